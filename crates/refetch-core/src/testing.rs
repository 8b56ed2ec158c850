//! In-memory transport that replays a script, for engine tests.

use crate::request::{OutgoingRequest, RawResponse};
use crate::transport::{Transport, TransportError};
use async_trait::async_trait;
use bytes::Bytes;
use http::{HeaderMap, HeaderName, HeaderValue, StatusCode};
use std::collections::VecDeque;
use std::sync::Mutex;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

pub(crate) enum Step {
    Respond(RawResponse),
    /// Respond after the given delay.
    Delayed(Duration, RawResponse),
    Fail(TransportError),
    /// Never completes.
    Hang,
}

pub(crate) struct ScriptedTransport {
    script: Mutex<VecDeque<Step>>,
    sent: Mutex<Vec<OutgoingRequest>>,
}

impl ScriptedTransport {
    pub(crate) fn new(steps: Vec<Step>) -> Self {
        Self {
            script: Mutex::new(steps.into()),
            sent: Mutex::new(Vec::new()),
        }
    }

    /// Number of exchanges started.
    pub(crate) fn calls(&self) -> usize {
        self.sent.lock().unwrap().len()
    }

    /// Requests as they reached the transport, in order.
    pub(crate) fn sent(&self) -> Vec<OutgoingRequest> {
        self.sent.lock().unwrap().clone()
    }
}

#[async_trait]
impl Transport for ScriptedTransport {
    async fn send(
        &self,
        request: OutgoingRequest,
        _cancel: &CancellationToken,
    ) -> Result<RawResponse, TransportError> {
        self.sent.lock().unwrap().push(request);
        let step = self.script.lock().unwrap().pop_front();
        match step {
            Some(Step::Respond(r)) => Ok(r),
            Some(Step::Delayed(d, r)) => {
                tokio::time::sleep(d).await;
                Ok(r)
            }
            Some(Step::Fail(e)) => Err(e),
            Some(Step::Hang) => std::future::pending().await,
            None => Err(TransportError::Io(std::io::Error::new(
                std::io::ErrorKind::Other,
                "script exhausted",
            ))),
        }
    }
}

/// Build a response for `https://example.com/`.
pub(crate) fn response(status: u16, headers: &[(&str, &str)], body: &str) -> RawResponse {
    let mut map = HeaderMap::new();
    for (name, value) in headers {
        map.append(
            HeaderName::from_bytes(name.as_bytes()).unwrap(),
            HeaderValue::from_str(value).unwrap(),
        );
    }
    RawResponse {
        url: url::Url::parse("https://example.com/").unwrap(),
        status: StatusCode::from_u16(status).unwrap(),
        headers: map,
        body: Bytes::from(body.to_string()),
    }
}
