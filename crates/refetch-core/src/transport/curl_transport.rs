//! libcurl-backed transport.
//!
//! Each exchange runs on tokio's blocking pool with its own `Easy` handle.
//! Cancellation is observed from curl's progress callback, which aborts the
//! transfer as soon as the token fires.

use super::parse::parse_header_lines;
use super::{Transport, TransportError};
use crate::request::{OutgoingRequest, RawResponse};
use async_trait::async_trait;
use bytes::Bytes;
use http::{Method, StatusCode};
use std::str;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use url::Url;

/// Options applied to every `Easy` handle.
#[derive(Debug, Clone)]
pub struct CurlTransport {
    pub connect_timeout: Duration,
    pub follow_redirects: bool,
    pub max_redirections: u32,
}

impl Default for CurlTransport {
    fn default() -> Self {
        Self {
            connect_timeout: Duration::from_secs(30),
            follow_redirects: true,
            max_redirections: 10,
        }
    }
}

impl CurlTransport {
    pub fn new() -> Self {
        Self::default()
    }

    /// Blocking exchange; call from `spawn_blocking` when used from async code.
    pub fn perform(
        &self,
        request: &OutgoingRequest,
        cancel: &CancellationToken,
    ) -> Result<RawResponse, TransportError> {
        let mut header_lines: Vec<String> = Vec::new();
        let mut body: Vec<u8> = Vec::new();

        let mut easy = curl::easy::Easy::new();
        easy.url(request.url.as_str())?;
        match request.method {
            Method::GET => easy.get(true)?,
            Method::HEAD => easy.nobody(true)?,
            ref other => easy.custom_request(other.as_str())?,
        }
        if let Some(payload) = &request.body {
            easy.post_fields_copy(payload)?;
            // post_fields switches curl to POST; keep the declared method.
            if request.method != Method::POST {
                easy.custom_request(request.method.as_str())?;
            }
        }
        easy.follow_location(self.follow_redirects)?;
        easy.max_redirections(self.max_redirections)?;
        easy.connect_timeout(self.connect_timeout)?;
        easy.progress(true)?;

        let mut list = curl::easy::List::new();
        for (name, value) in &request.headers {
            let value = value
                .to_str()
                .map_err(|e| TransportError::InvalidResponse(format!("header {name}: {e}")))?;
            list.append(&format!("{}: {}", name.as_str(), value.trim()))?;
        }
        if !request.headers.is_empty() {
            easy.http_headers(list)?;
        }

        {
            let mut transfer = easy.transfer();
            transfer.header_function(|data| {
                if let Ok(s) = str::from_utf8(data) {
                    header_lines.push(s.trim_end().to_string());
                }
                true
            })?;
            transfer.write_function(|data| {
                body.extend_from_slice(data);
                Ok(data.len())
            })?;
            // Returning false aborts the transfer.
            transfer.progress_function(|_, _, _, _| !cancel.is_cancelled())?;
            transfer.perform()?;
        }

        let code = easy.response_code()?;
        let status = u16::try_from(code)
            .ok()
            .and_then(|c| StatusCode::from_u16(c).ok())
            .ok_or_else(|| TransportError::InvalidResponse(format!("status code {code}")))?;

        let url = match easy.effective_url()? {
            Some(u) => Url::parse(u)
                .map_err(|e| TransportError::InvalidResponse(format!("effective url {u}: {e}")))?,
            None => request.url.clone(),
        };

        Ok(RawResponse {
            url,
            status,
            headers: parse_header_lines(&header_lines),
            body: Bytes::from(body),
        })
    }
}

#[async_trait]
impl Transport for CurlTransport {
    async fn send(
        &self,
        request: OutgoingRequest,
        cancel: &CancellationToken,
    ) -> Result<RawResponse, TransportError> {
        let transport = self.clone();
        let cancel = cancel.clone();
        tokio::task::spawn_blocking(move || transport.perform(&request, &cancel))
            .await
            .map_err(|e| TransportError::Task(e.to_string()))?
    }
}
