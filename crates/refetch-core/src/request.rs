//! Outgoing request and raw response values threaded through the engine.

use bytes::Bytes;
use http::header::{HeaderName, HeaderValue, CONTENT_TYPE};
use http::{HeaderMap, Method, StatusCode};
use url::Url;

/// Default content type declared on every outgoing request unless overridden.
pub const JSON_CONTENT_TYPE: &str = "application/json";

/// A request as it travels through the middleware chain to the transport.
///
/// Middleware receive it by value and hand back a (possibly new) request; the
/// engine keeps only the latest one and sends that.
#[derive(Debug, Clone)]
pub struct OutgoingRequest {
    pub method: Method,
    pub url: Url,
    pub headers: HeaderMap,
    pub body: Option<Bytes>,
}

impl OutgoingRequest {
    /// New request with `Content-Type: application/json` and no body.
    pub fn new(method: Method, url: Url) -> Self {
        let mut headers = HeaderMap::new();
        headers.insert(CONTENT_TYPE, HeaderValue::from_static(JSON_CONTENT_TYPE));
        Self {
            method,
            url,
            headers,
            body: None,
        }
    }

    /// Serialize `value` as JSON and use it as the body.
    pub fn with_json_body<T: serde::Serialize + ?Sized>(
        mut self,
        value: &T,
    ) -> Result<Self, serde_json::Error> {
        self.body = Some(Bytes::from(serde_json::to_vec(value)?));
        Ok(self)
    }

    /// Insert or replace a header.
    pub fn set_header(&mut self, name: HeaderName, value: HeaderValue) {
        self.headers.insert(name, value);
    }

    /// Merge `extra` over the current headers; entries in `extra` win.
    pub fn merge_headers(&mut self, extra: &HeaderMap) {
        for name in extra.keys() {
            self.headers.remove(name);
            for value in extra.get_all(name) {
                self.headers.append(name.clone(), value.clone());
            }
        }
    }
}

/// A fully received HTTP response.
#[derive(Debug, Clone)]
pub struct RawResponse {
    /// Final URL after redirects.
    pub url: Url,
    pub status: StatusCode,
    pub headers: HeaderMap,
    pub body: Bytes,
}

impl RawResponse {
    /// True for 2xx statuses.
    pub fn is_success(&self) -> bool {
        self.status.is_success()
    }

    /// Header value as a string, if present and visible ASCII.
    pub fn header_str(&self, name: impl http::header::AsHeaderName) -> Option<&str> {
        self.headers.get(name).and_then(|v| v.to_str().ok())
    }

    /// `Content-Type` without parameters, lowercased.
    pub fn content_type(&self) -> Option<String> {
        self.header_str(CONTENT_TYPE)
            .map(|v| v.split(';').next().unwrap_or(v).trim().to_ascii_lowercase())
    }
}
