//! Terminal errors of a logical request and the failures the network hook sees.

use crate::decode::DecodeError;
use crate::request::RawResponse;
use crate::transport::TransportError;
use url::Url;

/// A failed exchange with no usable response, as handed to the network-error hook.
#[derive(Debug, thiserror::Error)]
pub enum ExchangeError {
    #[error(transparent)]
    Transport(#[from] TransportError),
    /// A 2xx response whose body could not be converted to the declared kind.
    #[error("decode: {0}")]
    Decode(#[from] DecodeError),
}

/// How a logical request ended when it did not produce a value.
#[derive(Debug, thiserror::Error)]
pub enum FetchError {
    /// Attempts ran out (or the error hook said stop) after an HTTP failure.
    #[error("request to {url} failed after {attempts} attempt(s) with HTTP {}", .response.status)]
    ExhaustedWithResponse {
        url: Url,
        attempts: u32,
        response: Box<RawResponse>,
    },
    /// Every attempt failed before a response was obtained.
    #[error("request to {url} failed after {attempts} attempt(s) without a response")]
    ExhaustedNoResponse { url: Url, attempts: u32 },
    /// The caller's token or the per-attempt timeout aborted the request.
    #[error("request cancelled")]
    Cancelled,
    /// The exchange succeeded but the success callback failed.
    #[error("success callback failed for {url} on attempt {attempt}: {source:#}")]
    CallbackFailure {
        url: Url,
        attempt: u32,
        response: Box<RawResponse>,
        #[source]
        source: anyhow::Error,
    },
    /// The request could not be built; nothing was sent.
    #[error("invalid request: {0}")]
    InvalidRequest(String),
}

impl FetchError {
    pub fn is_cancelled(&self) -> bool {
        matches!(self, FetchError::Cancelled)
    }

    /// Last failing response, when one was received.
    pub fn response(&self) -> Option<&RawResponse> {
        match self {
            FetchError::ExhaustedWithResponse { response, .. }
            | FetchError::CallbackFailure { response, .. } => Some(&**response),
            _ => None,
        }
    }

    /// Number of attempts made before giving up, if the loop ran.
    pub fn attempts(&self) -> Option<u32> {
        match self {
            FetchError::ExhaustedWithResponse { attempts, .. }
            | FetchError::ExhaustedNoResponse { attempts, .. } => Some(*attempts),
            _ => None,
        }
    }
}
