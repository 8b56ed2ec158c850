//! The "perform one HTTP exchange" primitive.
//!
//! The retry engine never talks to the network itself; it hands each
//! post-middleware request to a [`Transport`] and classifies what comes back.

mod curl_transport;
mod parse;

pub use curl_transport::CurlTransport;

use crate::request::{OutgoingRequest, RawResponse};
use async_trait::async_trait;
use tokio_util::sync::CancellationToken;

/// Failure to obtain any response at all.
#[derive(Debug, thiserror::Error)]
pub enum TransportError {
    /// libcurl reported an error (timeout, connection, DNS, aborted transfer).
    #[error("curl: {0}")]
    Curl(#[from] curl::Error),
    #[error("io: {0}")]
    Io(#[from] std::io::Error),
    /// A response arrived but could not be represented (bad status line, bad URL).
    #[error("invalid response: {0}")]
    InvalidResponse(String),
    /// The blocking task running the exchange panicked or was cancelled.
    #[error("transport task failed: {0}")]
    Task(String),
}

#[async_trait]
pub trait Transport: Send + Sync {
    /// Perform exactly one exchange for `request`.
    ///
    /// Implementations should stop early once `cancel` fires; the engine also
    /// races the returned future against the token.
    async fn send(
        &self,
        request: OutgoingRequest,
        cancel: &CancellationToken,
    ) -> Result<RawResponse, TransportError>;
}

#[async_trait]
impl<T: Transport + ?Sized> Transport for std::sync::Arc<T> {
    async fn send(
        &self,
        request: OutgoingRequest,
        cancel: &CancellationToken,
    ) -> Result<RawResponse, TransportError> {
        (**self).send(request, cancel).await
    }
}
