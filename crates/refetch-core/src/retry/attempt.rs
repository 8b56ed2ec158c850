//! One HTTP exchange, classified for the retry loop.

use super::error::{ExchangeError, FetchError};
use crate::request::{OutgoingRequest, RawResponse};
use crate::transport::Transport;
use std::fmt;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

/// Called for every non-2xx response with `is_last_attempt`; `true` means retry.
pub type ErrorHook = Arc<dyn Fn(&RawResponse, bool) -> bool + Send + Sync>;

/// Called when no response could be obtained; `true` means retry.
pub type NetworkErrorHook = Arc<dyn Fn(&ExchangeError) -> bool + Send + Sync>;

/// The user hooks consulted by the retry loop. Both default to "always retry".
#[derive(Clone)]
pub struct Hooks {
    pub on_error: ErrorHook,
    pub on_network_error: NetworkErrorHook,
}

impl Default for Hooks {
    fn default() -> Self {
        Self {
            on_error: Arc::new(|_, _| true),
            on_network_error: Arc::new(|_| true),
        }
    }
}

impl fmt::Debug for Hooks {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Hooks").finish_non_exhaustive()
    }
}

/// Classification of a single exchange.
#[derive(Debug)]
pub enum AttemptOutcome {
    /// 2xx response.
    Success(RawResponse),
    /// Failure status and the error hook asked for a retry.
    Retryable(RawResponse),
    /// Failure status and the error hook said stop. Retry-After codes are
    /// still negotiated by the loop.
    Terminal(RawResponse),
    /// No response at all.
    NetworkFailure(ExchangeError),
}

/// Send `request` once and classify the result.
///
/// Resolves to [`FetchError::Cancelled`] as soon as `cancel` fires, whether or
/// not the transport notices.
pub async fn run_attempt<T: Transport + ?Sized>(
    transport: &T,
    request: OutgoingRequest,
    cancel: &CancellationToken,
    hooks: &Hooks,
    is_last_attempt: bool,
) -> Result<AttemptOutcome, FetchError> {
    let result = tokio::select! {
        biased;
        _ = cancel.cancelled() => return Err(FetchError::Cancelled),
        result = transport.send(request, cancel) => result,
    };

    match result {
        Ok(response) if response.is_success() => Ok(AttemptOutcome::Success(response)),
        Ok(response) => {
            if (hooks.on_error)(&response, is_last_attempt) {
                Ok(AttemptOutcome::Retryable(response))
            } else {
                Ok(AttemptOutcome::Terminal(response))
            }
        }
        // An aborted transfer surfaces as a transport error; report the cause instead.
        Err(_) if cancel.is_cancelled() => Err(FetchError::Cancelled),
        Err(e) => Ok(AttemptOutcome::NetworkFailure(ExchangeError::Transport(e))),
    }
}
