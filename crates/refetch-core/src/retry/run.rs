//! Retry loop: drive attempts until a response decodes, the hooks say stop,
//! attempts run out, or the request is cancelled.

use super::attempt::{run_attempt, AttemptOutcome, Hooks};
use super::error::{ExchangeError, FetchError};
use super::policy::RetryPolicy;
use super::retry_after::{RetryAfterPolicy, RetryDecision};
use crate::decode::{decode, Decoded, OutputKind};
use crate::middleware::{MiddlewareChain, MiddlewareContext};
use crate::request::{OutgoingRequest, RawResponse};
use crate::transport::Transport;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

/// Everything the loop needs for one logical request, already resolved
/// against client defaults.
#[derive(Debug, Clone)]
pub struct FetchPlan {
    pub request: OutgoingRequest,
    pub output: OutputKind,
    /// Attempt budget (including the first); 0 is treated as 1.
    pub max_attempts: u32,
    /// Backoff between failed attempts. Without it, plain failures retry
    /// immediately and `RetryAuto` uses [`RetryPolicy::default`].
    pub retry: Option<RetryPolicy>,
    pub retry_after: RetryAfterPolicy,
    pub hooks: Hooks,
    /// Per-attempt limit; only armed when no `cancel` token is supplied.
    pub timeout: Option<Duration>,
    pub cancel: Option<CancellationToken>,
}

impl FetchPlan {
    pub fn new(request: OutgoingRequest) -> Self {
        Self {
            request,
            output: OutputKind::default(),
            max_attempts: super::policy::DEFAULT_MAX_ATTEMPTS,
            retry: None,
            retry_after: RetryAfterPolicy::default(),
            hooks: Hooks::default(),
            timeout: None,
            cancel: None,
        }
    }
}

/// What to do once an attempt has been classified.
enum Next {
    /// Try again, after the delay if any.
    Retry(Option<Duration>),
    Stop,
}

/// Run `plan` to completion and hand the decoded body to `on_success`.
///
/// Exactly one of two things happens: `on_success` runs once and its value is
/// returned, or a [`FetchError`] is returned. `Cancelled` and `CallbackFailure`
/// are never retried.
pub async fn fetch_with_retry<T, R, F>(
    transport: &T,
    middleware: &MiddlewareChain,
    plan: FetchPlan,
    on_success: F,
) -> Result<R, FetchError>
where
    T: Transport + ?Sized,
    F: FnOnce(Decoded) -> anyhow::Result<R>,
{
    let FetchPlan {
        request,
        output,
        max_attempts,
        retry,
        retry_after,
        hooks,
        timeout,
        cancel,
    } = plan;

    let max_attempts = max_attempts.max(1);
    let url = request.url.clone();
    // A timeout gets its own token; a caller-supplied token disables it.
    let (cancel, timeout) = match cancel {
        Some(token) => (token, None),
        None => (CancellationToken::new(), timeout),
    };
    let backoff = |policy: RetryPolicy, attempt: u32| {
        policy.with_max_attempts(max_attempts).delay_for(attempt)
    };

    let mut last_response: Option<RawResponse> = None;
    let mut attempts = 0u32;

    for attempt in 0..max_attempts {
        if cancel.is_cancelled() {
            return Err(FetchError::Cancelled);
        }
        attempts = attempt + 1;
        let is_last_attempt = attempts == max_attempts;

        let ctx = MiddlewareContext {
            attempt,
            max_attempts,
            cancel: cancel.clone(),
        };
        let exchange = async {
            let prepared = middleware.apply(request.clone(), &ctx).await;
            run_attempt(transport, prepared, &cancel, &hooks, is_last_attempt).await
        };
        // The timer only spans middleware and the exchange; dropping it disarms it.
        let outcome = match timeout {
            Some(limit) => match tokio::time::timeout(limit, exchange).await {
                Ok(outcome) => outcome?,
                Err(_) => {
                    tracing::debug!(attempt, timeout_ms = limit.as_millis() as u64, url = %url, "attempt timed out");
                    cancel.cancel();
                    return Err(FetchError::Cancelled);
                }
            },
            None => exchange.await?,
        };

        let next = match outcome {
            AttemptOutcome::Success(response) => {
                let kept = response.clone();
                match decode(response, output) {
                    Ok(decoded) => {
                        return on_success(decoded).map_err(|source| {
                            tracing::warn!(url = %url, attempt, "success callback failed: {:#}", source);
                            FetchError::CallbackFailure {
                                url,
                                attempt,
                                response: Box::new(kept),
                                source,
                            }
                        });
                    }
                    Err(e) => network_failure(ExchangeError::Decode(e), &hooks, retry, |p| {
                        backoff(p, attempt)
                    }),
                }
            }
            // Retry-After codes always go to the negotiator; the error hook only gates the rest.
            AttemptOutcome::Retryable(response) | AttemptOutcome::Terminal(response)
                if retry_after.triggers(response.status.as_u16()) =>
            {
                let next = match retry_after.decide(&response) {
                    RetryDecision::Retry(delay) => Next::Retry(Some(delay)),
                    RetryDecision::RetryAuto => {
                        Next::Retry(Some(backoff(retry.unwrap_or_default(), attempt)))
                    }
                    RetryDecision::Stop => Next::Stop,
                };
                last_response = Some(response);
                next
            }
            AttemptOutcome::Retryable(response) => {
                last_response = Some(response);
                Next::Retry(retry.map(|p| backoff(p, attempt)))
            }
            AttemptOutcome::Terminal(response) => {
                tracing::debug!(url = %url, attempt, status = response.status.as_u16(), "error hook declined retry");
                last_response = Some(response);
                Next::Stop
            }
            AttemptOutcome::NetworkFailure(err) => {
                network_failure(err, &hooks, retry, |p| backoff(p, attempt))
            }
        };

        match next {
            Next::Stop => break,
            Next::Retry(_) if is_last_attempt => {}
            Next::Retry(delay) => {
                tracing::debug!(
                    url = %url,
                    attempt = attempt + 1,
                    max_attempts,
                    status = last_response.as_ref().map(|r| r.status.as_u16()),
                    delay_ms = delay.map(|d| d.as_millis() as u64),
                    "retrying request"
                );
                if let Some(delay) = delay {
                    sleep_or_cancel(delay, &cancel).await?;
                }
            }
        }
    }

    Err(match last_response {
        Some(response) => FetchError::ExhaustedWithResponse {
            url,
            attempts,
            response: Box::new(response),
        },
        None => FetchError::ExhaustedNoResponse { url, attempts },
    })
}

fn network_failure(
    err: ExchangeError,
    hooks: &Hooks,
    retry: Option<RetryPolicy>,
    backoff: impl Fn(RetryPolicy) -> Duration,
) -> Next {
    tracing::debug!(error = %err, "exchange failed");
    if (hooks.on_network_error)(&err) {
        Next::Retry(retry.map(backoff))
    } else {
        Next::Stop
    }
}

/// Wait for `delay` unless `cancel` fires first.
pub async fn sleep_or_cancel(delay: Duration, cancel: &CancellationToken) -> Result<(), FetchError> {
    tokio::select! {
        biased;
        _ = cancel.cancelled() => Err(FetchError::Cancelled),
        _ = tokio::time::sleep(delay) => Ok(()),
    }
}
