//! Retry engine.
//!
//! Backoff calculation, `Retry-After` negotiation, single-attempt
//! classification and the loop that ties them together around one
//! [`Transport`](crate::transport::Transport) exchange per attempt.

mod attempt;
mod error;
mod policy;
mod retry_after;
mod run;

pub use attempt::{run_attempt, AttemptOutcome, ErrorHook, Hooks, NetworkErrorHook};
pub use error::{ExchangeError, FetchError};
pub use policy::{
    BackoffKind, RetryPolicy, UnknownBackoffKind, DEFAULT_MAX_ATTEMPTS, DEFAULT_MAX_DELAY,
    DEFAULT_MIN_DELAY, JITTER_FRACTION,
};
pub use retry_after::{
    negotiate_retry_after, Negotiator, RetryAfterPolicy, RetryDecision, DEFAULT_RETRY_AFTER_CODES,
};
pub use run::{fetch_with_retry, sleep_or_cancel, FetchPlan};
