//! Server-driven retry pacing via the `Retry-After` response header.

use crate::request::RawResponse;
use std::fmt;
use std::sync::Arc;
use std::time::{Duration, SystemTime};

/// Statuses that consult `Retry-After` by default.
pub const DEFAULT_RETRY_AFTER_CODES: [u16; 6] = [408, 429, 500, 502, 503, 504];

/// What to do after a response whose status is in the triggering set.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RetryDecision {
    /// Retry after exactly this delay.
    Retry(Duration),
    /// Retry after the backoff calculator's delay for this attempt.
    RetryAuto,
    /// Do not retry.
    Stop,
}

/// Negotiator signature: the response and its raw `Retry-After` value, if any.
pub type Negotiator = Arc<dyn Fn(&RawResponse, Option<&str>) -> RetryDecision + Send + Sync>;

/// Which statuses trigger negotiation, and how to negotiate.
#[derive(Clone)]
pub struct RetryAfterPolicy {
    pub codes: Vec<u16>,
    pub negotiate: Negotiator,
}

impl Default for RetryAfterPolicy {
    fn default() -> Self {
        Self::with_codes(DEFAULT_RETRY_AFTER_CODES.to_vec())
    }
}

impl fmt::Debug for RetryAfterPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RetryAfterPolicy")
            .field("codes", &self.codes)
            .finish_non_exhaustive()
    }
}

impl RetryAfterPolicy {
    /// Default negotiator over a custom set of triggering codes.
    pub fn with_codes(codes: Vec<u16>) -> Self {
        Self {
            codes,
            negotiate: Arc::new(|_, value| negotiate_retry_after(value, SystemTime::now())),
        }
    }

    /// Replace the negotiator, keeping the triggering codes.
    pub fn negotiator<F>(mut self, f: F) -> Self
    where
        F: Fn(&RawResponse, Option<&str>) -> RetryDecision + Send + Sync + 'static,
    {
        self.negotiate = Arc::new(f);
        self
    }

    /// True when `status` is in the triggering set.
    pub fn triggers(&self, status: u16) -> bool {
        self.codes.contains(&status)
    }

    /// Read `Retry-After` from `response` and run the negotiator.
    pub fn decide(&self, response: &RawResponse) -> RetryDecision {
        let value = response.header_str(http::header::RETRY_AFTER);
        (self.negotiate)(response, value)
    }
}

/// Default negotiation of a `Retry-After` value against `now`.
///
/// - absent: [`RetryDecision::RetryAuto`]
/// - HTTP date: the time until that date, zero when already past
/// - integer seconds: that many seconds, zero when negative
/// - anything else: logged and treated as absent
pub fn negotiate_retry_after(value: Option<&str>, now: SystemTime) -> RetryDecision {
    let Some(raw) = value else {
        return RetryDecision::RetryAuto;
    };
    let trimmed = raw.trim();

    if let Ok(at) = httpdate::parse_http_date(trimmed) {
        let delay = at.duration_since(now).unwrap_or(Duration::ZERO);
        return RetryDecision::Retry(delay);
    }

    if let Ok(secs) = trimmed.parse::<i64>() {
        let delay = u64::try_from(secs)
            .map(Duration::from_secs)
            .unwrap_or(Duration::ZERO);
        return RetryDecision::Retry(delay);
    }

    tracing::warn!(value = raw, "malformed Retry-After header; falling back to backoff");
    RetryDecision::RetryAuto
}
