use rand::Rng;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use std::time::Duration;

/// Fraction of `max_delay` used as the jitter amplitude.
pub const JITTER_FRACTION: f64 = 1.0 / 5000.0;

/// Default floor for backoff delays.
pub const DEFAULT_MIN_DELAY: Duration = Duration::from_millis(500);

/// Default ceiling used by linear backoff and the jitter amplitude.
pub const DEFAULT_MAX_DELAY: Duration = Duration::from_secs(60);

/// Default number of attempts per logical request (including the first).
pub const DEFAULT_MAX_ATTEMPTS: u32 = 5;

/// Shape of the backoff curve.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase", try_from = "String")]
pub enum BackoffKind {
    /// `(attempt + 1) / max_attempts * max_delay`.
    Linear,
    /// `min_delay * 2^attempt`.
    #[default]
    Exponential,
}

/// Returned when a backoff kind name is not recognised.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unknown backoff kind {0:?} (expected \"linear\" or \"exponential\")")]
pub struct UnknownBackoffKind(pub String);

impl FromStr for BackoffKind {
    type Err = UnknownBackoffKind;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "linear" => Ok(BackoffKind::Linear),
            "exponential" => Ok(BackoffKind::Exponential),
            _ => Err(UnknownBackoffKind(s.to_string())),
        }
    }
}

impl TryFrom<String> for BackoffKind {
    type Error = UnknownBackoffKind;

    fn try_from(s: String) -> Result<Self, Self::Error> {
        s.parse()
    }
}

impl fmt::Display for BackoffKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BackoffKind::Linear => write!(f, "linear"),
            BackoffKind::Exponential => write!(f, "exponential"),
        }
    }
}

/// Backoff parameters for one logical request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub kind: BackoffKind,
    /// Floor: no computed delay is ever shorter than this.
    pub min_delay: Duration,
    /// Linear ceiling and jitter amplitude base.
    pub max_delay: Duration,
    /// Maximum number of attempts (including the first).
    pub max_attempts: u32,
    /// Add a small uniform offset to spread out synchronized clients.
    pub jitter: bool,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            kind: BackoffKind::Exponential,
            min_delay: DEFAULT_MIN_DELAY,
            max_delay: DEFAULT_MAX_DELAY,
            max_attempts: DEFAULT_MAX_ATTEMPTS,
            jitter: true,
        }
    }
}

impl RetryPolicy {
    /// Same policy evaluated over a different attempt budget.
    pub fn with_max_attempts(mut self, max_attempts: u32) -> Self {
        self.max_attempts = max_attempts;
        self
    }

    /// Compute the wait before the attempt following `attempt` (0-based).
    ///
    /// The result is rounded to whole milliseconds and never shorter than
    /// `min_delay`, including after negative jitter.
    pub fn delay_for(&self, attempt: u32) -> Duration {
        let min_ms = self.min_delay.as_secs_f64() * 1000.0;
        let max_ms = self.max_delay.as_secs_f64() * 1000.0;
        let max_attempts = f64::from(self.max_attempts.max(1));

        let base_ms = match self.kind {
            BackoffKind::Linear => (f64::from(attempt) + 1.0) / max_attempts * max_ms,
            BackoffKind::Exponential => min_ms * 2f64.powi(attempt.min(i32::MAX as u32) as i32),
        };

        let jitter_ms = if self.jitter {
            rand::rng().random_range(-1.0..=1.0) * max_ms * JITTER_FRACTION
        } else {
            0.0
        };

        let delay_ms = (base_ms + jitter_ms).max(min_ms);
        // `as u64` saturates for huge exponents. Rounding can drop a sub-ms
        // floor, so the floor is applied again on the `Duration`.
        Duration::from_millis(delay_ms.round() as u64).max(self.min_delay)
    }
}
