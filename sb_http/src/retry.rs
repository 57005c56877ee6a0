use std::time::Duration;

use http::StatusCode;
use serde::Deserialize;

/// What the dispatcher does with a response status
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    Success,
    /// 429: cool down, then retry through admission
    Throttled,
    /// 5xx: retry with backoff
    Transient,
    NotFound,
    Unauthorized,
    /// Any other 4xx (or unexpected status); not retried
    Rejected,
}

/// Map a response status to the dispatcher's next step
pub fn classify(status: StatusCode) -> Outcome {
    match status {
        status if status.is_success() => Outcome::Success,
        StatusCode::TOO_MANY_REQUESTS => Outcome::Throttled,
        StatusCode::NOT_FOUND => Outcome::NotFound,
        StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => Outcome::Unauthorized,
        status if status.is_server_error() => Outcome::Transient,
        _ => Outcome::Rejected,
    }
}

/// Retry budget and pacing
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct RetryPolicy {
    /// Total attempts for a call hitting 5xx, timeouts or network errors (default: 3)
    pub max_attempts: u32,

    /// Backoff unit; the n-th failure waits n times this (default: 1000ms)
    pub backoff_ms: u64,

    /// Total attempts for a call that keeps getting 429 (default: 3)
    pub rate_limit_attempts: u32,

    /// Cooldown after a 429 without `Retry-After` on a bucket with no known window (default: 1000ms)
    pub default_cooldown_ms: u64,

    /// Upper bound on any 429 cooldown, whatever `Retry-After` asks for (default: 600000ms)
    pub max_cooldown_ms: u64,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self { max_attempts: 3, backoff_ms: 1000, rate_limit_attempts: 3, default_cooldown_ms: 1000, max_cooldown_ms: 600_000 }
    }
}

impl RetryPolicy {
    /// Policy that never retries
    pub fn none() -> Self {
        Self { max_attempts: 1, rate_limit_attempts: 1, ..Default::default() }
    }

    /// Wait after the `failures`-th transient failure
    pub fn backoff_for(&self, failures: u32) -> Duration {
        Duration::from_millis(self.backoff_ms.saturating_mul(u64::from(failures)))
    }

    pub fn default_cooldown(&self) -> Duration {
        Duration::from_millis(self.default_cooldown_ms)
    }

    pub fn max_cooldown(&self) -> Duration {
        Duration::from_millis(self.max_cooldown_ms)
    }
}
