use std::time::Duration;

use tokio::time::Instant;

/// Current instant on the tokio clock
///
/// Every quota decision reads time through here so that paused-clock tests
/// (`tokio::time::pause`) drive window expiry deterministically.
#[inline(always)]
pub(crate) fn now() -> Instant {
    Instant::now()
}

/// Longest window a header can announce; longer values are clamped to it
pub(crate) const MAX_WINDOW_SECS: u64 = 24 * 60 * 60;

/// Convert a whole-seconds header value into a window duration
#[inline(always)]
pub(crate) const fn secs_to_duration(secs: u64) -> Duration {
    let secs = if secs > MAX_WINDOW_SECS { MAX_WINDOW_SECS } else { secs };
    Duration::from_secs(secs)
}

/// `at - offset`, clamped to `at` when the monotonic clock cannot reach that far back
///
/// Clamping only ever makes a synthesized entry look more recent, which over-counts.
#[inline(always)]
pub(crate) fn instant_before(at: Instant, offset: Duration) -> Instant {
    at.checked_sub(offset).unwrap_or(at)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_conversions() {
        assert_eq!(secs_to_duration(1), Duration::from_millis(1000));
        assert_eq!(secs_to_duration(120), Duration::from_secs(120));
        assert_eq!(secs_to_duration(u64::MAX), Duration::from_secs(MAX_WINDOW_SECS));
    }

    #[test]
    fn test_instant_before() {
        let at = now();
        let earlier = instant_before(at, Duration::from_secs(2));
        assert_eq!(at.duration_since(earlier), Duration::from_secs(2));
    }
}
