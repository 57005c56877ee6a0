use std::collections::VecDeque;
use std::time::Duration;

use tokio::time::Instant;

/// Smallest step past a window edge; matches the timer resolution
const SLOT_STEP: Duration = Duration::from_millis(1);

/// One sliding-window constraint announced by the server: at most `limit`
/// calls within any span of `duration`
///
/// Windows are closed: a call logged at `t` still counts at exactly
/// `t + duration` and stops counting right after.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct QuotaWindow {
    /// Maximum calls allowed per window
    pub limit: u32,

    /// Window length (millisecond precision)
    pub duration: Duration,
}

impl QuotaWindow {
    /// Create a new window
    pub const fn new(limit: u32, duration: Duration) -> Self {
        Self { limit, duration }
    }

    /// Create a window from a `limit:seconds` header pair
    pub const fn from_secs(limit: u32, secs: u64) -> Self {
        Self::new(limit, crate::time::secs_to_duration(secs))
    }

    /// Number of logged calls that still count against this window at `now`
    pub fn count_at(&self, log: &UsageLog, now: Instant) -> usize {
        log.len() - log.first_within(self.duration, now)
    }

    /// Whether one more call fits in this window at `now`
    #[inline]
    pub fn has_capacity(&self, log: &UsageLog, now: Instant) -> bool {
        self.count_at(log, now) < self.limit as usize
    }

    /// When this window regains one free slot, or `None` if it already has one
    pub fn frees_at(&self, log: &UsageLog, now: Instant) -> Option<Instant> {
        let first = log.first_within(self.duration, now);
        let count = log.len() - first;
        if count < self.limit as usize {
            return None;
        }

        // `count - limit + 1` entries have to age out before a slot opens
        let oldest = log.get(first + count - self.limit as usize).unwrap_or(now);
        Some(oldest.checked_add(self.duration.saturating_add(SLOT_STEP)).unwrap_or(now))
    }
}

/// Ordered call timestamps for one bucket, oldest first
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct UsageLog {
    entries: VecDeque<Instant>,
}

impl UsageLog {
    /// Create an empty log
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a log from timestamps in any order
    pub fn from_unsorted(mut entries: Vec<Instant>) -> Self {
        entries.sort_unstable();
        Self { entries: entries.into() }
    }

    /// Append a call timestamp, keeping the log ordered
    pub fn record(&mut self, at: Instant) {
        match self.entries.back() {
            Some(last) if *last > at => {
                let idx = self.entries.partition_point(|entry| *entry <= at);
                self.entries.insert(idx, at);
            }
            _ => self.entries.push_back(at),
        }
    }

    /// Drop every entry older than `horizon`
    pub fn prune(&mut self, horizon: Duration, now: Instant) {
        while let Some(front) = self.entries.front() {
            if now.saturating_duration_since(*front) > horizon {
                self.entries.pop_front();
            } else {
                break;
            }
        }
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn get(&self, idx: usize) -> Option<Instant> {
        self.entries.get(idx).copied()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Instant> {
        self.entries.iter()
    }

    /// Index of the oldest entry at most `duration` old at `now`
    fn first_within(&self, duration: Duration, now: Instant) -> usize {
        self.entries.partition_point(|entry| now.saturating_duration_since(*entry) > duration)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn log_at(base: Instant, offsets_ms: &[u64]) -> UsageLog {
        UsageLog::from_unsorted(offsets_ms.iter().map(|ms| base + Duration::from_millis(*ms)).collect())
    }

    #[test]
    fn test_count_within_window() {
        let base = Instant::now();
        let log = log_at(base, &[0, 200, 400, 900]);
        let window = QuotaWindow::new(10, Duration::from_millis(1000));

        assert_eq!(window.count_at(&log, base + Duration::from_millis(900)), 4);
        // entry at 0 still counts at exactly 1000
        assert_eq!(window.count_at(&log, base + Duration::from_millis(1000)), 4);
        assert_eq!(window.count_at(&log, base + Duration::from_millis(1001)), 3);
        assert_eq!(window.count_at(&log, base + Duration::from_millis(1450)), 1);
    }

    #[test]
    fn test_has_capacity() {
        let base = Instant::now();
        let log = log_at(base, &[0, 100]);
        let window = QuotaWindow::new(2, Duration::from_millis(1000));

        assert!(!window.has_capacity(&log, base + Duration::from_millis(500)));
        assert!(!window.has_capacity(&log, base + Duration::from_millis(1000)));
        assert!(window.has_capacity(&log, base + Duration::from_millis(1001)));
    }

    #[test]
    fn test_frees_at_oldest_entry() {
        let base = Instant::now();
        let log = log_at(base, &[0, 100, 300]);
        let window = QuotaWindow::new(2, Duration::from_millis(1000));
        let now = base + Duration::from_millis(400);

        // three in window, limit two: the entry at 100 must expire too
        assert_eq!(window.frees_at(&log, now), Some(base + Duration::from_millis(1101)));
        assert!(window.has_capacity(&log, base + Duration::from_millis(1101)));

        let roomy = QuotaWindow::new(5, Duration::from_millis(1000));
        assert_eq!(roomy.frees_at(&log, now), None);
    }

    #[test]
    fn test_zero_limit_never_has_capacity() {
        let now = Instant::now();
        let window = QuotaWindow::new(0, Duration::from_secs(1));
        let log = UsageLog::new();

        assert!(!window.has_capacity(&log, now));
        assert_eq!(window.frees_at(&log, now), Some(now + Duration::from_millis(1001)));
    }

    #[test]
    fn test_record_keeps_order() {
        let base = Instant::now();
        let mut log = log_at(base, &[0, 500]);
        log.record(base + Duration::from_millis(200));
        log.record(base + Duration::from_millis(800));

        let offsets: Vec<u64> = log.iter().map(|at| at.duration_since(base).as_millis() as u64).collect();
        assert_eq!(offsets, vec![0, 200, 500, 800]);
    }

    #[test]
    fn test_prune() {
        let base = Instant::now();
        let mut log = log_at(base, &[0, 500, 1500]);
        log.prune(Duration::from_millis(1000), base + Duration::from_millis(1500));

        // the entry at 500 is exactly one horizon old and stays
        assert_eq!(log.len(), 2);
        assert_eq!(log.get(0), Some(base + Duration::from_millis(500)));
    }
}
