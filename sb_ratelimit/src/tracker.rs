use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;
use std::sync::atomic::AtomicU64;
use std::sync::atomic::Ordering;
use std::time::Duration;

use dashmap::DashMap;
use parking_lot::Mutex;
use tokio::time::Instant;

use crate::headers::ParsedLimits;
use crate::time::now;
use crate::window::QuotaWindow;
use crate::window::UsageLog;

/// How long history is kept for a bucket whose policy has not been announced yet
const UNKNOWN_POLICY_HORIZON: Duration = Duration::from_secs(120);

/// Quota scope of a bucket
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Scope {
    /// Shared by every method on a route
    App,
    /// One endpoint template, e.g. `summoner-v4.by-puuid`
    Method(String),
}

/// A quota domain: one route (platform id or regional cluster) and one scope
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct BucketKey {
    pub route: String,
    pub scope: Scope,
}

impl BucketKey {
    pub fn app(route: impl Into<String>) -> Self {
        Self { route: route.into(), scope: Scope::App }
    }

    pub fn method(route: impl Into<String>, method_key: impl Into<String>) -> Self {
        Self { route: route.into(), scope: Scope::Method(method_key.into()) }
    }
}

impl fmt::Display for BucketKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.scope {
            Scope::App => write!(f, "{}/app", self.route),
            Scope::Method(method) => write!(f, "{}/{}", self.route, method),
        }
    }
}

/// The two buckets every call is admitted against
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CallBuckets {
    pub app: BucketKey,
    pub method: BucketKey,
}

impl CallBuckets {
    pub fn new(route: impl Into<String>, method_key: impl Into<String>) -> Self {
        let route = route.into();
        Self { app: BucketKey::app(route.clone()), method: BucketKey::method(route, method_key) }
    }
}

/// Proof that a call was admitted and logged against both of its buckets
///
/// Hand it back through [`QuotaTracker::settle`] once the response arrives, or
/// [`QuotaTracker::release`] if none did.
#[derive(Debug)]
pub struct Reservation {
    id: u64,
    at: Instant,
    buckets: CallBuckets,
}

impl Reservation {
    pub fn buckets(&self) -> &CallBuckets {
        &self.buckets
    }

    /// When the call was logged
    pub fn at(&self) -> Instant {
        self.at
    }
}

/// Point-in-time view of one bucket
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BucketSnapshot {
    pub windows: Vec<QuotaWindow>,
    /// In-window call count, one per entry of `windows`
    pub in_window: Vec<usize>,
    pub logged: usize,
    pub in_flight: usize,
    pub saturated_until: Option<Instant>,
}

#[derive(Debug, Default)]
struct BucketState {
    windows: Vec<QuotaWindow>,
    log: UsageLog,
    saturated_until: Option<Instant>,
    /// Admitted calls whose response has not been reconciled yet
    in_flight: BTreeMap<u64, Instant>,
}

impl BucketState {
    fn horizon(&self) -> Duration {
        self.windows.iter().map(|window| window.duration).max().unwrap_or(UNKNOWN_POLICY_HORIZON)
    }

    fn prune(&mut self, now: Instant) {
        let horizon = self.horizon();
        self.log.prune(horizon, now);
        // markers left behind by abandoned calls stop mattering once they leave every window
        self.in_flight.retain(|_, at| now.saturating_duration_since(*at) <= horizon);
        if self.saturated_until.is_some_and(|until| until <= now) {
            self.saturated_until = None;
        }
    }

    fn can_proceed(&mut self, now: Instant) -> bool {
        self.prune(now);
        if self.saturated_until.is_some() {
            return false;
        }
        self.windows.iter().all(|window| window.has_capacity(&self.log, now))
    }

    fn next_available_at(&mut self, now: Instant) -> Instant {
        self.prune(now);
        let mut at = self.saturated_until.unwrap_or(now).max(now);
        for window in &self.windows {
            if let Some(frees) = window.frees_at(&self.log, now) {
                at = at.max(frees);
            }
        }
        at
    }

    fn reconcile(&mut self, windows: &[QuotaWindow], usage: &[Instant]) {
        if !windows.is_empty() {
            self.windows = windows.to_vec();
        }
        self.log = UsageLog::from_unsorted(usage.to_vec());
    }

    fn snapshot(&mut self, now: Instant) -> BucketSnapshot {
        self.prune(now);
        BucketSnapshot {
            windows: self.windows.clone(),
            in_window: self.windows.iter().map(|window| window.count_at(&self.log, now)).collect(),
            logged: self.log.len(),
            in_flight: self.in_flight.len(),
            saturated_until: self.saturated_until,
        }
    }
}

/// Per-bucket quota bookkeeping
///
/// Buckets are created on first reference and each sits behind its own lock,
/// so calls on different buckets never contend. Admission ([`try_reserve`])
/// locks the app bucket before the method bucket, always in that order.
///
/// [`try_reserve`]: QuotaTracker::try_reserve
#[derive(Debug, Default)]
pub struct QuotaTracker {
    buckets: DashMap<BucketKey, Arc<Mutex<BucketState>>>,
    next_reservation: AtomicU64,
}

impl QuotaTracker {
    /// Create an empty tracker; every bucket starts with no known limit
    pub fn new() -> Self {
        Self::default()
    }

    fn bucket(&self, key: &BucketKey) -> Arc<Mutex<BucketState>> {
        if let Some(state) = self.buckets.get(key) {
            return Arc::clone(state.value());
        }
        Arc::clone(self.buckets.entry(key.clone()).or_default().value())
    }

    /// Whether one more call on this bucket fits every active window right now
    pub fn can_proceed(&self, key: &BucketKey) -> bool {
        self.bucket(key).lock().can_proceed(now())
    }

    /// Log a call against the bucket
    pub fn record(&self, key: &BucketKey, at: Instant) {
        self.bucket(key).lock().log.record(at);
    }

    /// Overwrite local bookkeeping with the server's view
    ///
    /// A non-empty `windows` replaces the bucket's window set wholesale; an empty
    /// one (response without limit headers) leaves the known policy in place.
    /// The usage log is always replaced.
    pub fn reconcile(&self, key: &BucketKey, windows: &[QuotaWindow], usage: &[Instant]) {
        self.bucket(key).lock().reconcile(windows, usage);
    }

    /// When the bucket can next admit a call; now if it already can
    pub fn next_available_at(&self, key: &BucketKey) -> Instant {
        self.bucket(key).lock().next_available_at(now())
    }

    /// Treat the bucket as exhausted until `until`, whatever the local log says
    pub fn saturate(&self, key: &BucketKey, until: Instant) {
        let state = self.bucket(key);
        let mut state = state.lock();
        state.saturated_until = Some(state.saturated_until.map_or(until, |current| current.max(until)));
        tracing::debug!(bucket = %key, "bucket saturated");
    }

    /// Longest known window of the bucket
    pub fn cooldown(&self, key: &BucketKey) -> Option<Duration> {
        self.bucket(key).lock().windows.iter().map(|window| window.duration).max()
    }

    pub fn snapshot(&self, key: &BucketKey) -> BucketSnapshot {
        self.bucket(key).lock().snapshot(now())
    }

    /// Admit a call against both of its buckets and log it, or report when to try again
    pub fn try_reserve(&self, buckets: &CallBuckets) -> Result<Reservation, Instant> {
        self.try_reserve_at(buckets, now())
    }

    pub(crate) fn try_reserve_at(&self, buckets: &CallBuckets, now: Instant) -> Result<Reservation, Instant> {
        let app = self.bucket(&buckets.app);
        let method = self.bucket(&buckets.method);
        let mut app = app.lock();
        let mut method = method.lock();

        if !(app.can_proceed(now) && method.can_proceed(now)) {
            return Err(app.next_available_at(now).max(method.next_available_at(now)));
        }

        let id = self.next_reservation.fetch_add(1, Ordering::Relaxed);
        for state in [&mut *app, &mut *method] {
            state.log.record(now);
            state.in_flight.insert(id, now);
        }
        Ok(Reservation { id, at: now, buckets: buckets.clone() })
    }

    /// Reconcile both buckets of an answered call from its response
    ///
    /// Calls admitted on the same bucket and still awaiting their own response
    /// cannot be in the server's counts yet, so they are logged again on top.
    /// A scope whose counts were not reported keeps its local log, which already
    /// holds this call.
    pub fn settle(&self, reservation: Reservation, parsed: &ParsedLimits) {
        let scopes = [
            (&reservation.buckets.app, &parsed.app, &parsed.usage.app, parsed.usage.app_reported),
            (&reservation.buckets.method, &parsed.method, &parsed.usage.method, parsed.usage.method_reported),
        ];
        for (key, windows, usage, reported) in scopes {
            let state = self.bucket(key);
            let mut state = state.lock();
            state.in_flight.remove(&reservation.id);
            if !reported {
                if !windows.is_empty() {
                    state.windows = windows.clone();
                }
                continue;
            }
            state.reconcile(windows, usage);

            let pending: Vec<Instant> = state.in_flight.values().copied().collect();
            for at in pending {
                state.log.record(at);
            }
        }
    }

    /// Forget the in-flight marker of a call that got no response; its log entry stays
    pub fn release(&self, reservation: Reservation) {
        for key in [&reservation.buckets.app, &reservation.buckets.method] {
            self.bucket(key).lock().in_flight.remove(&reservation.id);
        }
    }
}
