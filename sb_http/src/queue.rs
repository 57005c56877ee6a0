use std::collections::HashMap;
use std::collections::VecDeque;
use std::sync::Arc;
use std::sync::atomic::AtomicU64;
use std::sync::atomic::AtomicUsize;
use std::sync::atomic::Ordering;
use std::time::Duration;

use parking_lot::Mutex;
use sb_ratelimit::BucketKey;
use sb_ratelimit::CallBuckets;
use sb_ratelimit::QuotaTracker;
use sb_ratelimit::Reservation;
use tokio::sync::oneshot;
use tokio::time::Instant;

/// Shortest sleep between two release attempts on the same bucket
const MIN_DRAIN_SLEEP: Duration = Duration::from_millis(1);

/// A call waiting for quota, plus the channel its reservation is handed over on
pub struct PendingCall {
    id: u64,
    buckets: CallBuckets,
    release: oneshot::Sender<Reservation>,
}

/// A bucket's waiting calls; the entry lives exactly as long as its drain task
#[derive(Default)]
struct BucketQueue {
    pending: VecDeque<PendingCall>,
    draining: bool,
}

/// Result of one [`RequestQueue::release_ready`] pass
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReleasePass {
    /// Calls handed a reservation, in FIFO order
    pub released: usize,
    /// When the front call can next be admitted; `None` once the queue is empty
    pub retry_at: Option<Instant>,
}

/// How a submission got past admission
pub enum Admission {
    /// Capacity was free and nobody was queued ahead
    Ready(Reservation),
    /// Parked behind earlier calls or exhausted quota
    Queued(QueueTicket),
}

/// Per-bucket FIFO of calls that could not run when submitted
///
/// Queues are keyed by the call's method bucket and created on demand. Each
/// queue has at most one drain task, which owns it until it runs empty and
/// removes it. The drain task releases calls from the front as
/// [`QuotaTracker::try_reserve`] admits them and sleeps until the tracker's next
/// free slot in between. The reservation is taken at release time, so two calls
/// released in the same tick never share a slot.
pub struct RequestQueue {
    queues: Mutex<HashMap<BucketKey, BucketQueue>>,
    tracker: Arc<QuotaTracker>,
    next_id: AtomicU64,
    active_drains: AtomicUsize,
}

impl RequestQueue {
    pub fn new(tracker: Arc<QuotaTracker>) -> Self {
        Self { queues: Mutex::new(HashMap::new()), tracker, next_id: AtomicU64::new(0), active_drains: AtomicUsize::new(0) }
    }

    /// Admit a call right away, or park it at the back of its bucket's queue
    ///
    /// A call never overtakes one already queued on its bucket, even when the
    /// tracker would admit it.
    pub fn admit(self: &Arc<Self>, buckets: &CallBuckets) -> Admission {
        let mut queues = self.queues.lock();
        let idle = queues.get(&buckets.method).is_none_or(|queue| queue.pending.is_empty());
        if idle {
            if let Ok(reservation) = self.tracker.try_reserve(buckets) {
                return Admission::Ready(reservation);
            }
        }

        let (release, receiver) = oneshot::channel();
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let queue = queues.entry(buckets.method.clone()).or_default();
        let start_drain = !queue.draining;
        queue.draining = true;
        queue.pending.push_back(PendingCall { id, buckets: buckets.clone(), release });
        let position = queue.pending.len();
        drop(queues);

        tracing::debug!(bucket = %buckets.method, position, "call queued");
        if start_drain {
            self.active_drains.fetch_add(1, Ordering::Relaxed);
            tokio::spawn(Arc::clone(self).drain(buckets.method.clone()));
        }

        Admission::Queued(QueueTicket { id, key: buckets.method.clone(), queue: Arc::clone(self), receiver })
    }

    /// Hand reservations to queued calls from the front while the tracker admits them
    ///
    /// Calls whose waiter has gone away are dropped without reserving anything.
    /// An emptied queue is removed, which ends its drain task.
    fn release_ready(&self, key: &BucketKey) -> ReleasePass {
        let mut queues = self.queues.lock();
        let Some(queue) = queues.get_mut(key) else {
            return ReleasePass { released: 0, retry_at: None };
        };

        let mut released = 0;
        while let Some(front) = queue.pending.front() {
            if front.release.is_closed() {
                queue.pending.pop_front();
                continue;
            }

            match self.tracker.try_reserve(&front.buckets) {
                Ok(reservation) => {
                    let Some(call) = queue.pending.pop_front() else { break };
                    if let Err(reservation) = call.release.send(reservation) {
                        // waiter left between the check and the send
                        self.tracker.release(reservation);
                    } else {
                        released += 1;
                    }
                }
                Err(retry_at) => return ReleasePass { released, retry_at: Some(retry_at) },
            }
        }

        queues.remove(key);
        ReleasePass { released, retry_at: None }
    }

    /// Number of calls waiting on a bucket
    pub fn len(&self, key: &BucketKey) -> usize {
        self.queues.lock().get(key).map_or(0, |queue| queue.pending.len())
    }

    pub fn is_empty(&self, key: &BucketKey) -> bool {
        self.len(key) == 0
    }

    /// Drain tasks currently running, across all buckets
    pub fn active_drains(&self) -> usize {
        self.active_drains.load(Ordering::Relaxed)
    }

    async fn drain(self: Arc<Self>, key: BucketKey) {
        loop {
            let pass = self.release_ready(&key);
            if pass.released > 0 {
                tracing::debug!(bucket = %key, released = pass.released, "released queued calls");
            }
            match pass.retry_at {
                Some(at) => tokio::time::sleep_until(at.max(Instant::now() + MIN_DRAIN_SLEEP)).await,
                None => break,
            }
        }
        self.active_drains.fetch_sub(1, Ordering::Relaxed);
    }

    /// Drop a waiting call; an emptied queue stays with its drain task, which removes it
    fn cancel(&self, key: &BucketKey, id: u64) {
        let mut queues = self.queues.lock();
        if let Some(queue) = queues.get_mut(key) {
            queue.pending.retain(|call| call.id != id);
        }
    }
}

/// A queued call's place in line
///
/// Dropping the ticket before release removes the call from its queue.
pub struct QueueTicket {
    id: u64,
    key: BucketKey,
    queue: Arc<RequestQueue>,
    receiver: oneshot::Receiver<Reservation>,
}

impl QueueTicket {
    /// Wait until the drain task hands this call a reservation
    pub async fn released(&mut self) -> Option<Reservation> {
        (&mut self.receiver).await.ok()
    }
}

impl Drop for QueueTicket {
    fn drop(&mut self) {
        self.receiver.close();
        // a reservation handed over after close, but never awaited, goes back
        if let Ok(reservation) = self.receiver.try_recv() {
            self.queue.tracker.release(reservation);
            return;
        }
        self.queue.cancel(&self.key, self.id);
    }
}
