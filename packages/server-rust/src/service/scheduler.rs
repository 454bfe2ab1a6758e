//! Deferred job execution.
//!
//! Async operations advance through their stages as jobs submitted to a
//! [`Scheduler`] after a fixed delay. [`TokioScheduler`] runs them on the
//! runtime (and therefore honours tokio's paused test clock); [`ManualScheduler`]
//! queues them until a test advances its virtual time.

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use parking_lot::Mutex;
use tokio::runtime::Handle;
use tracing::debug;

/// A unit of deferred work.
pub type Job = Box<dyn FnOnce() + Send + 'static>;

/// Identifies a submitted job.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct JobHandle(pub u64);

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum SchedulerError {
    #[error("no tokio runtime is available to run scheduled jobs")]
    NoRuntime,
}

/// Runs jobs after a delay. Jobs are never cancelled once submitted.
pub trait Scheduler: Send + Sync + 'static {
    /// # Errors
    ///
    /// Fails only when the scheduler cannot accept work at all.
    fn submit(&self, delay: Duration, job: Job) -> Result<JobHandle, SchedulerError>;
}

// ---------------------------------------------------------------------------
// TokioScheduler
// ---------------------------------------------------------------------------

/// Spawns every job as its own task that sleeps for the delay first.
#[derive(Debug, Clone)]
pub struct TokioScheduler {
    runtime: Handle,
    next_id: std::sync::Arc<AtomicU64>,
}

impl TokioScheduler {
    #[must_use]
    pub fn new(runtime: Handle) -> Self {
        Self {
            runtime,
            next_id: std::sync::Arc::new(AtomicU64::new(1)),
        }
    }

    /// Binds to the runtime the caller is executing on.
    ///
    /// # Errors
    ///
    /// Returns [`SchedulerError::NoRuntime`] outside a tokio context.
    pub fn current() -> Result<Self, SchedulerError> {
        Handle::try_current()
            .map(Self::new)
            .map_err(|_| SchedulerError::NoRuntime)
    }
}

impl Scheduler for TokioScheduler {
    fn submit(&self, delay: Duration, job: Job) -> Result<JobHandle, SchedulerError> {
        let handle = JobHandle(self.next_id.fetch_add(1, Ordering::Relaxed));
        self.runtime.spawn(async move {
            tokio::time::sleep(delay).await;
            debug!(job = handle.0, "running scheduled job");
            job();
        });
        Ok(handle)
    }
}

// ---------------------------------------------------------------------------
// ManualScheduler
// ---------------------------------------------------------------------------

#[derive(Default)]
struct ManualQueue {
    now: Duration,
    /// Keyed by (due time, submission order) so equal deadlines run FIFO.
    due: BTreeMap<(Duration, u64), Job>,
    next_id: u64,
}

/// Virtual-time scheduler for deterministic tests.
///
/// Nothing runs until [`ManualScheduler::advance`] is called. Jobs submitted by
/// a running job are scheduled relative to that job's due time, so a chain of
/// stages completes within a single large enough `advance`.
#[derive(Default)]
pub struct ManualScheduler {
    queue: Mutex<ManualQueue>,
}

impl ManualScheduler {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of jobs waiting to run.
    #[must_use]
    pub fn pending(&self) -> usize {
        self.queue.lock().due.len()
    }

    /// Current virtual time.
    #[must_use]
    pub fn elapsed(&self) -> Duration {
        self.queue.lock().now
    }

    /// Moves virtual time forward by `by`, running every job that becomes due,
    /// in deadline order. Returns how many jobs ran.
    pub fn advance(&self, by: Duration) -> usize {
        let target = self.queue.lock().now + by;
        let mut ran = 0;

        loop {
            let next = {
                let mut queue = self.queue.lock();
                let first_due = queue.due.keys().next().copied();
                match first_due {
                    Some(key) if key.0 <= target => {
                        queue.now = key.0;
                        queue.due.remove(&key)
                    }
                    _ => {
                        queue.now = target;
                        None
                    }
                }
            };

            // Run outside the lock: jobs may submit follow-up jobs.
            match next {
                Some(job) => {
                    job();
                    ran += 1;
                }
                None => return ran,
            }
        }
    }
}

impl Scheduler for ManualScheduler {
    fn submit(&self, delay: Duration, job: Job) -> Result<JobHandle, SchedulerError> {
        let mut queue = self.queue.lock();
        queue.next_id += 1;
        let id = queue.next_id;
        let due_at = queue.now + delay;
        queue.due.insert((due_at, id), job);
        Ok(JobHandle(id))
    }
}

impl std::fmt::Debug for ManualScheduler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let queue = self.queue.lock();
        f.debug_struct("ManualScheduler")
            .field("now", &queue.now)
            .field("pending", &queue.due.len())
            .finish()
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
