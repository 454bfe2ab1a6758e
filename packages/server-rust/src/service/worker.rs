//! Periodic background work.
//!
//! [`ExpirySweeper`] is the only runnable: when enabled it enforces
//! `expiresAt` on operation instances and unclaimed stream sessions, which is
//! otherwise advisory.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use opencall_core::ClockSource;
use tokio::sync::oneshot;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::debug;

use crate::storage::instances::InstanceStore;
use crate::stream::sessions::SessionRegistry;

// ---------------------------------------------------------------------------
// BackgroundRunnable trait
// ---------------------------------------------------------------------------

/// Periodic work driven by a [`BackgroundWorker`].
#[async_trait]
pub trait BackgroundRunnable: Send + 'static {
    async fn on_tick(&mut self);

    async fn shutdown(&mut self) {}
}

// ---------------------------------------------------------------------------
// ExpirySweeper
// ---------------------------------------------------------------------------

/// Removes instances and sessions whose `expiresAt` has passed.
pub struct ExpirySweeper {
    instances: Arc<InstanceStore>,
    sessions: Arc<SessionRegistry>,
    clock: Arc<dyn ClockSource>,
}

impl ExpirySweeper {
    #[must_use]
    pub fn new(
        instances: Arc<InstanceStore>,
        sessions: Arc<SessionRegistry>,
        clock: Arc<dyn ClockSource>,
    ) -> Self {
        Self {
            instances,
            sessions,
            clock,
        }
    }

    /// Returns `(instances removed, sessions removed)`.
    pub fn sweep(&self) -> (usize, usize) {
        let now = self.clock.now_secs();
        let instances = self.instances.remove_expired(now);
        let sessions = self.sessions.remove_expired(now);
        if instances + sessions > 0 {
            debug!(instances, sessions, "expired entries swept");
        }
        (instances, sessions)
    }
}

#[async_trait]
impl BackgroundRunnable for ExpirySweeper {
    async fn on_tick(&mut self) {
        self.sweep();
    }
}

// ---------------------------------------------------------------------------
// BackgroundWorker
// ---------------------------------------------------------------------------

/// Drives one [`BackgroundRunnable`] on its own task: a periodic tick, then a
/// final `shutdown()` once stopped.
pub struct BackgroundWorker {
    stop: Option<oneshot::Sender<()>>,
    join: Option<JoinHandle<()>>,
}

impl BackgroundWorker {
    /// Spawns the worker. The first tick fires one full `every` after start.
    pub fn start<R: BackgroundRunnable>(mut runnable: R, every: Duration) -> Self {
        let (stop, mut stopped) = oneshot::channel::<()>();

        let join = tokio::spawn(async move {
            let mut ticker = tokio::time::interval_at(tokio::time::Instant::now() + every, every);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

            loop {
                tokio::select! {
                    _ = &mut stopped => break,
                    _ = ticker.tick() => runnable.on_tick().await,
                }
            }
            runnable.shutdown().await;
        });

        Self {
            stop: Some(stop),
            join: Some(join),
        }
    }

    /// Signals the loop to exit and waits for `shutdown()` to return.
    pub async fn stop(&mut self) {
        if let Some(stop) = self.stop.take() {
            let _ = stop.send(());
        }
        if let Some(join) = self.join.take() {
            if let Err(err) = join.await {
                debug!(error = %err, "background worker ended abnormally");
            }
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
