//! Periodic TTL sweep.
//!
//! The cache never schedules its own cleanup. Applications that want idle
//! resources reclaimed in the background start a sweeper next to the cache.

use std::time::Duration;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::{self, MissedTickBehavior};
use tracing::{debug, info};

use crate::cache::ResourceCache;

/// Handle to a running sweeper task.
///
/// Dropping the handle also stops the sweeper (on its next wake-up).
#[derive(Debug)]
pub struct SweeperHandle {
    shutdown_tx: watch::Sender<bool>,
    task: JoinHandle<()>,
}

impl SweeperHandle {
    /// Signal the sweeper to stop and wait for it to exit.
    pub async fn stop(self) {
        let _ = self.shutdown_tx.send(true);
        let _ = self.task.await;
    }

    /// Whether the sweeper task has exited.
    pub fn is_finished(&self) -> bool {
        self.task.is_finished()
    }
}

/// Spawn a task that calls [`ResourceCache::cleanup_expired`] every `interval`.
///
/// The first sweep happens one full interval after the call.
pub fn spawn_sweeper<R>(cache: ResourceCache<R>, interval: Duration) -> SweeperHandle
where
    R: ?Sized + Send + Sync + 'static,
{
    let (shutdown_tx, mut shutdown_rx) = watch::channel(false);
    let period = interval.max(Duration::from_millis(1));

    let task = tokio::spawn(async move {
        info!(interval_ms = period.as_millis() as u64, "TTL sweeper started");

        let mut ticker = time::interval_at(time::Instant::now() + period, period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                _ = shutdown_rx.changed() => {
                    info!("TTL sweeper shutdown signal received");
                    break;
                }
                _ = ticker.tick() => {
                    let expired = cache.cleanup_expired();
                    if expired > 0 {
                        debug!(expired, "TTL sweep unloaded idle resources");
                    }
                }
            }
        }
    });

    SweeperHandle { shutdown_tx, task }
}

impl<R> ResourceCache<R>
where
    R: ?Sized + Send + Sync + 'static,
{
    /// Spawn a sweeper using the configured `cleanup_interval`.
    pub fn spawn_sweeper(&self) -> SweeperHandle {
        spawn_sweeper(self.clone(), self.config().cleanup_interval())
    }
}
