//! Background TTL sweep.

use crate::SharedCache;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::{Duration, MissedTickBehavior, interval};
use tracing::{debug, info};

/// Periodically calls [`CandidateCache::sweep`](crate::CandidateCache::sweep).
pub struct CacheSweeper {
    cache: SharedCache,
    every: Duration,
}

impl CacheSweeper {
    pub fn new(cache: SharedCache, every: Duration) -> Self {
        Self { cache, every }
    }

    /// Run until `shutdown` flips to `true` or its sender is dropped.
    pub async fn run(&self, mut shutdown: watch::Receiver<bool>) {
        let mut ticker = interval(self.every);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        // The first tick completes immediately.
        ticker.tick().await;

        info!(interval_ms = self.every.as_millis() as u64, "Starting cache sweeper");

        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    let report = self.cache.write().await.sweep();
                    debug!(
                        expired_entries = report.expired_entries,
                        expired_patterns = report.expired_patterns,
                        "Cache sweep finished"
                    );
                }
                changed = shutdown.changed() => {
                    if changed.is_err() || *shutdown.borrow() {
                        info!("Cache sweeper shutting down");
                        break;
                    }
                }
            }
        }
    }

    /// Spawn the sweep loop onto the runtime.
    pub fn spawn(self) -> SweeperHandle {
        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let task = tokio::spawn(async move { self.run(shutdown_rx).await });
        SweeperHandle { shutdown_tx, task }
    }
}

/// Owner of a spawned sweeper.
pub struct SweeperHandle {
    shutdown_tx: watch::Sender<bool>,
    task: JoinHandle<()>,
}

impl SweeperHandle {
    /// Signal the loop and wait for it to finish.
    pub async fn shutdown(self) {
        let _ = self.shutdown_tx.send(true);
        let _ = self.task.await;
    }
}
