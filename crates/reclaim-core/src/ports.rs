//! Port traits for the external collaborators the scheduler drives.

use crate::Result;
use crate::job::{AttackConfig, Job, ProgressUpdate, WorkerOutcome};
use async_trait::async_trait;
use std::sync::Arc;
use tokio::sync::mpsc;

/// One recovery attempt running outside the scheduler, usually in a child process.
#[async_trait]
pub trait Worker: Send + Sync {
    /// Run the attempt to completion, streaming progress to `progress`.
    ///
    /// Settles exactly once. An `Ok` outcome means the search finished, whether
    /// or not it found anything; an `Err` means the attempt itself broke.
    async fn start(
        &self,
        config: &AttackConfig,
        progress: mpsc::Sender<ProgressUpdate>,
    ) -> Result<WorkerOutcome>;

    /// Whether `pause`/`resume` do anything for this worker.
    fn can_pause(&self) -> bool {
        false
    }

    async fn pause(&self) -> Result<()> {
        Ok(())
    }

    async fn resume(&self) -> Result<()> {
        Ok(())
    }

    /// Terminate the attempt. Resolves once the underlying process is gone
    /// or the worker's own grace period elapsed.
    async fn stop(&self) -> Result<()>;
}

/// Produces a fresh worker for every dispatched attempt.
pub trait WorkerFactory: Send + Sync {
    fn create(&self, job: &Job) -> Arc<dyn Worker>;
}

impl<F> WorkerFactory for F
where
    F: Fn(&Job) -> Arc<dyn Worker> + Send + Sync,
{
    fn create(&self, job: &Job) -> Arc<dyn Worker> {
        self(job)
    }
}
