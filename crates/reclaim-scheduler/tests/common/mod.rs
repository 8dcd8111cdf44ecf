//! Scripted in-memory workers for scheduler tests.

#![allow(dead_code)]

use async_trait::async_trait;
use reclaim_core::events::SchedulerEvent;
use reclaim_core::job::{AttackConfig, Job, ProgressUpdate, WorkerOutcome};
use reclaim_core::ports::{Worker, WorkerFactory};
use reclaim_core::{Error, Result};
use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::{Notify, broadcast, mpsc};

/// Initialize test logging (call once per test binary).
pub fn init_test_logging() {
    use tracing_subscriber::{EnvFilter, fmt};

    let _ = fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("warn,reclaim_scheduler=debug")),
        )
        .with_test_writer()
        .try_init();
}

/// What one attempt does.
#[derive(Debug, Clone)]
pub enum Step {
    Find { value: String, after: Duration },
    NotFound { after: Duration },
    Fail { after: Duration },
    /// Runs until stopped.
    Hang,
}

impl Step {
    pub fn find(value: &str) -> Self {
        Step::Find {
            value: value.to_string(),
            after: Duration::from_millis(10),
        }
    }

    pub fn not_found(after_ms: u64) -> Self {
        Step::NotFound {
            after: Duration::from_millis(after_ms),
        }
    }

    pub fn fail() -> Self {
        Step::Fail {
            after: Duration::from_millis(5),
        }
    }
}

/// Everything the workers observed.
#[derive(Default)]
pub struct Tally {
    running: AtomicUsize,
    peak: AtomicUsize,
    pub stops: AtomicUsize,
    pub pauses: AtomicUsize,
    pub resumes: AtomicUsize,
    started: Mutex<Vec<(String, AttackConfig)>>,
}

impl Tally {
    pub fn peak(&self) -> usize {
        self.peak.load(Ordering::SeqCst)
    }

    pub fn running(&self) -> usize {
        self.running.load(Ordering::SeqCst)
    }

    /// Targets in the order their attempts started.
    pub fn started(&self) -> Vec<String> {
        self.started
            .lock()
            .unwrap()
            .iter()
            .map(|(target, _)| target.clone())
            .collect()
    }

    /// Configs handed to workers for `target`, in attempt order.
    pub fn configs_for(&self, target: &str) -> Vec<AttackConfig> {
        self.started
            .lock()
            .unwrap()
            .iter()
            .filter(|(t, _)| t == target)
            .map(|(_, config)| config.clone())
            .collect()
    }

    fn enter(&self, target: &str, config: &AttackConfig) -> RunningGuard<'_> {
        self.started
            .lock()
            .unwrap()
            .push((target.to_string(), config.clone()));
        let now = self.running.fetch_add(1, Ordering::SeqCst) + 1;
        self.peak.fetch_max(now, Ordering::SeqCst);
        RunningGuard { tally: self }
    }
}

struct RunningGuard<'a> {
    tally: &'a Tally,
}

impl Drop for RunningGuard<'_> {
    fn drop(&mut self) {
        self.tally.running.fetch_sub(1, Ordering::SeqCst);
    }
}

pub struct ScriptedWorker {
    target: String,
    step: Step,
    pausable: bool,
    tally: Arc<Tally>,
    stopped: Notify,
}

#[async_trait]
impl Worker for ScriptedWorker {
    async fn start(
        &self,
        config: &AttackConfig,
        progress: mpsc::Sender<ProgressUpdate>,
    ) -> Result<WorkerOutcome> {
        let _guard = self.tally.enter(&self.target, config);
        let _ = progress
            .send(ProgressUpdate {
                phase: "searching".to_string(),
                percent: 50.0,
                tested: 21,
                total: 42,
                ..Default::default()
            })
            .await;

        let (after, outcome) = match &self.step {
            Step::Find { value, after } => (*after, Ok(WorkerOutcome::found(value.clone(), 42))),
            Step::NotFound { after } => (*after, Ok(WorkerOutcome::not_found(42))),
            Step::Fail { after } => (
                *after,
                Err(Error::WorkerFailed {
                    exit_code: 1,
                    message: "scripted failure".to_string(),
                }),
            ),
            Step::Hang => (Duration::from_secs(3600), Err(Error::WorkerStopped)),
        };

        tokio::select! {
            _ = tokio::time::sleep(after) => outcome,
            _ = self.stopped.notified() => Err(Error::WorkerStopped),
        }
    }

    fn can_pause(&self) -> bool {
        self.pausable
    }

    async fn pause(&self) -> Result<()> {
        self.tally.pauses.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    async fn resume(&self) -> Result<()> {
        self.tally.resumes.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    async fn stop(&self) -> Result<()> {
        self.tally.stops.fetch_add(1, Ordering::SeqCst);
        self.stopped.notify_one();
        Ok(())
    }
}

/// Hands out workers following a per-target script.
pub struct ScriptedFactory {
    scripts: Mutex<HashMap<String, VecDeque<Step>>>,
    fallback: Step,
    pausable: bool,
    pub tally: Arc<Tally>,
}

impl ScriptedFactory {
    pub fn new(fallback: Step) -> Self {
        Self {
            scripts: Mutex::new(HashMap::new()),
            fallback,
            pausable: false,
            tally: Arc::new(Tally::default()),
        }
    }

    pub fn pausable(mut self) -> Self {
        self.pausable = true;
        self
    }

    /// Attempts for `target` follow `steps`, then the fallback.
    pub fn script(self, target: &str, steps: Vec<Step>) -> Self {
        self.scripts
            .lock()
            .unwrap()
            .insert(target.to_string(), steps.into());
        self
    }
}

impl WorkerFactory for ScriptedFactory {
    fn create(&self, job: &Job) -> Arc<dyn Worker> {
        let step = self
            .scripts
            .lock()
            .unwrap()
            .get_mut(&job.target)
            .and_then(VecDeque::pop_front)
            .unwrap_or_else(|| self.fallback.clone());

        Arc::new(ScriptedWorker {
            target: job.target.clone(),
            step,
            pausable: self.pausable,
            tally: Arc::clone(&self.tally),
            stopped: Notify::new(),
        })
    }
}

/// Wait for the first event matching `predicate`, collecting everything seen.
pub async fn wait_for(
    events: &mut broadcast::Receiver<SchedulerEvent>,
    seen: &mut Vec<SchedulerEvent>,
    predicate: impl Fn(&SchedulerEvent) -> bool,
) -> SchedulerEvent {
    tokio::time::timeout(Duration::from_secs(5), async {
        loop {
            match events.recv().await {
                Ok(event) => {
                    seen.push(event.clone());
                    if predicate(&event) {
                        return event;
                    }
                }
                Err(broadcast::error::RecvError::Lagged(_)) => continue,
                Err(broadcast::error::RecvError::Closed) => panic!("event channel closed"),
            }
        }
    })
    .await
    .expect("timed out waiting for scheduler event")
}

pub fn is_completed(event: &SchedulerEvent) -> bool {
    matches!(event, SchedulerEvent::Completed { .. })
}

pub fn count(seen: &[SchedulerEvent], name: &str) -> usize {
    seen.iter().filter(|e| e.name() == name).count()
}
