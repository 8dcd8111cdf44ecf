//! Batch scheduler.

use crate::config::SchedulerConfig;
use crate::queue::JobQueue;
use crate::tuning::{apply_learned_patterns, prepend_candidate};

use chrono::Utc;
use futures::FutureExt;
use futures::future::{BoxFuture, join_all};
use reclaim_cache::{CacheContext, EntrySource, SharedCache};
use reclaim_core::events::{BatchStats, SchedulerEvent};
use reclaim_core::ids::JobId;
use reclaim_core::job::{
    AttackConfig, Job, JobStatus, ProgressUpdate, WorkerOutcome, validate_priority,
};
use reclaim_core::ports::{Worker, WorkerFactory};
use reclaim_core::{Error, Result};
use reclaim_patterns::{LearnedPattern, PatternContext, PatternKey, PatternStore, extract_patterns};
use serde::Serialize;
use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::Arc;
use tokio::sync::{Mutex, broadcast, mpsc, watch};
use tokio::task::AbortHandle;
use tokio::time::Instant;
use tracing::{debug, error, info, warn};

/// Buffered progress updates per running attempt.
const PROGRESS_BUFFER: usize = 64;

/// A job to enqueue.
#[derive(Debug, Clone)]
pub struct JobRequest {
    pub target: String,
    pub config: AttackConfig,
    pub priority: u8,
}

impl JobRequest {
    pub fn new(target: impl Into<String>, config: AttackConfig, priority: u8) -> Self {
        Self {
            target: target.into(),
            config,
            priority,
        }
    }
}

/// Point-in-time view of the scheduler.
#[derive(Debug, Clone, Serialize)]
pub struct SchedulerStatus {
    pub running: bool,
    pub paused: bool,
    /// Queued jobs in dispatch order.
    pub queue: Vec<Job>,
    pub in_flight: Vec<Job>,
    pub completed: Vec<Job>,
    pub failed: Vec<Job>,
    pub stats: BatchStats,
}

struct InFlight {
    job: Job,
    worker: Arc<dyn Worker>,
    task: AbortHandle,
    applied: Vec<PatternKey>,
    /// Identifies this dispatch; results from older attempts are ignored.
    attempt: u64,
}

#[derive(Default)]
struct SchedulerState {
    queue: JobQueue,
    in_flight: HashMap<JobId, InFlight>,
    completed: VecDeque<Job>,
    failed: VecDeque<Job>,
    stats: BatchStats,
    patterns: PatternStore,
    running: bool,
    paused: bool,
    stop_requested: bool,
    next_attempt: u64,
}

struct Inner {
    config: SchedulerConfig,
    factory: Arc<dyn WorkerFactory>,
    cache: Option<SharedCache>,
    state: Mutex<SchedulerState>,
    events: broadcast::Sender<SchedulerEvent>,
    /// Mirrors `SchedulerState::paused` for running attempts.
    paused: watch::Sender<bool>,
}

/// Runs a batch of recovery jobs over a bounded pool of workers.
///
/// Cheap to clone; clones share the same state.
#[derive(Clone)]
pub struct BatchScheduler {
    inner: Arc<Inner>,
}

impl BatchScheduler {
    pub fn new(config: SchedulerConfig, factory: Arc<dyn WorkerFactory>) -> Result<Self> {
        Self::build(config, factory, None)
    }

    /// Scheduler that consults and feeds `cache`.
    pub fn with_cache(
        config: SchedulerConfig,
        factory: Arc<dyn WorkerFactory>,
        cache: SharedCache,
    ) -> Result<Self> {
        Self::build(config, factory, Some(cache))
    }

    fn build(
        config: SchedulerConfig,
        factory: Arc<dyn WorkerFactory>,
        cache: Option<SharedCache>,
    ) -> Result<Self> {
        config.validate()?;
        let (events, _) = broadcast::channel(config.event_capacity.max(1));
        Ok(Self {
            inner: Arc::new(Inner {
                config,
                factory,
                cache,
                state: Mutex::new(SchedulerState::default()),
                events,
                paused: watch::Sender::new(false),
            }),
        })
    }

    pub fn config(&self) -> &SchedulerConfig {
        &self.inner.config
    }

    pub fn subscribe(&self) -> broadcast::Receiver<SchedulerEvent> {
        self.inner.events.subscribe()
    }

    /// Validate and queue a job.
    pub async fn enqueue(
        &self,
        target: impl Into<String>,
        config: AttackConfig,
        priority: u8,
    ) -> Result<JobId> {
        let job = Job::new(target, config, priority)?;
        let job_id = job.id;

        let mut state = self.inner.state.lock().await;
        info!(job_id = %job_id, target = %job.target, priority, "Job queued");
        self.inner.emit(SchedulerEvent::JobAdded {
            job_id,
            target: job.target.clone(),
            priority,
        });
        state.stats.total_jobs += 1;
        state.queue.push(job);

        if state.running && !state.paused {
            self.inner.dispatch(&mut state).await;
        }
        Ok(job_id)
    }

    /// Queue several jobs, stopping at the first invalid one.
    ///
    /// Jobs queued before the failure stay queued.
    pub async fn enqueue_many(
        &self,
        requests: impl IntoIterator<Item = JobRequest>,
    ) -> Result<Vec<JobId>> {
        let mut ids = Vec::new();
        for request in requests {
            ids.push(
                self.enqueue(request.target, request.config, request.priority)
                    .await?,
            );
        }
        Ok(ids)
    }

    pub async fn start(&self) -> Result<()> {
        let mut state = self.inner.state.lock().await;
        if state.running {
            return Err(Error::AlreadyRunning);
        }

        let now = Utc::now();
        state.running = true;
        state.paused = false;
        self.inner.paused.send_replace(false);
        state.stop_requested = false;
        state.stats.started_at = Some(now);
        state.stats.ended_at = None;

        info!(
            queued = state.queue.len(),
            max_concurrent = self.inner.config.max_concurrent,
            "Batch processing started"
        );
        self.inner.emit(SchedulerEvent::Started { at: now });
        self.inner.dispatch(&mut state).await;
        Ok(())
    }

    pub async fn pause(&self) {
        let workers = {
            let mut state = self.inner.state.lock().await;
            if !state.running || state.paused {
                return;
            }
            state.paused = true;
            self.inner.paused.send_replace(true);
            info!(in_flight = state.in_flight.len(), "Batch processing paused");
            self.inner.emit(SchedulerEvent::Paused);
            pausable_workers(&state)
        };

        for (job_id, worker) in workers {
            if let Err(e) = worker.pause().await {
                warn!(job_id = %job_id, error = %e, "Failed to pause worker");
            }
        }
    }

    pub async fn resume(&self) {
        let workers = {
            let mut state = self.inner.state.lock().await;
            if !state.running || !state.paused {
                return;
            }
            state.paused = false;
            self.inner.paused.send_replace(false);
            pausable_workers(&state)
        };

        for (job_id, worker) in workers {
            if let Err(e) = worker.resume().await {
                warn!(job_id = %job_id, error = %e, "Failed to resume worker");
            }
        }

        info!("Batch processing resumed");
        self.inner.emit(SchedulerEvent::Resumed);
        let mut state = self.inner.state.lock().await;
        self.inner.dispatch(&mut state).await;
    }

    /// Stop all running attempts and halt dispatch.
    ///
    /// Running jobs go back to the queue unchanged. Calling `stop` on a
    /// stopped scheduler does nothing.
    pub async fn stop(&self) -> Result<()> {
        let stopping = {
            let mut state = self.inner.state.lock().await;
            if !state.running && state.in_flight.is_empty() {
                return Ok(());
            }
            state.stop_requested = true;

            let flights: Vec<InFlight> = state.in_flight.drain().map(|(_, f)| f).collect();
            let mut stopping = Vec::with_capacity(flights.len());
            for flight in flights {
                let mut job = flight.job;
                job.status = JobStatus::Queued;
                job.progress = ProgressUpdate::queued();
                job.started_at = None;
                stopping.push((job.id, flight.worker, flight.task));
                state.queue.push(job);
            }
            stopping
        };

        info!(workers = stopping.len(), "Stopping batch processing");
        let grace = self.inner.config.stop_grace();
        join_all(
            stopping
                .into_iter()
                .map(|(job_id, worker, task)| stop_worker(job_id, worker, task, grace)),
        )
        .await;

        let mut state = self.inner.state.lock().await;
        let now = Utc::now();
        state.running = false;
        state.paused = false;
        self.inner.paused.send_replace(false);
        state.stats.ended_at = Some(now);
        info!("Batch processing stopped");
        self.inner.emit(SchedulerEvent::Stopped { at: now });
        Ok(())
    }

    /// Remove a queued or running job. Returns `false` for unknown ids.
    pub async fn remove_job(&self, job_id: JobId) -> bool {
        let mut state = self.inner.state.lock().await;

        if state.queue.remove(job_id).is_some() {
            state.stats.total_jobs = state.stats.total_jobs.saturating_sub(1);
            info!(job_id = %job_id, "Removed queued job");
            self.inner.emit(SchedulerEvent::JobRemoved {
                job_id,
                was_running: false,
            });
            return true;
        }

        let Some(flight) = state.in_flight.remove(&job_id) else {
            return false;
        };
        state.stats.total_jobs = state.stats.total_jobs.saturating_sub(1);
        info!(job_id = %job_id, "Removed running job");

        let grace = self.inner.config.stop_grace();
        tokio::spawn(stop_worker(job_id, flight.worker, flight.task, grace));

        self.inner.emit(SchedulerEvent::JobRemoved {
            job_id,
            was_running: true,
        });
        self.inner.dispatch(&mut state).await;
        true
    }

    /// Change the priority of a queued job. Running or finished jobs are left alone.
    pub async fn set_priority(&self, job_id: JobId, priority: u8) -> Result<bool> {
        validate_priority(priority)?;
        let mut state = self.inner.state.lock().await;

        let Some(mut job) = state.queue.remove(job_id) else {
            return Ok(false);
        };
        job.priority = priority;
        state.queue.push(job);

        debug!(job_id = %job_id, priority, "Priority changed");
        self.inner
            .emit(SchedulerEvent::PriorityChanged { job_id, priority });
        Ok(true)
    }

    pub async fn status(&self) -> SchedulerStatus {
        let state = self.inner.state.lock().await;
        let mut in_flight: Vec<Job> = state.in_flight.values().map(|f| f.job.clone()).collect();
        in_flight.sort_by_key(|job| job.started_at);

        SchedulerStatus {
            running: state.running,
            paused: state.paused,
            queue: state.queue.iter().cloned().collect(),
            in_flight,
            completed: state.completed.iter().cloned().collect(),
            failed: state.failed.iter().cloned().collect(),
            stats: state.stats.clone(),
        }
    }

    /// Patterns learned from recovered values, best success rate first.
    pub async fn learned_patterns(&self) -> Vec<LearnedPattern> {
        self.inner.state.lock().await.patterns.top_patterns()
    }
}

impl Inner {
    /// Fill free slots from the queue, then detect batch completion.
    async fn dispatch(self: &Arc<Self>, state: &mut SchedulerState) {
        while state.running
            && !state.paused
            && !state.stop_requested
            && state.in_flight.len() < self.config.max_concurrent
        {
            let Some(mut job) = state.queue.pop() else {
                break;
            };
            job.status = JobStatus::Processing;
            job.started_at = Some(Utc::now());

            let mut config = job.config.clone();
            let applied = apply_learned_patterns(&mut config, &state.patterns);

            if let Some(cache) = &self.cache {
                let lookup = cache.write().await.get(&job.target, &cache_context(&job));
                if let Some(lookup) = lookup {
                    debug!(
                        job_id = %job.id,
                        source = ?lookup.source(),
                        "Cache supplied a candidate"
                    );
                    prepend_candidate(&mut config, &lookup.value);
                }
            }

            state.next_attempt += 1;
            let attempt = state.next_attempt;
            let worker = self.factory.create(&job);
            let task = tokio::spawn(Arc::clone(self).run_attempt(
                job.id,
                attempt,
                Arc::clone(&worker),
                config,
            ));

            info!(
                job_id = %job.id,
                target = %job.target,
                attempt = job.retry_count + 1,
                applied_patterns = applied.len(),
                "Job started"
            );
            self.emit(SchedulerEvent::JobStarted {
                job_id: job.id,
                attempt: job.retry_count + 1,
                applied_patterns: applied.iter().map(ToString::to_string).collect(),
            });

            state.in_flight.insert(
                job.id,
                InFlight {
                    job,
                    worker,
                    task: task.abort_handle(),
                    applied,
                    attempt,
                },
            );
        }

        if state.running
            && !state.paused
            && !state.stop_requested
            && state.queue.is_empty()
            && state.in_flight.is_empty()
        {
            let now = Utc::now();
            state.running = false;
            state.stats.ended_at = Some(now);
            info!(
                processed = state.stats.processed,
                succeeded = state.stats.succeeded,
                failed = state.stats.failed,
                secrets_found = state.stats.total_secrets_found,
                "Batch processing completed"
            );
            self.emit(SchedulerEvent::Completed {
                stats: state.stats.clone(),
            });
        }
    }

    /// Drive one worker attempt and settle its result.
    ///
    /// The timeout only runs while the batch is not paused. On expiry the
    /// worker is stopped while its attempt keeps being polled, so it can
    /// wind down before the result is settled.
    ///
    /// Boxed so the dispatch -> attempt -> settle -> dispatch cycle has a
    /// nameable future type.
    fn run_attempt(
        self: Arc<Self>,
        job_id: JobId,
        attempt: u64,
        worker: Arc<dyn Worker>,
        config: AttackConfig,
    ) -> BoxFuture<'static, ()> {
        async move {
            let (progress_tx, mut progress_rx) = mpsc::channel(PROGRESS_BUFFER);
            let limit = self.config.timeout();
            let mut paused = self.paused.subscribe();

            let run = worker.start(&config, progress_tx);
            tokio::pin!(run);

            let mut suspended = *paused.borrow_and_update();
            let mut remaining = limit;
            let deadline = tokio::time::sleep(limit);
            tokio::pin!(deadline);

            let finished = loop {
                tokio::select! {
                    biased;
                    Some(update) = progress_rx.recv() => {
                        self.record_progress(job_id, attempt, update).await;
                    }
                    result = &mut run => break Some(result),
                    Ok(()) = paused.changed() => {
                        let now = Instant::now();
                        let is_paused = *paused.borrow_and_update();
                        match (is_paused, suspended) {
                            (true, false) => {
                                remaining = deadline.deadline().saturating_duration_since(now);
                                suspended = true;
                            }
                            (false, true) => {
                                deadline.as_mut().reset(now + remaining);
                                suspended = false;
                            }
                            _ => {}
                        }
                    }
                    () = &mut deadline, if !suspended => break None,
                }
            };
            while let Ok(update) = progress_rx.try_recv() {
                self.record_progress(job_id, attempt, update).await;
            }

            let result = match finished {
                Some(result) => result,
                None => {
                    warn!(job_id = %job_id, timeout_ms = self.config.timeout_ms, "Job timed out");
                    // Progress past the deadline is not reported.
                    drop(progress_rx);
                    let grace = self.config.stop_grace();
                    let wind_down = async {
                        let (stopped, _) = tokio::join!(worker.stop(), &mut run);
                        stopped
                    };
                    match tokio::time::timeout(grace, wind_down).await {
                        Ok(Err(e)) => warn!(job_id = %job_id, error = %e, "Failed to stop timed out worker"),
                        Err(_) => warn!(job_id = %job_id, "Timed out worker did not stop in time"),
                        Ok(Ok(())) => {}
                    }
                    Err(Error::JobTimeout {
                        seconds: limit.as_secs(),
                    })
                }
            };

            self.settle(job_id, attempt, result).await;
        }
        .boxed()
    }

    async fn record_progress(&self, job_id: JobId, attempt: u64, update: ProgressUpdate) {
        let mut state = self.state.lock().await;
        let Some(flight) = state.in_flight.get_mut(&job_id) else {
            return;
        };
        if flight.attempt != attempt {
            return;
        }
        let progress = update.normalized();
        flight.job.progress = progress.clone();
        self.emit(SchedulerEvent::JobProgress { job_id, progress });
    }

    async fn settle(self: &Arc<Self>, job_id: JobId, attempt: u64, result: Result<WorkerOutcome>) {
        let mut state = self.state.lock().await;

        let current = state
            .in_flight
            .get(&job_id)
            .is_some_and(|flight| flight.attempt == attempt);
        if !current {
            debug!(job_id = %job_id, "Discarding result of an attempt no longer tracked");
            return;
        }
        let Some(flight) = state.in_flight.remove(&job_id) else {
            return;
        };

        match result {
            Ok(outcome) => self.complete_job(&mut state, flight, outcome).await,
            Err(e) => self.fail_attempt(&mut state, flight, e),
        }

        self.dispatch(&mut state).await;
    }

    async fn complete_job(&self, state: &mut SchedulerState, flight: InFlight, outcome: WorkerOutcome) {
        let InFlight { mut job, applied, .. } = flight;
        let job_id = job.id;

        state.stats.processed += 1;
        state.stats.succeeded += 1;
        state.stats.total_units_tested += outcome.units_tested;

        match outcome.secret() {
            Some(secret) => {
                state.stats.total_secrets_found += 1;

                let context = PatternContext {
                    file_name: Some(job.file_name.clone()),
                    file_size: job.config.target_size,
                };
                let learned = extract_patterns(Some(secret), &context);
                let confirmed: HashSet<PatternKey> = learned.iter().map(|p| p.key()).collect();
                for pattern in &learned {
                    state.patterns.record_success(pattern);
                }
                for key in applied.iter().filter(|key| !confirmed.contains(*key)) {
                    state.patterns.record_attempt(key);
                }
                if !learned.is_empty() {
                    self.emit(SchedulerEvent::PatternLearned {
                        job_id,
                        patterns: learned.iter().map(|p| p.key().to_string()).collect(),
                    });
                }

                if let Some(cache) = &self.cache {
                    let context = cache_context(&job).with_source(EntrySource::Batch);
                    let stored = cache.write().await.set(&job.target, secret, &context);
                    if !stored {
                        warn!(job_id = %job_id, "Recovered value was not cached");
                    }
                }
                info!(job_id = %job_id, units_tested = outcome.units_tested, "Secret recovered");
            }
            None => {
                for key in &applied {
                    state.patterns.record_attempt(key);
                }
                info!(job_id = %job_id, units_tested = outcome.units_tested, "Search finished without a match");
            }
        }

        job.status = JobStatus::Completed;
        job.completed_at = Some(Utc::now());
        job.error = None;
        job.result = Some(outcome.clone());

        self.emit(SchedulerEvent::JobCompleted { job_id, outcome });
        push_bounded(&mut state.completed, job, self.config.history_limit);
    }

    fn fail_attempt(&self, state: &mut SchedulerState, flight: InFlight, err: Error) {
        let mut job = flight.job;
        let job_id = job.id;
        let message = err.to_string();
        job.error = Some(message.clone());

        if job.retry_count < self.config.max_retries {
            job.retry_count += 1;
            job.status = JobStatus::Queued;
            job.progress = ProgressUpdate::queued();
            job.started_at = None;
            job.priority = self
                .config
                .retry_priority
                .priority_for(job.priority, job.retry_count);

            warn!(
                job_id = %job_id,
                retry_count = job.retry_count,
                max_retries = self.config.max_retries,
                error = %message,
                "Job attempt failed, retrying"
            );
            let retry_count = job.retry_count;
            state.queue.push(job);
            self.emit(SchedulerEvent::JobRetry {
                job_id,
                retry_count,
                error: message,
            });
        } else {
            job.status = JobStatus::Failed;
            job.completed_at = Some(Utc::now());
            state.stats.processed += 1;
            state.stats.failed += 1;

            error!(
                job_id = %job_id,
                retry_count = job.retry_count,
                error = %message,
                "Job failed permanently"
            );
            let retry_count = job.retry_count;
            push_bounded(&mut state.failed, job, self.config.history_limit);
            self.emit(SchedulerEvent::JobFailed {
                job_id,
                retry_count,
                error: message,
            });
        }
    }

    fn emit(&self, event: SchedulerEvent) {
        debug!(event = event.name(), job_id = ?event.job_id(), "Scheduler event");
        // No subscribers is fine.
        let _ = self.events.send(event);
    }
}

/// Cache lookup/store context for a job.
fn cache_context(job: &Job) -> CacheContext {
    let context = CacheContext::new()
        .with_file_name(job.file_name.clone())
        .with_algorithm(job.config.attack_mode.clone());
    match job.config.target_size {
        Some(size) => context.with_target_size(size),
        None => context,
    }
}

fn pausable_workers(state: &SchedulerState) -> Vec<(JobId, Arc<dyn Worker>)> {
    state
        .in_flight
        .iter()
        .filter(|(_, flight)| flight.worker.can_pause())
        .map(|(id, flight)| (*id, Arc::clone(&flight.worker)))
        .collect()
}

/// Ask a worker to stop, aborting its task when it does not within `grace`.
async fn stop_worker(
    job_id: JobId,
    worker: Arc<dyn Worker>,
    task: AbortHandle,
    grace: std::time::Duration,
) {
    match tokio::time::timeout(grace, worker.stop()).await {
        Ok(Ok(())) => debug!(job_id = %job_id, "Worker stopped"),
        Ok(Err(e)) => {
            warn!(job_id = %job_id, error = %e, "Worker failed to stop, aborting");
            task.abort();
        }
        Err(_) => {
            warn!(job_id = %job_id, grace_ms = grace.as_millis() as u64, "Worker did not stop in time, aborting");
            task.abort();
        }
    }
}

fn push_bounded(history: &mut VecDeque<Job>, job: Job, limit: usize) {
    history.push_back(job);
    while history.len() > limit {
        history.pop_front();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_push_bounded() {
        let mut history = VecDeque::new();
        for i in 0..5 {
            push_bounded(
                &mut history,
                Job::new(format!("t{i}"), AttackConfig::default(), 5).unwrap(),
                3,
            );
        }
        let targets: Vec<_> = history.iter().map(|j| j.target.as_str()).collect();
        assert_eq!(targets, vec!["t2", "t3", "t4"]);
    }

    #[test]
    fn test_cache_context_uses_job_details() {
        let config = AttackConfig {
            target_size: Some(2048),
            ..Default::default()
        };
        let job = Job::new("/data/report_2023.zip", config, 5).unwrap();
        let context = cache_context(&job);
        assert_eq!(context.file_name.as_deref(), Some("report_2023.zip"));
        assert_eq!(context.target_size, Some(2048));
        assert_eq!(context.algorithm.as_deref(), Some("smart"));
    }
}
