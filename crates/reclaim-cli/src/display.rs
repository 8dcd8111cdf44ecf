//! Terminal progress for a running batch.

use console::style;
use indicatif::{MultiProgress, ProgressBar, ProgressDrawTarget, ProgressStyle};
use reclaim_core::events::SchedulerEvent;
use reclaim_core::ids::JobId;
use reclaim_core::job::file_name_of;
use std::collections::HashMap;
use std::time::Duration;

const BAR_TEMPLATE: &str = "{spinner:.cyan} {prefix:28!} [{bar:30.cyan/blue}] {pos:>3}% {msg}";

/// One bar per job, driven by scheduler events.
pub struct BatchProgress {
    multi: MultiProgress,
    style: ProgressStyle,
    targets: HashMap<JobId, String>,
    bars: HashMap<JobId, ProgressBar>,
}

impl BatchProgress {
    pub fn new() -> anyhow::Result<Self> {
        Self::with_target(ProgressDrawTarget::stderr())
    }

    #[cfg(test)]
    pub(crate) fn hidden() -> anyhow::Result<Self> {
        Self::with_target(ProgressDrawTarget::hidden())
    }

    fn with_target(target: ProgressDrawTarget) -> anyhow::Result<Self> {
        let style = ProgressStyle::with_template(BAR_TEMPLATE)?.progress_chars("=> ");
        Ok(Self {
            multi: MultiProgress::with_draw_target(target),
            style,
            targets: HashMap::new(),
            bars: HashMap::new(),
        })
    }

    fn bar(&mut self, job_id: JobId) -> &ProgressBar {
        let multi = &self.multi;
        let style = &self.style;
        let targets = &self.targets;
        self.bars.entry(job_id).or_insert_with(|| {
            let bar = multi.add(ProgressBar::new(100));
            bar.set_style(style.clone());
            let label = targets
                .get(&job_id)
                .map(|t| file_name_of(t).to_string())
                .unwrap_or_else(|| job_id.to_string());
            bar.set_prefix(label);
            bar.enable_steady_tick(Duration::from_millis(120));
            bar
        })
    }

    /// Update the display. Returns `true` once the batch is over.
    pub fn handle(&mut self, event: &SchedulerEvent) -> bool {
        match event {
            SchedulerEvent::JobAdded { job_id, target, .. } => {
                self.targets.insert(*job_id, target.clone());
            }
            SchedulerEvent::JobStarted {
                job_id,
                attempt,
                applied_patterns,
            } => {
                let bar = self.bar(*job_id);
                bar.reset();
                let mut message = format!("attempt {attempt}");
                if !applied_patterns.is_empty() {
                    message.push_str(&format!(", {} learned patterns", applied_patterns.len()));
                }
                bar.set_message(message);
            }
            SchedulerEvent::JobProgress { job_id, progress } => {
                let bar = self.bar(*job_id);
                bar.set_position(progress.percent.round() as u64);
                bar.set_message(format!(
                    "{} {}/{}",
                    progress.phase, progress.tested, progress.total
                ));
            }
            SchedulerEvent::JobCompleted { job_id, outcome } => {
                if let Some(bar) = self.bars.remove(job_id) {
                    let message = match outcome.secret() {
                        Some(_) => style("found").green().to_string(),
                        None => style("not found").yellow().to_string(),
                    };
                    bar.set_position(100);
                    bar.finish_with_message(message);
                }
            }
            SchedulerEvent::JobRetry {
                job_id,
                retry_count,
                error,
            } => {
                if let Some(bar) = self.bars.get(job_id) {
                    bar.set_message(format!("retry {retry_count}: {error}"));
                }
            }
            SchedulerEvent::JobFailed { job_id, error, .. } => {
                if let Some(bar) = self.bars.remove(job_id) {
                    bar.abandon_with_message(style(format!("failed: {error}")).red().to_string());
                }
            }
            SchedulerEvent::JobRemoved { job_id, .. } => {
                if let Some(bar) = self.bars.remove(job_id) {
                    bar.abandon_with_message("removed");
                }
            }
            SchedulerEvent::Completed { .. } | SchedulerEvent::Stopped { .. } => {
                self.finish();
                return true;
            }
            _ => {}
        }
        false
    }

    pub fn finish(&mut self) {
        for (_, bar) in self.bars.drain() {
            bar.abandon();
        }
    }

    /// Number of jobs with a live bar.
    #[cfg(test)]
    fn active(&self) -> usize {
        self.bars.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use reclaim_core::events::BatchStats;
    use reclaim_core::job::{ProgressUpdate, WorkerOutcome};

    #[test]
    fn test_bars_follow_job_lifecycle() {
        let mut progress = BatchProgress::hidden().unwrap();
        let a = JobId::new();
        let b = JobId::new();

        for (job_id, target) in [(a, "/data/a.zip"), (b, "/data/b.pdf")] {
            progress.handle(&SchedulerEvent::JobAdded {
                job_id,
                target: target.into(),
                priority: 5,
            });
            progress.handle(&SchedulerEvent::JobStarted {
                job_id,
                attempt: 1,
                applied_patterns: vec![],
            });
        }
        assert_eq!(progress.active(), 2);

        progress.handle(&SchedulerEvent::JobProgress {
            job_id: a,
            progress: ProgressUpdate {
                phase: "dictionary".into(),
                percent: 40.0,
                ..Default::default()
            },
        });
        assert_eq!(progress.bars[&a].position(), 40);

        progress.handle(&SchedulerEvent::JobCompleted {
            job_id: a,
            outcome: WorkerOutcome::found("pw", 10),
        });
        progress.handle(&SchedulerEvent::JobFailed {
            job_id: b,
            retry_count: 3,
            error: "exit 1".into(),
        });
        assert_eq!(progress.active(), 0);

        assert!(progress.handle(&SchedulerEvent::Completed {
            stats: BatchStats::default(),
        }));
    }
}
