//! Command handlers.

use crate::commands::RunArgs;
use crate::config::ReclaimConfig;
use crate::display::BatchProgress;
use anyhow::{Context, bail};
use chrono::DateTime;
use console::style;
use reclaim_cache::{CacheSweeper, CandidateCache, SharedCache, Snapshot};
use reclaim_scheduler::{BatchScheduler, JobRequest, SchedulerStatus};
use reclaim_worker::CommandWorkerFactory;
use std::path::Path;
use std::sync::Arc;
use reclaim_core::events::SchedulerEvent;
use tokio::sync::broadcast;
use tokio::sync::broadcast::error::RecvError;
use tracing::{info, warn};

/// Run a batch to completion.
pub async fn run_batch(mut config: ReclaimConfig, args: RunArgs) -> anyhow::Result<()> {
    config.apply_run_args(&args);
    config.validate()?;
    let worker = config.require_worker()?.clone();
    let program = worker.program.clone();
    let factory = Arc::new(CommandWorkerFactory::new(worker)?);

    let cache = reclaim_cache::shared(CandidateCache::new(config.cache.clone())?);
    if let Some(path) = &config.cache_snapshot {
        restore_snapshot(&cache, path).await?;
    }
    let sweeper = CacheSweeper::new(Arc::clone(&cache), config.cache.sweep_interval()).spawn();

    let scheduler =
        BatchScheduler::with_cache(config.scheduler.clone(), factory, Arc::clone(&cache))?;
    let mut events = scheduler.subscribe();
    let mut progress = BatchProgress::new()?;

    println!(
        "{} Recovering {} target(s) with {}",
        style("▶").cyan().bold(),
        args.targets.len(),
        style(&program).bold()
    );

    let requests = args
        .targets
        .iter()
        .map(|target| JobRequest::new(target.clone(), config.attack.clone(), args.priority));
    scheduler.enqueue_many(requests).await?;
    scheduler.start().await?;

    let interrupted =
        follow_batch(&scheduler, &mut events, &mut progress, tokio::signal::ctrl_c()).await?;

    sweeper.shutdown().await;

    let status = scheduler.status().await;
    print_summary(&status);

    if let Some(path) = &config.cache_snapshot {
        save_snapshot(&cache, path).await?;
        println!(
            "{} Cache snapshot saved to {}",
            style("✓").green(),
            path.display()
        );
    }

    if interrupted {
        bail!("batch interrupted with {} job(s) unfinished", status.queue.len());
    }
    if !status.failed.is_empty() {
        bail!("{} job(s) failed", status.failed.len());
    }
    Ok(())
}

/// Drive the display until the batch ends or `interrupt` fires.
///
/// Returns `true` when the batch was interrupted and stopped.
async fn follow_batch(
    scheduler: &BatchScheduler,
    events: &mut broadcast::Receiver<SchedulerEvent>,
    progress: &mut BatchProgress,
    interrupt: impl Future<Output = std::io::Result<()>>,
) -> anyhow::Result<bool> {
    tokio::pin!(interrupt);

    loop {
        tokio::select! {
            event = events.recv() => match event {
                Ok(event) => {
                    if progress.handle(&event) {
                        return Ok(false);
                    }
                }
                Err(RecvError::Lagged(skipped)) => {
                    warn!(skipped, "Progress display fell behind");
                    if !scheduler.status().await.running {
                        return Ok(false);
                    }
                }
                Err(RecvError::Closed) => return Ok(false),
            },
            signal = &mut interrupt => {
                signal.context("listening for interrupts")?;
                eprintln!("{} Interrupted, stopping workers...", style("!").yellow());
                scheduler.stop().await?;
                progress.finish();
                return Ok(true);
            }
        }
    }
}

fn print_summary(status: &SchedulerStatus) {
    println!();
    for job in &status.completed {
        match job.result.as_ref().and_then(|r| r.secret()) {
            Some(secret) => println!(
                "  {} {} {}",
                style("✓").green().bold(),
                job.target,
                style(secret).bold()
            ),
            None => println!("  {} {} not found", style("-").yellow(), job.target),
        }
    }
    for job in &status.failed {
        println!(
            "  {} {} {}",
            style("✗").red().bold(),
            job.target,
            style(job.error.as_deref().unwrap_or("unknown error")).dim()
        );
    }
    for job in &status.queue {
        println!("  {} {} not run", style("·").dim(), job.target);
    }

    let stats = &status.stats;
    let elapsed = match (stats.started_at, stats.ended_at) {
        (Some(start), Some(end)) => format!("{:.1}s", (end - start).num_milliseconds() as f64 / 1000.0),
        _ => "-".to_string(),
    };
    println!(
        "\n{} processed, {} recovered, {} failed, {} candidates tested in {}",
        stats.processed,
        stats.total_secrets_found,
        stats.failed,
        stats.total_units_tested,
        elapsed
    );
}

async fn restore_snapshot(cache: &SharedCache, path: &Path) -> anyhow::Result<()> {
    let data = match tokio::fs::read_to_string(path).await {
        Ok(data) => data,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            info!(path = %path.display(), "No cache snapshot yet");
            return Ok(());
        }
        Err(e) => {
            return Err(e).with_context(|| format!("reading snapshot {}", path.display()));
        }
    };

    let report = cache
        .write()
        .await
        .import_snapshot(&data)
        .with_context(|| format!("importing snapshot {}", path.display()))?;
    info!(
        path = %path.display(),
        imported = report.imported,
        patterns = report.patterns_imported,
        skipped_expired = report.skipped_expired,
        "Cache snapshot restored"
    );
    Ok(())
}

async fn save_snapshot(cache: &SharedCache, path: &Path) -> anyhow::Result<()> {
    let data = cache.read().await.export_snapshot()?;
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        tokio::fs::create_dir_all(parent).await?;
    }
    tokio::fs::write(path, data)
        .await
        .with_context(|| format!("writing snapshot {}", path.display()))?;
    Ok(())
}

/// Print what a snapshot holds and what importing it would keep.
pub async fn inspect_cache(config: &ReclaimConfig, path: &Path) -> anyhow::Result<()> {
    let data = tokio::fs::read_to_string(path)
        .await
        .with_context(|| format!("reading snapshot {}", path.display()))?;
    let snapshot: Snapshot = serde_json::from_str(&data)
        .with_context(|| format!("{} is not a cache snapshot", path.display()))?;

    let mut cache = CandidateCache::new(config.cache.clone())?;
    let report = cache.import_snapshot(&data)?;
    let info = cache.info();

    let taken = DateTime::from_timestamp_millis(snapshot.timestamp)
        .map(|at| at.to_rfc3339())
        .unwrap_or_else(|| "unknown".to_string());

    println!("{} {}", style("Snapshot").bold(), path.display());
    println!("  Taken:      {}", taken);
    println!("  Entries:    {}", snapshot.cache.len());
    println!("  Patterns:   {}", snapshot.patterns.len());
    println!(
        "  Importable: {} entries, {} patterns ({} expired, {} malformed, {} over budget)",
        report.imported,
        report.patterns_imported,
        report.skipped_expired,
        report.skipped_malformed,
        report.rejected
    );
    println!(
        "  Memory:     {} / {} bytes",
        info.memory_usage, info.max_memory
    );

    if let Some(stats) = &snapshot.statistics {
        println!(
            "  Recorded:   {} requests, {} hits, {} misses, {} pattern matches ({:.1}% hit rate)",
            stats.total_requests,
            stats.hits,
            stats.misses,
            stats.pattern_matches,
            stats.hit_rate * 100.0
        );
    }
    Ok(())
}

/// Show the effective configuration.
pub fn show_config(config: &ReclaimConfig) -> anyhow::Result<()> {
    print!("{}", config.to_yaml()?);
    Ok(())
}

/// Show where the configuration file is read from.
pub fn config_path(explicit: Option<&Path>) -> anyhow::Result<()> {
    match explicit.map(Path::to_path_buf).or_else(ReclaimConfig::default_path) {
        Some(path) => {
            let marker = if path.exists() { "" } else { " (not created)" };
            println!("{}{}", path.display(), marker);
            Ok(())
        }
        None => bail!("could not determine the configuration directory"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use reclaim_cache::CacheContext;

    #[tokio::test]
    async fn test_snapshot_save_and_restore() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("cache.json");

        let cache = reclaim_cache::shared(CandidateCache::new(Default::default()).unwrap());
        let context = CacheContext::new().with_file_name("report_2023.zip");
        assert!(cache.write().await.set("/data/report_2023.zip", "hunter2", &context));
        save_snapshot(&cache, &path).await.unwrap();

        let restored = reclaim_cache::shared(CandidateCache::new(Default::default()).unwrap());
        restore_snapshot(&restored, &path).await.unwrap();
        let hit = restored
            .write()
            .await
            .get("/data/report_2023.zip", &context)
            .unwrap();
        assert_eq!(hit.value, "hunter2");

        let config = ReclaimConfig::default();
        inspect_cache(&config, &path).await.unwrap();
    }

    #[tokio::test]
    async fn test_missing_snapshot_is_not_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let cache = reclaim_cache::shared(CandidateCache::new(Default::default()).unwrap());
        restore_snapshot(&cache, &dir.path().join("absent.json"))
            .await
            .unwrap();
        assert!(cache.read().await.is_empty());
    }

    #[tokio::test]
    async fn test_inspect_rejects_garbage() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("cache.json");
        tokio::fs::write(&path, "not json").await.unwrap();
        assert!(inspect_cache(&ReclaimConfig::default(), &path).await.is_err());
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_interrupt_stops_running_batch() {
        let worker = reclaim_worker::CommandConfig::new("sh").with_args(["-c", "exec sleep 30"]);
        let factory = Arc::new(CommandWorkerFactory::new(worker).unwrap());
        let scheduler = BatchScheduler::new(Default::default(), factory).unwrap();
        let mut events = scheduler.subscribe();
        let mut progress = BatchProgress::hidden().unwrap();

        scheduler
            .enqueue("/data/a.zip", Default::default(), 5)
            .await
            .unwrap();
        scheduler.start().await.unwrap();

        let (tx, rx) = tokio::sync::oneshot::channel::<()>();
        tx.send(()).unwrap();
        let interrupt = async move {
            let _ = rx.await;
            Ok(())
        };

        let interrupted = follow_batch(&scheduler, &mut events, &mut progress, interrupt)
            .await
            .unwrap();
        assert!(interrupted);

        let status = scheduler.status().await;
        assert!(!status.running);
        assert_eq!(status.queue.len(), 1);
        assert!(status.in_flight.is_empty());
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_run_batch_with_shell_worker() {
        let dir = tempfile::tempdir().unwrap();
        let snapshot = dir.path().join("cache.json");
        let config = ReclaimConfig::default();

        run_batch(
            config,
            RunArgs {
                targets: vec!["/data/a.zip".into(), "/data/b.zip".into()],
                worker: Some("sh".into()),
                args: vec![
                    "-c".into(),
                    r#"printf '{"event":"result","found":true,"value":"pw-%s","tested":3}\n' "$(basename "$1")""#.into(),
                    "sh".into(),
                    "{target}".into(),
                ],
                priority: 5,
                cache_snapshot: Some(snapshot.clone()),
                ..Default::default()
            },
        )
        .await
        .unwrap();

        let data = tokio::fs::read_to_string(&snapshot).await.unwrap();
        let snapshot: Snapshot = serde_json::from_str(&data).unwrap();
        assert_eq!(snapshot.cache.len(), 2);
    }
}
