//! Workers backed by an external program.

use crate::config::{ATTACK_CONFIG_ENV, CommandConfig, TARGET_ENV};
use crate::protocol::{WorkerMessage, parse_line};
use async_trait::async_trait;
use reclaim_core::job::{AttackConfig, Job, ProgressUpdate, WorkerOutcome};
use reclaim_core::ports::{Worker, WorkerFactory};
use reclaim_core::{Error, Result};
use std::collections::VecDeque;
use std::process::Stdio;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::time::Duration;
use sysinfo::{Pid, ProcessesToUpdate, Signal, System};
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::process::{Child, ChildStderr, Command};
use tokio::sync::{mpsc, watch};
use tokio::time::timeout;
use tracing::{debug, info, warn};

/// Stderr lines kept for the failure message.
const STDERR_TAIL_LINES: usize = 20;

/// Extra time `stop` allows on top of the grace period for the kill itself.
const STOP_SLACK: Duration = Duration::from_secs(1);

/// One attempt of the configured program against one target.
pub struct CommandWorker {
    config: Arc<CommandConfig>,
    target: String,
    /// 0 while no child is running.
    pid: AtomicU32,
    started: AtomicBool,
    stop_tx: watch::Sender<bool>,
    exited_tx: watch::Sender<bool>,
}

impl CommandWorker {
    pub fn new(config: Arc<CommandConfig>, target: impl Into<String>) -> Self {
        let (stop_tx, _) = watch::channel(false);
        let (exited_tx, _) = watch::channel(false);
        Self {
            config,
            target: target.into(),
            pid: AtomicU32::new(0),
            started: AtomicBool::new(false),
            stop_tx,
            exited_tx,
        }
    }

    pub fn target(&self) -> &str {
        &self.target
    }

    /// Process id of the running child.
    pub fn pid(&self) -> Option<u32> {
        match self.pid.load(Ordering::SeqCst) {
            0 => None,
            pid => Some(pid),
        }
    }

    fn command(&self, attack: &AttackConfig) -> Result<Command> {
        let mut command = Command::new(&self.config.program);
        command
            .args(self.config.args_for(&self.target))
            .envs(&self.config.env)
            .env(ATTACK_CONFIG_ENV, serde_json::to_string(attack)?)
            .env(TARGET_ENV, &self.target)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);
        if let Some(dir) = &self.config.working_dir {
            command.current_dir(dir);
        }
        Ok(command)
    }

    /// Deliver `signal` to the child. A child that already exited is not an error.
    fn signal(&self, signal: Signal) -> Result<()> {
        let Some(pid) = self.pid() else {
            return Ok(());
        };
        let pid = Pid::from_u32(pid);
        let mut system = System::new();
        system.refresh_processes(ProcessesToUpdate::Some(&[pid]), true);
        let Some(process) = system.process(pid) else {
            return Ok(());
        };

        match process.kill_with(signal) {
            Some(true) => Ok(()),
            Some(false) => Err(Error::Internal(format!(
                "failed to send {signal:?} to worker process {pid}"
            ))),
            None => Err(Error::Internal(format!(
                "{signal:?} is not supported on this platform"
            ))),
        }
    }

    async fn run(
        &self,
        attack: &AttackConfig,
        progress: mpsc::Sender<ProgressUpdate>,
        stop_rx: &mut watch::Receiver<bool>,
    ) -> Result<WorkerOutcome> {
        let mut child = self
            .command(attack)?
            .spawn()
            .map_err(|e| Error::WorkerSpawn(format!("{}: {}", self.config.program, e)))?;
        self.pid.store(child.id().unwrap_or(0), Ordering::SeqCst);

        info!(
            target = %self.target,
            program = %self.config.program,
            pid = child.id(),
            "Worker process started"
        );

        let stdout = child
            .stdout
            .take()
            .ok_or_else(|| Error::WorkerSpawn("stdout was not captured".into()))?;
        let stderr = child
            .stderr
            .take()
            .ok_or_else(|| Error::WorkerSpawn("stderr was not captured".into()))?;
        let stderr_handle = tokio::spawn(collect_stderr(stderr, self.target.clone()));

        let mut lines = BufReader::new(stdout).lines();
        let mut stdout_open = true;
        let mut outcome: Option<WorkerOutcome> = None;
        let mut last_tested = 0u64;

        let status = loop {
            tokio::select! {
                line = lines.next_line(), if stdout_open => match line {
                    Ok(Some(line)) => match parse_line(&line) {
                        Some(WorkerMessage::Progress(update)) => {
                            last_tested = update.tested;
                            // Receiver gone means nobody is watching progress.
                            let _ = progress.send(update.normalized()).await;
                        }
                        Some(message @ WorkerMessage::Result { .. }) => {
                            if outcome.is_none() {
                                outcome = message.into_outcome();
                            } else {
                                debug!(target = %self.target, "Ignoring repeated result line");
                            }
                        }
                        None => debug!(target = %self.target, line = %line, "Worker output"),
                    },
                    Ok(None) => stdout_open = false,
                    Err(e) => {
                        warn!(target = %self.target, error = %e, "Failed to read worker stdout");
                        stdout_open = false;
                    }
                },
                status = child.wait(), if !stdout_open => break status?,
                _ = stop_rx.changed() => {
                    self.terminate(&mut child).await;
                    stderr_handle.abort();
                    return Err(Error::WorkerStopped);
                }
            }
        };

        let stderr_tail = stderr_handle.await.unwrap_or_default();

        if !status.success() {
            let exit_code = status.code().unwrap_or(-1);
            let message = if stderr_tail.is_empty() {
                format!("{} exited unsuccessfully", self.config.program)
            } else {
                stderr_tail.join("\n")
            };
            warn!(target = %self.target, exit_code, "Worker process failed");
            return Err(Error::WorkerFailed { exit_code, message });
        }

        let outcome = outcome.unwrap_or_else(|| WorkerOutcome::not_found(last_tested));
        info!(
            target = %self.target,
            found = outcome.found,
            tested = outcome.units_tested,
            "Worker process finished"
        );
        Ok(outcome)
    }

    /// Ask the child to exit, then kill it once the grace period runs out.
    async fn terminate(&self, child: &mut Child) {
        // A paused child cannot act on SIGTERM until continued.
        let _ = self.signal(Signal::Continue);

        if self.signal(Signal::Term).is_ok() {
            if timeout(self.config.stop_grace(), child.wait()).await.is_ok() {
                debug!(target = %self.target, "Worker process terminated");
                return;
            }
            warn!(target = %self.target, "Worker ignored termination, killing");
        }

        if let Err(e) = child.kill().await {
            warn!(target = %self.target, error = %e, "Failed to kill worker process");
        }
    }
}

/// Marks the worker as exited when `start` returns or its future is dropped.
struct ExitGuard<'a>(&'a CommandWorker);

impl Drop for ExitGuard<'_> {
    fn drop(&mut self) {
        self.0.pid.store(0, Ordering::SeqCst);
        self.0.exited_tx.send_replace(true);
    }
}

async fn collect_stderr(stderr: ChildStderr, target: String) -> Vec<String> {
    let mut lines = BufReader::new(stderr).lines();
    let mut tail = VecDeque::with_capacity(STDERR_TAIL_LINES);

    while let Ok(Some(line)) = lines.next_line().await {
        debug!(target = %target, line = %line, "Worker stderr");
        if tail.len() == STDERR_TAIL_LINES {
            tail.pop_front();
        }
        tail.push_back(line);
    }

    tail.into()
}

#[async_trait]
impl Worker for CommandWorker {
    async fn start(
        &self,
        config: &AttackConfig,
        progress: mpsc::Sender<ProgressUpdate>,
    ) -> Result<WorkerOutcome> {
        let mut stop_rx = self.stop_tx.subscribe();
        self.started.store(true, Ordering::SeqCst);
        let _exit = ExitGuard(self);
        if *stop_rx.borrow_and_update() {
            return Err(Error::WorkerStopped);
        }

        self.run(config, progress, &mut stop_rx).await
    }

    fn can_pause(&self) -> bool {
        sysinfo::SUPPORTED_SIGNALS.contains(&Signal::Stop)
    }

    async fn pause(&self) -> Result<()> {
        self.signal(Signal::Stop)?;
        debug!(target = %self.target, "Worker process paused");
        Ok(())
    }

    async fn resume(&self) -> Result<()> {
        self.signal(Signal::Continue)?;
        debug!(target = %self.target, "Worker process resumed");
        Ok(())
    }

    async fn stop(&self) -> Result<()> {
        self.stop_tx.send_replace(true);
        if !self.started.load(Ordering::SeqCst) {
            return Ok(());
        }

        let mut exited_rx = self.exited_tx.subscribe();
        let exited = timeout(
            self.config.stop_grace() + STOP_SLACK,
            exited_rx.wait_for(|exited| *exited),
        )
        .await
        .is_ok();
        if !exited {
            warn!(target = %self.target, "Worker did not exit within the grace period");
        }
        Ok(())
    }
}

/// Creates a [`CommandWorker`] per job from one shared configuration.
#[derive(Debug, Clone)]
pub struct CommandWorkerFactory {
    config: Arc<CommandConfig>,
}

impl CommandWorkerFactory {
    pub fn new(config: CommandConfig) -> Result<Self> {
        config.validate()?;
        Ok(Self {
            config: Arc::new(config),
        })
    }

    pub fn config(&self) -> &CommandConfig {
        &self.config
    }
}

impl WorkerFactory for CommandWorkerFactory {
    fn create(&self, job: &Job) -> Arc<dyn Worker> {
        Arc::new(CommandWorker::new(Arc::clone(&self.config), job.target.clone()))
    }
}
