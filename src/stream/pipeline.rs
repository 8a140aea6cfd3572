//! A transcoding process whose standard output is the byte source of a session.

use std::process::Stdio;
use std::sync::Arc;
use std::time::Duration;

use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::process::{ChildStdout, Command};
use tokio::sync::{watch, OwnedSemaphorePermit, Semaphore};
use tokio_util::sync::CancellationToken;

use crate::engine::EngineCommand;

#[derive(Debug, thiserror::Error)]
pub enum PipelineError {
    #[error("transcode limit of {0} reached")]
    Busy(usize),
    #[error("failed to spawn {program}: {source}")]
    Spawn {
        program: String,
        #[source]
        source: std::io::Error,
    },
    #[error("{0} has no stdout")]
    NoStdout(String),
}

/// How a pipeline's process ended.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum PipelineExit {
    Success,
    /// Non-zero exit, or killed by a signal (`None`).
    Failed(Option<i32>),
    /// Killed by [`ProcessPipeline::abort`].
    Aborted,
}

impl PipelineExit {
    pub fn is_success(&self) -> bool {
        matches!(self, PipelineExit::Success)
    }
}

/// Spawns pipelines and bounds how many run at once.
#[derive(Debug, Clone)]
pub struct Transcoder {
    limit: Arc<Semaphore>,
    max: usize,
    abort_timeout: Duration,
}

impl Transcoder {
    pub fn new(max_transcodes: usize, abort_timeout: Duration) -> Self {
        Transcoder {
            limit: Arc::new(Semaphore::new(max_transcodes)),
            max: max_transcodes,
            abort_timeout,
        }
    }

    /// Pipelines that could still be started right now.
    pub fn available(&self) -> usize {
        self.limit.available_permits()
    }

    pub fn spawn(&self, command: &EngineCommand) -> Result<ProcessPipeline, PipelineError> {
        let permit = Arc::clone(&self.limit)
            .try_acquire_owned()
            .map_err(|_| PipelineError::Busy(self.max))?;
        ProcessPipeline::spawn(command, permit, self.abort_timeout)
    }
}

/// Owns one running engine process.
///
/// A monitor task owns the child and publishes its exit. The process is
/// killed when [`abort`](Self::abort) is called or the pipeline is dropped.
#[derive(Debug)]
pub struct ProcessPipeline {
    program: String,
    pid: Option<u32>,
    stdout: Option<ChildStdout>,
    cancel: CancellationToken,
    exit: watch::Receiver<Option<PipelineExit>>,
}

impl ProcessPipeline {
    fn spawn(
        command: &EngineCommand,
        permit: OwnedSemaphorePermit,
        abort_timeout: Duration,
    ) -> Result<Self, PipelineError> {
        let mut child = Command::new(&command.program)
            .args(&command.args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|source| PipelineError::Spawn {
                program: command.program.clone(),
                source,
            })?;

        let pid = child.id();
        tracing::debug!(pid = ?pid, "spawned {}", command);

        let stdout = child
            .stdout
            .take()
            .ok_or_else(|| PipelineError::NoStdout(command.program.clone()))?;

        if let Some(stderr) = child.stderr.take() {
            let program = command.program.clone();
            tokio::spawn(async move {
                let mut lines = BufReader::new(stderr).lines();
                while let Ok(Some(line)) = lines.next_line().await {
                    tracing::debug!(pid = ?pid, "{}: {}", program, line);
                }
            });
        }

        let cancel = CancellationToken::new();
        let (exit_tx, exit_rx) = watch::channel(None);
        let token = cancel.clone();
        let program = command.program.clone();
        tokio::spawn(async move {
            let exited = tokio::select! {
                status = child.wait() => Some(status),
                _ = token.cancelled() => None,
            };
            let outcome = match exited {
                Some(Ok(status)) if status.success() => PipelineExit::Success,
                Some(Ok(status)) => {
                    tracing::warn!(pid = ?pid, "{} exited with {}", program, status);
                    PipelineExit::Failed(status.code())
                }
                Some(Err(e)) => {
                    tracing::error!(pid = ?pid, "waiting for {} failed: {}", program, e);
                    PipelineExit::Failed(None)
                }
                None => {
                    // Already exited is fine; the wait below reaps it either way.
                    if let Err(e) = child.start_kill() {
                        tracing::debug!(pid = ?pid, "kill {}: {}", program, e);
                    }
                    if tokio::time::timeout(abort_timeout, child.wait()).await.is_err() {
                        tracing::warn!(pid = ?pid, "{} still running {:?} after kill", program, abort_timeout);
                    }
                    tracing::debug!(pid = ?pid, "{} aborted", program);
                    PipelineExit::Aborted
                }
            };
            drop(permit);
            let _ = exit_tx.send(Some(outcome));
        });

        Ok(ProcessPipeline {
            program: command.program.clone(),
            pid,
            stdout: Some(stdout),
            cancel,
            exit: exit_rx,
        })
    }

    pub fn pid(&self) -> Option<u32> {
        self.pid
    }

    pub fn program(&self) -> &str {
        &self.program
    }

    /// The process output. Can be taken once.
    pub fn take_stdout(&mut self) -> Option<ChildStdout> {
        self.stdout.take()
    }

    /// Kill the process and close its pipes. Safe to call repeatedly, from
    /// any task, and after the process has exited.
    pub fn abort(&mut self) {
        self.stdout = None;
        self.cancel.cancel();
    }

    /// A token that aborts this pipeline when cancelled.
    pub fn abort_handle(&self) -> CancellationToken {
        self.cancel.clone()
    }

    /// The exit outcome, if the process has ended.
    pub fn try_exit(&self) -> Option<PipelineExit> {
        *self.exit.borrow()
    }

    /// Wait for the process to end.
    pub async fn wait(&self) -> PipelineExit {
        let mut exit = self.exit.clone();
        let outcome = match exit.wait_for(Option::is_some).await {
            Ok(outcome) => (*outcome).unwrap_or(PipelineExit::Aborted),
            // Monitor gone without a verdict; the runtime is shutting down.
            Err(_) => PipelineExit::Aborted,
        };
        outcome
    }
}

impl Drop for ProcessPipeline {
    fn drop(&mut self) {
        self.cancel.cancel();
    }
}
