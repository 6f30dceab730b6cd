//! Runs a server's external update command and streams its output.
//!
//! The update command runs through the platform shell in the server's install
//! directory. Standard output and standard error are drained by two
//! concurrent workers into one bounded queue; the engine only waits for the
//! process to exit after both workers reached end-of-stream, so output written
//! just before exit is never lost.

use crate::config::ServerDescriptor;
use crate::error::{Error, Result};
use crate::server::{kill_process_tree, shell_command};
use async_process::Stdio;
use futures_lite::io::{AsyncBufReadExt, AsyncRead, BufReader};
use std::time::{Duration, Instant};
use tokio::sync::mpsc;

/// Capacity of the queue between the output drains and the consumer.
pub const DEFAULT_QUEUE_CAPACITY: usize = 64;

/// Outcome of an update command that launched.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct UpdateResult {
    /// Whether the process exit was observed
    pub exit_observed: bool,
    /// Exit code, when the process exited normally
    pub exit_code: Option<i32>,
    /// Every non-blank output line, stdout and stderr interleaved in arrival order
    pub output_lines: Vec<String>,
}

/// Launches update commands with a timeout.
#[derive(Debug, Clone)]
pub struct UpdateEngine {
    timeout: Duration,
    queue_capacity: usize,
}

impl UpdateEngine {
    /// Creates an engine that kills update commands running longer than `timeout`.
    pub fn new(timeout: Duration) -> Self {
        Self {
            timeout,
            queue_capacity: DEFAULT_QUEUE_CAPACITY,
        }
    }

    /// Sets the output queue capacity.
    pub fn with_queue_capacity(mut self, capacity: usize) -> Self {
        self.queue_capacity = capacity.max(1);
        self
    }

    /// Runs `server`'s update command to completion.
    ///
    /// Each output line is forwarded to `sink` as it arrives (if given) and
    /// collected into the result. The exit code is reported but not judged:
    /// a non-zero exit is still a completed update.
    ///
    /// # Errors
    ///
    /// * [`Error::UpdateLaunch`] if no update command is configured or the
    ///   process could not be spawned.
    /// * [`Error::UpdateTimeout`] if the command outlived the timeout; the
    ///   shell and every process it started are killed.
    #[tracing::instrument(skip(self, server, sink), fields(server = %server.name))]
    pub async fn run(
        &self,
        server: &ServerDescriptor,
        sink: Option<mpsc::Sender<String>>,
    ) -> Result<UpdateResult> {
        let command_line = server.update_command.trim();
        if command_line.is_empty() {
            return Err(Error::UpdateLaunch(format!(
                "Update command not configured for server '{}'",
                server.name
            )));
        }

        let mut child = shell_command(command_line, server.working_directory())
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()
            .map_err(|e| {
                tracing::error!(error = %e, "Failed to spawn update command");
                Error::UpdateLaunch(format!("'{}': {}", server.name, e))
            })?;

        let stdout = child.stdout.take().ok_or_else(|| {
            Error::UpdateLaunch("Failed to get stdout pipe from update process".to_string())
        })?;
        let stderr = child.stderr.take().ok_or_else(|| {
            Error::UpdateLaunch("Failed to get stderr pipe from update process".to_string())
        })?;

        tracing::info!(pid = child.id(), "Update command launched");
        let started = Instant::now();

        let (tx, mut rx) = mpsc::channel(self.queue_capacity);
        let mut stdout_task = tokio::spawn(drain_lines(stdout, tx.clone()));
        let mut stderr_task = tokio::spawn(drain_lines(stderr, tx));

        let mut output_lines = Vec::new();
        let run = async {
            // Ends once both drains dropped their senders.
            while let Some(line) = rx.recv().await {
                if let Some(sink) = &sink {
                    if sink.send(line.clone()).await.is_err() {
                        tracing::trace!("Output consumer went away");
                    }
                }
                output_lines.push(line);
            }
            let _ = (&mut stdout_task).await;
            let _ = (&mut stderr_task).await;
            child.status().await
        };
        let outcome = tokio::time::timeout(self.timeout, run).await;

        match outcome {
            Ok(Ok(status)) => {
                tracing::info!(
                    exit_code = ?status.code(),
                    lines = output_lines.len(),
                    elapsed_ms = started.elapsed().as_millis() as u64,
                    "Update command finished"
                );
                Ok(UpdateResult {
                    exit_observed: true,
                    exit_code: status.code(),
                    output_lines,
                })
            }
            Ok(Err(e)) => {
                tracing::warn!(error = %e, "Failed to observe update process exit");
                Ok(UpdateResult {
                    exit_observed: false,
                    exit_code: None,
                    output_lines,
                })
            }
            Err(_) => {
                tracing::error!(timeout = ?self.timeout, "Update command timed out; killing it");
                // The shell may have forked the real updater; take down the whole tree.
                let root = child.id();
                match tokio::task::spawn_blocking(move || kill_process_tree(root)).await {
                    Ok(killed) => tracing::info!(killed, "Killed timed-out update process tree"),
                    Err(e) => tracing::warn!(error = %e, "Process tree kill task failed"),
                }
                if let Err(e) = child.kill() {
                    tracing::debug!(error = %e, "Shell process already gone");
                }
                stdout_task.abort();
                stderr_task.abort();
                let _ = child.status().await;
                Err(Error::UpdateTimeout(format!(
                    "Update of '{}' did not finish within {:?}",
                    server.name, self.timeout
                )))
            }
        }
    }
}

/// Reads `reader` line by line into `tx`, skipping blank lines.
///
/// Invalid UTF-8 is replaced rather than ending the stream, so the child can
/// never block on a full pipe nobody reads.
async fn drain_lines<R>(reader: R, tx: mpsc::Sender<String>)
where
    R: AsyncRead + Unpin,
{
    let mut reader = BufReader::new(reader);
    let mut buffer = Vec::new();
    loop {
        buffer.clear();
        match reader.read_until(b'\n', &mut buffer).await {
            Ok(0) => break,
            Ok(_) => {
                let line = String::from_utf8_lossy(&buffer);
                let line = line.trim_end_matches(['\r', '\n']);
                if line.trim().is_empty() {
                    continue;
                }
                if tx.send(line.to_string()).await.is_err() {
                    break;
                }
            }
            Err(e) => {
                tracing::warn!(error = %e, "Error reading update output");
                break;
            }
        }
    }
}
