use crate::backup::BackupEngine;
use crate::channel::ChatChannel;
use crate::command::parser::{Command, CommandKind, CommandParser, InboundMessage, Route, Target, help_text};
use crate::command::progress::{ERROR_MARKER, Operation, spawn_output_renderer};
use crate::command::status::{ServerState, StatusLine, render_status_report};
use crate::config::{DEFAULT_COMMAND_PREFIX, ServerDescriptor};
use crate::error::{Error, Result};
use crate::server::{ProcessControl, SAMPLE_WINDOW, ServerLocks, ServerRegistry, StopOutcome};
use crate::state::RunningSetStore;
use crate::update::{DEFAULT_QUEUE_CAPACITY, UpdateEngine};
use futures::future::join_all;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;

/// How a message was handled.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Disposition {
    /// Not a command; nothing was sent.
    Ignored,
    /// Unknown command; the help text was sent.
    Help,
    /// Recognized but invalid (unknown or missing server); an error was sent.
    Rejected,
    /// The command ran to completion.
    Completed(CommandKind),
    /// The command started but failed part-way; the failure was reported.
    Failed(CommandKind),
}

/// Parses inbound commands and runs them against the roster.
///
/// Owns the composite sequencing of the lifecycle commands. Stop, start,
/// backup and update hold the target server's lock for their whole duration;
/// status does not lock. Every recognized command produces at least one reply.
pub struct CommandRouter {
    parser: CommandParser,
    registry: Arc<ServerRegistry>,
    locks: ServerLocks,
    controller: Arc<dyn ProcessControl>,
    running_set: Arc<RunningSetStore>,
    backups: BackupEngine,
    updates: UpdateEngine,
    sample_window: Duration,
    output_window_lines: usize,
}

impl CommandRouter {
    /// Creates a router with the default prefix, sampling window and output window.
    pub fn new(
        registry: Arc<ServerRegistry>,
        controller: Arc<dyn ProcessControl>,
        running_set: Arc<RunningSetStore>,
        backups: BackupEngine,
        updates: UpdateEngine,
    ) -> Self {
        let locks = ServerLocks::for_registry(&registry);
        Self {
            parser: CommandParser::new(DEFAULT_COMMAND_PREFIX),
            registry,
            locks,
            controller,
            running_set,
            backups,
            updates,
            sample_window: SAMPLE_WINDOW,
            output_window_lines: 15,
        }
    }

    /// Sets the control token.
    pub fn with_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.parser = CommandParser::new(prefix);
        self
    }

    /// Sets the CPU sampling window used by status.
    pub fn with_sample_window(mut self, window: Duration) -> Self {
        self.sample_window = window;
        self
    }

    /// Sets how many update output lines stay visible.
    pub fn with_output_window(mut self, lines: usize) -> Self {
        self.output_window_lines = lines.max(1);
        self
    }

    /// The roster.
    pub fn registry(&self) -> &Arc<ServerRegistry> {
        &self.registry
    }

    /// The per-server locks.
    pub fn locks(&self) -> &ServerLocks {
        &self.locks
    }

    /// Handles one inbound message end to end, rendering progress to `channel`.
    #[tracing::instrument(skip(self, message, channel), fields(author = %message.author))]
    pub async fn handle(&self, message: &InboundMessage, channel: Arc<dyn ChatChannel>) -> Disposition {
        match self.parser.route(message, &self.registry) {
            Route::Ignored => Disposition::Ignored,
            Route::Help { command } => {
                tracing::info!(content = %message.content, "Unknown command");
                send_or_log(channel.as_ref(), &help_text(&command)).await;
                Disposition::Help
            }
            Route::Rejected(e) => {
                tracing::info!(content = %message.content, error = %e, "Command rejected");
                send_or_log(channel.as_ref(), &format!("{} {}", ERROR_MARKER, e)).await;
                Disposition::Rejected
            }
            Route::Dispatch(command) => {
                tracing::info!(content = %message.content, command = %command.kind, "Dispatching command");
                let kind = command.kind;
                match self.execute(command, channel).await {
                    Ok(()) => Disposition::Completed(kind),
                    Err(e) => {
                        tracing::warn!(command = %kind, error = %e, "Command failed");
                        Disposition::Failed(kind)
                    }
                }
            }
        }
    }

    /// Runs a validated command.
    ///
    /// Failures are reported to `channel` before they are returned.
    pub async fn execute(&self, command: Command, channel: Arc<dyn ChatChannel>) -> Result<()> {
        let server = match &command.target {
            Target::Server(server) => Some(Arc::clone(server)),
            Target::Roster => None,
        };
        let mut op = Operation::new(command.kind, server.as_ref().map(|s| s.name.clone()), channel);

        let result = match (command.kind, server) {
            (CommandKind::Status, server) => {
                self.run_status(&mut op, server).await;
                Ok(())
            }
            (kind, Some(server)) => self.run_locked(&mut op, kind, &server).await,
            (kind, None) => Err(Error::MissingServerArgument(kind.to_string())),
        };

        if let Err(e) = &result {
            if !op.has_failed() {
                op.report_error(e.to_string(), Some(e)).await;
            }
        }
        result
    }

    async fn run_locked(&self, op: &mut Operation, kind: CommandKind, server: &ServerDescriptor) -> Result<()> {
        if self.locks.is_busy(&server.name) {
            op.report(format!(
                "'{}' is busy with another operation; waiting for it to finish...",
                server.name
            ))
            .await;
        }
        let _guard = self.locks.acquire(&server.name).await?;
        tracing::debug!(server = %server.name, command = %kind, "Acquired server lock");

        match kind {
            CommandKind::Stop => self.stop_server(op, server, None).await.map(|_| ()),
            CommandKind::Start => self.start_server(op, server, true).await,
            CommandKind::Backup => self.run_backup(op, server).await,
            CommandKind::Update => self.run_update(op, server).await,
            CommandKind::Status => Ok(()),
        }
    }

    /// Samples every target concurrently so the report costs one window.
    async fn run_status(&self, op: &mut Operation, server: Option<Arc<ServerDescriptor>>) {
        let targets = match server {
            Some(server) => vec![server],
            None => self.registry.servers().to_vec(),
        };
        let lines = join_all(targets.iter().map(|s| self.status_line(s))).await;
        op.report(render_status_report(&lines)).await;
    }

    async fn status_line(&self, server: &ServerDescriptor) -> StatusLine {
        let state = match self.controller.is_running(server).await {
            Ok(snapshot) if snapshot.running => {
                match self.controller.sample_usage(&snapshot.pids, self.sample_window).await {
                    Ok(usage) => ServerState::Running(Some(usage)),
                    Err(e) => {
                        tracing::warn!(server = %server.name, error = %e, "Failed to sample usage");
                        ServerState::Running(None)
                    }
                }
            }
            Ok(_) => ServerState::Stopped,
            Err(e) => {
                tracing::error!(server = %server.name, error = %e, "Failed to query process table");
                ServerState::Unknown(e.to_string())
            }
        };
        StatusLine {
            name: server.name.clone(),
            state,
        }
    }

    /// Stops `server`; returns whether anything was running.
    ///
    /// A kill failure is reported and returned, which ends the composite
    /// sequence before any backup or restart.
    async fn stop_server(&self, op: &mut Operation, server: &ServerDescriptor, purpose: Option<&str>) -> Result<bool> {
        let name = &server.name;
        match purpose {
            Some(purpose) => op.report(format!("Stopping '{}' before {}...", name, purpose)).await,
            None => op.report(format!("Stopping '{}'...", name)).await,
        };

        let outcome = match self.controller.stop(server).await {
            Ok(outcome) => outcome,
            Err(e) => {
                op.report_error(format!("Failed to stop '{}': {}", name, e), Some(&e)).await;
                return Err(e);
            }
        };

        match outcome {
            StopOutcome::Stopped { count } => {
                op.report(format!("Stopped {} process(es) for '{}'.", count, name)).await;
            }
            StopOutcome::NotRunning => {
                op.report(format!("'{}' is not running; nothing to stop.", name)).await;
            }
        }
        self.record(|store| store.mark_stopped(name));
        Ok(outcome.was_running())
    }

    /// Launches `server`. With `check_running`, an already-running server is
    /// left alone.
    async fn start_server(&self, op: &mut Operation, server: &ServerDescriptor, check_running: bool) -> Result<()> {
        let name = &server.name;
        if server.start_command.trim().is_empty() {
            let e = Error::StartCommandMissing(name.clone());
            op.report_error(e.to_string(), None).await;
            return Err(e);
        }

        if check_running {
            match self.controller.is_running(server).await {
                Ok(snapshot) if snapshot.running => {
                    op.report(format!("'{}' is already running.", name)).await;
                    self.record(|store| store.mark_started(name));
                    return Ok(());
                }
                Ok(_) => {}
                Err(e) => {
                    tracing::warn!(server = %name, error = %e, "Could not check process table before start");
                }
            }
        }

        op.report(format!("Starting '{}'...", name)).await;
        match self.controller.start(server).await {
            Ok(pid) => {
                tracing::debug!(server = %name, pid, "Start command spawned");
                op.report(format!("Start command executed for '{}'.", name)).await;
                self.record(|store| store.mark_started(name));
                Ok(())
            }
            Err(e) => {
                op.report_error(format!("Failed to start '{}': {}", name, e), Some(&e)).await;
                Err(e)
            }
        }
    }

    async fn backup_server(&self, op: &mut Operation, server: &ServerDescriptor, context: Option<&str>) -> Result<()> {
        let name = &server.name;
        let context = context.map(|c| format!(" ({})", c)).unwrap_or_default();
        op.report(format!("Performing backup for '{}'{}...", name, context)).await;

        match self.backups.backup(server).await {
            Ok(path) => {
                let file = path
                    .file_name()
                    .map(|f| f.to_string_lossy().into_owned())
                    .unwrap_or_else(|| path.display().to_string());
                op.report(format!(
                    "Backup of '{}' completed successfully. File: {}",
                    name, file
                ))
                .await;
                Ok(())
            }
            Err(e) => {
                op.report_error(format!("Failed to backup server '{}': {}", name, e), Some(&e)).await;
                Err(e)
            }
        }
    }

    /// Stop, back up, restart only if it was running and the backup succeeded.
    ///
    /// A failed backup deliberately leaves the server stopped.
    async fn run_backup(&self, op: &mut Operation, server: &ServerDescriptor) -> Result<()> {
        let was_running = self.stop_server(op, server, Some("backup")).await?;
        let backup = self.backup_server(op, server, None).await;
        if was_running && backup.is_ok() {
            self.start_server(op, server, false).await?;
        }
        backup
    }

    /// Stop, back up, update, restart if it was running.
    ///
    /// Only a failed backup, a failed launch or a timeout skip the restart.
    /// The update command's exit code is reported but does not gate the
    /// restart.
    async fn run_update(&self, op: &mut Operation, server: &ServerDescriptor) -> Result<()> {
        let name = &server.name;
        let was_running = self.stop_server(op, server, Some("update")).await?;

        if let Err(e) = self.backup_server(op, server, Some("before update")).await {
            op.report_error(format!("Backup failed. Update aborted for '{}'.", name), None).await;
            return Err(e);
        }

        op.report(format!("Running update command for '{}'...", name)).await;
        let (tx, rx) = mpsc::channel(DEFAULT_QUEUE_CAPACITY);
        let renderer = spawn_output_renderer(
            Arc::clone(op.channel()),
            format!("Update output for '{}':", name),
            self.output_window_lines,
            rx,
        );
        let result = self.updates.run(server, Some(tx)).await;
        if let Err(e) = renderer.await {
            tracing::warn!(error = %e, "Update output renderer failed");
        }

        match result {
            Ok(result) => {
                let suffix = match result.exit_code {
                    Some(0) => String::new(),
                    Some(code) => format!(" (exit code {})", code),
                    None if result.exit_observed => " (terminated by signal)".to_string(),
                    None => " (exit status unknown)".to_string(),
                };
                op.report(format!("Update command completed for '{}'{}.", name, suffix)).await;
            }
            Err(e) => {
                op.report_error(format!("Failed to update server '{}': {}", name, e), Some(&e)).await;
                return Err(e);
            }
        }

        if was_running {
            self.start_server(op, server, false).await?;
        }
        Ok(())
    }

    /// Applies a running-set mutation. Persistence problems are logged, not
    /// surfaced: the operation itself already happened.
    fn record(&self, mutate: impl FnOnce(&RunningSetStore) -> Result<()>) {
        if let Err(e) = mutate(&self.running_set) {
            tracing::error!(
                error = %e,
                path = %self.running_set.path().display(),
                "Failed to update running-set"
            );
        }
    }
}

async fn send_or_log(channel: &dyn ChatChannel, text: &str) {
    if let Err(e) = channel.send(text).await {
        tracing::warn!(error = %e, "Failed to deliver reply");
    }
}
