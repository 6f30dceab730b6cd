/*!
 # Game Server Manager

 A Rust library for supervising a roster of game-server processes on one host
 and driving their lifecycle from chat commands.

 ## Overview

 Game Server Manager provides functionality to:
 - Report whether each server is running, with memory and CPU usage
 - Start and forcefully stop the OS processes backing a server
 - Back up a server's save directory to a timestamped zip archive
 - Run a server's update command, streaming its output
 - Remember which servers were running across restarts of the manager
 - Accept commands over an HTTP gateway with Server-Sent Events output

 ## Basic Usage

 ```no_run
 use game_server_manager::{ServerManager, Result};
 use game_server_manager::channel::RecordingChannel;
 use game_server_manager::command::InboundMessage;
 use std::sync::Arc;

 #[tokio::main]
 async fn main() -> Result<()> {
     // Load and validate the configuration
     let mut manager = ServerManager::from_config_file("config.json")?;

     // Restart whatever was running when the manager last stopped
     let report = manager.restore_on_boot().await?;
     println!("Restarted {:?}", report.restarted);

     // Run a command and collect what it renders
     let channel = Arc::new(RecordingChannel::new());
     manager
         .handle_message(&InboundMessage::new("alice", "!sm status"), channel.clone())
         .await;
     println!("{}", channel.texts().join("\n"));

     // Serve the HTTP gateway if one is configured
     manager.start_gateway().await?;

     manager.shutdown().await?;
     Ok(())
 }
 ```

 ## Commands

 `<prefix> <command> [<serverName>]` with the default prefix `!sm`:

 - **status**: running state, RAM and CPU for one server or the whole roster
 - **stop**: kill every process matching the server's executable
 - **start**: launch the start command in the install directory
 - **backup**: stop, archive the save directory, restart if it was running
 - **update**: stop, back up, run the update command, restart if it was running
*/

pub mod backup;
pub mod channel;
pub mod command;
pub mod config;
pub mod error;
pub mod gateway;
pub mod logging;
pub mod server;
pub mod service;
pub mod state;
pub mod update;

pub use channel::{ChatChannel, MessageHandle, RecordingChannel};
pub use command::{CommandRouter, Disposition, InboundMessage};
pub use config::Config;
pub use error::{Error, Result};
pub use gateway::GatewayHandle;
pub use service::{DrainReport, OperationTracker};
pub use state::RunningSetStore;

use backup::BackupEngine;
use gateway::{EventManager, GatewayState};
use server::{ProcessControl, ServerLocks, ServerRegistry, SystemProcessController};
use std::path::Path;
use std::sync::Arc;
use tokio::runtime::Handle;
use update::UpdateEngine;

/// Buffered SSE events per subscriber.
const EVENT_BUFFER: usize = 100;

/// Outcome of [`ServerManager::restore_on_boot`].
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RestoreReport {
    /// Servers whose start command was launched
    pub restarted: Vec<String>,
    /// Servers that could not be restarted, with the reason
    pub failed: Vec<(String, String)>,
    /// Servers found already running and recorded as such
    pub reconciled: Vec<String>,
}

/// The manager's context object.
///
/// Built once at start-up from a validated configuration and owning every
/// engine, the roster, the running-set and the command intake.
/// All public async methods are instrumented with `tracing` spans.
pub struct ServerManager {
    config: Config,
    registry: Arc<ServerRegistry>,
    controller: Arc<dyn ProcessControl>,
    running_set: Arc<RunningSetStore>,
    router: Arc<CommandRouter>,
    tracker: OperationTracker,
    events: Arc<EventManager>,
    gateway: Option<GatewayHandle>,
}

impl ServerManager {
    /// Loads, validates and builds a manager from a configuration file.
    #[tracing::instrument(skip(path), fields(config_path = ?path.as_ref()))]
    pub fn from_config_file(path: impl AsRef<Path>) -> Result<Self> {
        tracing::info!("Loading configuration from file");
        let config = Config::from_file(path)?;
        Self::new(config)
    }

    /// Validates `config` and builds a manager that controls real OS processes.
    ///
    /// Must be called inside a Tokio runtime.
    pub fn new(config: Config) -> Result<Self> {
        let controller = Arc::new(SystemProcessController::new(config.process_match));
        Self::with_controller(config, controller)
    }

    /// Validates `config` and builds a manager around `controller`.
    #[tracing::instrument(skip(config, controller), fields(num_servers = config.servers.len()))]
    pub fn with_controller(config: Config, controller: Arc<dyn ProcessControl>) -> Result<Self> {
        config::validate_config(&config)?;

        let runtime = Handle::try_current()
            .map_err(|e| Error::Other(format!("The manager needs a Tokio runtime: {}", e)))?;
        let registry = Arc::new(ServerRegistry::new(config.servers.clone())?);
        let running_set = Arc::new(RunningSetStore::open(&config.state_file)?);

        let router = CommandRouter::new(
            Arc::clone(&registry),
            Arc::clone(&controller),
            Arc::clone(&running_set),
            BackupEngine::new(&config.backup_location),
            UpdateEngine::new(config.update_timeout()),
        )
        .with_prefix(config.command_prefix.clone())
        .with_output_window(config.output_window_lines);

        tracing::info!(servers = registry.len(), "Server manager created");
        Ok(Self {
            config,
            registry,
            controller,
            running_set,
            router: Arc::new(router),
            tracker: OperationTracker::with_runtime(runtime),
            events: Arc::new(EventManager::new(EVENT_BUFFER)),
            gateway: None,
        })
    }

    /// The validated configuration.
    pub fn config(&self) -> &Config {
        &self.config
    }

    /// The roster.
    pub fn registry(&self) -> &Arc<ServerRegistry> {
        &self.registry
    }

    /// The persisted running-set.
    pub fn running_set(&self) -> &Arc<RunningSetStore> {
        &self.running_set
    }

    /// The command router.
    pub fn router(&self) -> &Arc<CommandRouter> {
        &self.router
    }

    /// The per-server locks shared with the router.
    pub fn locks(&self) -> &ServerLocks {
        self.router.locks()
    }

    /// The running gateway, if started.
    pub fn gateway(&self) -> Option<&GatewayHandle> {
        self.gateway.as_ref()
    }

    /// Brings the running-set in line with the host after a manager restart.
    ///
    /// With `autoRestartServersOnBoot`, every server in the persisted set that
    /// is not already running is started. Afterwards every server with a live
    /// process is recorded as started and every other server as stopped.
    #[tracing::instrument(skip(self))]
    pub async fn restore_on_boot(&self) -> Result<RestoreReport> {
        let mut report = RestoreReport::default();

        if self.config.auto_restart_servers_on_boot {
            let persisted = self.running_set.take_persisted()?;
            tracing::info!(count = persisted.len(), "Restoring servers from last run");

            for name in persisted {
                let Some(server) = self.registry.find(&name) else {
                    tracing::warn!(server = %name, "Persisted server is no longer configured; skipping");
                    continue;
                };
                let _guard = self.locks().acquire(&server.name).await?;

                match self.controller.is_running(&server).await {
                    Ok(snapshot) if snapshot.running => {
                        tracing::info!(server = %server.name, "Already running; no restart needed");
                        continue;
                    }
                    Ok(_) => {}
                    Err(e) => {
                        tracing::warn!(server = %server.name, error = %e, "Liveness check failed before restart");
                    }
                }

                match self.controller.start(&server).await {
                    Ok(pid) => {
                        tracing::info!(server = %server.name, pid, "Restarted server");
                        self.running_set.mark_started(&server.name)?;
                        report.restarted.push(server.name.clone());
                    }
                    Err(e) => {
                        tracing::error!(server = %server.name, error = %e, "Failed to restart server");
                        report.failed.push((server.name.clone(), e.to_string()));
                    }
                }
            }
        }

        for server in self.registry.servers() {
            if report.restarted.contains(&server.name) {
                continue;
            }
            match self.controller.is_running(server).await {
                Ok(snapshot) if snapshot.running => {
                    self.running_set.mark_started(&server.name)?;
                    report.reconciled.push(server.name.clone());
                }
                Ok(_) => self.running_set.mark_stopped(&server.name)?,
                Err(e) => {
                    tracing::warn!(server = %server.name, error = %e, "Could not reconcile server state");
                }
            }
        }

        tracing::info!(
            restarted = report.restarted.len(),
            failed = report.failed.len(),
            reconciled = report.reconciled.len(),
            "Boot restore finished"
        );
        Ok(report)
    }

    /// Handles one message in the caller's task.
    pub async fn handle_message(
        &self,
        message: &InboundMessage,
        channel: Arc<dyn ChatChannel>,
    ) -> Disposition {
        self.router.handle(message, channel).await
    }

    /// Handles one message as an independent tracked task.
    ///
    /// Returns a receiver for the outcome; fails once shutdown has begun.
    pub async fn submit(
        &self,
        message: InboundMessage,
        channel: Arc<dyn ChatChannel>,
    ) -> Result<tokio::sync::oneshot::Receiver<Disposition>> {
        let router = Arc::clone(&self.router);
        self.tracker
            .spawn(async move { router.handle(&message, channel).await })
            .await
    }

    /// Starts the HTTP gateway if one is configured.
    ///
    /// Returns whether a gateway is running afterwards.
    #[tracing::instrument(skip(self))]
    pub async fn start_gateway(&mut self) -> Result<bool> {
        if self.gateway.is_some() {
            return Ok(true);
        }
        let Some(config) = &self.config.gateway else {
            tracing::debug!("No gateway configured");
            return Ok(false);
        };

        let state = GatewayState {
            router: Arc::clone(&self.router),
            tracker: self.tracker.clone(),
            running_set: Arc::clone(&self.running_set),
            events: Arc::clone(&self.events),
        };
        self.gateway = Some(gateway::start_gateway(config, state).await?);
        Ok(true)
    }

    /// Stops intake, lets in-flight operations finish, and persists the running-set.
    ///
    /// Operations still running after `shutdownGraceSecs` are aborted.
    #[tracing::instrument(skip(self))]
    pub async fn shutdown(&mut self) -> Result<DrainReport> {
        tracing::info!("Shutting down server manager");
        self.tracker.close();

        if let Some(gateway) = self.gateway.take() {
            if let Err(e) = gateway.shutdown().await {
                tracing::warn!(error = %e, "Failed to stop gateway cleanly");
            }
        }

        let report = self.tracker.drain(self.config.shutdown_grace()).await;
        self.running_set.persist()?;
        tracing::info!(
            completed = report.completed,
            aborted = report.aborted,
            "Server manager stopped"
        );
        Ok(report)
    }
}
