use async_trait::async_trait;
use game_server_manager::backup::BackupEngine;
use game_server_manager::channel::RecordingChannel;
use game_server_manager::command::{CommandRouter, Disposition, InboundMessage};
use game_server_manager::config::{Config, ProcessMatchMode, ServerDescriptor};
use game_server_manager::error::Result;
use game_server_manager::server::{
    ProcessControl, ProcessSnapshot, ResourceUsage, ServerRegistry, StopOutcome,
};
use game_server_manager::state::RunningSetStore;
use game_server_manager::update::UpdateEngine;
use mockall::mock;
use std::collections::BTreeSet;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tempfile::TempDir;

mock! {
    pub Controller {}

    #[async_trait]
    impl ProcessControl for Controller {
        async fn is_running(&self, server: &ServerDescriptor) -> Result<ProcessSnapshot>;
        async fn sample_usage(&self, pids: &BTreeSet<u32>, window: Duration) -> Result<ResourceUsage>;
        async fn stop(&self, server: &ServerDescriptor) -> Result<StopOutcome>;
        async fn start(&self, server: &ServerDescriptor) -> Result<u32>;
    }
}

/// A scratch roster: one save directory per server, a backup root and a
/// running-set file, all under a temporary directory.
pub struct Fixture {
    pub dir: TempDir,
    pub backups: PathBuf,
    pub servers: Vec<ServerDescriptor>,
    pub running_set: Arc<RunningSetStore>,
    pub update_timeout: Duration,
}

impl Fixture {
    pub fn new(names: &[&str]) -> Self {
        let dir = tempfile::tempdir().unwrap();
        let backups = dir.path().join("backups");
        std::fs::create_dir_all(&backups).unwrap();

        let servers = names
            .iter()
            .map(|name| {
                let install = dir.path().join(name);
                let save = install.join("save");
                std::fs::create_dir_all(save.join("worlds")).unwrap();
                std::fs::write(save.join("worlds").join("world.db"), b"seed=42").unwrap();
                ServerDescriptor {
                    name: name.to_string(),
                    install_location: install,
                    save_directory: save,
                    start_command: "./start.sh".to_string(),
                    update_command: "echo updated".to_string(),
                    executable_name: format!("gsm-test-{}", name.to_lowercase()),
                }
            })
            .collect();

        let running_set = Arc::new(RunningSetStore::open(dir.path().join("running.json")).unwrap());
        Self {
            dir,
            backups,
            servers,
            running_set,
            update_timeout: Duration::from_secs(30),
        }
    }

    pub fn server_mut(&mut self, name: &str) -> &mut ServerDescriptor {
        self.servers.iter_mut().find(|s| s.name == name).unwrap()
    }

    pub fn router(&self, controller: Arc<dyn ProcessControl>) -> CommandRouter {
        let registry = Arc::new(ServerRegistry::new(self.servers.clone()).unwrap());
        CommandRouter::new(
            registry,
            controller,
            Arc::clone(&self.running_set),
            BackupEngine::new(&self.backups),
            UpdateEngine::new(self.update_timeout),
        )
        .with_sample_window(Duration::from_millis(10))
    }

    pub fn config(&self) -> Config {
        Config {
            servers: self.servers.clone(),
            backup_location: self.backups.clone(),
            auto_restart_servers_on_boot: false,
            command_prefix: "!sm".to_string(),
            state_file: self.dir.path().join("running.json"),
            process_match: ProcessMatchMode::ImageName,
            update_timeout_secs: 30,
            shutdown_grace_secs: 5,
            output_window_lines: 15,
            gateway: None,
        }
    }

    pub fn archives(&self) -> Vec<String> {
        let mut names: Vec<String> = std::fs::read_dir(&self.backups)
            .unwrap()
            .map(|entry| entry.unwrap().file_name().to_string_lossy().into_owned())
            .collect();
        names.sort();
        names
    }
}

/// Runs one command and returns its disposition and transcript.
pub async fn run(router: &CommandRouter, content: &str) -> (Disposition, Vec<String>) {
    let channel = Arc::new(RecordingChannel::new());
    let disposition = router
        .handle(&InboundMessage::new("alice", content), channel.clone())
        .await;
    (disposition, channel.texts())
}
