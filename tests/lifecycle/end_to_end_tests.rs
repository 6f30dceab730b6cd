use super::support::{Fixture, run};
use assert_fs::prelude::*;
use game_server_manager::channel::RecordingChannel;
use game_server_manager::command::{CommandKind, Disposition, InboundMessage};
use game_server_manager::config::ProcessMatchMode;
use game_server_manager::server::SystemProcessController;
use game_server_manager::{OperationTracker, ServerManager};
use std::io::Read;
use std::sync::Arc;
use std::time::Duration;

#[tokio::test]
async fn test_backup_then_start_of_idle_server() {
    let mut fixture = Fixture::new(&["Foo"]);
    fixture.server_mut("Foo").start_command = String::new();
    let router = fixture.router(Arc::new(SystemProcessController::new(ProcessMatchMode::ImageName)));

    let (disposition, texts) = run(&router, "!sm backup Foo").await;
    assert_eq!(disposition, Disposition::Completed(CommandKind::Backup));
    assert!(texts.iter().any(|t| t.contains("nothing to stop")));
    assert!(texts.iter().any(|t| t.starts_with("Backup of 'Foo' completed successfully.")));
    assert!(!texts.iter().any(|t| t.contains("Start")));

    let (disposition, texts) = run(&router, "!sm start Foo").await;
    assert_eq!(disposition, Disposition::Failed(CommandKind::Start));
    assert_eq!(texts, vec![":x: Start command not configured for server 'Foo'."]);
}

#[tokio::test]
async fn test_backup_archive_contains_save_data() {
    let save = assert_fs::TempDir::new().unwrap();
    save.child("world/level.dat").write_str("level").unwrap();
    save.child("players/alice.json").write_str("{}").unwrap();

    let mut fixture = Fixture::new(&["Foo"]);
    fixture.server_mut("Foo").save_directory = save.path().to_path_buf();
    let router = fixture.router(Arc::new(SystemProcessController::new(ProcessMatchMode::ImageName)));

    let (disposition, _) = run(&router, "!sm backup Foo").await;
    assert_eq!(disposition, Disposition::Completed(CommandKind::Backup));

    let archives = fixture.archives();
    assert_eq!(archives.len(), 1);
    let file = std::fs::File::open(fixture.backups.join(&archives[0])).unwrap();
    let mut zip = zip::ZipArchive::new(file).unwrap();
    let mut contents = String::new();
    zip.by_name("world/level.dat")
        .unwrap()
        .read_to_string(&mut contents)
        .unwrap();
    assert_eq!(contents, "level");
    assert!(zip.by_name("players/alice.json").is_ok());
}

#[tokio::test]
async fn test_manager_serves_submitted_commands_until_shutdown() {
    let fixture = Fixture::new(&["Foo"]);
    let mut manager = ServerManager::new(fixture.config()).unwrap();

    let channel = Arc::new(RecordingChannel::new());
    let outcome = manager
        .submit(InboundMessage::new("alice", "!sm status"), channel.clone())
        .await
        .unwrap();
    assert_eq!(
        outcome.await.unwrap(),
        Disposition::Completed(CommandKind::Status)
    );
    assert_eq!(channel.texts(), vec!["Server status:\n- Foo: stopped"]);

    let drained = manager.shutdown().await.unwrap();
    assert_eq!(drained.aborted, 0);
    assert!(fixture.dir.path().join("running.json").exists());

    let refused = manager
        .submit(InboundMessage::new("alice", "!sm status"), channel)
        .await;
    assert!(refused.is_err());
}

#[tokio::test]
async fn test_invalid_configuration_blocks_start_up() {
    let fixture = Fixture::new(&["Foo"]);
    let mut config = fixture.config();
    config.servers.push(config.servers[0].clone());
    config.backup_location = fixture.dir.path().join("missing");

    let error = ServerManager::new(config).err().expect("configuration should be rejected");
    let message = error.to_string();
    assert!(message.contains("Duplicate server name found: 'Foo'"));
    assert!(message.contains("backupLocation"));
}

#[tokio::test]
async fn test_tracker_lets_commands_finish_during_drain() {
    let fixture = Fixture::new(&["Foo"]);
    let router = Arc::new(fixture.router(Arc::new(SystemProcessController::new(ProcessMatchMode::ImageName))));
    let tracker = OperationTracker::new();

    let channel = Arc::new(RecordingChannel::new());
    let task_router = Arc::clone(&router);
    let task_channel = channel.clone();
    let outcome = tracker
        .spawn(async move {
            task_router
                .handle(&InboundMessage::new("alice", "!sm backup Foo"), task_channel)
                .await
        })
        .await
        .unwrap();

    let report = tracker.drain(Duration::from_secs(10)).await;
    assert_eq!(report.aborted, 0);
    assert_eq!(
        outcome.await.unwrap(),
        Disposition::Completed(CommandKind::Backup)
    );
    assert!(channel.contains("completed successfully"));
}
