use super::support::{Fixture, MockController, run};
use game_server_manager::command::{CommandKind, Disposition};
use game_server_manager::error::Error;
use game_server_manager::server::{ProcessSnapshot, ResourceUsage, StopOutcome};
use std::collections::BTreeSet;
use std::sync::Arc;
use std::time::Duration;

#[tokio::test]
async fn test_backup_of_stopped_server_does_not_restart() {
    let fixture = Fixture::new(&["Foo"]);
    let mut controller = MockController::new();
    controller
        .expect_stop()
        .times(1)
        .returning(|_| Ok(StopOutcome::NotRunning));
    controller.expect_start().never();

    let router = fixture.router(Arc::new(controller));
    let (disposition, texts) = run(&router, "!sm backup Foo").await;

    assert_eq!(disposition, Disposition::Completed(CommandKind::Backup));
    assert_eq!(texts[0], "Stopping 'Foo' before backup...");
    assert_eq!(texts[1], "'Foo' is not running; nothing to stop.");
    assert_eq!(texts[2], "Performing backup for 'Foo'...");
    assert!(texts[3].starts_with("Backup of 'Foo' completed successfully. File: Foo_backup_"));
    assert_eq!(texts.len(), 4);
    assert_eq!(fixture.archives().len(), 1);
}

#[tokio::test]
async fn test_backup_of_running_server_restarts_exactly_once() {
    let fixture = Fixture::new(&["Foo"]);
    let mut controller = MockController::new();
    controller
        .expect_stop()
        .times(1)
        .returning(|_| Ok(StopOutcome::Stopped { count: 2 }));
    controller.expect_start().times(1).returning(|_| Ok(4242));

    let router = fixture.router(Arc::new(controller));
    let (disposition, texts) = run(&router, "!sm backup foo").await;

    assert_eq!(disposition, Disposition::Completed(CommandKind::Backup));
    assert!(texts.contains(&"Stopped 2 process(es) for 'Foo'.".to_string()));
    assert_eq!(texts.last().unwrap(), "Start command executed for 'Foo'.");
    assert!(fixture.running_set.contains("Foo").unwrap());
}

#[tokio::test]
async fn test_failed_backup_leaves_server_stopped() {
    let fixture = Fixture::new(&["Foo"]);
    std::fs::remove_dir_all(&fixture.servers[0].save_directory).unwrap();

    let mut controller = MockController::new();
    controller
        .expect_stop()
        .times(1)
        .returning(|_| Ok(StopOutcome::Stopped { count: 1 }));
    controller.expect_start().never();

    let router = fixture.router(Arc::new(controller));
    let (disposition, texts) = run(&router, "!sm backup Foo").await;

    assert_eq!(disposition, Disposition::Failed(CommandKind::Backup));
    assert!(texts.last().unwrap().starts_with(":x: Failed to backup server 'Foo':"));
    assert!(fixture.archives().is_empty());
    assert!(!fixture.running_set.contains("Foo").unwrap());
}

#[tokio::test]
async fn test_kill_failure_interrupts_the_sequence() {
    let fixture = Fixture::new(&["Foo"]);
    let mut controller = MockController::new();
    controller
        .expect_stop()
        .times(1)
        .returning(|_| Err(Error::Process("Failed to stop process 77 for 'Foo'".to_string())));
    controller.expect_start().never();

    let router = fixture.router(Arc::new(controller));
    let (disposition, texts) = run(&router, "!sm backup Foo").await;

    assert_eq!(disposition, Disposition::Failed(CommandKind::Backup));
    assert_eq!(texts.len(), 2);
    assert!(texts[1].starts_with(":x: Failed to stop 'Foo':"));
    assert!(fixture.archives().is_empty());
}

#[tokio::test]
async fn test_update_aborts_when_backup_fails() {
    let fixture = Fixture::new(&["Foo"]);
    std::fs::remove_dir_all(&fixture.servers[0].save_directory).unwrap();

    let mut controller = MockController::new();
    controller
        .expect_stop()
        .times(1)
        .returning(|_| Ok(StopOutcome::Stopped { count: 1 }));
    controller.expect_start().never();

    let router = fixture.router(Arc::new(controller));
    let (disposition, texts) = run(&router, "!sm update Foo").await;

    assert_eq!(disposition, Disposition::Failed(CommandKind::Update));
    assert!(texts.contains(&"Performing backup for 'Foo' (before update)...".to_string()));
    assert_eq!(texts.last().unwrap(), ":x: Backup failed. Update aborted for 'Foo'.");
    assert!(!texts.iter().any(|t| t.starts_with("Running update command")));
}

#[tokio::test]
async fn test_update_aborts_when_launch_fails() {
    let mut fixture = Fixture::new(&["Foo"]);
    fixture.server_mut("Foo").update_command = String::new();

    let mut controller = MockController::new();
    controller
        .expect_stop()
        .times(1)
        .returning(|_| Ok(StopOutcome::Stopped { count: 1 }));
    controller.expect_start().never();

    let router = fixture.router(Arc::new(controller));
    let (disposition, texts) = run(&router, "!sm update Foo").await;

    assert_eq!(disposition, Disposition::Failed(CommandKind::Update));
    assert_eq!(fixture.archives().len(), 1);
    assert!(
        texts
            .last()
            .unwrap()
            .starts_with(":x: Failed to update server 'Foo': Failed to start update process:")
    );
}

#[cfg(unix)]
#[tokio::test]
async fn test_update_with_nonzero_exit_still_restarts() {
    let mut fixture = Fixture::new(&["Foo"]);
    fixture.server_mut("Foo").update_command = "echo downloading; echo patch failed 1>&2; exit 3".to_string();

    let mut controller = MockController::new();
    controller
        .expect_stop()
        .times(1)
        .returning(|_| Ok(StopOutcome::Stopped { count: 1 }));
    controller.expect_start().times(1).returning(|_| Ok(1001));

    let router = fixture.router(Arc::new(controller));
    let (disposition, texts) = run(&router, "!sm update Foo").await;

    assert_eq!(disposition, Disposition::Completed(CommandKind::Update));
    let output = texts
        .iter()
        .find(|t| t.starts_with("Update output for 'Foo':"))
        .expect("update output message");
    assert!(output.contains("> downloading"));
    assert!(output.contains("> patch failed"));
    assert!(texts.contains(&"Update command completed for 'Foo' (exit code 3).".to_string()));
    assert_eq!(texts.last().unwrap(), "Start command executed for 'Foo'.");
}

#[cfg(unix)]
#[tokio::test]
async fn test_update_timeout_skips_restart() {
    let mut fixture = Fixture::new(&["Foo"]);
    fixture.update_timeout = Duration::from_millis(300);
    fixture.server_mut("Foo").update_command = "echo fetching; sleep 30; echo done".to_string();

    let mut controller = MockController::new();
    controller
        .expect_stop()
        .times(1)
        .returning(|_| Ok(StopOutcome::Stopped { count: 1 }));
    controller.expect_start().never();

    let router = fixture.router(Arc::new(controller));
    let (disposition, texts) = run(&router, "!sm update Foo").await;

    assert_eq!(disposition, Disposition::Failed(CommandKind::Update));
    assert_eq!(fixture.archives().len(), 1);
    let last = texts.last().unwrap();
    assert!(
        last.starts_with(":x: Failed to update server 'Foo': Update timed out:"),
        "{}",
        last
    );
    assert!(!texts.iter().any(|t| t.starts_with("Starting 'Foo'")));
}

#[cfg(unix)]
#[tokio::test]
async fn test_update_of_stopped_server_does_not_restart() {
    let fixture = Fixture::new(&["Foo"]);
    let mut controller = MockController::new();
    controller
        .expect_stop()
        .times(1)
        .returning(|_| Ok(StopOutcome::NotRunning));
    controller.expect_start().never();

    let router = fixture.router(Arc::new(controller));
    let (disposition, texts) = run(&router, "!sm update Foo").await;

    assert_eq!(disposition, Disposition::Completed(CommandKind::Update));
    assert_eq!(texts.last().unwrap(), "Update command completed for 'Foo'.");
}

#[tokio::test]
async fn test_stop_updates_running_set() {
    let fixture = Fixture::new(&["Foo"]);
    fixture.running_set.mark_started("Foo").unwrap();

    let mut controller = MockController::new();
    controller
        .expect_stop()
        .times(1)
        .returning(|_| Ok(StopOutcome::Stopped { count: 1 }));

    let router = fixture.router(Arc::new(controller));
    let (disposition, texts) = run(&router, "!sm stop Foo").await;

    assert_eq!(disposition, Disposition::Completed(CommandKind::Stop));
    assert_eq!(texts, vec!["Stopping 'Foo'...", "Stopped 1 process(es) for 'Foo'."]);
    assert!(!fixture.running_set.contains("Foo").unwrap());
}

#[tokio::test]
async fn test_start_of_running_server_is_a_no_op() {
    let fixture = Fixture::new(&["Foo"]);
    let mut controller = MockController::new();
    controller
        .expect_is_running()
        .times(1)
        .returning(|_| Ok(ProcessSnapshot::from_pids(BTreeSet::from([10]))));
    controller.expect_start().never();

    let router = fixture.router(Arc::new(controller));
    let (disposition, texts) = run(&router, "!sm start Foo").await;

    assert_eq!(disposition, Disposition::Completed(CommandKind::Start));
    assert_eq!(texts, vec!["'Foo' is already running."]);
    assert!(fixture.running_set.contains("Foo").unwrap());
}

#[tokio::test]
async fn test_status_reports_every_server() {
    let fixture = Fixture::new(&["Alpha", "Beta"]);
    let mut controller = MockController::new();
    controller.expect_is_running().times(2).returning(|server| {
        if server.name == "Alpha" {
            Ok(ProcessSnapshot::from_pids(BTreeSet::from([1, 2])))
        } else {
            Ok(ProcessSnapshot::default())
        }
    });
    controller.expect_sample_usage().times(1).returning(|pids, _| {
        assert_eq!(pids.len(), 2);
        Ok(ResourceUsage {
            memory_bytes: 2048,
            cpu_percent: 7.31,
        })
    });

    let router = fixture.router(Arc::new(controller));
    let (disposition, texts) = run(&router, "!sm status").await;

    assert_eq!(disposition, Disposition::Completed(CommandKind::Status));
    assert_eq!(
        texts,
        vec!["Server status:\n- Alpha: running | RAM: 2.00 KB | CPU: 7.3%\n- Beta: stopped"]
    );
}

#[tokio::test]
async fn test_invalid_commands_get_one_reply_and_no_dispatch() {
    let fixture = Fixture::new(&["Foo"]);
    let mut controller = MockController::new();
    controller.expect_stop().never();
    controller.expect_start().never();
    controller.expect_is_running().never();
    let router = fixture.router(Arc::new(controller));

    let (disposition, texts) = run(&router, "!sm stop Bar").await;
    assert_eq!(disposition, Disposition::Rejected);
    assert_eq!(texts, vec![":x: No server found with name 'Bar'."]);

    let (disposition, texts) = run(&router, "!sm stop").await;
    assert_eq!(disposition, Disposition::Rejected);
    assert_eq!(texts, vec![":x: The 'stop' command requires a server name."]);

    let (disposition, texts) = run(&router, "!sm reboot Foo").await;
    assert_eq!(disposition, Disposition::Help);
    assert_eq!(texts.len(), 1);

    let (disposition, texts) = run(&router, "good morning").await;
    assert_eq!(disposition, Disposition::Ignored);
    assert!(texts.is_empty());
}
