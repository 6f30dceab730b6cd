use super::support::{Fixture, MockController};
use game_server_manager::error::Error;
use game_server_manager::server::ProcessSnapshot;
use game_server_manager::{RunningSetStore, ServerManager};
use std::collections::BTreeSet;
use std::sync::Arc;

fn running() -> ProcessSnapshot {
    ProcessSnapshot::from_pids(BTreeSet::from([500]))
}

#[tokio::test]
async fn test_boot_restarts_persisted_servers() {
    let fixture = Fixture::new(&["Alpha", "Beta", "Gamma"]);
    fixture.running_set.mark_started("Alpha").unwrap();
    fixture.running_set.mark_started("Beta").unwrap();
    let mut config = fixture.config();
    config.auto_restart_servers_on_boot = true;

    let mut controller = MockController::new();
    // Alpha is down and gets restarted, Beta is already up, Gamma was never
    // persisted but is found running.
    controller.expect_is_running().returning(|server| match server.name.as_str() {
        "Alpha" => Ok(ProcessSnapshot::default()),
        _ => Ok(running()),
    });
    controller
        .expect_start()
        .times(1)
        .withf(|server| server.name == "Alpha")
        .returning(|_| Ok(9000));

    let manager = ServerManager::with_controller(config, Arc::new(controller)).unwrap();
    let report = manager.restore_on_boot().await.unwrap();

    assert_eq!(report.restarted, vec!["Alpha"]);
    assert!(report.failed.is_empty());
    assert_eq!(report.reconciled, vec!["Beta", "Gamma"]);

    let reopened = RunningSetStore::open(fixture.dir.path().join("running.json")).unwrap();
    assert_eq!(
        reopened.snapshot().unwrap(),
        BTreeSet::from(["Alpha".to_string(), "Beta".to_string(), "Gamma".to_string()])
    );
}

#[tokio::test]
async fn test_boot_failure_is_reported_and_server_marked_stopped() {
    let mut fixture = Fixture::new(&["Alpha"]);
    fixture.server_mut("Alpha").start_command = String::new();
    fixture.running_set.mark_started("Alpha").unwrap();
    let mut config = fixture.config();
    config.auto_restart_servers_on_boot = true;

    let mut controller = MockController::new();
    controller
        .expect_is_running()
        .returning(|_| Ok(ProcessSnapshot::default()));
    controller
        .expect_start()
        .times(1)
        .returning(|server| Err(Error::StartCommandMissing(server.name.clone())));

    let manager = ServerManager::with_controller(config, Arc::new(controller)).unwrap();
    let report = manager.restore_on_boot().await.unwrap();

    assert!(report.restarted.is_empty());
    assert_eq!(report.failed.len(), 1);
    assert_eq!(report.failed[0].0, "Alpha");
    assert!(!manager.running_set().contains("Alpha").unwrap());
}

#[tokio::test]
async fn test_boot_without_auto_restart_only_reconciles() {
    let fixture = Fixture::new(&["Alpha", "Beta"]);
    fixture.running_set.mark_started("Alpha").unwrap();

    let mut controller = MockController::new();
    controller.expect_start().never();
    controller.expect_is_running().returning(|server| {
        if server.name == "Beta" {
            Ok(running())
        } else {
            Ok(ProcessSnapshot::default())
        }
    });

    let manager = ServerManager::with_controller(fixture.config(), Arc::new(controller)).unwrap();
    let report = manager.restore_on_boot().await.unwrap();

    assert!(report.restarted.is_empty());
    assert_eq!(report.reconciled, vec!["Beta"]);
    assert_eq!(
        manager.running_set().snapshot().unwrap(),
        BTreeSet::from(["Beta".to_string()])
    );
}
