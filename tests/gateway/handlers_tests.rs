use actix_web::{App, http::StatusCode, test, web};
use game_server_manager::backup::BackupEngine;
use game_server_manager::command::CommandRouter;
use game_server_manager::config::{ProcessMatchMode, ServerDescriptor};
use game_server_manager::gateway::handlers::{self, GatewayState};
use game_server_manager::gateway::{CommandResponse, EventManager, ServerSummary};
use game_server_manager::server::{ServerRegistry, SystemProcessController};
use game_server_manager::update::UpdateEngine;
use game_server_manager::{OperationTracker, RunningSetStore};
use serde_json::json;
use std::sync::Arc;
use std::time::Duration;

struct TestContext {
    _dir: tempfile::TempDir,
    state: GatewayState,
}

fn create_test_context() -> TestContext {
    let dir = tempfile::tempdir().unwrap();
    let backups = dir.path().join("backups");
    std::fs::create_dir_all(&backups).unwrap();

    let servers = ["Valheim", "Factorio"]
        .iter()
        .map(|name| {
            let save = dir.path().join(name).join("save");
            std::fs::create_dir_all(&save).unwrap();
            ServerDescriptor {
                name: name.to_string(),
                install_location: dir.path().join(name),
                save_directory: save,
                start_command: String::new(),
                update_command: String::new(),
                executable_name: format!("gsm-gateway-test-{}", name.to_lowercase()),
            }
        })
        .collect();

    let registry = Arc::new(ServerRegistry::new(servers).unwrap());
    let running_set = Arc::new(RunningSetStore::open(dir.path().join("running.json")).unwrap());
    running_set.mark_started("factorio").unwrap();

    let router = CommandRouter::new(
        registry,
        Arc::new(SystemProcessController::new(ProcessMatchMode::ImageName)),
        Arc::clone(&running_set),
        BackupEngine::new(backups),
        UpdateEngine::new(Duration::from_secs(5)),
    );

    TestContext {
        _dir: dir,
        state: GatewayState {
            router: Arc::new(router),
            tracker: OperationTracker::new(),
            running_set,
            events: Arc::new(EventManager::new(16)),
        },
    }
}

#[actix_web::test]
async fn test_post_command_returns_transcript() {
    let context = create_test_context();
    let mut events = context.state.events.subscribe();
    let app = test::init_service(
        App::new()
            .app_data(web::Data::new(context.state.clone()))
            .configure(handlers::configure),
    )
    .await;

    let req = test::TestRequest::post()
        .uri("/commands")
        .set_json(json!({ "author": "alice", "content": "!sm start valheim" }))
        .to_request();
    let body: CommandResponse = test::call_and_read_body_json(&app, req).await;

    assert_eq!(body.disposition, "failed");
    assert_eq!(body.command.as_deref(), Some("start"));
    assert_eq!(body.messages.len(), 1);
    assert_eq!(
        body.messages[0].text,
        ":x: Start command not configured for server 'Valheim'."
    );

    let event = events.recv().await.unwrap();
    assert_eq!(event.event, "message");
    assert_eq!(event.id.as_deref(), Some(body.messages[0].id.as_str()));
}

#[actix_web::test]
async fn test_post_command_reports_unknown_server() {
    let context = create_test_context();
    let app = test::init_service(
        App::new()
            .app_data(web::Data::new(context.state.clone()))
            .configure(handlers::configure),
    )
    .await;

    let req = test::TestRequest::post()
        .uri("/commands")
        .set_json(json!({ "author": "alice", "content": "!sm backup Minecraft" }))
        .to_request();
    let body: CommandResponse = test::call_and_read_body_json(&app, req).await;

    assert_eq!(body.disposition, "rejected");
    assert_eq!(body.command, None);
    assert_eq!(body.messages[0].text, ":x: No server found with name 'Minecraft'.");
}

#[actix_web::test]
async fn test_bot_messages_are_ignored() {
    let context = create_test_context();
    let app = test::init_service(
        App::new()
            .app_data(web::Data::new(context.state.clone()))
            .configure(handlers::configure),
    )
    .await;

    let req = test::TestRequest::post()
        .uri("/commands")
        .set_json(json!({ "author": "manager", "bot": true, "content": "!sm status" }))
        .to_request();
    let body: CommandResponse = test::call_and_read_body_json(&app, req).await;

    assert_eq!(body.disposition, "ignored");
    assert!(body.messages.is_empty());
}

#[actix_web::test]
async fn test_empty_content_is_a_bad_request() {
    let context = create_test_context();
    let app = test::init_service(
        App::new()
            .app_data(web::Data::new(context.state.clone()))
            .configure(handlers::configure),
    )
    .await;

    let req = test::TestRequest::post()
        .uri("/commands")
        .set_json(json!({ "author": "alice", "content": "   " }))
        .to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
}

#[actix_web::test]
async fn test_closed_intake_is_unavailable() {
    let context = create_test_context();
    context.state.tracker.close();
    let app = test::init_service(
        App::new()
            .app_data(web::Data::new(context.state.clone()))
            .configure(handlers::configure),
    )
    .await;

    let req = test::TestRequest::post()
        .uri("/commands")
        .set_json(json!({ "author": "alice", "content": "!sm status" }))
        .to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), StatusCode::SERVICE_UNAVAILABLE);
}

#[actix_web::test]
async fn test_list_servers_includes_running_set_membership() {
    let context = create_test_context();
    let app = test::init_service(
        App::new()
            .app_data(web::Data::new(context.state.clone()))
            .configure(handlers::configure),
    )
    .await;

    let req = test::TestRequest::get().uri("/servers").to_request();
    let servers: Vec<ServerSummary> = test::call_and_read_body_json(&app, req).await;

    assert_eq!(
        servers,
        vec![
            ServerSummary {
                name: "Valheim".to_string(),
                in_running_set: false,
            },
            ServerSummary {
                name: "Factorio".to_string(),
                in_running_set: true,
            },
        ]
    );
}

#[actix_web::test]
async fn test_events_endpoint_streams_sse() {
    let context = create_test_context();
    let app = test::init_service(
        App::new()
            .app_data(web::Data::new(context.state.clone()))
            .configure(handlers::configure),
    )
    .await;

    let req = test::TestRequest::get().uri("/events").to_request();
    let resp = test::call_service(&app, req).await;

    assert_eq!(resp.status(), StatusCode::OK);
    assert_eq!(
        resp.headers().get("Content-Type").unwrap(),
        "text/event-stream"
    );
}
