//! HTTP request handlers for the command gateway.
//!
//! - `POST /commands` runs one chat command and returns its transcript
//! - `GET /events` streams every rendered message as Server-Sent Events
//! - `GET /servers` lists the roster

use crate::channel::ChatChannel;
use crate::command::{CommandRouter, Disposition, InboundMessage};
use crate::gateway::actix_error::ApiError;
use crate::gateway::channel::GatewayChannel;
use crate::gateway::events::EventManager;
use crate::server::same_name;
use crate::service::OperationTracker;
use crate::state::RunningSetStore;

use actix_web::{HttpResponse, Responder, web};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tokio::sync::broadcast::error::RecvError;

/// Everything the handlers share.
#[derive(Clone)]
pub struct GatewayState {
    /// Executes commands
    pub router: Arc<CommandRouter>,
    /// Runs each command as its own task
    pub tracker: OperationTracker,
    /// Running-set membership for `/servers`
    pub running_set: Arc<RunningSetStore>,
    /// SSE fan-out
    pub events: Arc<EventManager>,
}

/// One rendered message in a command response.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TranscriptEntry {
    /// Message identifier, as used in SSE events
    pub id: String,
    /// Final text
    pub text: String,
    /// How many times the message was edited
    pub edits: usize,
}

/// Response body of `POST /commands`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CommandResponse {
    /// `ignored`, `help`, `rejected`, `completed` or `failed`
    pub disposition: String,
    /// The command, when one was recognized and run
    #[serde(skip_serializing_if = "Option::is_none")]
    pub command: Option<String>,
    /// Every message the command rendered
    pub messages: Vec<TranscriptEntry>,
}

/// One roster entry for `GET /servers`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ServerSummary {
    /// Server name
    pub name: String,
    /// Whether the manager last left this server running
    pub in_running_set: bool,
}

fn describe(disposition: Disposition) -> (&'static str, Option<String>) {
    match disposition {
        Disposition::Ignored => ("ignored", None),
        Disposition::Help => ("help", None),
        Disposition::Rejected => ("rejected", None),
        Disposition::Completed(kind) => ("completed", Some(kind.to_string())),
        Disposition::Failed(kind) => ("failed", Some(kind.to_string())),
    }
}

/// Registers the gateway routes.
pub fn configure(cfg: &mut web::ServiceConfig) {
    cfg.route("/commands", web::post().to(post_command))
        .route("/events", web::get().to(sse_events))
        .route("/servers", web::get().to(list_servers));
}

/// Runs one chat command and returns what it rendered.
pub async fn post_command(
    state: web::Data<GatewayState>,
    body: web::Json<InboundMessage>,
) -> Result<HttpResponse, ApiError> {
    let message = body.into_inner();
    if message.content.trim().is_empty() {
        return Err(ApiError::InvalidRequest("content must not be empty".to_string()));
    }
    tracing::debug!(author = %message.author, content = %message.content, "Command received over HTTP");

    let channel = Arc::new(GatewayChannel::new(Arc::clone(&state.events)));
    let router = Arc::clone(&state.router);
    let task_channel: Arc<dyn ChatChannel> = channel.clone();
    let done = state
        .tracker
        .spawn(async move { router.handle(&message, task_channel).await })
        .await
        .map_err(|e| ApiError::Unavailable(e.to_string()))?;
    let disposition = done
        .await
        .map_err(|_| ApiError::Unavailable("The command was cancelled".to_string()))?;

    let (disposition, command) = describe(disposition);
    let messages = channel
        .transcript()
        .into_iter()
        .map(|m| TranscriptEntry {
            id: m.handle.to_string(),
            text: m.text,
            edits: m.edits,
        })
        .collect();

    Ok(HttpResponse::Ok().json(CommandResponse {
        disposition: disposition.to_string(),
        command,
        messages,
    }))
}

/// Streams every rendered message to the client.
pub async fn sse_events(state: web::Data<GatewayState>) -> impl Responder {
    let mut receiver = state.events.subscribe();
    tracing::debug!("Client subscribed to events");

    let stream = async_stream::stream! {
        loop {
            match receiver.recv().await {
                Ok(msg) => {
                    yield Ok::<_, actix_web::Error>(EventManager::format_sse_message(&msg));
                }
                Err(RecvError::Lagged(skipped)) => {
                    tracing::warn!(skipped, "SSE client fell behind; events dropped");
                }
                Err(RecvError::Closed) => break,
            }
        }
    };

    HttpResponse::Ok()
        .append_header(("Content-Type", "text/event-stream"))
        .append_header(("Cache-Control", "no-cache"))
        .append_header(("Connection", "keep-alive"))
        .streaming(stream)
}

/// Lists the roster with running-set membership.
pub async fn list_servers(state: web::Data<GatewayState>) -> Result<HttpResponse, ApiError> {
    let running = state.running_set.snapshot()?;
    let servers: Vec<ServerSummary> = state
        .router
        .registry()
        .servers()
        .iter()
        .map(|server| ServerSummary {
            name: server.name.clone(),
            in_running_set: running.iter().any(|n| same_name(n, &server.name)),
        })
        .collect();
    Ok(HttpResponse::Ok().json(servers))
}
