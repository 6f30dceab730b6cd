//! Broadcast of rendered chat messages to SSE subscribers.

use crate::channel::MessageHandle;
use actix_web::web::Bytes;
use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;

/// Payload of `message` and `message-edit` events.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MessagePayload {
    /// Message identifier, stable across edits
    pub id: String,
    /// Full current text
    pub text: String,
}

/// One Server-Sent Event.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SseMessage {
    /// Event type
    pub event: String,
    /// Event data as a single-line JSON string
    pub data: String,
    /// Optional event ID
    pub id: Option<String>,
}

/// Fans rendered messages out to every connected SSE client.
#[derive(Clone)]
pub struct EventManager {
    sender: broadcast::Sender<SseMessage>,
}

impl EventManager {
    /// Creates a manager buffering up to `capacity` events per slow subscriber.
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity.max(1));
        Self { sender }
    }

    /// Subscribes to future events.
    pub fn subscribe(&self) -> broadcast::Receiver<SseMessage> {
        self.sender.subscribe()
    }

    /// Announces a newly posted message.
    pub fn send_message(&self, handle: MessageHandle, text: &str) {
        self.publish("message", handle, text);
    }

    /// Announces an edit of a previously posted message.
    pub fn send_edit(&self, handle: MessageHandle, text: &str) {
        self.publish("message-edit", handle, text);
    }

    fn publish(&self, event: &str, handle: MessageHandle, text: &str) {
        let payload = MessagePayload {
            id: handle.to_string(),
            text: text.to_string(),
        };
        let data = match serde_json::to_string(&payload) {
            Ok(data) => data,
            Err(e) => {
                tracing::error!(error = %e, event_type = event, "Failed to serialize SSE event payload");
                return;
            }
        };
        let message = SseMessage {
            event: event.to_string(),
            data,
            id: Some(payload.id),
        };

        match self.sender.send(message) {
            Ok(receivers) => {
                tracing::debug!(event_type = event, receivers, "SSE event sent to clients");
            }
            Err(_) => {
                tracing::trace!(event_type = event, "SSE event created but no clients connected");
            }
        }
    }

    /// Formats an event for the wire.
    pub fn format_sse_message(message: &SseMessage) -> Bytes {
        let mut result = String::new();
        if let Some(id) = &message.id {
            result.push_str(&format!("id: {}\n", id));
        }
        result.push_str(&format!("event: {}\n", message.event));
        result.push_str(&format!("data: {}\n\n", message.data));
        Bytes::from(result)
    }
}
