use crate::channel::{ChatChannel, MessageHandle, RecordedMessage, RecordingChannel};
use crate::error::Result;
use crate::gateway::events::EventManager;
use async_trait::async_trait;
use std::sync::Arc;

/// The channel for one HTTP-submitted command.
///
/// Keeps the command's own transcript for the HTTP response and mirrors every
/// send and edit to the SSE subscribers.
pub struct GatewayChannel {
    transcript: RecordingChannel,
    events: Arc<EventManager>,
}

impl GatewayChannel {
    /// Creates an empty channel broadcasting through `events`.
    pub fn new(events: Arc<EventManager>) -> Self {
        Self {
            transcript: RecordingChannel::new(),
            events,
        }
    }

    /// Messages rendered so far, in the order they were sent.
    pub fn transcript(&self) -> Vec<RecordedMessage> {
        self.transcript.messages()
    }
}

#[async_trait]
impl ChatChannel for GatewayChannel {
    async fn send(&self, text: &str) -> Result<MessageHandle> {
        let handle = self.transcript.send(text).await?;
        self.events.send_message(handle, text);
        Ok(handle)
    }

    async fn edit(&self, handle: MessageHandle, text: &str) -> Result<()> {
        self.transcript.edit(handle, text).await?;
        self.events.send_edit(handle, text);
        Ok(())
    }
}
