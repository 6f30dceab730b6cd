//! The narrow interface between command handling and the chat transport.
//!
//! Command handling only ever posts a message or edits one it posted before.
//! Any transport that can do those two things can carry the manager: the HTTP
//! gateway implements this trait, and [`RecordingChannel`] implements it in
//! memory for tests.

use crate::error::{Error, Result};
use async_trait::async_trait;
use std::fmt;
use std::sync::Mutex;
use uuid::Uuid;

/// Identifies a message posted through a [`ChatChannel`] so it can be edited.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct MessageHandle(Uuid);

impl MessageHandle {
    /// Creates a fresh, unique handle.
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for MessageHandle {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for MessageHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// A place status updates are rendered to.
#[async_trait]
pub trait ChatChannel: Send + Sync {
    /// Posts a new message and returns a handle for later edits.
    async fn send(&self, text: &str) -> Result<MessageHandle>;

    /// Replaces the text of a previously posted message.
    async fn edit(&self, handle: MessageHandle, text: &str) -> Result<()>;
}

/// One message as last rendered.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecordedMessage {
    /// Handle returned when the message was sent
    pub handle: MessageHandle,
    /// Current text, including any edits
    pub text: String,
    /// Number of times the message was edited
    pub edits: usize,
}

/// In-memory [`ChatChannel`] that keeps the rendered transcript.
#[derive(Debug, Default)]
pub struct RecordingChannel {
    messages: Mutex<Vec<RecordedMessage>>,
}

impl RecordingChannel {
    /// Creates an empty channel.
    pub fn new() -> Self {
        Self::default()
    }

    /// Every message in the order it was sent.
    pub fn messages(&self) -> Vec<RecordedMessage> {
        self.messages
            .lock()
            .map(|messages| messages.clone())
            .unwrap_or_default()
    }

    /// The current text of every message in the order it was sent.
    pub fn texts(&self) -> Vec<String> {
        self.messages().into_iter().map(|m| m.text).collect()
    }

    /// Whether any message contains `needle`.
    pub fn contains(&self, needle: &str) -> bool {
        self.messages().iter().any(|m| m.text.contains(needle))
    }
}

#[async_trait]
impl ChatChannel for RecordingChannel {
    async fn send(&self, text: &str) -> Result<MessageHandle> {
        let handle = MessageHandle::new();
        let mut messages = self
            .messages
            .lock()
            .map_err(|_| Error::Transport("Failed to lock transcript".to_string()))?;
        messages.push(RecordedMessage {
            handle,
            text: text.to_string(),
            edits: 0,
        });
        Ok(handle)
    }

    async fn edit(&self, handle: MessageHandle, text: &str) -> Result<()> {
        let mut messages = self
            .messages
            .lock()
            .map_err(|_| Error::Transport("Failed to lock transcript".to_string()))?;
        let message = messages
            .iter_mut()
            .find(|m| m.handle == handle)
            .ok_or_else(|| Error::Transport(format!("Unknown message {}", handle)))?;
        message.text = text.to_string();
        message.edits += 1;
        Ok(())
    }
}
