use crate::channel::{ChatChannel, MessageHandle};
use crate::command::CommandKind;
use crate::error::Error;
use std::collections::VecDeque;
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

/// Longest text rendered into one message; stays under common chat limits.
pub const MAX_MESSAGE_CHARS: usize = 1900;

/// Prefix marking a failure line.
pub const ERROR_MARKER: &str = ":x:";

/// One command's execution and its progress log.
///
/// Every report is appended to the log and sent to the channel. Transport
/// failures are logged and otherwise ignored: a chat hiccup must not abort a
/// half-finished stop/backup/start sequence.
pub struct Operation {
    kind: CommandKind,
    target: Option<String>,
    channel: Arc<dyn ChatChannel>,
    log: Vec<String>,
    failed: bool,
}

impl Operation {
    /// Starts tracking a command against `target` (`None` for the whole roster).
    pub fn new(kind: CommandKind, target: Option<String>, channel: Arc<dyn ChatChannel>) -> Self {
        Self {
            kind,
            target,
            channel,
            log: Vec::new(),
            failed: false,
        }
    }

    /// The channel progress is rendered to.
    pub fn channel(&self) -> &Arc<dyn ChatChannel> {
        &self.channel
    }

    /// Everything reported so far.
    pub fn progress(&self) -> &[String] {
        &self.log
    }

    /// Whether a failure has been reported.
    pub fn has_failed(&self) -> bool {
        self.failed
    }

    /// Sends a progress line.
    pub async fn report(&mut self, text: impl Into<String>) -> Option<MessageHandle> {
        let text = text.into();
        tracing::info!(command = %self.kind, server = ?self.target, "{}", text);
        let handle = match self.channel.send(&text).await {
            Ok(handle) => Some(handle),
            Err(e) => {
                tracing::warn!(error = %e, "Failed to deliver progress message");
                None
            }
        };
        self.log.push(text);
        handle
    }

    /// Sends a failure line and records that the operation failed.
    ///
    /// The underlying error, when given, is logged with full detail.
    pub async fn report_error(&mut self, text: impl Into<String>, error: Option<&Error>) {
        let text = text.into();
        match error {
            Some(e) => tracing::error!(command = %self.kind, server = ?self.target, error = %e, "{}", text),
            None => tracing::warn!(command = %self.kind, server = ?self.target, "{}", text),
        }
        self.failed = true;
        let line = format!("{} {}", ERROR_MARKER, text);
        if let Err(e) = self.channel.send(&line).await {
            tracing::warn!(error = %e, "Failed to deliver error message");
        }
        self.log.push(line);
    }
}

/// Rolling window over the most recent output lines.
#[derive(Debug, Clone)]
pub struct OutputWindow {
    capacity: usize,
    lines: VecDeque<String>,
    total: usize,
}

impl OutputWindow {
    /// Keeps the last `capacity` lines.
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            capacity,
            lines: VecDeque::with_capacity(capacity),
            total: 0,
        }
    }

    /// Adds a line, evicting the oldest one when full.
    pub fn push(&mut self, line: String) {
        if self.lines.len() == self.capacity {
            self.lines.pop_front();
        }
        self.lines.push_back(line);
        self.total += 1;
    }

    /// Lines currently in the window, oldest first.
    pub fn lines(&self) -> impl Iterator<Item = &str> {
        self.lines.iter().map(String::as_str)
    }

    /// Number of lines ever pushed.
    pub fn total(&self) -> usize {
        self.total
    }

    /// Renders the window under `title`, quoting each line.
    ///
    /// Oldest lines are dropped until the text fits [`MAX_MESSAGE_CHARS`].
    pub fn render(&self, title: &str) -> String {
        let mut quoted: VecDeque<String> = self.lines.iter().map(|l| format!("> {}", l)).collect();
        let hidden = self.total - self.lines.len();
        loop {
            let header = if hidden + (self.lines.len() - quoted.len()) > 0 {
                format!(
                    "{} (last {} of {} lines)",
                    title,
                    quoted.len(),
                    self.total
                )
            } else {
                title.to_string()
            };
            let text = std::iter::once(header)
                .chain(quoted.iter().cloned())
                .collect::<Vec<_>>()
                .join("\n");
            if text.chars().count() <= MAX_MESSAGE_CHARS || quoted.len() <= 1 {
                return clip(text);
            }
            quoted.pop_front();
        }
    }
}

fn clip(text: String) -> String {
    if text.chars().count() <= MAX_MESSAGE_CHARS {
        return text;
    }
    let mut clipped: String = text.chars().take(MAX_MESSAGE_CHARS - 1).collect();
    clipped.push('…');
    clipped
}

/// Spawns the renderer that turns queued output lines into one live message.
///
/// The first line posts the message; later lines edit it in place. The task
/// ends when every sender for `lines` is dropped and returns how many lines it
/// rendered.
pub fn spawn_output_renderer(
    channel: Arc<dyn ChatChannel>,
    title: String,
    capacity: usize,
    mut lines: mpsc::Receiver<String>,
) -> JoinHandle<usize> {
    tokio::spawn(async move {
        let mut window = OutputWindow::new(capacity);
        let mut handle: Option<MessageHandle> = None;
        while let Some(line) = lines.recv().await {
            window.push(line);
            let text = window.render(&title);
            let delivered = match handle {
                Some(existing) => channel.edit(existing, &text).await,
                None => channel.send(&text).await.map(|new| {
                    handle = Some(new);
                }),
            };
            if let Err(e) = delivered {
                tracing::warn!(error = %e, "Failed to render update output");
            }
        }
        window.total()
    })
}
