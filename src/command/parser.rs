use crate::config::ServerDescriptor;
use crate::error::Error;
use crate::server::ServerRegistry;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;

/// The five lifecycle commands.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CommandKind {
    /// Report running state and resource usage
    Status,
    /// Kill the server's processes
    Stop,
    /// Launch the server's start command
    Start,
    /// Stop, archive the save directory, restart if it was running
    Backup,
    /// Stop, back up, run the update command, restart if it was running
    Update,
}

impl CommandKind {
    /// Every command, in help-text order.
    pub const ALL: [CommandKind; 5] = [
        CommandKind::Status,
        CommandKind::Stop,
        CommandKind::Start,
        CommandKind::Backup,
        CommandKind::Update,
    ];

    /// Matches an already lower-cased command token.
    pub fn from_token(token: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|kind| kind.as_str() == token)
    }

    /// The command's token.
    pub fn as_str(&self) -> &'static str {
        match self {
            CommandKind::Status => "status",
            CommandKind::Stop => "stop",
            CommandKind::Start => "start",
            CommandKind::Backup => "backup",
            CommandKind::Update => "update",
        }
    }

    /// Whether the command must name a server.
    pub fn requires_server(&self) -> bool {
        !matches!(self, CommandKind::Status)
    }
}

impl fmt::Display for CommandKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A chat message as delivered by the transport.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InboundMessage {
    /// Display name of the sender
    pub author: String,
    /// Whether the sender is a bot, including the manager itself
    #[serde(default)]
    pub bot: bool,
    /// Raw message text
    pub content: String,
}

impl InboundMessage {
    /// A message from a human author.
    pub fn new(author: impl Into<String>, content: impl Into<String>) -> Self {
        Self {
            author: author.into(),
            bot: false,
            content: content.into(),
        }
    }
}

/// What a command applies to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Target {
    /// Every server in the roster
    Roster,
    /// One resolved server
    Server(Arc<ServerDescriptor>),
}

/// A validated command ready for dispatch.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Command {
    /// Which command
    pub kind: CommandKind,
    /// What it applies to
    pub target: Target,
}

/// The routing decision for one inbound message.
#[derive(Debug)]
pub enum Route {
    /// Not addressed to the manager, or sent by a bot.
    Ignored,
    /// Prefix matched but the command did not; answer with the help text.
    Help {
        /// The unrecognized command token (may be empty)
        command: String,
    },
    /// The command was recognized but cannot be dispatched.
    Rejected(Error),
    /// A valid command.
    Dispatch(Command),
}

/// Splits `content` into prefix, command and the remainder of the line.
///
/// Tokens are separated by whitespace; the third part is everything after the
/// command, trimmed, so server names may contain spaces.
pub fn split_command(content: &str) -> (&str, &str, &str) {
    fn next_token(s: &str) -> (&str, &str) {
        let s = s.trim_start();
        match s.find(char::is_whitespace) {
            Some(end) => (&s[..end], s[end..].trim_start()),
            None => (s, ""),
        }
    }

    let (prefix, rest) = next_token(content);
    let (command, rest) = next_token(rest);
    (prefix, command, rest.trim_end())
}

/// The reply to an unrecognized command.
pub fn help_text(command: &str) -> String {
    let available = CommandKind::ALL
        .iter()
        .map(|kind| kind.as_str())
        .collect::<Vec<_>>()
        .join(", ");
    format!("Unknown command: {}\nAvailable commands: {}", command, available)
}

/// Turns raw message text into a [`Route`].
#[derive(Debug, Clone)]
pub struct CommandParser {
    prefix: String,
}

impl CommandParser {
    /// Creates a parser for commands introduced by `prefix`.
    pub fn new(prefix: impl Into<String>) -> Self {
        Self {
            prefix: prefix.into(),
        }
    }

    /// Routes one message against the roster.
    pub fn route(&self, message: &InboundMessage, registry: &ServerRegistry) -> Route {
        if message.bot {
            return Route::Ignored;
        }

        let (prefix, command, server_name) = split_command(&message.content);
        if prefix.to_lowercase() != self.prefix.to_lowercase() {
            return Route::Ignored;
        }

        let command = command.to_lowercase();
        let Some(kind) = CommandKind::from_token(&command) else {
            return Route::Help { command };
        };

        if server_name.is_empty() {
            if kind.requires_server() {
                return Route::Rejected(Error::MissingServerArgument(kind.to_string()));
            }
            return Route::Dispatch(Command {
                kind,
                target: Target::Roster,
            });
        }

        match registry.resolve(server_name) {
            Ok(server) => Route::Dispatch(Command {
                kind,
                target: Target::Server(server),
            }),
            Err(e) => Route::Rejected(e),
        }
    }
}
