//! Chat command handling.
//!
//! This module turns chat messages into lifecycle operations:
//!
//! - Parsing the control token, command word and server name
//! - Routing validated commands to the stop/start/backup/update sequences
//! - Rendering progress and status reports back to the channel

mod parser;
mod progress;
mod router;
mod status;

pub use parser::{Command, CommandKind, CommandParser, InboundMessage, Route, Target, help_text, split_command};
pub use progress::{ERROR_MARKER, MAX_MESSAGE_CHARS, Operation, OutputWindow, spawn_output_renderer};
pub use router::{CommandRouter, Disposition};
pub use status::{ServerState, StatusLine, format_bytes, render_status_report};
