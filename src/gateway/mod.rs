//! HTTP command gateway built on Actix Web.
//!
//! The gateway is the manager's chat transport. Clients post chat messages to
//! `POST /commands` and receive the rendered transcript in the response, while
//! `GET /events` streams every message and edit, from any command, as
//! Server-Sent Events. `GET /servers` lists the roster.
//!
//! Requests may be gated by a bearer token, and CORS is permissive so browser
//! dashboards can subscribe directly.

pub use self::channel::GatewayChannel;
pub use self::events::{EventManager, MessagePayload, SseMessage};
pub use self::handlers::{CommandResponse, GatewayState, ServerSummary, TranscriptEntry};
pub use self::server::{GatewayHandle, start_gateway};

pub mod actix_error;
pub mod auth;
mod channel;
pub mod events;
pub mod handlers;
mod server;
