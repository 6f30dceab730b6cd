//! Configuration module for the game server manager.
//!
//! This module handles parsing and validation of the manager's configuration:
//! the server roster, the backup location, the running-set file and the
//! optional HTTP command gateway. Configurations load from JSON or YAML files.
//!
//! # Examples
//!
//! Loading and validating a configuration:
//!
//! ```no_run
//! use game_server_manager::config::{Config, validate_config};
//!
//! let config = Config::from_file("config.json").unwrap();
//! validate_config(&config).unwrap();
//! println!("Managing {} servers", config.servers.len());
//! ```
mod parser;
pub mod validator;

pub use parser::{
    AuthConfig, BearerAuthConfig, Config, DEFAULT_COMMAND_PREFIX, DEFAULT_STATE_FILE,
    DEFAULT_WORKERS, GatewayConfig, ProcessMatchMode, ServerDescriptor,
};
pub use validator::validate_config;
