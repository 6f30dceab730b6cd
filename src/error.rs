/// Error handling module for the game server manager.
///
/// This module defines the error types used throughout the library.
/// Every engine-level failure is caught at the operation boundary and turned
/// into a user-facing status line, so none of these errors ever terminates the
/// manager once it is serving commands. Only configuration errors are fatal,
/// and only at start-up.
///
/// # Example
///
/// ```
/// use game_server_manager::error::{Error, Result};
///
/// fn describe(result: Result<()>) -> String {
///     match result {
///         Ok(_) => "done".to_string(),
///         Err(Error::ServerNotFound(name)) => format!("no server called '{}'", name),
///         Err(Error::Backup(msg)) => format!("backup failed: {}", msg),
///         Err(e) => format!("other error: {}", e),
///     }
/// }
/// ```
use thiserror::Error;

/// Errors that can occur in the game-server-manager library.
///
/// Each variant corresponds to one class of failure with its own handling
/// policy: configuration errors block start-up, user input errors are reported
/// back without state change, and process/backup/update failures abort the
/// remainder of the current operation.
#[derive(Error, Debug)]
pub enum Error {
    /// Failed to read or parse configuration from a file or string.
    ///
    /// This error occurs when:
    /// - The configuration file cannot be read
    /// - The JSON or YAML is malformed
    /// - Field types are incorrect
    #[error("Failed to parse configuration: {0}")]
    ConfigParse(String),

    /// Configuration is well-formed but cannot be used.
    #[error("Invalid configuration: {0}")]
    ConfigInvalid(String),

    /// Configuration failed validation.
    ///
    /// Carries every problem found, not just the first, so an operator can fix
    /// the whole file in one pass.
    #[error("Config validation failed: {}", .0.join("; "))]
    ConfigValidation(Vec<String>),

    /// Requested server was not found in the roster.
    #[error("No server found with name '{0}'.")]
    ServerNotFound(String),

    /// A command that targets one server was sent without a server name.
    #[error("The '{0}' command requires a server name.")]
    MissingServerArgument(String),

    /// The server has no start command configured.
    #[error("Start command not configured for server '{0}'.")]
    StartCommandMissing(String),

    /// Killing or launching an OS process failed.
    ///
    /// This error occurs when:
    /// - A matched process could not be terminated
    /// - The start command could not be spawned
    /// - The process table could not be read
    #[error("Server process error: {0}")]
    Process(String),

    /// Archiving a server's save directory failed.
    #[error("Backup failed: {0}")]
    Backup(String),

    /// The update command could not be launched.
    #[error("Failed to start update process: {0}")]
    UpdateLaunch(String),

    /// The update command ran longer than the configured timeout and was killed.
    #[error("Update timed out: {0}")]
    UpdateTimeout(String),

    /// Reading or writing the persisted running-set failed.
    #[error("Running-set persistence error: {0}")]
    Persistence(String),

    /// Delivering a message through the chat transport failed.
    #[error("Transport error: {0}")]
    Transport(String),

    /// Unauthorized access to the command gateway.
    #[error("Unauthorized: {0}")]
    Unauthorized(String),

    /// Any other error not covered by the above categories.
    #[error("Other error: {0}")]
    Other(String),
}

/// Result type for game-server-manager operations.
pub type Result<T> = std::result::Result<T, Error>;
