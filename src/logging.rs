//! Logging setup with a console layer and a daily-rotated log file.

use crate::error::{Error, Result};
use std::path::PathBuf;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_appender::rolling::{RollingFileAppender, Rotation};
use tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt};

/// Where and how the manager logs.
#[derive(Debug, Clone)]
pub struct LoggingOptions {
    /// Directory for the rotated log files
    pub directory: PathBuf,
    /// Log file name prefix; the date is appended per rotation
    pub file_prefix: String,
    /// Filter used when `RUST_LOG` is not set
    pub default_filter: String,
    /// Rotated files kept on disk
    pub max_files: usize,
}

impl Default for LoggingOptions {
    fn default() -> Self {
        Self {
            directory: PathBuf::from("logging"),
            file_prefix: "game-server-manager.log".to_string(),
            default_filter: "info".to_string(),
            max_files: 14,
        }
    }
}

/// Installs the global subscriber.
///
/// Keep the returned guard alive for the life of the process; dropping it
/// flushes and stops the background file writer.
///
/// # Errors
///
/// Fails when the log directory cannot be created or a global subscriber is
/// already installed.
pub fn init_logging(options: LoggingOptions) -> Result<WorkerGuard> {
    std::fs::create_dir_all(&options.directory).map_err(|e| {
        Error::Other(format!(
            "Failed to create log directory {}: {}",
            options.directory.display(),
            e
        ))
    })?;

    let appender = RollingFileAppender::builder()
        .rotation(Rotation::DAILY)
        .max_log_files(options.max_files.max(1))
        .filename_prefix(&options.file_prefix)
        .build(&options.directory)
        .map_err(|e| Error::Other(format!("Failed to open log file: {}", e)))?;
    let (writer, guard) = tracing_appender::non_blocking(appender);

    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(&options.default_filter));

    tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().with_target(true))
        .with(fmt::layer().with_ansi(false).with_writer(writer))
        .try_init()
        .map_err(|e| Error::Other(format!("Failed to install log subscriber: {}", e)))?;

    tracing::info!(directory = %options.directory.display(), "Logging initialized");
    Ok(guard)
}
