// Host program: loads the configuration, restores the servers that were
// running before, serves the HTTP gateway and shuts down on Ctrl-C.
//
// Usage: cargo run --example manager -- path/to/config.json

use game_server_manager::logging::{LoggingOptions, init_logging};
use game_server_manager::{Result, ServerManager};
use tracing::{error, info};

#[tokio::main]
async fn main() -> Result<()> {
    let _guard = init_logging(LoggingOptions::default())?;

    let config_path = std::env::args()
        .nth(1)
        .unwrap_or_else(|| "config.json".to_string());
    info!(path = %config_path, "Starting game server manager");

    let mut manager = match ServerManager::from_config_file(&config_path) {
        Ok(manager) => manager,
        Err(e) => {
            error!(error = %e, "Configuration rejected; refusing to start");
            return Err(e);
        }
    };

    let report = manager.restore_on_boot().await?;
    info!(
        restarted = ?report.restarted,
        failed = ?report.failed,
        reconciled = ?report.reconciled,
        "Running-set restored"
    );

    if manager.start_gateway().await? {
        if let Some(gateway) = manager.gateway() {
            info!(address = %gateway.local_addr(), "Accepting commands over HTTP");
        }
    } else {
        info!("No gateway configured; nothing will accept commands");
    }

    if let Err(e) = tokio::signal::ctrl_c().await {
        error!(error = %e, "Failed to listen for Ctrl-C; shutting down");
    }

    let drained = manager.shutdown().await?;
    info!(
        completed = drained.completed,
        aborted = drained.aborted,
        "Game server manager stopped"
    );
    Ok(())
}
