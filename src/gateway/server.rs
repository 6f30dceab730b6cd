use crate::config::{DEFAULT_WORKERS, GatewayConfig};
use crate::error::{Error, Result};
use crate::gateway::auth::Authentication;
use crate::gateway::handlers::{self, GatewayState};
use actix_cors::Cors;
use actix_web::{App, HttpServer, dev::ServerHandle, middleware, web::Data};
use std::net::{SocketAddr, ToSocketAddrs};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;
use tokio::task::JoinHandle;

const SHUTDOWN_TIMEOUT: Duration = Duration::from_secs(5);

/// Handle for a running gateway.
#[derive(Clone)]
pub struct GatewayHandle {
    server: ServerHandle,
    task: Arc<Mutex<Option<JoinHandle<()>>>>,
    local_addr: SocketAddr,
}

impl GatewayHandle {
    /// The address the gateway is listening on.
    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    /// Stops accepting connections and waits for the server task.
    pub async fn shutdown(&self) -> Result<()> {
        tracing::info!(address = %self.local_addr, "Stopping command gateway");
        self.server.stop(true).await;

        let mut task = self.task.lock().await;
        if let Some(task) = task.take() {
            match tokio::time::timeout(SHUTDOWN_TIMEOUT, task).await {
                Ok(Err(e)) => tracing::warn!("Error while joining gateway task: {}", e),
                Ok(Ok(())) => {}
                Err(_) => tracing::warn!("Timeout waiting for gateway task to finish"),
            }
        }
        Ok(())
    }
}

fn resolve_address(config: &GatewayConfig) -> Result<SocketAddr> {
    let addr_str = format!("{}:{}", config.address, config.port);
    addr_str
        .to_socket_addrs()
        .map_err(|e| Error::Other(format!("Failed to parse socket address: {}", e)))?
        .next()
        .ok_or_else(|| Error::Other(format!("Could not parse socket address: {}", addr_str)))
}

/// Binds and starts the HTTP command gateway in a background task.
pub async fn start_gateway(config: &GatewayConfig, state: GatewayState) -> Result<GatewayHandle> {
    let addr = resolve_address(config)?;
    tracing::info!(address = %addr, "Starting command gateway");

    let auth = Authentication::from_config(config);
    let state = Data::new(state);
    let mut server_builder = HttpServer::new(move || {
        let cors = Cors::default()
            .allow_any_origin()
            .allow_any_method()
            .allow_any_header()
            .max_age(3600);

        App::new()
            .wrap(middleware::Logger::default())
            .wrap(cors)
            .wrap(auth.clone())
            .app_data(state.clone())
            .configure(handlers::configure)
    });

    let workers = config.workers.unwrap_or(DEFAULT_WORKERS);
    tracing::info!(workers = workers, "Setting number of Actix Web workers");
    server_builder = server_builder
        .workers(workers)
        .disable_signals()
        .bind(addr)
        .map_err(|e| Error::Other(format!("Failed to bind server: {}", e)))?;

    let local_addr = server_builder.addrs().first().copied().unwrap_or(addr);
    let server = server_builder.run();
    let server_handle = server.handle();

    let task = tokio::spawn(async move {
        if let Err(e) = server.await {
            tracing::error!(error = %e, "Command gateway stopped with an error");
        }
        tracing::info!("Command gateway shut down completely");
    });

    tracing::info!(address = %local_addr, "Command gateway started");
    Ok(GatewayHandle {
        server: server_handle,
        task: Arc::new(Mutex::new(Some(task))),
        local_addr,
    })
}
