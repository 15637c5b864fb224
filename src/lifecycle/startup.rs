//! Startup orchestration.
//!
//! # Responsibilities
//! - Load and validate configuration
//! - Initialize logging and metrics
//! - Compile the first snapshot, start reload sources
//! - Bind listeners and begin accepting traffic
//!
//! # Design Decisions
//! - Fail fast: any startup error is fatal
//! - Listeners start last (traffic only when ready)

use std::net::SocketAddr;
use std::path::Path;
use std::sync::Arc;

use tokio::sync::mpsc;

use crate::config::load_config;
use crate::config::schema::ObservabilityConfig;
use crate::config::watcher::ConfigWatcher;
use crate::error::GatewayError;
use crate::gateway::{spawn_reload_task, Gateway, GatewaySnapshot};
use crate::http::HttpServer;
use crate::lifecycle::{signals, Shutdown};
use crate::observability::{logging, metrics};
use crate::pipeline::PolicyRegistry;

/// Load, validate and compile without serving (`--check`).
pub fn check(config_path: &Path, registry: &PolicyRegistry) -> Result<GatewaySnapshot, GatewayError> {
    let config = load_config(config_path)?;
    Ok(GatewaySnapshot::compile(config, registry, 0)?)
}

/// Run the gateway until a shutdown signal arrives.
pub async fn run(config_path: &Path, registry: PolicyRegistry) -> Result<(), GatewayError> {
    let config = match load_config(config_path) {
        Ok(config) => config,
        Err(e) => {
            logging::init_logging(&ObservabilityConfig::default());
            tracing::error!(path = ?config_path, error = %e, "Failed to load configuration");
            return Err(e.into());
        }
    };
    logging::init_logging(&config.observability);

    tracing::info!(
        version = env!("CARGO_PKG_VERSION"),
        path = ?config_path,
        api_endpoints = config.api_endpoints.len(),
        pipelines = config.pipelines.len(),
        policies = ?registry.names(),
        "policy-gateway starting"
    );

    let shutdown = Shutdown::new();

    if config.observability.metrics_enabled {
        match config.observability.metrics_address.parse::<SocketAddr>() {
            Ok(addr) => {
                metrics::spawn_metrics_server(addr, shutdown.subscribe())?;
            }
            Err(_) => tracing::error!(
                metrics_address = %config.observability.metrics_address,
                "Failed to parse metrics address"
            ),
        }
    }

    let gateway = Arc::new(Gateway::new(config, registry)?);

    let (reload_tx, reload_rx) = mpsc::unbounded_channel();
    let reload_task = spawn_reload_task(Arc::clone(&gateway), reload_rx, shutdown.subscribe());
    let _watcher = ConfigWatcher::new(config_path, reload_tx.clone()).run()?;
    let signal_task = signals::install(shutdown.clone(), config_path.to_path_buf(), reload_tx)?;

    HttpServer::new(gateway).run(shutdown.clone()).await?;

    signal_task.abort();
    if reload_task.await.is_err() {
        tracing::warn!("Reload task ended abnormally");
    }
    tracing::info!("Shutdown complete");
    Ok(())
}
