//! OS signal handling.
//!
//! # Responsibilities
//! - SIGTERM/SIGINT (Ctrl-C) → trigger graceful shutdown
//! - SIGHUP → reload the config file through the reload channel
//!
//! # Design Decisions
//! - Uses Tokio's signal handling (async-safe)
//! - SIGHUP triggers config reload, not shutdown

use std::path::PathBuf;

use tokio::sync::mpsc;
use tokio::task::JoinHandle;

use crate::config::schema::GatewayConfig;
#[cfg(unix)]
use crate::config::watcher::reload_from;
use crate::lifecycle::Shutdown;

/// Install the handlers and wait for signals in a background task.
#[cfg(unix)]
pub fn install(
    shutdown: Shutdown,
    config_path: PathBuf,
    reload_tx: mpsc::UnboundedSender<GatewayConfig>,
) -> std::io::Result<JoinHandle<()>> {
    use tokio::signal::unix::{signal, SignalKind};

    let mut terminate = signal(SignalKind::terminate())?;
    let mut hangup = signal(SignalKind::hangup())?;

    Ok(tokio::spawn(async move {
        loop {
            tokio::select! {
                _ = tokio::signal::ctrl_c() => {
                    tracing::info!("SIGINT received, shutting down");
                    break;
                }
                _ = terminate.recv() => {
                    tracing::info!("SIGTERM received, shutting down");
                    break;
                }
                _ = hangup.recv() => {
                    tracing::info!(path = ?config_path, "SIGHUP received, reloading configuration");
                    reload_from(&config_path, &reload_tx);
                }
            }
        }
        shutdown.trigger();
    }))
}

/// Install the handlers and wait for signals in a background task.
#[cfg(not(unix))]
pub fn install(
    shutdown: Shutdown,
    _config_path: PathBuf,
    _reload_tx: mpsc::UnboundedSender<GatewayConfig>,
) -> std::io::Result<JoinHandle<()>> {
    Ok(tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::info!("Ctrl-C received, shutting down");
        }
        shutdown.trigger();
    }))
}
