//! Metrics collection and exposition.
//!
//! # Metrics
//! - `gateway_requests_total` (counter): by method, status, api_endpoint
//! - `gateway_request_duration_seconds` (histogram): by api_endpoint
//! - `gateway_policy_failures_total` (counter): by pipeline, policy
//! - `gateway_tls_handshakes_refused_total` (counter): by reason
//! - `gateway_config_reloads_total` (counter): by result
//!
//! # Design Decisions
//! - Recording goes through the `metrics` facade; without an installed
//!   recorder every call is a no-op
//! - The Prometheus endpoint is a separate listener from the gateway

use std::net::SocketAddr;
use std::time::Instant;

use axum::{routing::get, Router};
use metrics::{counter, histogram};
use metrics_exporter_prometheus::{BuildError, PrometheusBuilder, PrometheusHandle};
use tokio::sync::broadcast;

pub fn record_request(method: &str, status: u16, api_endpoint: &str, start: Instant) {
    counter!(
        "gateway_requests_total",
        "method" => method.to_string(),
        "status" => status.to_string(),
        "api_endpoint" => api_endpoint.to_string()
    )
    .increment(1);
    histogram!(
        "gateway_request_duration_seconds",
        "api_endpoint" => api_endpoint.to_string()
    )
    .record(start.elapsed().as_secs_f64());
}

pub fn record_policy_failure(pipeline: &str, policy: &str) {
    counter!(
        "gateway_policy_failures_total",
        "pipeline" => pipeline.to_string(),
        "policy" => policy.to_string()
    )
    .increment(1);
}

pub fn record_tls_refused(reason: &'static str) {
    counter!("gateway_tls_handshakes_refused_total", "reason" => reason).increment(1);
}

pub fn record_config_reload(success: bool) {
    let result = if success { "success" } else { "failure" };
    counter!("gateway_config_reloads_total", "result" => result).increment(1);
}

/// Install the global Prometheus recorder.
pub fn init_metrics_recorder() -> Result<PrometheusHandle, BuildError> {
    PrometheusBuilder::new().install_recorder()
}

/// Serve `/metrics` on `addr` until shutdown.
pub async fn run_metrics_server(
    addr: SocketAddr,
    handle: PrometheusHandle,
    mut shutdown: broadcast::Receiver<()>,
) -> Result<(), std::io::Error> {
    let app = Router::new().route(
        "/metrics",
        get(move || {
            let handle = handle.clone();
            async move { handle.render() }
        }),
    );

    let listener = tokio::net::TcpListener::bind(addr).await?;
    tracing::info!(address = %addr, "Metrics server listening");

    axum::serve(listener, app)
        .with_graceful_shutdown(async move {
            let _ = shutdown.recv().await;
        })
        .await
}

/// Install the recorder and spawn the server in the background.
pub fn spawn_metrics_server(
    addr: SocketAddr,
    shutdown: broadcast::Receiver<()>,
) -> Result<tokio::task::JoinHandle<()>, BuildError> {
    let handle = init_metrics_recorder()?;
    Ok(tokio::spawn(async move {
        if let Err(e) = run_metrics_server(addr, handle, shutdown).await {
            tracing::error!(address = %addr, error = %e, "Metrics server failed");
        }
    }))
}
