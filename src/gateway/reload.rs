//! Applies configurations published by the file watcher and SIGHUP.

use std::sync::Arc;

use tokio::sync::{broadcast, mpsc};
use tokio::task::JoinHandle;

use crate::config::schema::GatewayConfig;
use crate::gateway::Gateway;
use crate::observability::metrics;

/// Consume `updates` until shutdown, compiling and activating each one.
pub fn spawn_reload_task(
    gateway: Arc<Gateway>,
    mut updates: mpsc::UnboundedReceiver<GatewayConfig>,
    mut shutdown: broadcast::Receiver<()>,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        loop {
            tokio::select! {
                update = updates.recv() => {
                    let Some(config) = update else { break };
                    match gateway.reload(config) {
                        Ok(_) => metrics::record_config_reload(true),
                        Err(e) => {
                            metrics::record_config_reload(false);
                            tracing::error!(error = %e, "Reload rejected; keeping current configuration");
                        }
                    }
                }
                _ = shutdown.recv() => break,
            }
        }
        tracing::debug!("Reload task stopped");
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pipeline::PolicyRegistry;
    use serde_json::json;
    use std::time::Duration;

    fn config(endpoint: &str) -> GatewayConfig {
        serde_json::from_value(json!({
            "http": { "bind_address": "127.0.0.1:0" },
            "api_endpoints": [{ "name": "api" }],
            "pipelines": [{ "name": "p", "api_endpoints": endpoint }]
        }))
        .unwrap()
    }

    #[tokio::test]
    async fn applies_updates_in_order() {
        let gateway = Arc::new(Gateway::new(config("api"), PolicyRegistry::with_builtins()).unwrap());
        let (tx, rx) = mpsc::unbounded_channel();
        let (shutdown_tx, shutdown_rx) = broadcast::channel(1);
        let task = spawn_reload_task(Arc::clone(&gateway), rx, shutdown_rx);

        tx.send(config("missing")).unwrap();
        tx.send(config("api")).unwrap();

        tokio::time::timeout(Duration::from_secs(2), async {
            while gateway.snapshot().version() < 3 {
                tokio::time::sleep(Duration::from_millis(10)).await;
            }
        })
        .await
        .unwrap();

        shutdown_tx.send(()).unwrap();
        task.await.unwrap();
    }
}
