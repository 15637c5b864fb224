//! Gateway core: compiled snapshot, atomic reload and request dispatch.
//!
//! # Data Flow
//! ```text
//! GatewayConfig
//!     → snapshot.rs (validate, bind, compile routes + chains + SNI table)
//!     → ArcSwap<GatewaySnapshot> (single atomic store)
//!
//! Per request (dispatcher.rs):
//!     load_full() snapshot
//!     → resolve endpoint → RequestContext → PolicyChain::execute
//!     → exactly one response, x-request-id stamped
//!
//! Reload (reload.rs):
//!     mpsc<GatewayConfig> → compile → store (or keep the old snapshot)
//! ```
//!
//! # Design Decisions
//! - Readers never lock; a reload swaps one pointer
//! - A failed compile never replaces the active snapshot
//! - Snapshot versions only ever increase

pub mod dispatcher;
pub mod reload;
pub mod snapshot;

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use arc_swap::ArcSwap;

use crate::config::schema::GatewayConfig;
use crate::config::ConfigError;
use crate::pipeline::PolicyRegistry;

pub use dispatcher::X_REQUEST_ID;
pub use reload::spawn_reload_task;
pub use snapshot::GatewaySnapshot;

/// Shared gateway state.
#[derive(Debug)]
pub struct Gateway {
    snapshot: ArcSwap<GatewaySnapshot>,
    registry: PolicyRegistry,
    next_version: AtomicU64,
}

impl Gateway {
    pub fn new(config: GatewayConfig, registry: PolicyRegistry) -> Result<Self, ConfigError> {
        let snapshot = GatewaySnapshot::compile(config, &registry, 1)?;
        Ok(Self {
            snapshot: ArcSwap::from_pointee(snapshot),
            registry,
            next_version: AtomicU64::new(2),
        })
    }

    /// The snapshot new requests will use.
    pub fn snapshot(&self) -> Arc<GatewaySnapshot> {
        self.snapshot.load_full()
    }

    pub fn registry(&self) -> &PolicyRegistry {
        &self.registry
    }

    /// Compile `config` and make it active. Returns the new version.
    pub fn reload(&self, config: GatewayConfig) -> Result<u64, ConfigError> {
        let version = self.next_version.fetch_add(1, Ordering::SeqCst);
        let snapshot = GatewaySnapshot::compile(config, &self.registry, version)?;
        self.snapshot.store(Arc::new(snapshot));
        tracing::info!(version, "Configuration activated");
        Ok(version)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::{to_bytes, Body};
    use axum::http::{Request, StatusCode};
    use serde_json::{json, Value};

    fn config(message: &str) -> GatewayConfig {
        serde_json::from_value(json!({
            "http": { "bind_address": "127.0.0.1:0" },
            "policies": ["terminate"],
            "api_endpoints": [{ "name": "api", "paths": "/api/*" }],
            "pipelines": [{
                "name": "p",
                "api_endpoints": "api",
                "policies": [{ "policy": "terminate", "action": { "status_code": 200, "message": message } }]
            }]
        }))
        .unwrap()
    }

    async fn body(response: axum::http::Response<Body>) -> String {
        String::from_utf8(to_bytes(response.into_body(), usize::MAX).await.unwrap().to_vec()).unwrap()
    }

    fn get(uri: &str) -> Request<Body> {
        Request::builder().uri(uri).body(Body::empty()).unwrap()
    }

    #[tokio::test]
    async fn dispatches_and_stamps_request_id() {
        let gateway = Gateway::new(config("v1"), PolicyRegistry::with_builtins()).unwrap();
        let response = gateway.dispatch(get("/api/x")).await;
        assert_eq!(response.status(), StatusCode::OK);
        assert!(response.headers().contains_key(X_REQUEST_ID));
        assert_eq!(body(response).await, "v1");
    }

    #[tokio::test]
    async fn miss_is_json_404() {
        let gateway = Gateway::new(config("v1"), PolicyRegistry::with_builtins()).unwrap();
        let response = gateway.dispatch(get("/other")).await;
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
        let id = response.headers()[X_REQUEST_ID].to_str().unwrap().to_string();
        let body: Value = serde_json::from_str(&body(response).await).unwrap();
        assert_eq!(body["error"], "Not Found");
        assert_eq!(body["request_id"], id.as_str());
    }

    #[tokio::test]
    async fn reload_swaps_and_failed_reload_keeps_old() {
        let gateway = Gateway::new(config("v1"), PolicyRegistry::with_builtins()).unwrap();
        let pinned = gateway.snapshot();

        assert_eq!(gateway.reload(config("v2")).unwrap(), 2);
        assert_eq!(body(gateway.dispatch(get("/api")).await).await, "v2");
        assert_eq!(pinned.version(), 1);

        let mut broken = config("v3");
        broken.pipelines[0].api_endpoints = crate::config::schema::OneOrMany::One("missing".into());
        assert!(gateway.reload(broken).is_err());
        assert_eq!(gateway.snapshot().version(), 2);
        assert_eq!(body(gateway.dispatch(get("/api")).await).await, "v2");
    }
}
