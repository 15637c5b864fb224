//! Shared utilities for integration testing.
#![allow(dead_code)]

use std::net::SocketAddr;
use std::sync::Arc;

use async_trait::async_trait;
use axum::body::{to_bytes, Body};
use axum::http::{Request, Response};
use axum::Router;
use serde_json::{json, Value};
use tokio::net::TcpListener;
use tokio::task::JoinHandle;

use policy_gateway::config::loader::{parse_config, ConfigFormat};
use policy_gateway::context::{Consumer, ConsumerKind};
use policy_gateway::pipeline::{CredentialKind, CredentialService, Identity, PolicyError};
use policy_gateway::{Gateway, GatewayConfig, HttpServer, PolicyRegistry, Shutdown};

/// Start a backend that answers every request with a JSON description of it.
pub async fn start_echo_backend() -> SocketAddr {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let app = Router::new().fallback(echo);

    tokio::spawn(async move {
        let _ = axum::serve(listener, app).await;
    });
    addr
}

async fn echo(request: Request<Body>) -> axum::Json<Value> {
    let headers: serde_json::Map<String, Value> = request
        .headers()
        .iter()
        .map(|(k, v)| (k.as_str().to_string(), json!(v.to_str().unwrap_or_default())))
        .collect();
    let method = request.method().to_string();
    let uri = request.uri().to_string();
    let body = to_bytes(request.into_body(), usize::MAX).await.unwrap();
    axum::Json(json!({
        "method": method,
        "uri": uri,
        "headers": headers,
        "body": String::from_utf8_lossy(&body),
    }))
}

/// Parse a TOML config, validating it the way the loader does.
pub fn config(toml: &str) -> GatewayConfig {
    parse_config(toml, ConfigFormat::Toml).unwrap()
}

pub fn gateway(toml: &str) -> Arc<Gateway> {
    gateway_with(toml, PolicyRegistry::with_builtins())
}

pub fn gateway_with(toml: &str, registry: PolicyRegistry) -> Arc<Gateway> {
    Arc::new(Gateway::new(config(toml), registry).unwrap())
}

/// A gateway serving on real sockets.
pub struct RunningGateway {
    pub gateway: Arc<Gateway>,
    pub http_addr: Option<SocketAddr>,
    pub https_addr: Option<SocketAddr>,
    shutdown: Shutdown,
    handle: JoinHandle<()>,
}

impl RunningGateway {
    pub fn http_url(&self, path: &str) -> String {
        format!("http://{}{}", self.http_addr.unwrap(), path)
    }

    pub async fn stop(self) {
        self.shutdown.trigger();
        self.handle.await.unwrap();
    }
}

/// Bind the configured listeners (use port 0) and serve in the background.
pub async fn start_gateway(gateway: Arc<Gateway>) -> RunningGateway {
    let server = HttpServer::new(Arc::clone(&gateway));
    let listeners = server.bind().await.unwrap();
    let http_addr = listeners.http_addr();
    let https_addr = listeners.https_addr();
    let shutdown = Shutdown::new();
    let handle = tokio::spawn(server.serve(listeners, shutdown.clone()));

    RunningGateway {
        gateway,
        http_addr,
        https_addr,
        shutdown,
        handle,
    }
}

pub async fn body_json(response: Response<Body>) -> Value {
    let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    serde_json::from_slice(&bytes).unwrap()
}

pub async fn body_text(response: Response<Body>) -> String {
    let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    String::from_utf8(bytes.to_vec()).unwrap()
}

/// Credential store holding a single user and a single application key.
#[derive(Debug)]
pub struct StaticCredentials;

#[async_trait]
impl CredentialService for StaticCredentials {
    async fn authenticate(
        &self,
        id: &str,
        secret: &str,
        kind: CredentialKind,
    ) -> Result<Option<Identity>, PolicyError> {
        let identity = match (kind, id, secret) {
            (CredentialKind::BasicAuth, "alice", "s3cret") => Identity {
                consumer: Consumer {
                    id: "user-1".into(),
                    kind: ConsumerKind::User,
                    username: Some("alice".into()),
                },
                scopes: vec!["orders:read".into()],
            },
            (CredentialKind::KeyAuth, "app-key", "app-secret") => Identity {
                consumer: Consumer {
                    id: "app-1".into(),
                    kind: ConsumerKind::Application,
                    username: None,
                },
                scopes: vec!["orders:read".into(), "orders:write".into()],
            },
            _ => return Ok(None),
        };
        Ok(Some(identity))
    }
}
