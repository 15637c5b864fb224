//! HTTP server setup.
//!
//! # Responsibilities
//! - Build the Axum app: every request falls through to the dispatcher
//! - Wire up middleware (tracing, body limit, optional timeout)
//! - Run the plain and TLS accept loops (HTTP/1.1 and HTTP/2)
//! - Attach `ConnectionInfo` to each request
//! - Drain connections on shutdown
//!
//! # Design Decisions
//! - Listener, body limit and timeout settings are read once at startup;
//!   routes, pipelines and certificates follow reloads
//! - The TLS certificate table is read from the snapshot per handshake

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use axum::{
    body::Body,
    extract::State,
    http::{Request, Response},
    Router,
};
use hyper::body::Incoming;
use hyper_util::{
    rt::{TokioExecutor, TokioIo},
    server::conn::auto,
    service::TowerToHyperService,
};
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::sync::broadcast;
use tower::ServiceExt;
use tower_http::{limit::RequestBodyLimitLayer, timeout::TimeoutLayer, trace::TraceLayer};

use crate::config::schema::GatewayConfig;
use crate::gateway::Gateway;
use crate::lifecycle::Shutdown;
use crate::net::{ConnectionInfo, ConnectionTracker, Listener, ListenerError};
use crate::tls;

const HANDSHAKE_TIMEOUT: Duration = Duration::from_secs(10);

/// HTTP front end of the gateway.
pub struct HttpServer {
    gateway: Arc<Gateway>,
    tracker: ConnectionTracker,
}

/// Listeners bound by [`HttpServer::bind`].
#[derive(Debug)]
pub struct BoundListeners {
    pub http: Option<Listener>,
    pub https: Option<Listener>,
}

impl BoundListeners {
    pub fn http_addr(&self) -> Option<SocketAddr> {
        self.http.as_ref().and_then(|l| l.local_addr().ok())
    }

    pub fn https_addr(&self) -> Option<SocketAddr> {
        self.https.as_ref().and_then(|l| l.local_addr().ok())
    }
}

impl HttpServer {
    pub fn new(gateway: Arc<Gateway>) -> Self {
        Self {
            gateway,
            tracker: ConnectionTracker::new(),
        }
    }

    pub fn gateway(&self) -> &Arc<Gateway> {
        &self.gateway
    }

    /// The Axum app serving every request through the gateway.
    pub fn app(&self) -> Router {
        let snapshot = self.gateway.snapshot();
        build_router(Arc::clone(&self.gateway), snapshot.config())
    }

    /// Bind the configured listeners.
    pub async fn bind(&self) -> Result<BoundListeners, ListenerError> {
        let snapshot = self.gateway.snapshot();
        let config = snapshot.config();
        let http = match &config.http {
            Some(http) => Some(Listener::bind(&http.bind_address, http.max_connections).await?),
            None => None,
        };
        let https = match &config.https {
            Some(https) => Some(Listener::bind(&https.bind_address, https.max_connections).await?),
            None => None,
        };
        Ok(BoundListeners { http, https })
    }

    /// Bind and serve until `shutdown` fires.
    pub async fn run(self, shutdown: Shutdown) -> Result<(), ListenerError> {
        let listeners = self.bind().await?;
        self.serve(listeners, shutdown).await;
        Ok(())
    }

    /// Serve already bound listeners until `shutdown` fires, then drain.
    pub async fn serve(self, listeners: BoundListeners, shutdown: Shutdown) {
        let app = self.app();
        let drain_timeout = Duration::from_secs(self.gateway.snapshot().config().timeouts.shutdown_secs);
        let mut loops = Vec::new();

        if let Some(listener) = listeners.http {
            loops.push(tokio::spawn(accept_loop(
                listener,
                None,
                app.clone(),
                self.tracker.clone(),
                shutdown.clone(),
                shutdown.subscribe(),
            )));
        }
        if let Some(listener) = listeners.https {
            loops.push(tokio::spawn(accept_loop(
                listener,
                Some(Arc::clone(&self.gateway)),
                app.clone(),
                self.tracker.clone(),
                shutdown.clone(),
                shutdown.subscribe(),
            )));
        }

        for handle in loops {
            if let Err(e) = handle.await {
                tracing::error!(error = %e, "Accept loop aborted");
            }
        }

        tracing::info!(active_connections = self.tracker.active_count(), "Draining connections");
        if !self.tracker.wait_for_drain(drain_timeout).await {
            tracing::warn!(
                active_connections = self.tracker.active_count(),
                "Drain timeout reached; closing remaining connections"
            );
        }
        tracing::info!("HTTP server stopped");
    }
}

/// Build the Axum router with all middleware layers.
#[allow(deprecated)]
fn build_router(gateway: Arc<Gateway>, config: &GatewayConfig) -> Router {
    let router = Router::new()
        .fallback(dispatch_handler)
        .with_state(gateway)
        .layer(RequestBodyLimitLayer::new(config.security.max_body_size));

    let router = if config.timeouts.request_secs > 0 {
        router.layer(TimeoutLayer::new(Duration::from_secs(config.timeouts.request_secs)))
    } else {
        router
    };

    router.layer(TraceLayer::new_for_http())
}

async fn dispatch_handler(State(gateway): State<Arc<Gateway>>, request: Request<Body>) -> Response<Body> {
    gateway.dispatch(request).await
}

/// Accept until shutdown. `tls_gateway` is set for the TLS listener.
async fn accept_loop(
    listener: Listener,
    tls_gateway: Option<Arc<Gateway>>,
    app: Router,
    tracker: ConnectionTracker,
    shutdown: Shutdown,
    mut stop: broadcast::Receiver<()>,
) {
    let scheme = if tls_gateway.is_some() { "https" } else { "http" };
    if let Ok(addr) = listener.local_addr() {
        tracing::info!(address = %addr, scheme, "Accepting connections");
    }

    loop {
        let accepted = tokio::select! {
            accepted = listener.accept() => accepted,
            _ = stop.recv() => break,
        };
        let (stream, remote_addr, permit) = match accepted {
            Ok(conn) => conn,
            Err(ListenerError::Closed) => break,
            Err(e) => {
                tracing::error!(error = %e, scheme, "Failed to accept connection");
                tokio::time::sleep(Duration::from_millis(50)).await;
                continue;
            }
        };

        let guard = tracker.track();
        let app = app.clone();
        let conn_shutdown = shutdown.subscribe();
        let gateway = tls_gateway.clone();

        tokio::spawn(async move {
            let _permit = permit;
            let connection_id = guard.id();
            match gateway {
                None => serve_connection(stream, app, ConnectionInfo::plain(remote_addr), conn_shutdown).await,
                Some(gateway) => {
                    let snapshot = gateway.snapshot();
                    let handshake = tokio::time::timeout(HANDSHAKE_TIMEOUT, tls::accept(snapshot.sni(), stream)).await;
                    match handshake {
                        Ok(Ok((stream, session))) => {
                            tracing::debug!(
                                connection_id = %connection_id,
                                peer_addr = %remote_addr,
                                sni = %session.sni,
                                authorized = session.authorized,
                                "TLS session established"
                            );
                            let info = ConnectionInfo::secure(remote_addr, session);
                            serve_connection(stream, app, info, conn_shutdown).await;
                        }
                        Ok(Err(e)) => tracing::warn!(
                            connection_id = %connection_id,
                            peer_addr = %remote_addr,
                            error = %e,
                            "TLS handshake refused"
                        ),
                        Err(_) => tracing::warn!(
                            connection_id = %connection_id,
                            peer_addr = %remote_addr,
                            "TLS handshake timed out"
                        ),
                    }
                }
            }
            drop(guard);
        });
    }

    tracing::info!(scheme, "Stopped accepting connections");
}

async fn serve_connection<IO>(io: IO, app: Router, info: ConnectionInfo, mut shutdown: broadcast::Receiver<()>)
where
    IO: AsyncRead + AsyncWrite + Unpin + Send + 'static,
{
    let service = app.map_request(move |mut request: Request<Incoming>| {
        request.extensions_mut().insert(info.clone());
        request
    });
    let builder = auto::Builder::new(TokioExecutor::new());
    let connection = builder.serve_connection(TokioIo::new(io), TowerToHyperService::new(service));
    tokio::pin!(connection);

    let result = tokio::select! {
        result = connection.as_mut() => result,
        _ = shutdown.recv() => {
            connection.as_mut().graceful_shutdown();
            connection.await
        }
    };
    if let Err(e) = result {
        tracing::debug!(error = %e, "Connection closed with error");
    }
}
