//! Per-request context threaded through a policy chain.
//!
//! # Data Flow
//! ```text
//! Dispatcher (endpoint resolved)
//!     → RequestContext::new (request id, endpoint, params, scopes)
//!     → policies read/write consumer, properties, headers
//!     → a policy responds (ResponseState::Ready)
//!     → Dispatcher takes the response (ResponseState::Sent)
//! ```
//!
//! # Design Decisions
//! - Exclusively owned by one request; never shared, never persisted
//! - At most one response: later writes are dropped with a warning
//! - Expression bindings are built from a snapshot of the context, so
//!   templates only ever see `req`, `res`, `egContext` and `requestID`

use std::net::SocketAddr;

use axum::body::Body;
use axum::http::{request::Parts, HeaderMap, Method, Request, Response, Uri};
use serde::Serialize;
use serde_json::{json, Map, Value};
use uuid::Uuid;

use crate::expression::{self, Bindings, Expression, ExpressionError, Template};
use crate::net::connection::ConnectionInfo;
use crate::tls::TlsSession;

/// Unique identifier generated for every request at ingress.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct RequestId(Uuid);

impl RequestId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for RequestId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for RequestId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        self.0.fmt(f)
    }
}

/// Kind of authenticated principal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ConsumerKind {
    User,
    Application,
}

/// Identity attached by an authentication policy.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Consumer {
    pub id: String,
    pub kind: ConsumerKind,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub username: Option<String>,
}

/// What the endpoint resolver found for this request.
#[derive(Debug, Clone, Default)]
pub struct RouteInfo {
    pub api_endpoint: String,
    pub pipeline: String,
    pub params: Vec<(String, String)>,
    pub scopes: Vec<String>,
    /// Path remainder captured by a trailing wildcard.
    pub wildcard: Option<String>,
}

enum ResponseState {
    Pending,
    Ready(Response<Body>),
    Sent,
}

/// Request-scoped mutable state.
pub struct RequestContext {
    request_id: RequestId,
    route: RouteInfo,
    parts: Parts,
    body: Option<Body>,
    connection: ConnectionInfo,
    consumer: Option<Consumer>,
    granted_scopes: Vec<String>,
    properties: Map<String, Value>,
    response: ResponseState,
    finished: bool,
}

impl RequestContext {
    pub fn new(request_id: RequestId, request: Request<Body>, route: RouteInfo) -> Self {
        let (parts, body) = request.into_parts();
        let connection = parts
            .extensions
            .get::<ConnectionInfo>()
            .cloned()
            .unwrap_or_default();
        Self {
            request_id,
            route,
            parts,
            body: Some(body),
            connection,
            consumer: None,
            granted_scopes: Vec::new(),
            properties: Map::new(),
            response: ResponseState::Pending,
            finished: false,
        }
    }

    pub fn request_id(&self) -> RequestId {
        self.request_id
    }

    pub fn api_endpoint(&self) -> &str {
        &self.route.api_endpoint
    }

    pub fn pipeline(&self) -> &str {
        &self.route.pipeline
    }

    /// Scopes the matched endpoint requires.
    pub fn required_scopes(&self) -> &[String] {
        &self.route.scopes
    }

    /// Named path parameters in pattern order.
    pub fn params(&self) -> &[(String, String)] {
        &self.route.params
    }

    pub fn param(&self, name: &str) -> Option<&str> {
        self.route
            .params
            .iter()
            .find(|(k, _)| k == name)
            .map(|(_, v)| v.as_str())
    }

    pub fn wildcard(&self) -> Option<&str> {
        self.route.wildcard.as_deref()
    }

    pub fn method(&self) -> &Method {
        &self.parts.method
    }

    pub fn uri(&self) -> &Uri {
        &self.parts.uri
    }

    pub fn path(&self) -> &str {
        self.parts.uri.path()
    }

    pub fn headers(&self) -> &HeaderMap {
        &self.parts.headers
    }

    pub fn headers_mut(&mut self) -> &mut HeaderMap {
        &mut self.parts.headers
    }

    pub fn request_parts(&self) -> &Parts {
        &self.parts
    }

    /// Host the client addressed, lowercased and without port.
    pub fn host(&self) -> Option<String> {
        request_host(&self.parts).map(normalize_host)
    }

    pub fn remote_addr(&self) -> Option<SocketAddr> {
        self.connection.remote_addr
    }

    pub fn tls(&self) -> Option<&TlsSession> {
        self.connection.tls.as_ref()
    }

    /// Take the request body; later calls get an empty body.
    pub fn take_body(&mut self) -> Body {
        self.body.take().unwrap_or_else(Body::empty)
    }

    pub fn consumer(&self) -> Option<&Consumer> {
        self.consumer.as_ref()
    }

    pub fn granted_scopes(&self) -> &[String] {
        &self.granted_scopes
    }

    pub fn set_consumer(&mut self, consumer: Consumer, scopes: Vec<String>) {
        self.consumer = Some(consumer);
        self.granted_scopes = scopes;
    }

    pub fn property(&self, key: &str) -> Option<&Value> {
        self.properties.get(key)
    }

    pub fn set_property(&mut self, key: impl Into<String>, value: Value) {
        self.properties.insert(key.into(), value);
    }

    /// Record the terminal response. Returns `false` (and drops the
    /// response) if one was already written.
    pub fn respond(&mut self, response: Response<Body>) -> bool {
        match self.response {
            ResponseState::Pending => {
                self.response = ResponseState::Ready(response);
                true
            }
            _ => {
                tracing::warn!(
                    request_id = %self.request_id,
                    api_endpoint = %self.route.api_endpoint,
                    status = %response.status(),
                    "Response already written; ignoring additional response"
                );
                false
            }
        }
    }

    pub fn has_responded(&self) -> bool {
        !matches!(self.response, ResponseState::Pending)
    }

    /// Hand the recorded response to the dispatcher.
    pub(crate) fn take_response(&mut self) -> Option<Response<Body>> {
        match std::mem::replace(&mut self.response, ResponseState::Sent) {
            ResponseState::Ready(response) => Some(response),
            ResponseState::Pending => {
                self.response = ResponseState::Pending;
                None
            }
            ResponseState::Sent => None,
        }
    }

    /// Mark the request as completed by the dispatcher.
    pub(crate) fn finish(&mut self) {
        self.finished = true;
    }

    /// Build the expression allow-list for this request.
    pub fn bindings(&self) -> Bindings {
        let req = self.request_value();
        let res = self.response_value();

        let mut eg = self.properties.clone();
        eg.insert("requestID".into(), json!(self.request_id.to_string()));
        eg.insert("apiEndpoint".into(), json!(self.route.api_endpoint));
        eg.insert("pipeline".into(), json!(self.route.pipeline));
        eg.insert("scopes".into(), json!(self.granted_scopes));
        eg.insert(
            "consumer".into(),
            serde_json::to_value(&self.consumer).unwrap_or(Value::Null),
        );
        eg.insert("req".into(), req.clone());
        eg.insert("res".into(), res.clone());

        let mut bindings = Bindings::new();
        bindings.insert("req".into(), req);
        bindings.insert("res".into(), res);
        bindings.insert("egContext".into(), Value::Object(eg));
        bindings.insert("requestID".into(), json!(self.request_id.to_string()));
        bindings
    }

    /// Render a `${}` template against this request.
    pub fn evaluate_template(&self, template: &str) -> Result<String, ExpressionError> {
        expression::evaluate(template, &self.bindings())
    }

    pub fn render(&self, template: &Template) -> Result<String, ExpressionError> {
        template.render(&self.bindings())
    }

    pub fn evaluate_condition(&self, expr: &Expression) -> Result<bool, ExpressionError> {
        expr.evaluate_bool(&self.bindings())
    }

    fn request_value(&self) -> Value {
        let headers: Map<String, Value> = self
            .parts
            .headers
            .iter()
            .filter_map(|(k, v)| v.to_str().ok().map(|s| (k.as_str().to_string(), json!(s))))
            .collect();
        let query: Map<String, Value> = self
            .parts
            .uri
            .query()
            .map(|q| {
                url::form_urlencoded::parse(q.as_bytes())
                    .map(|(k, v)| (k.into_owned(), json!(v.into_owned())))
                    .collect()
            })
            .unwrap_or_default();
        let params: Map<String, Value> = self
            .route
            .params
            .iter()
            .map(|(k, v)| (k.clone(), json!(v)))
            .collect();
        let url = self
            .parts
            .uri
            .path_and_query()
            .map(|pq| pq.as_str().to_string())
            .unwrap_or_else(|| "/".to_string());

        json!({
            "method": self.parts.method.as_str(),
            "url": url,
            "path": self.parts.uri.path(),
            "query": query,
            "headers": headers,
            "hostname": self.host(),
            "params": params,
            "ip": self.connection.remote_addr.map(|a| a.ip().to_string()),
            "secure": self.connection.tls.is_some(),
            "tls": self.connection.tls.as_ref().map(|t| json!({
                "servername": t.sni,
                "authorized": t.authorized,
            })),
        })
    }

    fn response_value(&self) -> Value {
        match &self.response {
            ResponseState::Ready(response) => {
                let headers: Map<String, Value> = response
                    .headers()
                    .iter()
                    .filter_map(|(k, v)| v.to_str().ok().map(|s| (k.as_str().to_string(), json!(s))))
                    .collect();
                json!({ "statusCode": response.status().as_u16(), "headers": headers })
            }
            _ => json!({}),
        }
    }
}

impl Drop for RequestContext {
    fn drop(&mut self) {
        if !self.finished {
            tracing::debug!(
                request_id = %self.request_id,
                api_endpoint = %self.route.api_endpoint,
                "Request context discarded before completion"
            );
        }
    }
}

fn request_host(parts: &Parts) -> Option<&str> {
    parts
        .headers
        .get(axum::http::header::HOST)
        .and_then(|h| h.to_str().ok())
        .or_else(|| parts.uri.host())
}

/// Lowercase a host and strip any port (IPv6 literals keep their brackets).
pub fn normalize_host(host: &str) -> String {
    let host = host.trim();
    let without_port = if host.starts_with('[') {
        match host.find(']') {
            Some(end) => &host[..=end],
            None => host,
        }
    } else {
        host.rsplit_once(':').map(|(h, _)| h).unwrap_or(host)
    };
    without_port.to_ascii_lowercase()
}

/// Host of an incoming request, normalized.
pub fn host_of<B>(request: &Request<B>) -> Option<String> {
    request
        .headers()
        .get(axum::http::header::HOST)
        .and_then(|h| h.to_str().ok())
        .or_else(|| request.uri().host())
        .map(normalize_host)
}
