//! `proxy`: forward the request to a named service endpoint.
//!
//! # Responsibilities
//! - Resolve the service endpoint URL at compile time
//! - Rewrite the URI (optionally stripping the matched endpoint prefix)
//! - Drop hop-by-hop headers in both directions
//! - Terminate the chain with the upstream response, or 502
//!
//! # Design Decisions
//! - One pooled hyper-util client shared by every proxy step
//! - Plain HTTP upstreams only
//! - The request body is streamed, never buffered

use std::sync::Arc;

use async_trait::async_trait;
use axum::body::Body;
use axum::http::{header, HeaderMap, HeaderName, HeaderValue, Request, StatusCode, Uri};
use hyper_util::client::legacy::{connect::HttpConnector, Client};
use hyper_util::rt::TokioExecutor;
use serde::Deserialize;
use serde_json::Value;
use url::Url;

use crate::config::schema::GatewayConfig;
use crate::context::RequestContext;
use crate::pipeline::policy::{parse_action, text_response, Policy, PolicyError, PolicyFactory, StepOutcome};

const HOP_BY_HOP: [&str; 8] = [
    "connection",
    "keep-alive",
    "proxy-authenticate",
    "proxy-authorization",
    "te",
    "trailer",
    "transfer-encoding",
    "upgrade",
];

#[derive(Debug, Default, Deserialize)]
#[serde(default, deny_unknown_fields)]
struct ProxyAction {
    service_endpoint: String,
    strip_path: bool,
    change_origin: bool,
}

/// Builds proxy steps sharing one connection pool.
#[derive(Clone)]
pub struct ProxyFactory {
    client: Client<HttpConnector, Body>,
}

impl ProxyFactory {
    pub fn new() -> Self {
        Self {
            client: Client::builder(TokioExecutor::new()).build(HttpConnector::new()),
        }
    }
}

impl Default for ProxyFactory {
    fn default() -> Self {
        Self::new()
    }
}

impl PolicyFactory for ProxyFactory {
    fn build(&self, action: &Value, config: &GatewayConfig) -> Result<Arc<dyn Policy>, PolicyError> {
        let action: ProxyAction = parse_action(action)?;
        let service = config
            .service_endpoints
            .iter()
            .find(|s| s.name == action.service_endpoint)
            .ok_or_else(|| {
                PolicyError::InvalidParams(format!("unknown service endpoint `{}`", action.service_endpoint))
            })?;

        let url = Url::parse(&service.url)
            .map_err(|e| PolicyError::InvalidParams(format!("service endpoint `{}`: {e}", service.name)))?;
        if url.scheme() != "http" {
            return Err(PolicyError::InvalidParams(format!(
                "service endpoint `{}`: only http:// upstreams are supported",
                service.name
            )));
        }
        let host = url
            .host_str()
            .ok_or_else(|| PolicyError::InvalidParams(format!("service endpoint `{}` has no host", service.name)))?;
        let authority = match url.port() {
            Some(port) => format!("{host}:{port}"),
            None => host.to_string(),
        };

        Ok(Arc::new(ProxyPolicy {
            client: self.client.clone(),
            service: service.name.clone(),
            authority,
            base_path: url.path().trim_end_matches('/').to_string(),
            strip_path: action.strip_path,
            change_origin: action.change_origin,
        }))
    }
}

#[derive(Debug)]
pub struct ProxyPolicy {
    client: Client<HttpConnector, Body>,
    service: String,
    authority: String,
    base_path: String,
    strip_path: bool,
    change_origin: bool,
}

impl ProxyPolicy {
    fn upstream_uri(&self, ctx: &RequestContext) -> Result<Uri, PolicyError> {
        let path = if self.strip_path {
            format!("/{}", ctx.wildcard().unwrap_or_default())
        } else {
            ctx.path().to_string()
        };
        let mut target = format!("http://{}{}{}", self.authority, self.base_path, path);
        if let Some(query) = ctx.uri().query() {
            target.push('?');
            target.push_str(query);
        }
        target
            .parse()
            .map_err(|e| PolicyError::Execution(format!("invalid upstream uri `{target}`: {e}")))
    }

    fn upstream_headers(&self, ctx: &RequestContext) -> HeaderMap {
        let mut headers = ctx.headers().clone();
        strip_hop_by_hop(&mut headers);

        if self.change_origin {
            if let Ok(host) = HeaderValue::from_str(&self.authority) {
                headers.insert(header::HOST, host);
            }
        } else if !headers.contains_key(header::HOST) {
            // HTTP/2 clients send :authority instead of Host.
            if let Some(authority) = ctx.uri().authority() {
                if let Ok(host) = HeaderValue::from_str(authority.as_str()) {
                    headers.insert(header::HOST, host);
                }
            }
        }

        if let Some(addr) = ctx.remote_addr() {
            let ip = addr.ip().to_string();
            let forwarded = match headers.get("x-forwarded-for").and_then(|v| v.to_str().ok()) {
                Some(prior) => format!("{prior}, {ip}"),
                None => ip,
            };
            if let Ok(value) = HeaderValue::from_str(&forwarded) {
                headers.insert("x-forwarded-for", value);
            }
        }
        let proto = if ctx.tls().is_some() { "https" } else { "http" };
        headers.insert("x-forwarded-proto", HeaderValue::from_static(proto));
        if let Ok(id) = HeaderValue::from_str(&ctx.request_id().to_string()) {
            headers.insert("x-request-id", id);
        }
        headers
    }
}

#[async_trait]
impl Policy for ProxyPolicy {
    async fn execute(&self, ctx: &mut RequestContext) -> StepOutcome {
        let uri = match self.upstream_uri(ctx) {
            Ok(uri) => uri,
            Err(e) => return StepOutcome::Fail(e),
        };
        let headers = self.upstream_headers(ctx);
        let request_id = ctx.request_id();

        let mut request = Request::new(ctx.take_body());
        *request.method_mut() = ctx.method().clone();
        *request.uri_mut() = uri;
        *request.headers_mut() = headers;

        tracing::debug!(
            request_id = %request_id,
            service_endpoint = %self.service,
            uri = %request.uri(),
            "Proxying request"
        );

        match self.client.request(request).await {
            Ok(response) => {
                let (mut parts, body) = response.into_parts();
                strip_hop_by_hop(&mut parts.headers);
                StepOutcome::Terminate(axum::http::Response::from_parts(parts, Body::new(body)))
            }
            Err(e) => {
                tracing::warn!(
                    request_id = %request_id,
                    service_endpoint = %self.service,
                    error = %e,
                    "Upstream request failed"
                );
                StepOutcome::Terminate(text_response(StatusCode::BAD_GATEWAY, "Bad Gateway"))
            }
        }
    }
}

/// Remove hop-by-hop headers, including any listed in `Connection`.
fn strip_hop_by_hop(headers: &mut HeaderMap) {
    let listed: Vec<HeaderName> = headers
        .get_all(header::CONNECTION)
        .iter()
        .filter_map(|v| v.to_str().ok())
        .flat_map(|v| v.split(','))
        .filter_map(|name| HeaderName::from_bytes(name.trim().as_bytes()).ok())
        .collect();
    for name in &listed {
        headers.remove(name);
    }
    for name in HOP_BY_HOP {
        headers.remove(name);
    }
}
