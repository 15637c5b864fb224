//! Per-request driver.
//!
//! # Responsibilities
//! - Pin the current snapshot for the lifetime of the request
//! - Resolve the endpoint, build the context, run the chain
//! - Turn every chain outcome into exactly one response
//!
//! # Request States
//! ```text
//! Received → Resolved → Piped → Completed
//!     └──────────┴─────────┴──→ Failed (500)
//! no endpoint / chain exhausted → 404
//! ```

use std::time::Instant;

use axum::body::Body;
use axum::http::{HeaderValue, Request, Response, StatusCode};
use axum::response::IntoResponse;
use axum::Json;
use serde_json::json;

use crate::context::{host_of, RequestContext, RequestId};
use crate::gateway::Gateway;
use crate::observability::metrics;
use crate::pipeline::ChainOutcome;

pub const X_REQUEST_ID: &str = "x-request-id";

impl Gateway {
    /// Dispatch one request through the snapshot active when it arrived.
    ///
    /// Dropping the returned future (client gone) stops the chain at its
    /// current await point; no further policies run.
    pub async fn dispatch(&self, request: Request<Body>) -> Response<Body> {
        let start = Instant::now();
        let snapshot = self.snapshot();
        let request_id = RequestId::new();
        let method = request.method().clone();
        let host = host_of(&request);

        let Some((route, chain)) = snapshot.resolve(host.as_deref(), request.uri().path(), &method) else {
            tracing::debug!(
                request_id = %request_id,
                method = %method,
                host = host.as_deref().unwrap_or(""),
                path = %request.uri().path(),
                "No endpoint matched"
            );
            let response = finalize(not_found(request_id), request_id);
            metrics::record_request(method.as_str(), response.status().as_u16(), "none", start);
            return response;
        };

        let api_endpoint = route.api_endpoint.clone();
        let mut ctx = RequestContext::new(request_id, request, route);

        tracing::debug!(
            request_id = %request_id,
            api_endpoint = %api_endpoint,
            pipeline = %chain.name(),
            version = snapshot.version(),
            "Request resolved"
        );

        let response = match chain.execute(&mut ctx).await {
            ChainOutcome::Responded => ctx
                .take_response()
                .unwrap_or_else(|| internal_error(request_id)),
            ChainOutcome::Exhausted => {
                tracing::warn!(
                    request_id = %request_id,
                    api_endpoint = %api_endpoint,
                    pipeline = %chain.name(),
                    "Pipeline finished without a response"
                );
                not_found(request_id)
            }
            ChainOutcome::Failed { policy, error } => {
                metrics::record_policy_failure(chain.name(), &policy);
                tracing::error!(
                    request_id = %request_id,
                    api_endpoint = %api_endpoint,
                    pipeline = %chain.name(),
                    policy = %policy,
                    error = %error,
                    "Policy failed"
                );
                // A response written before the failure still wins.
                ctx.take_response().unwrap_or_else(|| internal_error(request_id))
            }
        };
        ctx.finish();

        let response = finalize(response, request_id);
        metrics::record_request(method.as_str(), response.status().as_u16(), &api_endpoint, start);
        response
    }
}

fn not_found(request_id: RequestId) -> Response<Body> {
    error_response(StatusCode::NOT_FOUND, "Not Found", request_id)
}

fn internal_error(request_id: RequestId) -> Response<Body> {
    error_response(StatusCode::INTERNAL_SERVER_ERROR, "Internal Server Error", request_id)
}

fn error_response(status: StatusCode, message: &str, request_id: RequestId) -> Response<Body> {
    (
        status,
        Json(json!({
            "error": message,
            "request_id": request_id.to_string(),
        })),
    )
        .into_response()
}

fn finalize(mut response: Response<Body>, request_id: RequestId) -> Response<Body> {
    if let Ok(value) = HeaderValue::from_str(&request_id.to_string()) {
        response.headers_mut().insert(X_REQUEST_ID, value);
    }
    response
}
