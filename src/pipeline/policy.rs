//! Policy step contract.

use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;
use axum::body::Body;
use axum::http::{header, Response, StatusCode};
use serde::de::DeserializeOwned;
use serde_json::Value;
use thiserror::Error;

use crate::config::schema::GatewayConfig;
use crate::context::RequestContext;

/// Failure of a single policy, either at build time or while serving.
#[derive(Debug, Error)]
pub enum PolicyError {
    #[error("invalid action parameters: {0}")]
    InvalidParams(String),

    #[error("{0}")]
    Execution(String),

    #[error("upstream request failed: {0}")]
    Upstream(String),

    #[error("policy panicked: {0}")]
    Panicked(String),
}

/// What a step decided for the request.
#[derive(Debug)]
pub enum StepOutcome {
    /// Run the next step.
    Continue,
    /// Respond with this and stop the chain.
    Terminate(Response<Body>),
    /// Abort the request with a server error.
    Fail(PolicyError),
}

/// A compiled, configured policy instance.
///
/// Instances are shared by every request on the snapshot, so all
/// per-request state goes through the context.
#[async_trait]
pub trait Policy: Send + Sync + fmt::Debug {
    async fn execute(&self, ctx: &mut RequestContext) -> StepOutcome;
}

/// Builds a policy from its `action` object.
pub trait PolicyFactory: Send + Sync {
    fn build(&self, action: &Value, config: &GatewayConfig) -> Result<Arc<dyn Policy>, PolicyError>;
}

impl<F> PolicyFactory for F
where
    F: Fn(&Value, &GatewayConfig) -> Result<Arc<dyn Policy>, PolicyError> + Send + Sync,
{
    fn build(&self, action: &Value, config: &GatewayConfig) -> Result<Arc<dyn Policy>, PolicyError> {
        self(action, config)
    }
}

/// Deserialize an action object; a missing action means all defaults.
pub fn parse_action<T>(action: &Value) -> Result<T, PolicyError>
where
    T: DeserializeOwned + Default,
{
    if action.is_null() {
        return Ok(T::default());
    }
    serde_json::from_value(action.clone()).map_err(|e| PolicyError::InvalidParams(e.to_string()))
}

/// Plain-text response used by built-in policies.
pub fn text_response(status: StatusCode, message: impl Into<String>) -> Response<Body> {
    let mut response = Response::new(Body::from(message.into()));
    *response.status_mut() = status;
    response.headers_mut().insert(
        header::CONTENT_TYPE,
        header::HeaderValue::from_static("text/plain; charset=utf-8"),
    );
    response
}
