//! `terminate`: respond immediately.

use std::sync::Arc;

use async_trait::async_trait;
use axum::http::StatusCode;
use serde::Deserialize;
use serde_json::Value;

use crate::config::schema::GatewayConfig;
use crate::context::RequestContext;
use crate::pipeline::policy::{parse_action, text_response, Policy, PolicyError, StepOutcome};

#[derive(Debug, Deserialize)]
#[serde(default, deny_unknown_fields)]
struct TerminateAction {
    status_code: u16,
    message: String,
}

impl Default for TerminateAction {
    fn default() -> Self {
        Self {
            status_code: 400,
            message: "Terminated".to_string(),
        }
    }
}

#[derive(Debug)]
pub struct TerminatePolicy {
    status: StatusCode,
    message: String,
}

pub fn build(action: &Value, _config: &GatewayConfig) -> Result<Arc<dyn Policy>, PolicyError> {
    let action: TerminateAction = parse_action(action)?;
    let status = StatusCode::from_u16(action.status_code)
        .map_err(|_| PolicyError::InvalidParams(format!("invalid status code {}", action.status_code)))?;
    Ok(Arc::new(TerminatePolicy {
        status,
        message: action.message,
    }))
}

#[async_trait]
impl Policy for TerminatePolicy {
    async fn execute(&self, _ctx: &mut RequestContext) -> StepOutcome {
        StepOutcome::Terminate(text_response(self.status, self.message.clone()))
    }
}
