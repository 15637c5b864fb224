//! `log`: emit a templated message and continue.

use std::sync::Arc;

use async_trait::async_trait;
use serde::Deserialize;
use serde_json::Value;

use crate::config::schema::GatewayConfig;
use crate::context::RequestContext;
use crate::expression::{ExpressionError, Template};
use crate::pipeline::policy::{parse_action, Policy, PolicyError, StepOutcome};

#[derive(Debug, Clone, Copy, Default, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
    Trace,
    Debug,
    #[default]
    Info,
    Warn,
    Error,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default, deny_unknown_fields)]
struct LogAction {
    message: String,
    level: LogLevel,
}

#[derive(Debug)]
pub struct LogPolicy {
    source: String,
    // Parse errors surface per request as a failed message.
    template: Result<Template, ExpressionError>,
    level: LogLevel,
}

pub fn build(action: &Value, _config: &GatewayConfig) -> Result<Arc<dyn Policy>, PolicyError> {
    let action: LogAction = parse_action(action)?;
    let template = Template::parse(&action.message);
    if let Err(e) = &template {
        tracing::warn!(template = %action.message, error = %e, "log policy message will not render");
    }
    Ok(Arc::new(LogPolicy {
        source: action.message,
        template,
        level: action.level,
    }))
}

impl LogPolicy {
    /// Render the message for this request.
    pub fn message(&self, ctx: &RequestContext) -> Result<String, ExpressionError> {
        match &self.template {
            Ok(template) => ctx.render(template),
            Err(e) => Err(e.clone()),
        }
    }
}

#[async_trait]
impl Policy for LogPolicy {
    async fn execute(&self, ctx: &mut RequestContext) -> StepOutcome {
        match self.message(ctx) {
            Ok(message) => emit(self.level, &message),
            Err(e) => tracing::error!(
                target: "policy_gateway::policy::log",
                request_id = %ctx.request_id(),
                template = %self.source,
                error = %e,
                "failed to build log message"
            ),
        }
        StepOutcome::Continue
    }
}

fn emit(level: LogLevel, message: &str) {
    match level {
        LogLevel::Trace => tracing::trace!(target: "policy_gateway::policy::log", "{message}"),
        LogLevel::Debug => tracing::debug!(target: "policy_gateway::policy::log", "{message}"),
        LogLevel::Info => tracing::info!(target: "policy_gateway::policy::log", "{message}"),
        LogLevel::Warn => tracing::warn!(target: "policy_gateway::policy::log", "{message}"),
        LogLevel::Error => tracing::error!(target: "policy_gateway::policy::log", "{message}"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::context::{RequestId, RouteInfo};
    use axum::body::Body;
    use axum::http::Request;
    use serde_json::json;

    fn ctx() -> RequestContext {
        let request = Request::builder().method("GET").uri("/test").body(Body::empty()).unwrap();
        RequestContext::new(RequestId::new(), request, RouteInfo::default())
    }

    fn log_policy(message: &str) -> LogPolicy {
        let action: LogAction = parse_action(&json!({ "message": message })).unwrap();
        LogPolicy {
            source: action.message.clone(),
            template: Template::parse(&action.message),
            level: action.level,
        }
    }

    #[tokio::test]
    async fn renders_url_and_method() {
        let policy = log_policy("${req.url} ${egContext.req.method}");
        let mut ctx = ctx();
        assert_eq!(policy.message(&ctx).unwrap(), "/test GET");
        assert!(matches!(policy.execute(&mut ctx).await, StepOutcome::Continue));
    }

    #[tokio::test]
    async fn request_id_is_available() {
        let policy = log_policy("${egContext.requestID}");
        let ctx = ctx();
        assert_eq!(policy.message(&ctx).unwrap(), ctx.request_id().to_string());
    }

    #[tokio::test]
    async fn escaping_the_sandbox_fails_but_continues() {
        for message in ["${process.exit(1)}", "${process.env}"] {
            let policy = log_policy(message);
            let mut ctx = ctx();
            assert!(policy.message(&ctx).is_err());
            assert!(matches!(policy.execute(&mut ctx).await, StepOutcome::Continue));
        }
    }

    #[test]
    fn level_parsing() {
        assert!(build(&json!({ "message": "x", "level": "warn" }), &GatewayConfig::default()).is_ok());
        assert!(build(&json!({ "message": "x", "level": "loud" }), &GatewayConfig::default()).is_err());
    }
}
