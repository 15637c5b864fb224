//! `headers`: add templated request headers before proxying.

use std::collections::BTreeMap;
use std::sync::Arc;

use async_trait::async_trait;
use axum::http::{HeaderName, HeaderValue};
use serde::Deserialize;
use serde_json::Value;

use crate::config::schema::GatewayConfig;
use crate::context::RequestContext;
use crate::expression::Template;
use crate::pipeline::policy::{parse_action, Policy, PolicyError, StepOutcome};

#[derive(Debug, Default, Deserialize)]
#[serde(default, deny_unknown_fields)]
struct HeadersAction {
    request_headers_prefix: String,
    forward_headers: BTreeMap<String, String>,
}

#[derive(Debug)]
pub struct HeadersPolicy {
    headers: Vec<(HeaderName, Template)>,
}

pub fn build(action: &Value, _config: &GatewayConfig) -> Result<Arc<dyn Policy>, PolicyError> {
    let action: HeadersAction = parse_action(action)?;
    let mut headers = Vec::with_capacity(action.forward_headers.len());
    for (name, template) in &action.forward_headers {
        let full = format!("{}{}", action.request_headers_prefix, name);
        let header = HeaderName::from_bytes(full.as_bytes())
            .map_err(|_| PolicyError::InvalidParams(format!("invalid header name `{full}`")))?;
        let template = Template::parse(template)
            .map_err(|e| PolicyError::InvalidParams(format!("header `{full}`: {e}")))?;
        headers.push((header, template));
    }
    Ok(Arc::new(HeadersPolicy { headers }))
}

#[async_trait]
impl Policy for HeadersPolicy {
    async fn execute(&self, ctx: &mut RequestContext) -> StepOutcome {
        let bindings = ctx.bindings();
        for (name, template) in &self.headers {
            let value = template
                .render(&bindings)
                .map_err(|e| e.to_string())
                .and_then(|v| HeaderValue::from_str(&v).map_err(|e| e.to_string()));
            match value {
                Ok(value) => {
                    ctx.headers_mut().insert(name.clone(), value);
                }
                Err(error) => tracing::warn!(
                    request_id = %ctx.request_id(),
                    header = %name,
                    error = %error,
                    "Skipping header whose value could not be built"
                ),
            }
        }
        StepOutcome::Continue
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::context::{RequestId, RouteInfo};
    use axum::body::Body;
    use axum::http::Request;
    use serde_json::json;

    #[tokio::test]
    async fn sets_prefixed_headers() {
        let policy = build(
            &json!({
                "request_headers_prefix": "x-eg-",
                "forward_headers": {
                    "id": "${requestID}",
                    "endpoint": "${egContext.apiEndpoint}",
                    "broken": "${req.nothing.here}"
                }
            }),
            &GatewayConfig::default(),
        )
        .unwrap();

        let request = Request::builder().uri("/").body(Body::empty()).unwrap();
        let route = RouteInfo {
            api_endpoint: "api".into(),
            ..RouteInfo::default()
        };
        let mut ctx = RequestContext::new(RequestId::new(), request, route);

        assert!(matches!(policy.execute(&mut ctx).await, StepOutcome::Continue));
        assert_eq!(ctx.headers()["x-eg-id"], ctx.request_id().to_string().as_str());
        assert_eq!(ctx.headers()["x-eg-endpoint"], "api");
        assert!(!ctx.headers().contains_key("x-eg-broken"));
    }

    #[test]
    fn rejects_bad_names_and_templates() {
        let config = GatewayConfig::default();
        assert!(build(&json!({ "forward_headers": { "bad name": "x" } }), &config).is_err());
        assert!(build(&json!({ "forward_headers": { "x": "${a(1)}" } }), &config).is_err());
    }
}
