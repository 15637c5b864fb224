//! `basic-auth` and `key-auth`.
//!
//! Both extract a credential, ask the [`CredentialService`] to authenticate
//! it, check the endpoint's scopes with `authorize`, and record the consumer
//! on the context. Missing or rejected credentials answer 401 unless the
//! step is configured as `passthrough`.

use std::sync::Arc;

use async_trait::async_trait;
use axum::body::Body;
use axum::http::{header, HeaderValue, Response, StatusCode};
use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use serde::Deserialize;
use serde_json::Value;

use crate::config::schema::GatewayConfig;
use crate::context::RequestContext;
use crate::pipeline::credentials::{CredentialKind, CredentialService};
use crate::pipeline::policy::{parse_action, text_response, Policy, PolicyError, PolicyFactory, StepOutcome};
use crate::pipeline::registry::PolicyRegistry;

/// Register both auth policies against one credential service.
pub fn register(registry: &mut PolicyRegistry, service: Arc<dyn CredentialService>) {
    registry
        .register(
            "basic-auth",
            AuthFactory {
                kind: CredentialKind::BasicAuth,
                service: Arc::clone(&service),
            },
        )
        .register(
            "key-auth",
            AuthFactory {
                kind: CredentialKind::KeyAuth,
                service,
            },
        );
}

struct AuthFactory {
    kind: CredentialKind,
    service: Arc<dyn CredentialService>,
}

impl PolicyFactory for AuthFactory {
    fn build(&self, action: &Value, _config: &GatewayConfig) -> Result<Arc<dyn Policy>, PolicyError> {
        let service = Arc::clone(&self.service);
        Ok(match self.kind {
            CredentialKind::BasicAuth => {
                let action: BasicAuthAction = parse_action(action)?;
                Arc::new(BasicAuthPolicy {
                    service,
                    passthrough: action.passthrough,
                })
            }
            CredentialKind::KeyAuth => {
                let action: KeyAuthAction = parse_action(action)?;
                Arc::new(KeyAuthPolicy { service, action })
            }
        })
    }
}

#[derive(Debug, Default, Deserialize)]
#[serde(default, deny_unknown_fields)]
struct BasicAuthAction {
    passthrough: bool,
}

#[derive(Debug, Deserialize)]
#[serde(default, deny_unknown_fields)]
struct KeyAuthAction {
    /// Header carrying the key.
    header: String,
    /// Scheme expected before the key in the header.
    header_scheme: String,
    /// Accept the raw key without a scheme.
    disable_header_scheme: bool,
    /// Do not look at headers at all.
    disable_headers: bool,
    /// Query parameter carrying the key.
    query_param: String,
    passthrough: bool,
}

impl Default for KeyAuthAction {
    fn default() -> Self {
        Self {
            header: "Authorization".to_string(),
            header_scheme: "apiKey".to_string(),
            disable_header_scheme: false,
            disable_headers: false,
            query_param: "apiKey".to_string(),
            passthrough: false,
        }
    }
}

#[derive(Debug)]
pub struct BasicAuthPolicy {
    service: Arc<dyn CredentialService>,
    passthrough: bool,
}

#[derive(Debug)]
pub struct KeyAuthPolicy {
    service: Arc<dyn CredentialService>,
    action: KeyAuthAction,
}

#[async_trait]
impl Policy for BasicAuthPolicy {
    async fn execute(&self, ctx: &mut RequestContext) -> StepOutcome {
        let credential = ctx
            .headers()
            .get(header::AUTHORIZATION)
            .and_then(|v| v.to_str().ok())
            .and_then(|v| strip_scheme(v, "basic"))
            .and_then(|encoded| STANDARD.decode(encoded.trim()).ok())
            .and_then(|raw| String::from_utf8(raw).ok())
            .and_then(|decoded| {
                decoded
                    .split_once(':')
                    .map(|(user, pass)| (user.to_string(), pass.to_string()))
            });

        authenticate(
            ctx,
            &*self.service,
            CredentialKind::BasicAuth,
            credential,
            self.passthrough,
        )
        .await
    }
}

impl KeyAuthPolicy {
    fn extract(&self, ctx: &RequestContext) -> Option<(String, String)> {
        let from_header = if self.action.disable_headers {
            None
        } else {
            ctx.headers()
                .get(self.action.header.as_str())
                .and_then(|v| v.to_str().ok())
                .and_then(|v| {
                    if self.action.disable_header_scheme {
                        Some(v.trim())
                    } else {
                        strip_scheme(v, &self.action.header_scheme)
                    }
                })
                .map(str::to_string)
        };

        let key = from_header.or_else(|| {
            ctx.uri().query().and_then(|q| {
                url::form_urlencoded::parse(q.as_bytes())
                    .find(|(k, _)| k == self.action.query_param.as_str())
                    .map(|(_, v)| v.into_owned())
            })
        })?;

        key.split_once(':')
            .map(|(id, secret)| (id.to_string(), secret.to_string()))
    }
}

#[async_trait]
impl Policy for KeyAuthPolicy {
    async fn execute(&self, ctx: &mut RequestContext) -> StepOutcome {
        let credential = self.extract(ctx);
        authenticate(
            ctx,
            &*self.service,
            CredentialKind::KeyAuth,
            credential,
            self.action.passthrough,
        )
        .await
    }
}

/// `"Basic abc"` → `"abc"`; the scheme is case-insensitive.
fn strip_scheme<'a>(value: &'a str, scheme: &str) -> Option<&'a str> {
    let (given, rest) = value.trim().split_once(' ')?;
    given.eq_ignore_ascii_case(scheme).then(|| rest.trim())
}

async fn authenticate(
    ctx: &mut RequestContext,
    service: &dyn CredentialService,
    kind: CredentialKind,
    credential: Option<(String, String)>,
    passthrough: bool,
) -> StepOutcome {
    let Some((id, secret)) = credential else {
        return reject(ctx, kind, passthrough, "missing credentials");
    };

    let identity = match service.authenticate(&id, &secret, kind).await {
        Ok(Some(identity)) => identity,
        Ok(None) => return reject(ctx, kind, passthrough, "invalid credentials"),
        Err(e) => return StepOutcome::Fail(e),
    };

    let required = ctx.required_scopes().to_vec();
    match service.authorize(&identity, kind, &required).await {
        Ok(true) => {
            tracing::debug!(
                request_id = %ctx.request_id(),
                consumer = %identity.consumer.id,
                kind = %kind,
                "Consumer authenticated"
            );
            ctx.set_consumer(identity.consumer, identity.scopes);
            StepOutcome::Continue
        }
        Ok(false) => reject(ctx, kind, passthrough, "insufficient scopes"),
        Err(e) => StepOutcome::Fail(e),
    }
}

fn reject(ctx: &RequestContext, kind: CredentialKind, passthrough: bool, reason: &str) -> StepOutcome {
    tracing::debug!(
        request_id = %ctx.request_id(),
        api_endpoint = %ctx.api_endpoint(),
        kind = %kind,
        reason,
        passthrough,
        "Authentication rejected"
    );
    if passthrough {
        return StepOutcome::Continue;
    }
    StepOutcome::Terminate(unauthorized(kind))
}

fn unauthorized(kind: CredentialKind) -> Response<Body> {
    let mut response = text_response(StatusCode::UNAUTHORIZED, "Unauthorized");
    if kind == CredentialKind::BasicAuth {
        response.headers_mut().insert(
            header::WWW_AUTHENTICATE,
            HeaderValue::from_static("Basic realm=\"gateway\""),
        );
    }
    response
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::context::{Consumer, ConsumerKind, RequestId, RouteInfo};
    use crate::pipeline::credentials::Identity;
    use axum::http::Request;
    use serde_json::json;

    #[derive(Debug)]
    struct OneUser;

    #[async_trait]
    impl CredentialService for OneUser {
        async fn authenticate(
            &self,
            id: &str,
            secret: &str,
            _kind: CredentialKind,
        ) -> Result<Option<Identity>, PolicyError> {
            if id == "alice" && secret == "s3cret" {
                Ok(Some(Identity {
                    consumer: Consumer {
                        id: "u-1".into(),
                        kind: ConsumerKind::User,
                        username: Some("alice".into()),
                    },
                    scopes: vec!["read".into()],
                }))
            } else {
                Ok(None)
            }
        }
    }

    fn registry() -> PolicyRegistry {
        PolicyRegistry::new().with_credentials(Arc::new(OneUser))
    }

    fn ctx(builder: axum::http::request::Builder, scopes: &[&str]) -> RequestContext {
        let route = RouteInfo {
            api_endpoint: "api".into(),
            scopes: scopes.iter().map(|s| s.to_string()).collect(),
            ..RouteInfo::default()
        };
        RequestContext::new(RequestId::new(), builder.body(Body::empty()).unwrap(), route)
    }

    fn basic(user: &str, pass: &str) -> String {
        format!("basic {}", STANDARD.encode(format!("{user}:{pass}")))
    }

    async fn run(policy: &str, action: Value, ctx: &mut RequestContext) -> StepOutcome {
        let registry = registry();
        let factory = registry.get(policy).unwrap();
        let step = factory.build(&action, &GatewayConfig::default()).unwrap();
        step.execute(ctx).await
    }

    fn status(outcome: StepOutcome) -> Option<StatusCode> {
        match outcome {
            StepOutcome::Terminate(response) => Some(response.status()),
            StepOutcome::Continue => None,
            StepOutcome::Fail(e) => panic!("unexpected failure: {e}"),
        }
    }

    #[tokio::test]
    async fn basic_auth_flow() {
        let mut missing = ctx(Request::builder().uri("/"), &["read"]);
        assert_eq!(status(run("basic-auth", Value::Null, &mut missing).await), Some(StatusCode::UNAUTHORIZED));

        let mut wrong = ctx(
            Request::builder().uri("/").header("authorization", basic("alice", "nope")),
            &["read"],
        );
        assert_eq!(status(run("basic-auth", Value::Null, &mut wrong).await), Some(StatusCode::UNAUTHORIZED));

        let mut ok = ctx(
            Request::builder().uri("/").header("authorization", basic("alice", "s3cret")),
            &["read"],
        );
        assert_eq!(status(run("basic-auth", Value::Null, &mut ok).await), None);
        assert_eq!(ok.consumer().unwrap().username.as_deref(), Some("alice"));
        assert_eq!(ok.granted_scopes(), ["read".to_string()]);
    }

    #[tokio::test]
    async fn missing_scope_is_rejected() {
        let mut c = ctx(
            Request::builder().uri("/").header("authorization", basic("alice", "s3cret")),
            &["admin"],
        );
        assert_eq!(status(run("basic-auth", Value::Null, &mut c).await), Some(StatusCode::UNAUTHORIZED));
        assert!(c.consumer().is_none());
    }

    #[tokio::test]
    async fn passthrough_continues_anonymously() {
        let mut c = ctx(Request::builder().uri("/"), &[]);
        let outcome = run("basic-auth", json!({ "passthrough": true }), &mut c).await;
        assert_eq!(status(outcome), None);
        assert!(c.consumer().is_none());
    }

    #[tokio::test]
    async fn key_auth_sources() {
        let mut header = ctx(
            Request::builder().uri("/").header("authorization", "apiKey alice:s3cret"),
            &[],
        );
        assert_eq!(status(run("key-auth", Value::Null, &mut header).await), None);

        let mut custom = ctx(
            Request::builder().uri("/").header("x-key", "SCHEME1 alice:s3cret"),
            &[],
        );
        let action = json!({ "header": "x-key", "header_scheme": "scheme1" });
        assert_eq!(status(run("key-auth", action, &mut custom).await), None);

        let mut query = ctx(Request::builder().uri("/by_query?customApiKeyParam=alice:s3cret"), &[]);
        let action = json!({ "query_param": "customApiKeyParam", "disable_headers": true });
        assert_eq!(status(run("key-auth", action, &mut query).await), None);

        let mut wrong_scheme = ctx(
            Request::builder().uri("/").header("authorization", "Bearer alice:s3cret"),
            &[],
        );
        assert_eq!(
            status(run("key-auth", Value::Null, &mut wrong_scheme).await),
            Some(StatusCode::UNAUTHORIZED)
        );
    }

    #[test]
    fn scheme_is_case_insensitive() {
        assert_eq!(strip_scheme("Basic abc", "basic"), Some("abc"));
        assert_eq!(strip_scheme("BASIC   abc ", "basic"), Some("abc"));
        assert_eq!(strip_scheme("Bearer abc", "basic"), None);
        assert_eq!(strip_scheme("abc", "basic"), None);
    }
}
