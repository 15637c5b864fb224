//! Endpoint resolution through the full Axum app.

mod common;

use axum::body::Body;
use axum::http::{Request, StatusCode};
use tower::ServiceExt;

use policy_gateway::gateway::X_REQUEST_ID;
use policy_gateway::HttpServer;

const CONFIG: &str = r#"
policies = ["terminate"]

[http]
bind_address = "127.0.0.1:0"

[[api_endpoints]]
name = "admin"
host = "admin.example.com"
paths = "/admin/*"

[[api_endpoints]]
name = "order"
host = "*.example.com"
paths = "/orders/:id"
methods = "GET, DELETE"

[[api_endpoints]]
name = "cats"
[[api_endpoints.variants]]
path_regex = "/wild-cats$"
methods = "POST,PUT"
[[api_endpoints.variants]]
path = "/tame-cats"
methods = ["GET"]

[[api_endpoints]]
name = "fallback"
host = "*"
paths = "/*"

[[api_endpoints]]
name = "unbound"
paths = "/never"

[[pipelines]]
name = "admin"
api_endpoints = "admin"
[[pipelines.policies]]
terminate = { action = { status_code = 200, message = "admin" } }

[[pipelines]]
name = "order"
api_endpoint = "order"
[[pipelines.policies]]
terminate = { action = { status_code = 200, message = "order" } }

[[pipelines]]
name = "cats"
api_endpoints = ["cats"]
[[pipelines.policies]]
terminate = { action = { status_code = 200, message = "cats" } }

[[pipelines]]
name = "fallback"
api_endpoints = ["fallback"]
[[pipelines.policies]]
terminate = { action = { status_code = 200, message = "fallback" } }
"#;

async fn endpoint_for(method: &str, host: Option<&str>, path: &str) -> (StatusCode, String) {
    let server = HttpServer::new(common::gateway(CONFIG));
    let mut request = Request::builder().method(method).uri(path);
    if let Some(host) = host {
        request = request.header("host", host);
    }
    let response = server
        .app()
        .oneshot(request.body(Body::empty()).unwrap())
        .await
        .unwrap();
    let status = response.status();
    (status, common::body_text(response).await)
}

#[tokio::test]
async fn trailing_wildcard_covers_prefix_and_children() {
    for path in ["/admin", "/admin/", "/admin/users/7"] {
        let (status, body) = endpoint_for("GET", Some("admin.example.com"), path).await;
        assert_eq!(status, StatusCode::OK, "{path}");
        assert_eq!(body, "admin", "{path}");
    }
    let (_, body) = endpoint_for("GET", Some("admin.example.com"), "/administrator").await;
    assert_eq!(body, "fallback");
}

#[tokio::test]
async fn host_patterns_are_case_insensitive_and_ignore_port() {
    let (_, body) = endpoint_for("GET", Some("ADMIN.example.com:8080"), "/admin/x").await;
    assert_eq!(body, "admin");

    let (_, body) = endpoint_for("GET", Some("shop.example.com"), "/orders/42").await;
    assert_eq!(body, "order");

    // the bare suffix is not a subdomain of itself
    let (_, body) = endpoint_for("GET", Some("example.com"), "/orders/42").await;
    assert_eq!(body, "fallback");
}

#[tokio::test]
async fn method_lists_filter_matches() {
    let (_, body) = endpoint_for("DELETE", Some("shop.example.com"), "/orders/42").await;
    assert_eq!(body, "order");
    let (_, body) = endpoint_for("POST", Some("shop.example.com"), "/orders/42").await;
    assert_eq!(body, "fallback");
}

#[tokio::test]
async fn variants_are_alternatives() {
    let (_, body) = endpoint_for("PUT", Some("pets.test"), "/big/wild-cats").await;
    assert_eq!(body, "cats");
    let (_, body) = endpoint_for("GET", Some("pets.test"), "/tame-cats").await;
    assert_eq!(body, "cats");
    let (_, body) = endpoint_for("GET", Some("pets.test"), "/big/wild-cats").await;
    assert_eq!(body, "fallback");
}

#[tokio::test]
async fn unbound_endpoints_never_match() {
    let (_, body) = endpoint_for("GET", Some("any.test"), "/never").await;
    assert_eq!(body, "fallback");
}

#[tokio::test]
async fn miss_returns_json_not_found() {
    let config = r#"
        policies = ["terminate"]
        [http]
        bind_address = "127.0.0.1:0"
        [[api_endpoints]]
        name = "only"
        host = "only.test"
        paths = "/only"
        [[pipelines]]
        name = "only"
        api_endpoints = "only"
        [[pipelines.policies]]
        terminate = { action = { status_code = 204 } }
    "#;
    let server = HttpServer::new(common::gateway(config));
    let response = server
        .app()
        .oneshot(
            Request::builder()
                .uri("/only")
                .header("host", "other.test")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::NOT_FOUND);
    let request_id = response
        .headers()
        .get(X_REQUEST_ID)
        .and_then(|v| v.to_str().ok())
        .map(str::to_string)
        .unwrap();
    let body = common::body_json(response).await;
    assert_eq!(body["error"], "Not Found");
    assert_eq!(body["request_id"], request_id.as_str());
}
