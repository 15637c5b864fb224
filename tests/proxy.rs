//! Proxying over real sockets.

mod common;

use reqwest::StatusCode;
use serde_json::Value;

fn proxy_config(service_url: &str) -> String {
    format!(
        r#"
        policies = ["proxy"]

        [http]
        bind_address = "127.0.0.1:0"

        [[service_endpoints]]
        name = "backend"
        url = "{service_url}"

        [[api_endpoints]]
        name = "api"
        paths = "/api/*"

        [[api_endpoints]]
        name = "raw"
        paths = "/raw/*"

        [[pipelines]]
        name = "api"
        api_endpoints = "api"
        [[pipelines.policies]]
        proxy = {{ action = {{ service_endpoint = "backend", strip_path = true, change_origin = true }} }}

        [[pipelines]]
        name = "raw"
        api_endpoints = "raw"
        [[pipelines.policies]]
        proxy = {{ action = {{ service_endpoint = "backend" }} }}
        "#
    )
}

#[tokio::test]
async fn strips_matched_prefix_and_rewrites_host() {
    let backend = common::start_echo_backend().await;
    let running = common::start_gateway(common::gateway(&proxy_config(&format!("http://{backend}/base")))).await;
    let client = reqwest::Client::new();

    let response = client
        .get(running.http_url("/api/users/1?active=true"))
        .header("x-custom", "kept")
        .header("connection", "keep-alive")
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let request_id = response.headers()["x-request-id"].to_str().unwrap().to_string();
    let echoed: Value = response.json().await.unwrap();

    assert_eq!(echoed["uri"], "/base/users/1?active=true");
    assert_eq!(echoed["headers"]["host"], backend.to_string());
    assert_eq!(echoed["headers"]["x-custom"], "kept");
    assert_eq!(echoed["headers"]["x-forwarded-for"], "127.0.0.1");
    assert_eq!(echoed["headers"]["x-request-id"], request_id.as_str());

    running.stop().await;
}

#[tokio::test]
async fn keeps_path_and_streams_body() {
    let backend = common::start_echo_backend().await;
    let running = common::start_gateway(common::gateway(&proxy_config(&format!("http://{backend}")))).await;
    let client = reqwest::Client::new();

    let response = client
        .post(running.http_url("/raw/upload"))
        .body("payload bytes")
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let echoed: Value = response.json().await.unwrap();

    assert_eq!(echoed["method"], "POST");
    assert_eq!(echoed["uri"], "/raw/upload");
    assert_eq!(echoed["body"], "payload bytes");
    assert_ne!(echoed["headers"]["host"], backend.to_string());

    running.stop().await;
}

#[tokio::test]
async fn unreachable_upstream_is_bad_gateway() {
    let closed = {
        let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
        listener.local_addr().unwrap()
    };
    let running = common::start_gateway(common::gateway(&proxy_config(&format!("http://{closed}")))).await;

    let response = reqwest::get(running.http_url("/raw/anything")).await.unwrap();
    assert_eq!(response.status(), StatusCode::BAD_GATEWAY);
    assert!(response.headers().contains_key("x-request-id"));

    running.stop().await;
}
