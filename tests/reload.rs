//! Hot reload of routes and pipelines on a running gateway.

mod common;

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use axum::http::StatusCode;
use serde::Deserialize;
use serde_json::Value;
use tokio::sync::{broadcast, mpsc};

use policy_gateway::config::watcher::reload_from;
use policy_gateway::context::RequestContext;
use policy_gateway::gateway::spawn_reload_task;
use policy_gateway::pipeline::{Policy, PolicyError, StepOutcome};
use policy_gateway::{Gateway, GatewayConfig, PolicyRegistry};

/// Answers with its configured message after a delay.
#[derive(Debug, Deserialize)]
struct Slow {
    message: String,
}

#[async_trait]
impl Policy for Slow {
    async fn execute(&self, _ctx: &mut RequestContext) -> StepOutcome {
        tokio::time::sleep(Duration::from_millis(300)).await;
        StepOutcome::Terminate(axum::http::Response::new(self.message.clone().into()))
    }
}

fn slow(action: &Value, _: &GatewayConfig) -> Result<Arc<dyn Policy>, PolicyError> {
    let slow: Slow = serde_json::from_value(action.clone()).map_err(|e| PolicyError::InvalidParams(e.to_string()))?;
    Ok(Arc::new(slow))
}

fn registry() -> PolicyRegistry {
    let mut registry = PolicyRegistry::with_builtins();
    registry.register("slow", slow);
    registry
}

fn config(generation: &str, extra_endpoint: bool) -> String {
    let mut toml = format!(
        r#"
        policies = ["slow", "terminate"]
        [http]
        bind_address = "127.0.0.1:0"
        [[api_endpoints]]
        name = "slow"
        paths = "/slow"
        [[api_endpoints]]
        name = "fast"
        paths = "/fast"
        [[pipelines]]
        name = "slow"
        api_endpoints = "slow"
        [[pipelines.policies]]
        slow = {{ action = {{ message = "{generation}" }} }}
        [[pipelines]]
        name = "fast"
        api_endpoints = "fast"
        [[pipelines.policies]]
        terminate = {{ action = {{ status_code = 200, message = "{generation}" }} }}
        "#
    );
    if extra_endpoint {
        toml.push_str(
            r#"
        [[api_endpoints]]
        name = "added"
        paths = "/added"
        [[pipelines]]
        name = "added"
        api_endpoints = "added"
        [[pipelines.policies]]
        terminate = { action = { status_code = 201, message = "added" } }
        "#,
        );
    }
    toml
}

fn write_config(file: &tempfile::NamedTempFile, content: &str) {
    std::fs::write(file.path(), content).unwrap();
}

async fn wait_for_version(gateway: &Gateway, version: u64) {
    for _ in 0..100 {
        if gateway.snapshot().version() >= version {
            return;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    panic!("snapshot version never reached {version}");
}

#[tokio::test]
async fn reload_swaps_routes_and_pins_in_flight_requests() {
    let file = tempfile::Builder::new().suffix(".toml").tempfile().unwrap();
    write_config(&file, &config("v1", false));

    let gateway = common::gateway_with(&config("v1", false), registry());
    let running = common::start_gateway(Arc::clone(&gateway)).await;
    let (tx, rx) = mpsc::unbounded_channel();
    let (stop_tx, stop_rx) = broadcast::channel(1);
    let reload_task = spawn_reload_task(Arc::clone(&gateway), rx, stop_rx);
    let client = reqwest::Client::new();

    let response = client.get(running.http_url("/added")).send().await.unwrap();
    assert_eq!(response.status(), StatusCode::NOT_FOUND);

    // Starts under v1 and must finish under v1.
    let in_flight = tokio::spawn({
        let client = client.clone();
        let url = running.http_url("/slow");
        async move { client.get(url).send().await.unwrap().text().await.unwrap() }
    });
    tokio::time::sleep(Duration::from_millis(50)).await;

    write_config(&file, &config("v2", true));
    reload_from(file.path(), &tx);
    wait_for_version(&gateway, 2).await;

    assert_eq!(in_flight.await.unwrap(), "v1");
    let fast = client.get(running.http_url("/fast")).send().await.unwrap();
    assert_eq!(fast.text().await.unwrap(), "v2");
    let added = client.get(running.http_url("/added")).send().await.unwrap();
    assert_eq!(added.status(), StatusCode::CREATED);

    // A broken file never reaches the gateway.
    write_config(&file, "[[pipelines]]\nname = \"orphan\"\napi_endpoints = \"missing\"\n");
    reload_from(file.path(), &tx);
    tokio::time::sleep(Duration::from_millis(50)).await;
    assert_eq!(gateway.snapshot().version(), 2);
    let fast = client.get(running.http_url("/fast")).send().await.unwrap();
    assert_eq!(fast.text().await.unwrap(), "v2");

    stop_tx.send(()).unwrap();
    reload_task.await.unwrap();
    running.stop().await;
}

#[tokio::test]
async fn rejected_snapshot_keeps_serving_previous_one() {
    let gateway = common::gateway_with(&config("v1", false), registry());

    // Passes validation, but the slow step cannot be built without a message.
    let broken_toml = config("v2", false).replace(r#"slow = { action = { message = "v2" } }"#, r#"slow = { action = { } }"#);
    let broken: GatewayConfig = toml::from_str(&broken_toml).unwrap();
    assert!(gateway.reload(broken).is_err());
    assert_eq!(gateway.snapshot().version(), 1);

    let mut emptied = common::config(&config("v2", false));
    emptied.pipelines[0].policies.clear();
    let version = gateway.reload(emptied).unwrap();
    assert!(version > 1);
    assert!(gateway.snapshot().pipeline("slow").unwrap().is_empty());
}
