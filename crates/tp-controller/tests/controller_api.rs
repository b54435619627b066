//! Controller adapter integration tests
//!
//! Runs the adapter against a fake controller served by axum.

use std::collections::HashMap;
use std::convert::Infallible;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use axum::body::Body;
use axum::extract::{Path, Query, State};
use axum::http::{HeaderMap, StatusCode};
use axum::routing::{get, put};
use axum::{Json, Router};
use futures::StreamExt;
use serde_json::{json, Value};

use tp_controller::ControllerEngine;
use tp_core::config::ControllerConfig;
use tp_core::model::{
    ConfigurationOverride, OverrideSlot, ProviderType, ProxySort, TunConfiguration, TunStack,
    TunnelMode,
};
use tp_core::traits::Engine;
use tp_core::EngineError;

const SECRET: &str = "s3cret";

#[derive(Default)]
struct FakeController {
    patches: Mutex<Vec<Value>>,
    selected: Mutex<HashMap<String, String>>,
    delay_queries: Mutex<Vec<HashMap<String, String>>>,
    gc_runs: AtomicUsize,
    log_chunks: Vec<Vec<u8>>,
}

fn authorized(headers: &HeaderMap) -> bool {
    headers
        .get("authorization")
        .and_then(|v| v.to_str().ok())
        .is_some_and(|v| v == format!("Bearer {}", SECRET))
}

async fn configs(headers: HeaderMap) -> Result<Json<Value>, StatusCode> {
    if !authorized(&headers) {
        return Err(StatusCode::UNAUTHORIZED);
    }
    Ok(Json(json!({
        "port": 0,
        "mixed-port": 7890,
        "allow-lan": false,
        "mode": "global",
        "log-level": "info",
        "ipv6": true
    })))
}

async fn patch_configs(
    State(fake): State<Arc<FakeController>>,
    Json(body): Json<Value>,
) -> StatusCode {
    fake.patches.lock().unwrap().push(body);
    StatusCode::NO_CONTENT
}

async fn proxies() -> Json<Value> {
    Json(json!({
        "proxies": {
            "GLOBAL": { "type": "Selector", "now": "Proxy", "all": ["Proxy", "Auto", "DIRECT"] },
            "Proxy": { "type": "Selector", "now": "hk-1", "all": ["jp-1", "hk-1"] },
            "Auto": { "type": "URLTest", "now": "hk-1", "all": ["hk-1", "jp-1"] },
            "hk-1": { "type": "Shadowsocks", "history": [{ "delay": 40 }] },
            "jp-1": { "type": "Vmess", "history": [{ "delay": 180 }] },
            "DIRECT": { "type": "Direct" }
        }
    }))
}

async fn select(
    State(fake): State<Arc<FakeController>>,
    Path(group): Path<String>,
    Json(body): Json<Value>,
) -> (StatusCode, String) {
    if group != "Proxy" {
        return (
            StatusCode::BAD_REQUEST,
            r#"{"message":"Selector update error: Must be a Selector"}"#.to_string(),
        );
    }
    let name = body["name"].as_str().unwrap_or_default().to_string();
    fake.selected.lock().unwrap().insert(group, name);
    (StatusCode::NO_CONTENT, String::new())
}

async fn connections() -> Json<Value> {
    Json(json!({ "downloadTotal": 1000, "uploadTotal": 24, "connections": [] }))
}

async fn proxy_providers() -> Json<Value> {
    Json(json!({
        "providers": {
            "airport": { "name": "airport", "type": "Proxy", "vehicleType": "HTTP", "updatedAt": "2026-10-01T00:00:00Z" },
            "default": { "name": "default", "type": "Proxy", "vehicleType": "Compatible" }
        }
    }))
}

async fn group_delay(
    State(fake): State<Arc<FakeController>>,
    Path(_group): Path<String>,
    Query(query): Query<HashMap<String, String>>,
) -> Json<Value> {
    fake.delay_queries.lock().unwrap().push(query);
    Json(json!({ "hk-1": 40, "jp-1": 180 }))
}

async fn logs(State(fake): State<Arc<FakeController>>) -> Body {
    let chunks: Vec<Result<Vec<u8>, Infallible>> =
        fake.log_chunks.iter().cloned().map(Ok).collect();
    Body::from_stream(futures::stream::iter(chunks))
}

fn default_log_chunks() -> Vec<Vec<u8>> {
    // The second record is split across chunks.
    vec![
        b"{\"type\":\"info\",\"payload\":\"one\"}\n{\"type\":\"warn".to_vec(),
        b"ing\",\"payload\":\"two\"}\n".to_vec(),
        b"\n{\"type\":\"error\",\"payload\":\"three\"}\n".to_vec(),
    ]
}

async fn gc(State(fake): State<Arc<FakeController>>) -> StatusCode {
    fake.gc_runs.fetch_add(1, Ordering::SeqCst);
    StatusCode::NO_CONTENT
}

async fn spawn_fake() -> (Arc<FakeController>, ControllerEngine) {
    spawn_fake_with_logs(default_log_chunks()).await
}

async fn spawn_fake_with_logs(
    log_chunks: Vec<Vec<u8>>,
) -> (Arc<FakeController>, ControllerEngine) {
    let fake = Arc::new(FakeController {
        log_chunks,
        ..FakeController::default()
    });

    let app = Router::new()
        .route("/configs", get(configs).patch(patch_configs))
        .route("/proxies", get(proxies))
        .route("/proxies/:name", put(select))
        .route("/connections", get(connections))
        .route("/providers/proxies", get(proxy_providers))
        .route("/providers/proxies/:name", put(|| async { StatusCode::NO_CONTENT }))
        .route("/group/:name/delay", get(group_delay))
        .route("/logs", get(logs))
        .route("/debug/gc", put(gc))
        .with_state(Arc::clone(&fake));

    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });

    let engine = ControllerEngine::new(&ControllerConfig {
        address: format!("http://{}", addr),
        secret: Some(SECRET.to_string()),
        ..ControllerConfig::default()
    })
    .unwrap();

    (fake, engine)
}

#[tokio::test]
async fn test_query_tunnel_state_and_configuration() {
    let (_fake, engine) = spawn_fake().await;

    let state = engine.query_tunnel_state().await.unwrap();
    assert_eq!(state.mode, TunnelMode::Global);

    let config = engine.query_configuration().await.unwrap();
    assert_eq!(config.mixed_port, 7890);
    assert!(config.ipv6);
}

#[tokio::test]
async fn test_missing_secret_is_rejected() {
    let (_fake, engine) = spawn_fake().await;

    let unauthenticated = ControllerEngine::new(&ControllerConfig {
        address: engine.client().url(&[]).to_string(),
        ..ControllerConfig::default()
    })
    .unwrap();

    let err = unauthenticated.query_tunnel_state().await.unwrap_err();
    assert!(matches!(err, EngineError::Rejected { status: 401, .. }));
}

#[tokio::test]
async fn test_traffic_total_sums_both_directions() {
    let (_fake, engine) = spawn_fake().await;
    assert_eq!(engine.query_traffic_total().await.unwrap(), 1024);
}

#[tokio::test]
async fn test_group_queries() {
    let (_fake, engine) = spawn_fake().await;

    assert_eq!(engine.query_group_names(false).await.unwrap(), ["Proxy", "Auto"]);
    assert_eq!(engine.query_group_names(true).await.unwrap(), ["Proxy"]);

    let group = engine.query_group("Proxy", ProxySort::Delay).await.unwrap();
    let names: Vec<_> = group.proxies.iter().map(|p| p.name.as_str()).collect();
    assert_eq!(names, ["hk-1", "jp-1"]);
    assert_eq!(group.now, "hk-1");

    let missing = engine.query_group("Nope", ProxySort::Default).await;
    assert!(matches!(missing, Err(EngineError::NotFound(_))));
}

#[tokio::test]
async fn test_patch_selector_reports_engine_verdict() {
    let (fake, engine) = spawn_fake().await;

    assert!(engine.patch_selector("Proxy", "jp-1").await);
    assert_eq!(fake.selected.lock().unwrap().get("Proxy").unwrap(), "jp-1");

    assert!(!engine.patch_selector("Auto", "jp-1").await);
    assert!(!fake.selected.lock().unwrap().contains_key("Auto"));
}

#[tokio::test]
async fn test_override_patch_and_clear() {
    let (fake, engine) = spawn_fake().await;

    let tun = ConfigurationOverride::with_tun(TunConfiguration {
        enable: Some(true),
        device: Some("tun0".into()),
        stack: Some(TunStack::GVisor),
        dns_hijack: Some(vec![]),
        auto_route: Some(true),
        auto_detect_interface: Some(true),
    });

    engine
        .patch_override(OverrideSlot::Session, &tun)
        .await
        .unwrap();
    assert_eq!(engine.query_override(OverrideSlot::Session).await.unwrap(), tun);
    assert!(engine
        .query_override(OverrideSlot::Persist)
        .await
        .unwrap()
        .is_empty());

    engine.clear_override(OverrideSlot::Session).await.unwrap();
    assert!(engine
        .query_override(OverrideSlot::Session)
        .await
        .unwrap()
        .is_empty());

    // Clearing an already empty slot does not reach the engine
    engine.clear_override(OverrideSlot::Session).await.unwrap();

    let patches = fake.patches.lock().unwrap();
    assert_eq!(patches.len(), 2);
    assert_eq!(patches[0]["tun"]["stack"], "gvisor");
    assert_eq!(patches[0]["tun"]["dns-hijack"], json!([]));
    assert_eq!(patches[1], json!({ "tun": { "enable": false } }));
}

#[tokio::test]
async fn test_clearing_override_restores_running_values() {
    let (fake, engine) = spawn_fake().await;

    let session = ConfigurationOverride {
        mixed_port: Some(7891),
        allow_lan: Some(true),
        ..ConfigurationOverride::default()
    };
    engine
        .patch_override(OverrideSlot::Session, &session)
        .await
        .unwrap();

    let persist = ConfigurationOverride {
        allow_lan: Some(false),
        ..ConfigurationOverride::default()
    };
    engine
        .patch_override(OverrideSlot::Persist, &persist)
        .await
        .unwrap();

    engine.clear_override(OverrideSlot::Session).await.unwrap();
    engine.clear_override(OverrideSlot::Persist).await.unwrap();

    let patches = fake.patches.lock().unwrap();
    assert_eq!(
        *patches,
        [
            json!({ "mixed-port": 7891, "allow-lan": true }),
            json!({ "mixed-port": 7891, "allow-lan": true }),
            json!({ "mixed-port": 7890, "allow-lan": false }),
            json!({ "allow-lan": false }),
        ]
    );
}

#[tokio::test]
async fn test_providers_tolerate_missing_rule_endpoint() {
    let (_fake, engine) = spawn_fake().await;

    let providers = engine.query_providers().await.unwrap();
    assert_eq!(providers.len(), 2);
    let airport = providers.iter().find(|p| p.name == "airport").unwrap();
    assert!(airport.is_updatable());
    assert_eq!(airport.provider_type, ProviderType::Proxy);

    engine
        .update_provider(ProviderType::Proxy, "airport")
        .await
        .unwrap();
    let missing = engine.update_provider(ProviderType::Rule, "geoip").await;
    assert!(matches!(missing, Err(EngineError::NotFound(_))));
}

#[tokio::test]
async fn test_health_check_passes_delay_settings() {
    let (fake, engine) = spawn_fake().await;

    engine.health_check("Auto").await.unwrap();

    let queries = fake.delay_queries.lock().unwrap();
    assert_eq!(queries.len(), 1);
    assert_eq!(queries[0]["url"], ControllerConfig::default().health_check_url);
    assert_eq!(queries[0]["timeout"], "5000");
}

#[tokio::test]
async fn test_log_feed_preserves_order_across_chunks() {
    let (_fake, engine) = spawn_fake().await;

    let feed = engine.subscribe_logs().await.unwrap();
    let messages: Vec<_> = feed.map(|m| m.message).collect().await;
    assert_eq!(messages, ["one", "two", "three"]);
}

#[tokio::test]
async fn test_log_feed_survives_undecodable_lines() {
    let mut oversized = b"{\"type\":\"info\",\"payload\":\"".to_vec();
    oversized.extend(std::iter::repeat(b'x').take(tp_controller::MAX_LOG_LINE));
    oversized.extend_from_slice(b"\"}\n");

    let (_fake, engine) = spawn_fake_with_logs(vec![
        b"{\"type\":\"info\",\"payload\":\"caf\xff\xfe\"}\n".to_vec(),
        b"{\"type\":\"info\",\"payload\":\"after\"}\n".to_vec(),
        b"{not json}\n".to_vec(),
        oversized,
        b"{\"type\":\"debug\",\"payload\":\"last\"}\n".to_vec(),
    ])
    .await;

    let feed = engine.subscribe_logs().await.unwrap();
    let messages: Vec<_> = feed.map(|m| m.message).collect().await;

    assert_eq!(messages.len(), 3);
    assert!(messages[0].starts_with("caf"));
    assert_eq!(messages[1..], ["after", "last"]);
}

#[tokio::test]
async fn test_reclaim_resources_runs_gc() {
    let (fake, engine) = spawn_fake().await;

    engine.reclaim_resources().await;
    engine.reclaim_resources().await;
    assert_eq!(fake.gc_runs.load(Ordering::SeqCst), 2);
}
