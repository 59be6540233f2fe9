#![allow(dead_code)]

use axum::body::{to_bytes, Body};
use axum::http::{Request, StatusCode};
use rsa::RsaPrivateKey;
use serde_json::Value;
use statmon_server::app;
use statmon_server::state::AppState;
use statmon_storage::memory::MemoryRepo;
use statmon_storage::{MetricStorage, PoolConfig, StoreConfig};
use std::sync::Arc;
use tower::util::ServiceExt;

pub struct TestContext {
    pub state: AppState,
    pub app: axum::Router,
}

pub fn memory_store_config() -> StoreConfig {
    StoreConfig {
        interval_secs: 300,
        file: None,
        restore: false,
        database_dsn: None,
        pool: PoolConfig::default(),
    }
}

pub fn build_test_context(sign_key: Option<&str>) -> TestContext {
    build_test_context_with(sign_key, None, None)
}

pub fn build_test_context_with(
    sign_key: Option<&str>,
    trusted_subnet: Option<&str>,
    private_key: Option<RsaPrivateKey>,
) -> TestContext {
    let storage: Arc<dyn MetricStorage> = MemoryRepo::open(&memory_store_config());
    let state = AppState {
        storage,
        sign_key: sign_key.map(|s| s.to_string()),
        private_key: private_key.map(Arc::new),
        trusted_subnet: trusted_subnet.map(|s| s.parse().expect("subnet should parse")),
    };
    let app = app::build_http_app(state.clone());
    TestContext { state, app }
}

async fn into_json(resp: axum::response::Response) -> (StatusCode, Value) {
    let status = resp.status();
    let bytes = to_bytes(resp.into_body(), usize::MAX)
        .await
        .expect("body should read");
    let json = if bytes.is_empty() {
        Value::Null
    } else {
        serde_json::from_slice::<Value>(&bytes)
            .unwrap_or_else(|_| Value::String(String::from_utf8_lossy(&bytes).to_string()))
    };
    (status, json)
}

pub async fn request_json(
    app: &axum::Router,
    method: &str,
    uri: &str,
    real_ip: Option<&str>,
    body: Option<Value>,
) -> (StatusCode, Value) {
    let mut builder = Request::builder()
        .method(method)
        .uri(uri)
        .header("Content-Type", "application/json");
    if let Some(ip) = real_ip {
        builder = builder.header("X-Real-IP", ip);
    }

    let req_body = body.map(|v| v.to_string()).unwrap_or_default();
    let req = builder
        .body(Body::from(req_body))
        .expect("request should build");

    let resp = app
        .clone()
        .oneshot(req)
        .await
        .expect("request should be handled");
    into_json(resp).await
}

pub async fn request_raw(
    app: &axum::Router,
    method: &str,
    uri: &str,
    body: Vec<u8>,
) -> (StatusCode, Value) {
    let req = Request::builder()
        .method(method)
        .uri(uri)
        .header("Content-Type", "application/json")
        .body(Body::from(body))
        .expect("request should build");

    let resp = app
        .clone()
        .oneshot(req)
        .await
        .expect("request should be handled");
    into_json(resp).await
}
