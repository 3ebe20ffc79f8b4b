//! Shared fixtures for integration tests
//!
//! All fixtures run offline: no connectivity probes, no health probes,
//! and (unless a test opts in) no file watcher.

use std::sync::Arc;

use axum::Router;
use axum::body::Body;
use axum::http::{Request, Response};
use polyroute::config::ConfigDocument;
use polyroute::config::store::ConfigStore;
use polyroute::config::validator::ValidatorOptions;
use polyroute::config::versions::DEFAULT_MAX_VERSIONS;
use polyroute::config::watcher::WatcherOptions;
use polyroute::dynamic::{DynamicRouter, DynamicRouterOptions};
use polyroute::handlers::{self, AppState};
use polyroute::health::HealthOptions;
use tempfile::TempDir;

pub fn offline_options() -> DynamicRouterOptions {
    DynamicRouterOptions {
        hot_reload: false,
        validation: true,
        rollback_on_failure: true,
        max_versions: DEFAULT_MAX_VERSIONS,
        validator: ValidatorOptions {
            connectivity: false,
            ..Default::default()
        },
        watcher: WatcherOptions::default(),
        health: HealthOptions {
            probing_enabled: false,
            ..Default::default()
        },
    }
}

/// Two providers, one route table, a bearer token.
pub fn base_config_json() -> String {
    r#"{
        "Providers": [
            {"name": "p1", "api_base_url": "https://one.example.com/v1", "api_key": "key-0123456789", "models": ["model-x"]},
            {"name": "p2", "api_base_url": "https://two.example.com/v1", "api_key": "key-9876543210", "models": ["model-y"]}
        ],
        "Router": {"default": "p1,model-x"},
        "APIKEY": "secret-token-0123456789"
    }"#
    .to_string()
}

/// Boot a gateway from `config_json` in a fresh tempdir and return the
/// app router, the dynamic router, and the tempdir keeping it alive.
pub async fn boot(config_json: &str) -> (Router, Arc<DynamicRouter>, TempDir) {
    boot_with_options(config_json, offline_options()).await
}

pub async fn boot_with_options(
    config_json: &str,
    options: DynamicRouterOptions,
) -> (Router, Arc<DynamicRouter>, TempDir) {
    let dir = tempfile::tempdir().expect("tempdir");
    let store = ConfigStore::new(dir.path().join("config.json"));
    let config = ConfigDocument::from_json_str(config_json).expect("test config parses");
    store.write(&config).expect("seed config file");

    let router = DynamicRouter::initialize(store, Some(config), options)
        .await
        .expect("router initializes");
    let app = handlers::app(AppState::new(Arc::clone(&router)));
    (app, router, dir)
}

pub fn get(path: &str, token: Option<&str>) -> Request<Body> {
    let mut builder = Request::builder().method("GET").uri(path);
    if let Some(token) = token {
        builder = builder.header("authorization", format!("Bearer {token}"));
    }
    builder.body(Body::empty()).unwrap()
}

pub fn post_json(path: &str, token: Option<&str>, body: serde_json::Value) -> Request<Body> {
    let mut builder = Request::builder()
        .method("POST")
        .uri(path)
        .header("content-type", "application/json");
    if let Some(token) = token {
        builder = builder.header("authorization", format!("Bearer {token}"));
    }
    builder.body(Body::from(body.to_string())).unwrap()
}

pub async fn body_json(response: Response<Body>) -> serde_json::Value {
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .expect("read body");
    serde_json::from_slice(&bytes).expect("body is JSON")
}
