//! HTTP handlers for the Polyroute control API

pub mod config_api;
pub mod groups;
pub mod health;
pub mod route;

use std::sync::Arc;

use axum::{
    Router,
    middleware::{from_fn, from_fn_with_state},
    routing::{get, post},
};

use crate::dynamic::DynamicRouter;
use crate::middleware::{authenticate, request_id_middleware};
use crate::router::RoutingEngine;

/// Application state shared across all handlers
///
/// Both fields are `Arc`-wrapped: Axum clones state per request and the
/// handlers run concurrently, so cloning must be cheap and `Send + Sync`.
#[derive(Clone)]
pub struct AppState {
    router: Arc<DynamicRouter>,
    engine: Arc<RoutingEngine>,
}

impl AppState {
    pub fn new(router: Arc<DynamicRouter>) -> Self {
        Self {
            router,
            engine: Arc::new(RoutingEngine::default()),
        }
    }

    /// Swap in a different decision engine (custom token counter or
    /// background marker).
    pub fn with_engine(mut self, engine: RoutingEngine) -> Self {
        self.engine = Arc::new(engine);
        self
    }

    pub fn router(&self) -> &Arc<DynamicRouter> {
        &self.router
    }

    pub fn engine(&self) -> &RoutingEngine {
        &self.engine
    }
}

/// Build the full control-API router.
///
/// The authenticate layer only classifies the caller; enforcement sits in
/// each handler's access extractor, which is why `/health` stays open.
pub fn app(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health::handler))
        .route("/route", post(route::handler))
        .route(
            "/config",
            get(config_api::get_config).post(config_api::post_config),
        )
        .route("/config/test", post(config_api::config_test))
        .route("/config/hot-reload", post(config_api::hot_reload))
        .route("/config/status", get(config_api::get_status))
        .route("/config/validate", post(config_api::validate))
        .route("/config/rollback", post(config_api::rollback))
        .route("/config/versions", get(config_api::get_versions))
        .route("/config/diff/{from}/{to}", get(config_api::get_diff))
        .route("/router-groups", get(groups::list))
        .route("/router-groups/switch", post(groups::switch))
        .route("/router-groups/{id}", get(groups::get_group))
        .route("/restart", post(config_api::restart))
        .layer(from_fn_with_state(state.clone(), authenticate))
        .layer(from_fn(request_id_middleware))
        .with_state(state)
}
