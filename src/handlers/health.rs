//! Liveness endpoint
//!
//! Unauthenticated: load balancers and the CLI use it to tell whether
//! the gateway is up at all. Provider detail lives behind the
//! authenticated config endpoints.

use axum::{Json, extract::State, http::StatusCode};
use serde::Serialize;

use crate::dynamic::ComponentState;
use crate::handlers::AppState;

#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
    pub router_state: ComponentState,
    pub providers: usize,
}

/// GET /health
pub async fn handler(State(state): State<AppState>) -> (StatusCode, Json<HealthResponse>) {
    let snapshot = state.router().snapshot();
    (
        StatusCode::OK,
        Json(HealthResponse {
            status: "OK",
            router_state: state.router().state(),
            providers: snapshot.config.providers.len(),
        }),
    )
}
