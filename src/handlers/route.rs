//! Routing decision endpoint
//!
//! The gateway's data path: resolve an inbound chat request to a
//! `(provider, model)` target. The snapshot is captured once here and
//! used for the whole decision, so a concurrent config update never
//! splits a request across two configurations. Transformation and
//! forwarding to the upstream happen outside this core.

use axum::{Json, extract::State};
use serde::Serialize;

use crate::error::AppError;
use crate::handlers::AppState;
use crate::middleware::ReadAccess;
use crate::router::engine::ChatRequest;

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RouteResponse {
    pub provider: String,
    pub model: String,
    /// `"provider,model"` exactly as the transformer pipeline expects it.
    pub target: String,
    pub rule: &'static str,
    pub degraded: bool,
    pub config_version: String,
}

/// POST /route
pub async fn handler(
    State(state): State<AppState>,
    _access: ReadAccess,
    Json(request): Json<ChatRequest>,
) -> Result<Json<RouteResponse>, AppError> {
    let snapshot = state.router().snapshot();

    match state.engine().decide(&request, &snapshot) {
        Ok(decision) => {
            if decision.is_degraded() {
                tracing::warn!(
                    target = %decision.target(),
                    "Selected provider is not healthy; decision flagged degraded"
                );
            }
            Ok(Json(RouteResponse {
                provider: decision.target().provider().to_string(),
                model: decision.target().model().to_string(),
                target: decision.target().to_string(),
                rule: decision.rule().as_str(),
                degraded: decision.is_degraded(),
                config_version: snapshot.version_id.clone(),
            }))
        }
        Err(e) => {
            state.router().note_routing_error();
            Err(e)
        }
    }
}
