//! Config control endpoints
//!
//! Reads come back as plain JSON documents; writes run through the
//! dynamic router's update pipeline so every mutation is validated,
//! versioned, and published the same way.

use axum::{
    Json,
    extract::{Path, State},
    http::StatusCode,
    response::IntoResponse,
};
use serde::Deserialize;
use serde_json::{Value, json};

use crate::config::ConfigDocument;
use crate::config::versions::VersionSource;
use crate::error::AppError;
use crate::handlers::AppState;
use crate::middleware::{FullAccess, ReadAccess};

/// GET /config
pub async fn get_config(
    State(state): State<AppState>,
    _access: ReadAccess,
) -> Result<Json<Value>, AppError> {
    let snapshot = state.router().snapshot();
    Ok(Json(snapshot.config.to_value()?))
}

/// POST /config - replace the document (with backup) through the update
/// pipeline.
pub async fn post_config(
    State(state): State<AppState>,
    _access: FullAccess,
    Json(body): Json<Value>,
) -> Result<impl IntoResponse, AppError> {
    let config = ConfigDocument::from_value(body)?;
    let report = state.router().apply_update(config, VersionSource::Api).await;

    if report.success {
        Ok((
            StatusCode::OK,
            Json(json!({
                "success": true,
                "message": "configuration updated",
                "version": report.version_id,
            })),
        ))
    } else {
        Ok((
            StatusCode::BAD_REQUEST,
            Json(json!({
                "success": false,
                "message": report.error,
                "validation": report.validation,
                "rollbackPerformed": report.rollback_performed,
            })),
        ))
    }
}

/// POST /config/test - auth probe for clients checking their token.
pub async fn config_test(_access: FullAccess) -> Json<Value> {
    Json(json!({"success": true}))
}

/// POST /config/hot-reload
pub async fn hot_reload(State(state): State<AppState>, _access: FullAccess) -> Json<Value> {
    let report = state.router().hot_reload().await;
    Json(json!({
        "success": report.success,
        "version": report.version_id,
        "validation": report.validation,
        "rollbackPerformed": report.rollback_performed,
        "error": report.error,
    }))
}

/// GET /config/status
pub async fn get_status(
    State(state): State<AppState>,
    _access: ReadAccess,
) -> Json<Value> {
    let status = state.router().status().await;
    Json(json!({
        "status": status.status,
        "version": status.version,
        "metadata": {
            "ordinal": status.ordinal,
            "checksum": status.checksum,
            "timestamp": status.timestamp,
            "activeGroup": status.active_group,
            "providerCount": status.provider_count,
        },
        "hotReloadEnabled": status.hot_reload_enabled,
    }))
}

/// POST /config/validate - dry-run a candidate document.
pub async fn validate(
    State(state): State<AppState>,
    _access: FullAccess,
    Json(candidate): Json<Value>,
) -> Json<Value> {
    let report = state.router().validate_candidate(candidate).await;
    Json(json!({
        "success": report.is_valid,
        "validation": report,
    }))
}

#[derive(Debug, Deserialize)]
pub struct RollbackBody {
    #[serde(rename = "versionId")]
    pub version_id: Option<String>,
}

/// POST /config/rollback
pub async fn rollback(
    State(state): State<AppState>,
    _access: FullAccess,
    Json(body): Json<RollbackBody>,
) -> Result<Json<Value>, AppError> {
    let version_id = body
        .version_id
        .filter(|id| !id.is_empty())
        .ok_or_else(|| AppError::Validation("versionId is required".to_string()))?;

    let restored = state.router().rollback(&version_id).await?;
    Ok(Json(json!({
        "success": true,
        "message": format!("rolled back to version {}", restored.id),
    })))
}

/// GET /config/versions
pub async fn get_versions(
    State(state): State<AppState>,
    _access: ReadAccess,
) -> Json<Value> {
    let overview = state.router().versions_overview().await;
    Json(json!({
        "current": overview.current,
        "metadata": overview.metadata,
        "versions": overview.versions,
    }))
}

/// GET /config/diff/{from}/{to}
pub async fn get_diff(
    State(state): State<AppState>,
    _access: ReadAccess,
    Path((from, to)): Path<(String, String)>,
) -> Result<Json<Value>, AppError> {
    let diff = state.router().diff(&from, &to).await?;
    Ok(Json(json!({"diff": diff})))
}

/// POST /restart - the supervisor watching our events does the rest.
pub async fn restart(State(state): State<AppState>, _access: FullAccess) -> Json<Value> {
    state.router().request_restart();
    Json(json!({"success": true}))
}
