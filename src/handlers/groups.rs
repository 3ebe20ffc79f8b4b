//! Router-group endpoints

use axum::{
    Json,
    extract::{Path, State},
};
use serde::Deserialize;
use serde_json::{Value, json};

use crate::error::AppError;
use crate::handlers::AppState;
use crate::middleware::ReadAccess;

/// GET /router-groups
pub async fn list(State(state): State<AppState>, _access: ReadAccess) -> Json<Value> {
    let (groups, current) = state.router().groups_overview().await;
    Json(json!({
        "success": true,
        "groups": groups,
        "currentGroup": current,
    }))
}

#[derive(Debug, Deserialize)]
pub struct SwitchBody {
    #[serde(rename = "groupId")]
    pub group_id: Option<String>,
}

/// POST /router-groups/switch - any valid token may switch.
pub async fn switch(
    State(state): State<AppState>,
    _access: ReadAccess,
    Json(body): Json<SwitchBody>,
) -> Result<Json<Value>, AppError> {
    let group_id = body
        .group_id
        .filter(|id| !id.is_empty())
        .ok_or_else(|| AppError::Validation("groupId is required".to_string()))?;

    // An unknown group is a client-shape error on this endpoint.
    let current = state
        .router()
        .switch_group(&group_id)
        .await
        .map_err(|e| match e {
            AppError::Group(id) => AppError::Validation(format!("unknown router group '{id}'")),
            other => other,
        })?;

    Ok(Json(json!({
        "success": true,
        "currentGroup": current,
    })))
}

/// GET /router-groups/{id}
pub async fn get_group(
    State(state): State<AppState>,
    _access: ReadAccess,
    Path(id): Path<String>,
) -> Result<Json<Value>, AppError> {
    let group = state.router().get_group(&id).await?;
    let is_active = group.is_active;
    Ok(Json(json!({
        "success": true,
        "group": group,
        "isActive": is_active,
    })))
}
