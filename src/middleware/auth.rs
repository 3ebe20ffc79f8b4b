//! Bearer-token authentication for the control API
//!
//! Three access levels: `restricted` (no or invalid token), `read`
//! (valid token), `full` (token allowed to mutate). Tokens come from the
//! live config, so rotating APIKEY takes effect on the next request.
//! Comparisons are constant-time.
//!
//! The [`authenticate`] middleware only classifies; enforcement happens
//! in handlers through the [`ReadAccess`] / [`FullAccess`] extractors.

use axum::{
    extract::{FromRequestParts, Request, State},
    http::HeaderMap,
    http::request::Parts,
    middleware::Next,
    response::Response,
};
use subtle::ConstantTimeEq;

use crate::config::ConfigDocument;
use crate::error::AppError;
use crate::handlers::AppState;

/// Caller privilege, attached to the request extensions by
/// [`authenticate`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum AccessLevel {
    Restricted,
    Read,
    Full,
}

/// Classify the caller and stash the level for downstream extractors.
pub async fn authenticate(
    State(state): State<AppState>,
    mut request: Request,
    next: Next,
) -> Response {
    let snapshot = state.router().snapshot();
    let token = extract_token(request.headers());
    let level = classify(&snapshot.config, token.as_deref());

    request.extensions_mut().insert(level);
    next.run(request).await
}

/// Extractor guarding read endpoints: any valid token (or an open
/// instance). Rejects with 401.
#[derive(Debug, Clone, Copy)]
pub struct ReadAccess(pub AccessLevel);

impl<S> FromRequestParts<S> for ReadAccess
where
    S: Send + Sync,
{
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        match parts.extensions.get::<AccessLevel>() {
            Some(level) if *level >= AccessLevel::Read => Ok(Self(*level)),
            _ => Err(AppError::Auth(
                "a valid bearer token is required".to_string(),
            )),
        }
    }
}

/// Extractor guarding mutating endpoints: full access only. Rejects with
/// 403 for read-level tokens, 401 otherwise.
#[derive(Debug, Clone, Copy)]
pub struct FullAccess;

impl<S> FromRequestParts<S> for FullAccess
where
    S: Send + Sync,
{
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        match parts.extensions.get::<AccessLevel>() {
            Some(AccessLevel::Full) => Ok(Self),
            Some(AccessLevel::Read) => Err(AppError::Forbidden(
                "this endpoint requires full access".to_string(),
            )),
            _ => Err(AppError::Auth(
                "a valid bearer token is required".to_string(),
            )),
        }
    }
}

fn extract_token(headers: &HeaderMap) -> Option<String> {
    if let Some(value) = headers.get(axum::http::header::AUTHORIZATION) {
        if let Ok(value) = value.to_str() {
            if let Some(token) = value.strip_prefix("Bearer ") {
                return Some(token.trim().to_string());
            }
        }
    }
    headers
        .get("x-api-key")
        .and_then(|v| v.to_str().ok())
        .map(|v| v.trim().to_string())
}

/// Decide the access level for a (possibly absent) token against the
/// live config. An instance without APIKEY runs open.
pub fn classify(config: &ConfigDocument, token: Option<&str>) -> AccessLevel {
    let api_key = config.api_key.as_deref().unwrap_or("");
    if api_key.is_empty() {
        return AccessLevel::Full;
    }

    let Some(token) = token else {
        return AccessLevel::Restricted;
    };

    if config.full_access_keys.iter().any(|key| ct_eq(key, token)) {
        return AccessLevel::Full;
    }

    if ct_eq(api_key, token) {
        // Without a separate full-access list the primary key mutates.
        if config.full_access_keys.is_empty() {
            return AccessLevel::Full;
        }
        return AccessLevel::Read;
    }

    AccessLevel::Restricted
}

fn ct_eq(a: &str, b: &str) -> bool {
    a.as_bytes().ct_eq(b.as_bytes()).into()
}
