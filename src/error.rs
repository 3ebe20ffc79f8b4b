//! Error types for Polyroute
//!
//! All errors implement `IntoResponse` for Axum handlers. The response
//! body is always `{"error": <kind>, "message": <detail>}`.

use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use thiserror::Error;

/// Main error type for the application
#[derive(Error, Debug)]
pub enum AppError {
    #[error("Config I/O error: {0}")]
    ConfigIo(String),

    #[error("Schema error: {0}")]
    Schema(String),

    #[error("Referential error: {0}")]
    Referential(String),

    #[error("Security error: {0}")]
    Security(String),

    #[error("Connectivity error: {0}")]
    Connectivity(String),

    #[error("Custom router error: {0}")]
    CustomRouter(String),

    #[error("Version error: {0}")]
    Version(String),

    #[error("Unknown router group: {0}")]
    Group(String),

    #[error("Routing failed: {0}")]
    Routing(String),

    #[error("Invalid request: {0}")]
    Validation(String),

    #[error("Authentication failed: {0}")]
    Auth(String),

    #[error("Insufficient access: {0}")]
    Forbidden(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl AppError {
    /// Stable machine-readable kind string used in response bodies.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::ConfigIo(_) => "config_io",
            Self::Schema(_) => "schema",
            Self::Referential(_) => "referential",
            Self::Security(_) => "security",
            Self::Connectivity(_) => "connectivity",
            Self::CustomRouter(_) => "custom_router",
            Self::Version(_) => "version",
            Self::Group(_) => "group",
            Self::Routing(_) => "routing",
            Self::Validation(_) => "validation",
            Self::Auth(_) => "auth",
            Self::Forbidden(_) => "forbidden",
            Self::Internal(_) => "internal",
        }
    }

    /// HTTP status this error maps to.
    pub fn status(&self) -> StatusCode {
        match self {
            Self::Schema(_) | Self::Referential(_) | Self::Security(_) | Self::Validation(_) => {
                StatusCode::BAD_REQUEST
            }
            Self::Auth(_) => StatusCode::UNAUTHORIZED,
            Self::Forbidden(_) => StatusCode::FORBIDDEN,
            Self::Version(_) | Self::Group(_) => StatusCode::NOT_FOUND,
            Self::Connectivity(_) => StatusCode::BAD_GATEWAY,
            Self::ConfigIo(_)
            | Self::CustomRouter(_)
            | Self::Routing(_)
            | Self::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = self.status();
        let body = Json(serde_json::json!({
            "error": self.kind(),
            "message": self.to_string(),
        }));

        (status, body).into_response()
    }
}

/// Convenience type alias for Results
pub type AppResult<T> = Result<T, AppError>;
