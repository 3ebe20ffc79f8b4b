//! HTTP middleware for the control API

pub mod auth;
pub mod request_id;

pub use auth::{AccessLevel, FullAccess, ReadAccess, authenticate};
pub use request_id::request_id_middleware;
