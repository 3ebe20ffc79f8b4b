//! Polyroute - hot-reloadable request-routing gateway for LLM providers
//!
//! Polyroute sits between a coding-assistant client and a set of
//! heterogeneous LLM providers. Every inbound chat request is mapped to a
//! `(provider, model)` target based on request shape; the configuration
//! that drives the mapping can be swapped at runtime with validation,
//! versioned history, and automatic rollback on failure.

pub mod cli;
pub mod config;
pub mod dynamic;
pub mod error;
pub mod events;
pub mod handlers;
pub mod health;
pub mod middleware;
pub mod router;
pub mod telemetry;
