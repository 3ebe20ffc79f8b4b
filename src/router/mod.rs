//! Routing logic for Polyroute
//!
//! Maps inbound chat requests to a `(provider, model)` target using the
//! merged route table of the active router group, an optional
//! operator-supplied rule file, and the provider health table.

pub mod custom;
pub mod engine;
pub mod groups;

pub use custom::{CustomRouter, CustomRouterLoader};
pub use engine::{ChatRequest, RoutingEngine};
pub use groups::RouterGroupManager;

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::{AppError, AppResult};

/// A `"provider,model"` pair
///
/// The model part may itself contain commas (some registries use them),
/// so parsing splits on the first comma only.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RouteTarget {
    provider: String,
    model: String,
}

impl RouteTarget {
    pub fn new(provider: impl Into<String>, model: impl Into<String>) -> Self {
        Self {
            provider: provider.into(),
            model: model.into(),
        }
    }

    /// Parse `"provider,model"`. Both halves must be non-empty.
    pub fn parse(spec: &str) -> AppResult<Self> {
        let (provider, model) = spec
            .split_once(',')
            .ok_or_else(|| {
                AppError::Routing(format!(
                    "route '{spec}' must have the form \"provider,model\""
                ))
            })?;
        let provider = provider.trim();
        let model = model.trim();
        if provider.is_empty() || model.is_empty() {
            return Err(AppError::Routing(format!(
                "route '{spec}' must name both a provider and a model"
            )));
        }
        Ok(Self::new(provider, model))
    }

    pub fn provider(&self) -> &str {
        &self.provider
    }

    pub fn model(&self) -> &str {
        &self.model
    }
}

impl fmt::Display for RouteTarget {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{},{}", self.provider, self.model)
    }
}

/// Which selection rule produced a decision
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MatchedRule {
    Custom,
    Subagent,
    WebSearch,
    LongContext,
    Think,
    Background,
    Default,
}

impl MatchedRule {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Custom => "custom",
            Self::Subagent => "subagent",
            Self::WebSearch => "web_search",
            Self::LongContext => "long_context",
            Self::Think => "think",
            Self::Background => "background",
            Self::Default => "default",
        }
    }
}

/// Result of a routing decision
///
/// Fields are private; use the accessors. `degraded` means the chosen
/// provider is not currently healthy - the decision still stands, any
/// fallback is the caller's business.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RouteDecision {
    target: RouteTarget,
    rule: MatchedRule,
    degraded: bool,
}

impl RouteDecision {
    pub fn new(target: RouteTarget, rule: MatchedRule, degraded: bool) -> Self {
        Self {
            target,
            rule,
            degraded,
        }
    }

    pub fn target(&self) -> &RouteTarget {
        &self.target
    }

    pub fn rule(&self) -> MatchedRule {
        self.rule
    }

    pub fn is_degraded(&self) -> bool {
        self.degraded
    }
}

/// Token counting contract
///
/// The engine calls this once per routing decision over the request's
/// textual parts. Implementations must be consistent between calls.
pub trait TokenCounter: Send + Sync {
    fn count_tokens(&self, parts: &[String]) -> u64;
}

/// Character-count heuristic: roughly four characters per token.
#[derive(Debug, Clone, Copy, Default)]
pub struct HeuristicTokenCounter;

impl TokenCounter for HeuristicTokenCounter {
    fn count_tokens(&self, parts: &[String]) -> u64 {
        let chars: usize = parts.iter().map(|p| p.chars().count()).sum();
        (chars / 4) as u64
    }
}
