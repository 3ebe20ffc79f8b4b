//! Routing decision engine
//!
//! Resolves an inbound chat request against the active snapshot. Rules
//! run in a fixed priority order; the first match wins. The engine only
//! chooses a target - forwarding and payload transformation happen
//! downstream.

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::dynamic::RouteSnapshot;
use crate::error::{AppError, AppResult};
use crate::health::ProviderStatus;
use crate::router::custom::RequestFeatures;
use crate::router::{HeuristicTokenCounter, MatchedRule, RouteDecision, RouteTarget, TokenCounter};

/// Wire marker a parent agent uses to pin a subagent to a model.
const SUBAGENT_TAG_OPEN: &str = "<CCR-SUBAGENT-MODEL>";
const SUBAGENT_TAG_CLOSE: &str = "</CCR-SUBAGENT-MODEL>";

/// Model-name prefix that marks background-class traffic by default.
pub const DEFAULT_BACKGROUND_MARKER: &str = "claude-3-5-haiku";

/// Inbound chat request, Anthropic shape. Only the fields routing needs
/// are modeled; the rest rides along in `extra`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ChatRequest {
    #[serde(default)]
    pub model: String,
    #[serde(default)]
    pub messages: Vec<ChatMessage>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub system: Option<SystemPrompt>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub tools: Vec<ToolDefinition>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub thinking: Option<ThinkingConfig>,
    #[serde(flatten)]
    pub extra: serde_json::Map<String, Value>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: String,
    pub content: MessageContent,
}

/// Message content is either a bare string or a list of typed blocks.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(untagged)]
pub enum MessageContent {
    Text(String),
    Blocks(Vec<ContentBlock>),
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ContentBlock {
    #[serde(rename = "type")]
    pub kind: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub text: Option<String>,
    #[serde(flatten)]
    pub extra: serde_json::Map<String, Value>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(untagged)]
pub enum SystemPrompt {
    Text(String),
    Blocks(Vec<ContentBlock>),
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolDefinition {
    #[serde(default)]
    pub name: String,
    #[serde(rename = "type", default, skip_serializing_if = "Option::is_none")]
    pub kind: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub input_schema: Option<Value>,
    #[serde(flatten)]
    pub extra: serde_json::Map<String, Value>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ThinkingConfig {
    #[serde(rename = "type", default, skip_serializing_if = "Option::is_none")]
    pub kind: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub budget_tokens: Option<u64>,
    #[serde(flatten)]
    pub extra: serde_json::Map<String, Value>,
}

impl ChatRequest {
    /// Text of the first user-role message, if any.
    fn first_user_text(&self) -> Option<&str> {
        self.messages
            .iter()
            .find(|m| m.role == "user")
            .and_then(|m| match &m.content {
                MessageContent::Text(text) => Some(text.as_str()),
                MessageContent::Blocks(blocks) => blocks
                    .iter()
                    .find(|b| b.kind == "text")
                    .and_then(|b| b.text.as_deref()),
            })
    }

    /// All textual parts the token counter sees: message texts, the
    /// system prompt, and tool names/descriptions/schemas.
    fn text_parts(&self) -> Vec<String> {
        let mut parts = Vec::new();

        for message in &self.messages {
            match &message.content {
                MessageContent::Text(text) => parts.push(text.clone()),
                MessageContent::Blocks(blocks) => {
                    for block in blocks {
                        if let Some(text) = &block.text {
                            parts.push(text.clone());
                        }
                    }
                }
            }
        }

        match &self.system {
            Some(SystemPrompt::Text(text)) => parts.push(text.clone()),
            Some(SystemPrompt::Blocks(blocks)) => {
                for block in blocks {
                    if let Some(text) = &block.text {
                        parts.push(text.clone());
                    }
                }
            }
            None => {}
        }

        for tool in &self.tools {
            parts.push(tool.name.clone());
            if let Some(description) = &tool.description {
                parts.push(description.clone());
            }
            if let Some(schema) = &tool.input_schema {
                parts.push(schema.to_string());
            }
        }

        parts
    }

    fn advertises_web_search(&self) -> bool {
        self.tools.iter().any(|tool| {
            tool.kind
                .as_deref()
                .is_some_and(|k| k.starts_with("web_search"))
                || tool.name.starts_with("web_search")
        })
    }

    fn thinking_enabled(&self) -> bool {
        self.thinking
            .as_ref()
            .is_some_and(|t| t.kind.as_deref() != Some("disabled"))
    }

    /// Extract the subagent model override from the first user message.
    fn subagent_override(&self) -> Option<&str> {
        let text = self.first_user_text()?;
        let rest = text.strip_prefix(SUBAGENT_TAG_OPEN)?;
        let end = rest.find(SUBAGENT_TAG_CLOSE)?;
        let spec = rest[..end].trim();
        (!spec.is_empty()).then_some(spec)
    }
}

/// Stateless decision engine; one per process is plenty.
pub struct RoutingEngine {
    counter: Arc<dyn TokenCounter>,
    background_marker: String,
}

impl Default for RoutingEngine {
    fn default() -> Self {
        Self::new(Arc::new(HeuristicTokenCounter))
    }
}

impl RoutingEngine {
    pub fn new(counter: Arc<dyn TokenCounter>) -> Self {
        Self {
            counter,
            background_marker: DEFAULT_BACKGROUND_MARKER.to_string(),
        }
    }

    /// Override the model-name prefix that marks background traffic.
    pub fn with_background_marker(mut self, marker: impl Into<String>) -> Self {
        self.background_marker = marker.into();
        self
    }

    /// Pick the `(provider, model)` target for a request against one
    /// published snapshot.
    pub fn decide(
        &self,
        request: &ChatRequest,
        snapshot: &RouteSnapshot,
    ) -> AppResult<RouteDecision> {
        let token_count = self.counter.count_tokens(&request.text_parts());
        let features = RequestFeatures {
            model: request.model.clone(),
            token_count,
            thinking: request.thinking_enabled(),
            web_search: request.advertises_web_search(),
        };

        let (spec, rule) = self.select(request, snapshot, &features)?;
        let target = RouteTarget::parse(&spec)?;
        let degraded = snapshot.provider_status(target.provider()) != Some(ProviderStatus::Active);

        tracing::debug!(
            target = %target,
            rule = rule.as_str(),
            tokens = token_count,
            degraded,
            "Routing decision made"
        );

        Ok(RouteDecision::new(target, rule, degraded))
    }

    fn select(
        &self,
        request: &ChatRequest,
        snapshot: &RouteSnapshot,
        features: &RequestFeatures,
    ) -> AppResult<(String, MatchedRule)> {
        // Custom rules outrank everything, but only when they produce a
        // usable target; contract errors fall back to the built-in ladder.
        if let Some(custom) = &snapshot.custom_router {
            if let Some(spec) = custom.evaluate(features) {
                if RouteTarget::parse(&spec).is_ok() {
                    return Ok((spec, MatchedRule::Custom));
                }
                tracing::warn!(%spec, "Custom router returned an unusable target, ignoring");
            }
        }

        if let Some(spec) = request.subagent_override() {
            return Ok((spec.to_string(), MatchedRule::Subagent));
        }

        let view = &snapshot.view;

        if features.web_search {
            if let Some(spec) = &view.web_search {
                return Ok((spec.clone(), MatchedRule::WebSearch));
            }
        }

        if features.token_count >= view.threshold() {
            if let Some(spec) = &view.long_context {
                return Ok((spec.clone(), MatchedRule::LongContext));
            }
        }

        if features.thinking {
            if let Some(spec) = &view.think {
                return Ok((spec.clone(), MatchedRule::Think));
            }
        }

        if features.model.starts_with(&self.background_marker) {
            if let Some(spec) = &view.background {
                return Ok((spec.clone(), MatchedRule::Background));
            }
        }

        view.default
            .clone()
            .filter(|d| !d.trim().is_empty())
            .map(|d| (d, MatchedRule::Default))
            .ok_or_else(|| AppError::Routing("no default route available".to_string()))
    }
}
