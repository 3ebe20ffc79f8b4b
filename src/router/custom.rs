//! Operator-supplied routing rules
//!
//! The custom router is a JSON file holding an ordered list of clauses;
//! the first clause whose conditions all hold decides the route. The
//! loader keeps the previously loaded rule set when a reload fails, so a
//! bad edit never knocks out a working custom router.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::error::{AppError, AppResult};
use crate::router::RouteTarget;

/// Conditions of a single clause. Absent fields always match.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct RuleCondition {
    /// Matches when the request's declared model starts with this prefix.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub model_prefix: Option<String>,
    /// Inclusive lower bound on the estimated token count.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub min_tokens: Option<u64>,
    /// Exclusive upper bound on the estimated token count.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_tokens: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub thinking: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub web_search: Option<bool>,
}

/// One ordered clause: conditions plus the route they select
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct CustomRule {
    #[serde(default)]
    pub when: RuleCondition,
    pub route: String,
}

/// Request features the rules are evaluated against
#[derive(Debug, Clone)]
pub struct RequestFeatures {
    pub model: String,
    pub token_count: u64,
    pub thinking: bool,
    pub web_search: bool,
}

/// Compiled custom router
#[derive(Debug, Clone)]
pub struct CustomRouter {
    rules: Vec<CustomRule>,
}

impl CustomRouter {
    /// Load and compile a rules file.
    pub fn load(path: &Path) -> AppResult<Self> {
        let content = std::fs::read_to_string(path).map_err(|e| {
            AppError::CustomRouter(format!(
                "failed to read custom router file {}: {e}",
                path.display()
            ))
        })?;
        let rules: Vec<CustomRule> = serde_json::from_str(&content).map_err(|e| {
            AppError::CustomRouter(format!(
                "custom router file {} is not a valid rule list: {e}",
                path.display()
            ))
        })?;
        Self::from_rules(rules)
    }

    /// Compile an in-memory rule list, checking every route parses.
    pub fn from_rules(rules: Vec<CustomRule>) -> AppResult<Self> {
        for (i, rule) in rules.iter().enumerate() {
            RouteTarget::parse(&rule.route)
                .map_err(|e| AppError::CustomRouter(format!("rule {i}: {e}")))?;
        }
        Ok(Self { rules })
    }

    pub fn rule_count(&self) -> usize {
        self.rules.len()
    }

    /// First matching clause wins; no match yields no decision.
    pub fn evaluate(&self, features: &RequestFeatures) -> Option<String> {
        self.rules.iter().find_map(|rule| {
            let cond = &rule.when;

            if let Some(prefix) = &cond.model_prefix {
                if !features.model.starts_with(prefix.as_str()) {
                    return None;
                }
            }
            if let Some(min) = cond.min_tokens {
                if features.token_count < min {
                    return None;
                }
            }
            if let Some(max) = cond.max_tokens {
                if features.token_count >= max {
                    return None;
                }
            }
            if let Some(thinking) = cond.thinking {
                if features.thinking != thinking {
                    return None;
                }
            }
            if let Some(web_search) = cond.web_search {
                if features.web_search != web_search {
                    return None;
                }
            }

            Some(rule.route.clone())
        })
    }
}

/// Keeps the active custom-router binding across reloads
#[derive(Debug, Default)]
pub struct CustomRouterLoader {
    current: Option<Arc<CustomRouter>>,
    path: Option<PathBuf>,
}

impl CustomRouterLoader {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn current(&self) -> Option<Arc<CustomRouter>> {
        self.current.clone()
    }

    /// Rebind from `path`. `None` clears the binding. A load failure
    /// returns the error and leaves the previous binding untouched.
    pub fn reload(&mut self, path: Option<&Path>) -> AppResult<Option<Arc<CustomRouter>>> {
        match path {
            None => {
                if self.current.take().is_some() {
                    tracing::info!("Custom router unbound");
                }
                self.path = None;
                Ok(None)
            }
            Some(path) => match CustomRouter::load(path) {
                Ok(router) => {
                    tracing::info!(
                        path = %path.display(),
                        rules = router.rule_count(),
                        "Custom router loaded"
                    );
                    let router = Arc::new(router);
                    self.current = Some(router.clone());
                    self.path = Some(path.to_path_buf());
                    Ok(Some(router))
                }
                Err(e) => {
                    tracing::warn!(
                        path = %path.display(),
                        error = %e,
                        "Custom router reload failed, keeping previous rules"
                    );
                    Err(e)
                }
            },
        }
    }
}
