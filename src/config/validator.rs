//! Candidate config validation
//!
//! Produces a severity-scored report over a candidate document. Schema
//! and referential checks always run; security, performance, and
//! connectivity rule sets can be switched off individually. Connectivity
//! probes are parallel and best-effort: they only ever produce warnings.

use std::time::Duration;

use serde::Serialize;
use serde_json::Value;
use tokio::task::JoinSet;
use url::Url;

use crate::config::{ConfigDocument, RouteTable};
use crate::router::custom::CustomRouter;

/// API keys that are clearly placeholders from a template.
const PLACEHOLDER_KEYS: [&str; 3] = ["sk-xxx", "your-api-key", "your-secret-key"];

/// Issue severity with its score deduction
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Critical,
    High,
    Medium,
    Low,
}

impl Severity {
    pub fn deduction(self) -> i64 {
        match self {
            Self::Critical => 25,
            Self::High => 15,
            Self::Medium => 10,
            Self::Low => 5,
        }
    }
}

/// A validation error tied to a config field
#[derive(Debug, Clone, Serialize)]
pub struct ValidationIssue {
    pub severity: Severity,
    pub field: String,
    pub message: String,
}

/// A non-fatal observation (−2 score each)
#[derive(Debug, Clone, Serialize)]
pub struct ValidationWarning {
    pub field: String,
    pub message: String,
}

/// Outcome of a validation pass
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ValidationReport {
    pub is_valid: bool,
    pub errors: Vec<ValidationIssue>,
    pub warnings: Vec<ValidationWarning>,
    pub score: u8,
}

impl ValidationReport {
    fn from_parts(errors: Vec<ValidationIssue>, warnings: Vec<ValidationWarning>) -> Self {
        let mut score: i64 = 100;
        for issue in &errors {
            score -= issue.severity.deduction();
        }
        score -= 2 * warnings.len() as i64;
        let score = score.clamp(0, 100) as u8;

        Self {
            is_valid: !errors
                .iter()
                .any(|e| e.severity == Severity::Critical),
            errors,
            warnings,
            score,
        }
    }

    /// Whether the update pipeline must refuse this config. Criticals
    /// always block; high-severity errors block too because they leave a
    /// route pointing at nothing.
    pub fn has_blocking_errors(&self) -> bool {
        self.errors
            .iter()
            .any(|e| matches!(e.severity, Severity::Critical | Severity::High))
    }
}

/// Which rule sets run, and probe budgets
#[derive(Debug, Clone)]
pub struct ValidatorOptions {
    pub security: bool,
    pub performance: bool,
    pub connectivity: bool,
    pub probe_timeout: Duration,
    pub aggregate_timeout: Duration,
    pub slow_probe: Duration,
}

impl Default for ValidatorOptions {
    fn default() -> Self {
        Self {
            security: true,
            performance: true,
            connectivity: true,
            probe_timeout: Duration::from_secs(5),
            aggregate_timeout: Duration::from_secs(30),
            slow_probe: Duration::from_millis(5000),
        }
    }
}

/// Validator over candidate configs
#[derive(Debug, Clone)]
pub struct Validator {
    options: ValidatorOptions,
    client: reqwest::Client,
}

impl Validator {
    pub fn new(options: ValidatorOptions) -> Self {
        Self {
            options,
            client: reqwest::Client::new(),
        }
    }

    /// Validate a raw JSON value. A document that does not even parse
    /// yields a single critical schema error.
    pub async fn validate_value(&self, value: Value) -> ValidationReport {
        match ConfigDocument::from_value(value) {
            Ok(config) => self.validate(&config).await,
            Err(e) => ValidationReport::from_parts(
                vec![ValidationIssue {
                    severity: Severity::Critical,
                    field: "$".to_string(),
                    message: e.to_string(),
                }],
                Vec::new(),
            ),
        }
    }

    /// Validate a parsed config document.
    pub async fn validate(&self, config: &ConfigDocument) -> ValidationReport {
        let mut errors = Vec::new();
        let mut warnings = Vec::new();

        self.schema_checks(config, &mut errors);
        self.referential_checks(config, &mut errors, &mut warnings);
        if self.options.security {
            self.security_checks(config, &mut errors, &mut warnings);
        }
        if self.options.performance {
            self.performance_checks(config, &mut warnings);
        }
        self.custom_router_check(config, &mut errors);
        if self.options.connectivity {
            self.connectivity_checks(config, &mut warnings).await;
        }

        let report = ValidationReport::from_parts(errors, warnings);
        tracing::debug!(
            is_valid = report.is_valid,
            errors = report.errors.len(),
            warnings = report.warnings.len(),
            score = report.score,
            "Validation pass completed"
        );
        report
    }

    fn schema_checks(&self, config: &ConfigDocument, errors: &mut Vec<ValidationIssue>) {
        if config.providers.is_empty() {
            errors.push(ValidationIssue {
                severity: Severity::High,
                field: "Providers".to_string(),
                message: "at least one provider must be configured".to_string(),
            });
        }

        let mut seen = std::collections::HashSet::new();
        for (i, provider) in config.providers.iter().enumerate() {
            let field = format!("Providers[{i}]");
            if provider.name.trim().is_empty() {
                errors.push(ValidationIssue {
                    severity: Severity::Critical,
                    field: format!("{field}.name"),
                    message: "provider name must be non-empty".to_string(),
                });
            } else if !seen.insert(provider.name.clone()) {
                errors.push(ValidationIssue {
                    severity: Severity::Critical,
                    field: format!("{field}.name"),
                    message: format!("duplicate provider name '{}'", provider.name),
                });
            }

            match Url::parse(&provider.api_base_url) {
                Ok(url) if matches!(url.scheme(), "http" | "https") && url.has_host() => {}
                _ => errors.push(ValidationIssue {
                    severity: Severity::Critical,
                    field: format!("{field}.api_base_url"),
                    message: format!(
                        "'{}' is not an absolute http(s) URL",
                        provider.api_base_url
                    ),
                }),
            }

            if provider.api_key.is_empty() {
                errors.push(ValidationIssue {
                    severity: Severity::High,
                    field: format!("{field}.api_key"),
                    message: "api_key must be non-empty".to_string(),
                });
            }

            if provider.models.is_empty() {
                errors.push(ValidationIssue {
                    severity: Severity::Critical,
                    field: format!("{field}.models"),
                    message: "models must list at least one model".to_string(),
                });
            }
        }

        if config
            .router
            .default
            .as_deref()
            .unwrap_or("")
            .trim()
            .is_empty()
        {
            errors.push(ValidationIssue {
                severity: Severity::Critical,
                field: "Router.default".to_string(),
                message: "a default route is required".to_string(),
            });
        }

        if let Some(groups) = &config.router_groups {
            if groups.is_empty() {
                errors.push(ValidationIssue {
                    severity: Severity::High,
                    field: "RouterGroups".to_string(),
                    message: "RouterGroups must define at least one group when present"
                        .to_string(),
                });
            }
            for id in groups.keys() {
                if id.trim().is_empty() {
                    errors.push(ValidationIssue {
                        severity: Severity::High,
                        field: "RouterGroups".to_string(),
                        message: "group ids must be non-empty".to_string(),
                    });
                }
            }
        }
    }

    fn referential_checks(
        &self,
        config: &ConfigDocument,
        errors: &mut Vec<ValidationIssue>,
        warnings: &mut Vec<ValidationWarning>,
    ) {
        self.check_route_table("Router", &config.router, config, errors, warnings);

        if let Some(groups) = &config.router_groups {
            for (id, group) in groups {
                self.check_route_table(
                    &format!("RouterGroups.{id}"),
                    &group.routes,
                    config,
                    errors,
                    warnings,
                );
            }

            if let Some(active) = config.router.active_group.as_deref() {
                if !groups.contains_key(active) {
                    errors.push(ValidationIssue {
                        severity: Severity::High,
                        field: "Router.activeGroup".to_string(),
                        message: format!("activeGroup '{active}' is not a defined group"),
                    });
                }
            }
        }
    }

    fn check_route_table(
        &self,
        prefix: &str,
        table: &RouteTable,
        config: &ConfigDocument,
        errors: &mut Vec<ValidationIssue>,
        warnings: &mut Vec<ValidationWarning>,
    ) {
        for (field, target) in table.routes() {
            let Some((provider_name, model)) = target.split_once(',') else {
                errors.push(ValidationIssue {
                    severity: Severity::Medium,
                    field: format!("{prefix}.{field}"),
                    message: format!("route '{target}' must have the form \"provider,model\""),
                });
                continue;
            };
            let provider_name = provider_name.trim();
            let model = model.trim();

            match config.find_provider(provider_name) {
                None => errors.push(ValidationIssue {
                    severity: Severity::High,
                    field: format!("{prefix}.{field}"),
                    message: format!("route references unknown provider '{provider_name}'"),
                }),
                Some(provider) if !provider.models.iter().any(|m| m == model) => {
                    warnings.push(ValidationWarning {
                        field: format!("{prefix}.{field}"),
                        message: format!(
                            "model '{model}' is not listed for provider '{provider_name}'"
                        ),
                    });
                }
                Some(_) => {}
            }
        }
    }

    fn security_checks(
        &self,
        config: &ConfigDocument,
        errors: &mut Vec<ValidationIssue>,
        warnings: &mut Vec<ValidationWarning>,
    ) {
        for (i, provider) in config.providers.iter().enumerate() {
            let field = format!("Providers[{i}].api_key");
            if PLACEHOLDER_KEYS.contains(&provider.api_key.as_str()) {
                errors.push(ValidationIssue {
                    severity: Severity::Critical,
                    field,
                    message: format!(
                        "provider '{}' still uses a placeholder API key",
                        provider.name
                    ),
                });
            } else if !provider.api_key.is_empty() && provider.api_key.len() < 10 {
                warnings.push(ValidationWarning {
                    field,
                    message: format!(
                        "API key for provider '{}' is suspiciously short",
                        provider.name
                    ),
                });
            }
        }

        if config.host.as_deref() == Some("0.0.0.0") {
            warnings.push(ValidationWarning {
                field: "HOST".to_string(),
                message: "binding to 0.0.0.0 exposes the gateway on all interfaces".to_string(),
            });
        }
    }

    fn performance_checks(&self, config: &ConfigDocument, warnings: &mut Vec<ValidationWarning>) {
        if let Some(timeout_ms) = config.api_timeout_ms {
            if !(1_000..=600_000).contains(&timeout_ms) {
                warnings.push(ValidationWarning {
                    field: "API_TIMEOUT_MS".to_string(),
                    message: format!(
                        "timeout of {timeout_ms} ms is outside the sensible 1000-600000 range"
                    ),
                });
            }
        }

        if config.providers.len() < 2 {
            warnings.push(ValidationWarning {
                field: "Providers".to_string(),
                message: "fewer than two providers leaves no routing headroom".to_string(),
            });
        }
    }

    fn custom_router_check(&self, config: &ConfigDocument, errors: &mut Vec<ValidationIssue>) {
        if let Some(path) = config.custom_router_path.as_deref() {
            if let Err(e) = CustomRouter::load(std::path::Path::new(path)) {
                errors.push(ValidationIssue {
                    severity: Severity::High,
                    field: "CUSTOM_ROUTER_PATH".to_string(),
                    message: e.to_string(),
                });
            }
        }
    }

    async fn connectivity_checks(
        &self,
        config: &ConfigDocument,
        warnings: &mut Vec<ValidationWarning>,
    ) {
        let mut probes = JoinSet::new();
        for provider in &config.providers {
            let Ok(url) = Url::parse(&provider.api_base_url) else {
                continue; // schema check already flagged it
            };
            let origin = url.origin().ascii_serialization();
            if origin == "null" {
                continue;
            }

            let client = self.client.clone();
            let name = provider.name.clone();
            let timeout = self.options.probe_timeout;
            probes.spawn(async move {
                let started = std::time::Instant::now();
                let result = client.head(&origin).timeout(timeout).send().await;
                (name, result.map(|_| started.elapsed()))
            });
        }

        let slow = self.options.slow_probe;
        let collected = tokio::time::timeout(self.options.aggregate_timeout, async {
            let mut out = Vec::new();
            while let Some(joined) = probes.join_next().await {
                if let Ok(result) = joined {
                    out.push(result);
                }
            }
            out
        })
        .await
        .unwrap_or_default();

        for (name, outcome) in collected {
            match outcome {
                Err(e) => warnings.push(ValidationWarning {
                    field: format!("Providers.{name}"),
                    message: format!("provider endpoint unreachable: {e}"),
                }),
                Ok(elapsed) if elapsed > slow => warnings.push(ValidationWarning {
                    field: format!("Providers.{name}"),
                    message: format!(
                        "provider endpoint is slow ({} ms to respond)",
                        elapsed.as_millis()
                    ),
                }),
                Ok(_) => {}
            }
        }
    }
}
