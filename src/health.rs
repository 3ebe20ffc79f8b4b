//! Provider health tracking
//!
//! Keeps a per-provider status table fed by periodic liveness probes.
//! Probes never touch config state; they only move provider status
//! between `active`, `degraded`, and `failed`.

use std::collections::HashMap;
use std::sync::{Arc, RwLock};
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::config::Provider;
use crate::events::{EventBus, GatewayEvent};

/// Consecutive failures after which a provider is considered failed.
const FAILED_THRESHOLD: u32 = 3;

/// Provider liveness status
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ProviderStatus {
    Active,
    Degraded,
    Failed,
}

/// Health record for one provider
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ProviderHealth {
    pub name: String,
    #[serde(skip_serializing)]
    base_url: String,
    #[serde(skip_serializing)]
    api_key: String,
    pub status: ProviderStatus,
    pub consecutive_failures: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub response_time_ms: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_check: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_error: Option<String>,
    pub error_count: u64,
}

impl ProviderHealth {
    fn new(provider: &Provider) -> Self {
        Self {
            name: provider.name.clone(),
            base_url: provider.api_base_url.clone(),
            api_key: provider.api_key.clone(),
            status: ProviderStatus::Active,
            consecutive_failures: 0,
            response_time_ms: None,
            last_check: None,
            last_error: None,
            error_count: 0,
        }
    }
}

/// Summary of a provider-list reconciliation
#[derive(Debug, Clone, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct UpdateSummary {
    pub providers_added: Vec<String>,
    pub providers_removed: Vec<String>,
    pub providers_updated: Vec<String>,
    pub errors: Vec<String>,
}

#[derive(Debug, Clone)]
pub struct HealthOptions {
    /// Interval between scheduled probe rounds.
    pub interval: Duration,
    /// Per-probe timeout.
    pub probe_timeout: Duration,
    /// Latency above which a reachable provider counts as degraded.
    pub slow_threshold: Duration,
    /// When false, no probes are issued; status only changes through
    /// explicit record calls. Used by tests and offline deployments.
    pub probing_enabled: bool,
}

impl Default for HealthOptions {
    fn default() -> Self {
        Self {
            interval: Duration::from_secs(300),
            probe_timeout: Duration::from_secs(10),
            slow_threshold: Duration::from_millis(5000),
            probing_enabled: true,
        }
    }
}

/// Health table plus the probe loop
pub struct HealthManager {
    table: RwLock<HashMap<String, ProviderHealth>>,
    options: HealthOptions,
    client: reqwest::Client,
    events: EventBus,
}

impl HealthManager {
    pub fn new(options: HealthOptions, events: EventBus) -> Self {
        let client = reqwest::Client::builder()
            .user_agent(concat!("polyroute-healthcheck/", env!("CARGO_PKG_VERSION")))
            .build()
            .unwrap_or_default();
        Self {
            table: RwLock::new(HashMap::new()),
            options,
            client,
            events,
        }
    }

    /// Current status for a provider; unknown names yield `None`.
    pub fn status_of(&self, name: &str) -> Option<ProviderStatus> {
        self.read_table().get(name).map(|h| h.status)
    }

    /// Snapshot of all health records for the control surface.
    pub fn statuses(&self) -> Vec<ProviderHealth> {
        let mut all: Vec<ProviderHealth> = self.read_table().values().cloned().collect();
        all.sort_by(|a, b| a.name.cmp(&b.name));
        all
    }

    /// Reconcile the table against a new provider list. New providers
    /// start `active` and get an immediate probe, as do providers whose
    /// URL or key changed.
    pub fn update_providers(self: &Arc<Self>, providers: &[Provider]) -> UpdateSummary {
        let mut summary = UpdateSummary::default();
        let mut needs_probe = Vec::new();

        {
            let mut table = self.write_table();

            let incoming: HashMap<&str, &Provider> =
                providers.iter().map(|p| (p.name.as_str(), p)).collect();

            let stale: Vec<String> = table
                .keys()
                .filter(|name| !incoming.contains_key(name.as_str()))
                .cloned()
                .collect();
            for name in stale {
                table.remove(&name);
                summary.providers_removed.push(name);
            }

            for provider in providers {
                if provider.name.is_empty() {
                    summary
                        .errors
                        .push("provider with empty name skipped".to_string());
                    continue;
                }
                match table.get_mut(&provider.name) {
                    None => {
                        table.insert(provider.name.clone(), ProviderHealth::new(provider));
                        summary.providers_added.push(provider.name.clone());
                        needs_probe.push(provider.name.clone());
                    }
                    Some(existing)
                        if existing.base_url != provider.api_base_url
                            || existing.api_key != provider.api_key =>
                    {
                        *existing = ProviderHealth::new(provider);
                        summary.providers_updated.push(provider.name.clone());
                        needs_probe.push(provider.name.clone());
                    }
                    Some(_) => {}
                }
            }
        }

        if self.options.probing_enabled {
            for name in needs_probe {
                let manager = Arc::clone(self);
                tokio::spawn(async move {
                    manager.probe(&name).await;
                });
            }
        }

        tracing::info!(
            added = summary.providers_added.len(),
            removed = summary.providers_removed.len(),
            updated = summary.providers_updated.len(),
            "Provider health table reconciled"
        );

        summary
    }

    /// Spawn the periodic probe loop.
    pub fn start_health_checks(self: &Arc<Self>) {
        if !self.options.probing_enabled {
            tracing::info!("Health probing disabled");
            return;
        }

        let manager = Arc::clone(self);
        tokio::spawn(async move {
            tracing::info!(
                interval_secs = manager.options.interval.as_secs(),
                "Provider health checks started"
            );
            loop {
                tokio::time::sleep(manager.options.interval).await;
                manager.run_probe_round().await;
            }
        });
    }

    async fn run_probe_round(&self) {
        let names: Vec<String> = self.read_table().keys().cloned().collect();
        for name in names {
            self.probe(&name).await;
        }
    }

    /// Probe one provider: `HEAD` against the base URL origin, retried
    /// once as `OPTIONS` on error.
    pub async fn probe(&self, name: &str) {
        let Some(base_url) = self.read_table().get(name).map(|h| h.base_url.clone()) else {
            return;
        };
        let Some(origin) = probe_origin(&base_url) else {
            self.record_failure(name, &format!("unparseable base URL '{base_url}'"));
            return;
        };

        let started = std::time::Instant::now();
        let head = self
            .client
            .head(&origin)
            .timeout(self.options.probe_timeout)
            .send()
            .await;

        let outcome = match head {
            Ok(response) => Ok((response.status(), started.elapsed())),
            Err(_) => {
                let retry_started = std::time::Instant::now();
                self.client
                    .request(reqwest::Method::OPTIONS, &origin)
                    .timeout(self.options.probe_timeout)
                    .send()
                    .await
                    .map(|response| (response.status(), retry_started.elapsed()))
            }
        };

        match outcome {
            Ok((status, elapsed)) if status.as_u16() < 500 => {
                self.record_success(name, elapsed);
            }
            Ok((status, _)) => {
                self.record_failure(name, &format!("probe returned {status}"));
            }
            Err(e) => {
                self.record_failure(name, &format!("probe failed: {e}"));
            }
        }
    }

    /// Record a successful probe. Slow responses count as degraded but
    /// clear the failure streak.
    pub fn record_success(&self, name: &str, elapsed: Duration) {
        let next_status = if elapsed > self.options.slow_threshold {
            ProviderStatus::Degraded
        } else {
            ProviderStatus::Active
        };

        let transition = {
            let mut table = self.write_table();
            let Some(health) = table.get_mut(name) else {
                return;
            };
            let previous = health.status;
            health.consecutive_failures = 0;
            health.status = next_status;
            health.response_time_ms = Some(elapsed.as_millis() as u64);
            health.last_check = Some(Utc::now());
            health.last_error = None;
            (previous != next_status).then_some((previous, next_status))
        };

        if let Some((from, to)) = transition {
            tracing::info!(provider = %name, from = ?from, to = ?to, "Provider status changed");
            self.events.emit(GatewayEvent::HealthChanged {
                provider: name.to_string(),
                from,
                to,
            });
        }
    }

    /// Record a failed probe. Failed status starts on the third
    /// consecutive failure, not the second.
    pub fn record_failure(&self, name: &str, error: &str) {
        let transition = {
            let mut table = self.write_table();
            let Some(health) = table.get_mut(name) else {
                return;
            };
            let previous = health.status;
            health.consecutive_failures += 1;
            health.error_count += 1;
            health.status = if health.consecutive_failures >= FAILED_THRESHOLD {
                ProviderStatus::Failed
            } else {
                ProviderStatus::Degraded
            };
            health.last_check = Some(Utc::now());
            health.last_error = Some(error.to_string());
            (previous != health.status).then_some((previous, health.status))
        };

        if let Some((from, to)) = transition {
            tracing::warn!(provider = %name, from = ?from, to = ?to, error = %error, "Provider status changed");
            self.events.emit(GatewayEvent::HealthChanged {
                provider: name.to_string(),
                from,
                to,
            });
        }
    }

    fn read_table(&self) -> std::sync::RwLockReadGuard<'_, HashMap<String, ProviderHealth>> {
        match self.table.read() {
            Ok(guard) => guard,
            Err(err) => err.into_inner(),
        }
    }

    fn write_table(&self) -> std::sync::RwLockWriteGuard<'_, HashMap<String, ProviderHealth>> {
        match self.table.write() {
            Ok(guard) => guard,
            Err(err) => err.into_inner(),
        }
    }
}

/// Scheme + host + port of the provider base URL; probes never hit the
/// full API path.
fn probe_origin(base_url: &str) -> Option<String> {
    let url = url::Url::parse(base_url).ok()?;
    let origin = url.origin().ascii_serialization();
    (origin != "null").then_some(origin)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn provider(name: &str, url: &str, key: &str) -> Provider {
        Provider {
            name: name.to_string(),
            api_base_url: url.to_string(),
            api_key: key.to_string(),
            models: vec!["m".to_string()],
            transformer: None,
            extra: Default::default(),
        }
    }

    fn offline_manager() -> Arc<HealthManager> {
        Arc::new(HealthManager::new(
            HealthOptions {
                probing_enabled: false,
                ..Default::default()
            },
            EventBus::default(),
        ))
    }

    #[tokio::test]
    async fn test_new_providers_start_active() {
        let manager = offline_manager();
        let summary =
            manager.update_providers(&[provider("p1", "https://one.example.com/v1", "key-1")]);

        assert_eq!(summary.providers_added, vec!["p1"]);
        assert_eq!(manager.status_of("p1"), Some(ProviderStatus::Active));
    }

    #[tokio::test]
    async fn test_unknown_provider_has_no_status() {
        let manager = offline_manager();
        assert_eq!(manager.status_of("ghost"), None);
    }

    #[tokio::test]
    async fn test_failed_on_third_consecutive_failure() {
        let manager = offline_manager();
        manager.update_providers(&[provider("p1", "https://one.example.com/v1", "key-1")]);

        manager.record_failure("p1", "boom");
        assert_eq!(manager.status_of("p1"), Some(ProviderStatus::Degraded));

        manager.record_failure("p1", "boom");
        assert_eq!(
            manager.status_of("p1"),
            Some(ProviderStatus::Degraded),
            "second failure must not mark failed yet"
        );

        manager.record_failure("p1", "boom");
        assert_eq!(manager.status_of("p1"), Some(ProviderStatus::Failed));
    }

    #[tokio::test]
    async fn test_success_recovers_and_resets_streak() {
        let manager = offline_manager();
        manager.update_providers(&[provider("p1", "https://one.example.com/v1", "key-1")]);

        for _ in 0..3 {
            manager.record_failure("p1", "boom");
        }
        assert_eq!(manager.status_of("p1"), Some(ProviderStatus::Failed));

        manager.record_success("p1", Duration::from_millis(50));
        assert_eq!(manager.status_of("p1"), Some(ProviderStatus::Active));

        let statuses = manager.statuses();
        assert_eq!(statuses[0].consecutive_failures, 0);
        assert!(statuses[0].last_error.is_none());
    }

    #[tokio::test]
    async fn test_slow_response_is_degraded() {
        let manager = offline_manager();
        manager.update_providers(&[provider("p1", "https://one.example.com/v1", "key-1")]);

        manager.record_success("p1", Duration::from_millis(6000));
        assert_eq!(manager.status_of("p1"), Some(ProviderStatus::Degraded));
    }

    #[tokio::test]
    async fn test_update_providers_diffs_the_set() {
        let manager = offline_manager();
        manager.update_providers(&[
            provider("p1", "https://one.example.com/v1", "key-1"),
            provider("p2", "https://two.example.com/v1", "key-2"),
        ]);

        let summary = manager.update_providers(&[
            provider("p1", "https://one.example.com/v2", "key-1"),
            provider("p3", "https://three.example.com/v1", "key-3"),
        ]);

        assert_eq!(summary.providers_added, vec!["p3"]);
        assert_eq!(summary.providers_removed, vec!["p2"]);
        assert_eq!(summary.providers_updated, vec!["p1"]);
        assert_eq!(manager.status_of("p2"), None);
    }

    #[tokio::test]
    async fn test_url_change_resets_health_state() {
        let manager = offline_manager();
        manager.update_providers(&[provider("p1", "https://one.example.com/v1", "key-1")]);
        for _ in 0..3 {
            manager.record_failure("p1", "boom");
        }

        manager.update_providers(&[provider("p1", "https://moved.example.com/v1", "key-1")]);
        assert_eq!(manager.status_of("p1"), Some(ProviderStatus::Active));
    }

    #[tokio::test]
    async fn test_health_changed_events_emitted_on_transition() {
        let bus = EventBus::new(8);
        let mut rx = bus.subscribe();
        let manager = Arc::new(HealthManager::new(
            HealthOptions {
                probing_enabled: false,
                ..Default::default()
            },
            bus,
        ));
        manager.update_providers(&[provider("p1", "https://one.example.com/v1", "key-1")]);

        manager.record_failure("p1", "boom");
        let event = rx.recv().await.unwrap();
        assert!(matches!(
            event,
            GatewayEvent::HealthChanged {
                from: ProviderStatus::Active,
                to: ProviderStatus::Degraded,
                ..
            }
        ));
    }

    #[test]
    fn test_probe_origin_strips_path() {
        assert_eq!(
            probe_origin("https://api.example.com:8443/v1/chat").as_deref(),
            Some("https://api.example.com:8443")
        );
        assert!(probe_origin("not a url").is_none());
    }
}
