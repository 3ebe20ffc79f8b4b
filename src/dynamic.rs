//! Dynamic router coordinator
//!
//! Owns the config kernel. All mutation flows through a single update
//! lock; request handlers never take it - they read the published
//! snapshot atomically and keep that reference for the request lifetime.

use std::path::PathBuf;
use std::sync::Arc;

use arc_swap::ArcSwap;
use chrono::{DateTime, Utc};
use serde::Serialize;
use tokio::sync::{Mutex, broadcast};

use crate::config::store::ConfigStore;
use crate::config::validator::{ValidationReport, Validator, ValidatorOptions};
use crate::config::versions::{ConfigVersion, DEFAULT_MAX_VERSIONS, VersionManager, VersionSource};
use crate::config::watcher::{ChangeKind, ConfigWatcher, WatcherOptions};
use crate::config::{ConfigDocument, RouteTable, RouterGroup};
use crate::error::{AppError, AppResult};
use crate::events::{EventBus, GatewayEvent};
use crate::health::{HealthManager, HealthOptions, ProviderHealth, ProviderStatus};
use crate::router::custom::CustomRouter;
use crate::router::{CustomRouterLoader, RouterGroupManager};

/// Immutable view published to request handlers
///
/// A handler loads this once at request entry; everything it needs for a
/// routing decision hangs off it.
#[derive(Clone)]
pub struct RouteSnapshot {
    pub config: Arc<ConfigDocument>,
    /// Merged route table of the active group.
    pub view: RouteTable,
    pub custom_router: Option<Arc<CustomRouter>>,
    pub version_id: String,
    pub ordinal: u64,
    pub checksum: String,
    pub active_group: Option<String>,
    health: Arc<HealthManager>,
}

impl RouteSnapshot {
    /// Live status of a provider; the health table is advisory and is
    /// intentionally not frozen with the config.
    pub fn provider_status(&self, name: &str) -> Option<ProviderStatus> {
        self.health.status_of(name)
    }

    pub fn provider_health(&self) -> Vec<ProviderHealth> {
        self.health.statuses()
    }
}

/// Coordinator lifecycle state
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ComponentState {
    Uninitialized,
    Healthy,
    Degraded,
    Failed,
}

#[derive(Debug)]
struct StateMachine {
    state: ComponentState,
    consecutive_errors: u32,
}

impl StateMachine {
    fn new() -> Self {
        Self {
            state: ComponentState::Uninitialized,
            consecutive_errors: 0,
        }
    }

    fn record_success(&mut self) {
        self.consecutive_errors = 0;
        self.state = ComponentState::Healthy;
    }

    fn record_error(&mut self) {
        self.consecutive_errors += 1;
        if self.consecutive_errors > 3 {
            self.state = ComponentState::Failed;
        } else if self.consecutive_errors > 2 {
            self.state = ComponentState::Degraded;
        }
    }
}

/// Outcome of one pass through the update pipeline
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct UpdateReport {
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub version_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ordinal: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub validation: Option<ValidationReport>,
    pub rollback_performed: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// Status summary for the control surface
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StatusReport {
    pub status: ComponentState,
    pub version: Option<String>,
    pub ordinal: Option<u64>,
    pub checksum: Option<String>,
    pub timestamp: Option<DateTime<Utc>>,
    pub active_group: Option<String>,
    pub provider_count: usize,
    pub hot_reload_enabled: bool,
}

/// Version-ring overview for the control surface
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct VersionsOverview {
    pub current: Option<String>,
    pub metadata: VersionsMetadata,
    pub versions: Vec<ConfigVersion>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct VersionsMetadata {
    pub total: usize,
    pub max_versions: usize,
}

/// One group as reported by the control surface
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct GroupSummary {
    pub id: String,
    pub name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    pub routes: RouteTable,
    pub is_active: bool,
}

#[derive(Debug, Clone)]
pub struct DynamicRouterOptions {
    pub hot_reload: bool,
    pub validation: bool,
    pub rollback_on_failure: bool,
    pub max_versions: usize,
    pub validator: ValidatorOptions,
    pub watcher: WatcherOptions,
    pub health: HealthOptions,
}

impl Default for DynamicRouterOptions {
    fn default() -> Self {
        Self {
            hot_reload: true,
            validation: true,
            rollback_on_failure: true,
            max_versions: DEFAULT_MAX_VERSIONS,
            validator: ValidatorOptions::default(),
            watcher: WatcherOptions::default(),
            health: HealthOptions::default(),
        }
    }
}

struct Mutable {
    versions: VersionManager,
    groups: RouterGroupManager,
    custom: CustomRouterLoader,
    _watcher: Option<ConfigWatcher>,
}

/// Single-writer owner of the config kernel
pub struct DynamicRouter {
    mutable: Mutex<Mutable>,
    snapshot: ArcSwap<RouteSnapshot>,
    validator: Validator,
    health: Arc<HealthManager>,
    events: EventBus,
    state: std::sync::Mutex<StateMachine>,
    options: DynamicRouterOptions,
    config_path: PathBuf,
}

impl DynamicRouter {
    /// Bring the kernel up: load (or adopt) a config, register it as the
    /// first version, publish the initial snapshot, and start the
    /// watcher and health loops.
    pub async fn initialize(
        store: ConfigStore,
        initial: Option<ConfigDocument>,
        options: DynamicRouterOptions,
    ) -> AppResult<Arc<Self>> {
        let events = EventBus::default();
        let health = Arc::new(HealthManager::new(options.health.clone(), events.clone()));
        let config_path = store.path().to_path_buf();

        let mut config = match initial {
            Some(config) => config,
            None => store.read()?,
        };
        ensure_default_route(&mut config);

        let mut versions = VersionManager::new(store, options.max_versions);
        let outcome = versions.add_version(
            config.clone(),
            VersionSource::Manual,
            Some("initial configuration".to_string()),
        )?;

        let groups = RouterGroupManager::from_config(&config);

        let mut custom = CustomRouterLoader::new();
        if let Err(e) = custom.reload(config.custom_router_path.as_deref().map(std::path::Path::new))
        {
            tracing::warn!(error = %e, "Custom router unavailable at startup");
        }

        health.update_providers(&config.providers);

        let snapshot = RouteSnapshot {
            config: Arc::new(config.clone()),
            view: groups.merged_view(),
            custom_router: custom.current(),
            version_id: outcome.version.id.clone(),
            ordinal: outcome.version.ordinal,
            checksum: outcome.version.checksum.clone(),
            active_group: groups.active_group_id().map(str::to_string),
            health: health.clone(),
        };

        let router = Arc::new(Self {
            mutable: Mutex::new(Mutable {
                versions,
                groups,
                custom,
                _watcher: None,
            }),
            snapshot: ArcSwap::from_pointee(snapshot),
            validator: Validator::new(options.validator.clone()),
            health: health.clone(),
            events,
            state: std::sync::Mutex::new(StateMachine::new()),
            options,
            config_path,
        });

        router.with_state(|s| s.record_success());
        health.start_health_checks();

        if router.options.hot_reload {
            router.start_watcher(&config).await?;
        }

        tracing::info!(
            version_id = %outcome.version.id,
            hot_reload = router.options.hot_reload,
            "Dynamic router initialized"
        );

        Ok(router)
    }

    /// Current published snapshot. Cheap; callers keep the returned Arc
    /// for the whole request.
    pub fn snapshot(&self) -> Arc<RouteSnapshot> {
        self.snapshot.load_full()
    }

    pub fn subscribe(&self) -> broadcast::Receiver<GatewayEvent> {
        self.events.subscribe()
    }

    pub fn state(&self) -> ComponentState {
        self.with_state(|s| s.state)
    }

    /// Routing failures degrade the coordinator without touching config
    /// state.
    pub fn note_routing_error(&self) {
        self.with_state(|s| s.record_error());
    }

    /// Run a candidate config through the update pipeline.
    pub async fn apply_update(&self, new_config: ConfigDocument, source: VersionSource) -> UpdateReport {
        let report = {
            let mut guard = self.mutable.lock().await;
            self.apply_update_locked(&mut guard, new_config, source).await
        };

        // Events go out after the lock is released.
        if report.success {
            if let (Some(version_id), Some(ordinal)) =
                (report.version_id.clone(), report.ordinal)
            {
                self.events.emit(GatewayEvent::ConfigUpdated {
                    version_id,
                    ordinal,
                    source,
                });
            }
        } else {
            self.events.emit(GatewayEvent::UpdateFailed {
                reason: report
                    .error
                    .clone()
                    .unwrap_or_else(|| "validation failed".to_string()),
                rollback_performed: report.rollback_performed,
            });
        }

        report
    }

    /// Re-read the on-disk config and run it through the pipeline.
    pub async fn hot_reload(&self) -> UpdateReport {
        let config = {
            let guard = self.mutable.lock().await;
            guard.versions.store().read()
        };
        match config {
            Ok(config) => self.apply_update(config, VersionSource::Api).await,
            Err(e) => {
                self.with_state(|s| s.record_error());
                let report = UpdateReport {
                    success: false,
                    version_id: None,
                    ordinal: None,
                    validation: None,
                    rollback_performed: false,
                    error: Some(e.to_string()),
                };
                self.events.emit(GatewayEvent::UpdateFailed {
                    reason: e.to_string(),
                    rollback_performed: false,
                });
                report
            }
        }
    }

    async fn apply_update_locked(
        &self,
        guard: &mut Mutable,
        new_config: ConfigDocument,
        source: VersionSource,
    ) -> UpdateReport {
        let validation = if self.options.validation {
            let report = self.validator.validate(&new_config).await;
            if report.has_blocking_errors() {
                let rollback_performed = if self.options.rollback_on_failure {
                    match guard.versions.restore_active_to_disk() {
                        Ok(active) => {
                            tracing::warn!(
                                version_id = %active.id,
                                "Rejected config rolled back to active version"
                            );
                            true
                        }
                        Err(e) => {
                            tracing::error!(error = %e, "Rollback after failed validation failed");
                            false
                        }
                    }
                } else {
                    false
                };

                self.with_state(|s| s.record_error());
                return UpdateReport {
                    success: false,
                    version_id: None,
                    ordinal: None,
                    validation: Some(report),
                    rollback_performed,
                    error: Some("config validation failed".to_string()),
                };
            }
            Some(report)
        } else {
            None
        };

        let outcome = match guard.versions.add_version(new_config.clone(), source, None) {
            Ok(outcome) => outcome,
            Err(e) => {
                self.with_state(|s| s.record_error());
                return UpdateReport {
                    success: false,
                    version_id: None,
                    ordinal: None,
                    validation,
                    rollback_performed: false,
                    error: Some(e.to_string()),
                };
            }
        };

        let preferred = guard.groups.active_group_id().map(str::to_string);
        guard.groups =
            RouterGroupManager::with_preferred_group(&new_config, preferred.as_deref());

        // A broken custom-router file must not sink the update; the
        // previous binding stays in place.
        if let Err(e) = guard
            .custom
            .reload(new_config.custom_router_path.as_deref().map(std::path::Path::new))
        {
            tracing::warn!(error = %e, "Custom router rebind failed, keeping previous binding");
        }

        self.health.update_providers(&new_config.providers);

        // Durability: new versions from manual or API sources are written
        // through; file-watch updates are already on disk in the
        // operator's own formatting.
        if outcome.created && source != VersionSource::FileWatch {
            if let Err(e) = guard.versions.store().write(&new_config) {
                tracing::error!(error = %e, "Write-through of updated config failed");
            }
        }

        self.publish_locked(guard);
        self.with_state(|s| s.record_success());

        UpdateReport {
            success: true,
            version_id: Some(outcome.version.id),
            ordinal: Some(outcome.version.ordinal),
            validation,
            rollback_performed: false,
            error: None,
        }
    }

    /// Re-activate a stored version and republish.
    pub async fn rollback(&self, version_id: &str) -> AppResult<ConfigVersion> {
        let restored = {
            let mut guard = self.mutable.lock().await;
            let restored = guard.versions.rollback_to(version_id)?;

            guard.groups = RouterGroupManager::from_config(&restored.config);
            if let Err(e) = guard.custom.reload(
                restored
                    .config
                    .custom_router_path
                    .as_deref()
                    .map(std::path::Path::new),
            ) {
                tracing::warn!(error = %e, "Custom router rebind failed during rollback");
            }
            self.health.update_providers(&restored.config.providers);
            self.publish_locked(&mut guard);
            restored
        };

        self.with_state(|s| s.record_success());
        self.events.emit(GatewayEvent::RollbackCompleted {
            version_id: restored.id.clone(),
        });
        Ok(restored)
    }

    /// Switch the active router group. Runtime-only: no version is
    /// created and the file is untouched.
    pub async fn switch_group(&self, group_id: &str) -> AppResult<String> {
        let from = {
            let mut guard = self.mutable.lock().await;
            let from = guard.groups.active_group_id().map(str::to_string);
            guard.groups.switch_to(group_id)?;
            self.publish_locked(&mut guard);
            from
        };

        self.events.emit(GatewayEvent::GroupSwitched {
            from,
            to: group_id.to_string(),
        });
        Ok(group_id.to_string())
    }

    /// Validate a candidate without touching any state.
    pub async fn validate_candidate(&self, candidate: serde_json::Value) -> ValidationReport {
        self.validator.validate_value(candidate).await
    }

    pub async fn status(&self) -> StatusReport {
        let guard = self.mutable.lock().await;
        let active = guard.versions.active();
        StatusReport {
            status: self.state(),
            version: active.map(|v| v.id.clone()),
            ordinal: active.map(|v| v.ordinal),
            checksum: active.map(|v| v.checksum.clone()),
            timestamp: active.map(|v| v.timestamp),
            active_group: guard.groups.active_group_id().map(str::to_string),
            provider_count: self.snapshot().config.providers.len(),
            hot_reload_enabled: self.options.hot_reload,
        }
    }

    pub async fn versions_overview(&self) -> VersionsOverview {
        let guard = self.mutable.lock().await;
        VersionsOverview {
            current: guard.versions.active().map(|v| v.id.clone()),
            metadata: VersionsMetadata {
                total: guard.versions.versions().len(),
                max_versions: self.options.max_versions,
            },
            versions: guard.versions.versions().to_vec(),
        }
    }

    pub async fn diff(&self, from_id: &str, to_id: &str) -> AppResult<crate::config::versions::VersionDiff> {
        let guard = self.mutable.lock().await;
        guard.versions.diff(from_id, to_id)
    }

    pub async fn groups_overview(&self) -> (Vec<GroupSummary>, Option<String>) {
        let guard = self.mutable.lock().await;
        let current = guard.groups.active_group_id().map(str::to_string);
        let summaries = guard
            .groups
            .groups()
            .iter()
            .map(|(id, group)| summarize_group(id, group, current.as_deref()))
            .collect();
        (summaries, current)
    }

    pub async fn get_group(&self, id: &str) -> AppResult<GroupSummary> {
        let guard = self.mutable.lock().await;
        let current = guard.groups.active_group_id();
        guard
            .groups
            .get(id)
            .map(|group| summarize_group(id, group, current))
            .ok_or_else(|| AppError::Group(id.to_string()))
    }

    /// Ask the external supervisor for a restart.
    pub fn request_restart(&self) {
        self.events.emit(GatewayEvent::RestartRequested);
    }

    pub fn health(&self) -> &Arc<HealthManager> {
        &self.health
    }

    fn publish_locked(&self, guard: &mut Mutable) {
        let active = guard
            .versions
            .active()
            .expect("an active version always exists after initialization");
        let snapshot = RouteSnapshot {
            config: Arc::new(active.config.clone()),
            view: guard.groups.merged_view(),
            custom_router: guard.custom.current(),
            version_id: active.id.clone(),
            ordinal: active.ordinal,
            checksum: active.checksum.clone(),
            active_group: guard.groups.active_group_id().map(str::to_string),
            health: self.health.clone(),
        };
        self.snapshot.store(Arc::new(snapshot));
    }

    async fn start_watcher(self: &Arc<Self>, config: &ConfigDocument) -> AppResult<()> {
        let custom_path = config.custom_router_path.as_ref().map(PathBuf::from);
        let (watcher, mut rx) = ConfigWatcher::spawn(
            self.config_path.clone(),
            custom_path,
            self.options.watcher.clone(),
        )?;

        {
            let mut guard = self.mutable.lock().await;
            guard._watcher = Some(watcher);
        }

        let router = Arc::clone(self);
        tokio::spawn(async move {
            while let Some(event) = rx.recv().await {
                if let Some(error) = &event.error {
                    tracing::warn!(
                        path = %event.path.display(),
                        %error,
                        "File change observed but unreadable"
                    );
                    continue;
                }
                match event.kind {
                    ChangeKind::Config => {
                        let Some(content) = event.content else { continue };
                        match ConfigDocument::from_json_str(&content) {
                            Ok(config) => {
                                let _ = router
                                    .apply_update(config, VersionSource::FileWatch)
                                    .await;
                            }
                            Err(e) => {
                                tracing::warn!(error = %e, "Watched config does not parse");
                                router.with_state(|s| s.record_error());
                                router.events.emit(GatewayEvent::UpdateFailed {
                                    reason: e.to_string(),
                                    rollback_performed: false,
                                });
                            }
                        }
                    }
                    ChangeKind::CustomRouter => {
                        router.rebind_custom_router().await;
                    }
                }
            }
        });

        Ok(())
    }

    async fn rebind_custom_router(&self) {
        let mut guard = self.mutable.lock().await;
        let path = self
            .snapshot()
            .config
            .custom_router_path
            .as_ref()
            .map(PathBuf::from);
        if let Err(e) = guard.custom.reload(path.as_deref()) {
            tracing::warn!(error = %e, "Custom router reload failed, keeping previous binding");
            return;
        }
        self.publish_locked(&mut guard);
    }

    fn with_state<R>(&self, f: impl FnOnce(&mut StateMachine) -> R) -> R {
        let mut guard = match self.state.lock() {
            Ok(guard) => guard,
            Err(err) => err.into_inner(),
        };
        f(&mut guard)
    }
}

fn summarize_group(id: &str, group: &RouterGroup, current: Option<&str>) -> GroupSummary {
    GroupSummary {
        id: id.to_string(),
        name: if group.name.is_empty() {
            id.to_string()
        } else {
            group.name.clone()
        },
        description: group.description.clone(),
        routes: group.routes.clone(),
        is_active: current == Some(id),
    }
}

/// Keep routing functional: a config without a usable default route gets
/// one synthesized from the first provider that lists a model.
fn ensure_default_route(config: &mut ConfigDocument) {
    let missing = config
        .router
        .default
        .as_deref()
        .map(|d| d.trim().is_empty())
        .unwrap_or(true);
    if !missing {
        return;
    }

    match config.providers.iter().find(|p| !p.models.is_empty()) {
        Some(provider) => {
            let target = format!("{},{}", provider.name, provider.models[0]);
            tracing::warn!(%target, "No default route configured, synthesizing one");
            config.router.default = Some(target);
        }
        None => {
            tracing::warn!("No default route and no providers; routing will fail until configured");
        }
    }
}
