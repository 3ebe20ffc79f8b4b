//! Config version history
//!
//! A bounded ring of past configs keyed by canonical checksum. Exactly
//! one version is active at any time; rollback re-activates a stored
//! version, keeps an audit sentinel for the outgoing one, and writes the
//! restored config back through the store.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::config::store::ConfigStore;
use crate::config::{ConfigDocument, checksum_value};
use crate::error::{AppError, AppResult};

/// Default ring capacity.
pub const DEFAULT_MAX_VERSIONS: usize = 10;

/// Where an update came from
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum VersionSource {
    Manual,
    FileWatch,
    Api,
}

/// One stored config version
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ConfigVersion {
    pub id: String,
    pub ordinal: u64,
    pub timestamp: DateTime<Utc>,
    pub checksum: String,
    #[serde(skip_serializing)]
    pub config: ConfigDocument,
    pub is_active: bool,
    pub source: VersionSource,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    pub rollback_supported: bool,
}

/// Result of `add_version`
#[derive(Debug, Clone)]
pub struct AddOutcome {
    pub version: ConfigVersion,
    /// False when the candidate matched the active checksum and the
    /// existing version was returned unchanged.
    pub created: bool,
}

/// Top-level diff between two stored versions
#[derive(Debug, Clone, Serialize)]
pub struct VersionDiff {
    pub added: serde_json::Map<String, Value>,
    pub removed: serde_json::Map<String, Value>,
    pub modified: serde_json::Map<String, Value>,
    pub unchanged: serde_json::Map<String, Value>,
}

/// Bounded ring of config versions, newest first
#[derive(Debug)]
pub struct VersionManager {
    versions: Vec<ConfigVersion>,
    max_versions: usize,
    next_ordinal: u64,
    store: ConfigStore,
}

impl VersionManager {
    pub fn new(store: ConfigStore, max_versions: usize) -> Self {
        Self {
            versions: Vec::new(),
            max_versions: max_versions.max(1),
            next_ordinal: 1,
            store,
        }
    }

    pub fn versions(&self) -> &[ConfigVersion] {
        &self.versions
    }

    pub fn active(&self) -> Option<&ConfigVersion> {
        self.versions.iter().find(|v| v.is_active)
    }

    pub fn get(&self, id: &str) -> Option<&ConfigVersion> {
        self.versions.iter().find(|v| v.id == id)
    }

    pub fn store(&self) -> &ConfigStore {
        &self.store
    }

    /// Add a version for `config`. Idempotent: a candidate whose
    /// canonical checksum equals the active version's returns the active
    /// version unchanged.
    pub fn add_version(
        &mut self,
        config: ConfigDocument,
        source: VersionSource,
        description: Option<String>,
    ) -> AppResult<AddOutcome> {
        let checksum = config.checksum()?;

        if let Some(active) = self.active() {
            if active.checksum == checksum {
                tracing::debug!(
                    version_id = %active.id,
                    "Candidate config matches active checksum, no new version"
                );
                return Ok(AddOutcome {
                    version: active.clone(),
                    created: false,
                });
            }
        }

        for version in &mut self.versions {
            version.is_active = false;
        }

        let version = ConfigVersion {
            id: uuid::Uuid::new_v4().to_string(),
            ordinal: self.next_ordinal,
            timestamp: Utc::now(),
            checksum,
            config,
            is_active: true,
            source,
            description,
            rollback_supported: true,
        };
        self.next_ordinal += 1;

        tracing::info!(
            version_id = %version.id,
            ordinal = version.ordinal,
            source = ?source,
            "New config version activated"
        );

        self.versions.insert(0, version.clone());
        self.evict_over_capacity();

        Ok(AddOutcome {
            version,
            created: true,
        })
    }

    /// Load the on-disk config and register it as a version.
    pub fn sync_from_file(&mut self, source: VersionSource) -> AppResult<AddOutcome> {
        let config = self.store.read()?;
        self.add_version(config, source, Some("synchronized from file".to_string()))
    }

    /// Re-activate a stored version. The outgoing active version is kept
    /// as a `backup-*` audit entry, and the restored config is written
    /// back to disk.
    pub fn rollback_to(&mut self, id: &str) -> AppResult<ConfigVersion> {
        let target_index = self
            .versions
            .iter()
            .position(|v| v.id == id)
            .ok_or_else(|| AppError::Version(format!("unknown version '{id}'")))?;

        if !self.versions[target_index].rollback_supported {
            return Err(AppError::Version(format!(
                "version '{id}' does not support rollback"
            )));
        }

        let sentinel = self.active().filter(|a| a.id != id).map(|active| {
            let mut sentinel = active.clone();
            sentinel.id = format!("backup-{}", active.id);
            sentinel.ordinal = self.next_ordinal;
            sentinel.timestamp = Utc::now();
            sentinel.is_active = false;
            sentinel.rollback_supported = false;
            sentinel.description = Some(format!("pre-rollback snapshot of {}", active.id));
            sentinel
        });

        for version in &mut self.versions {
            version.is_active = false;
        }
        self.versions[target_index].is_active = true;
        let restored = self.versions[target_index].clone();

        if let Some(sentinel) = sentinel {
            self.next_ordinal += 1;
            tracing::info!(
                sentinel_id = %sentinel.id,
                restored_id = %restored.id,
                "Rollback: audit sentinel recorded"
            );
            self.versions.insert(0, sentinel);
            self.evict_over_capacity();
        }

        self.store.write(&restored.config)?;
        Ok(restored)
    }

    /// Rewrite the on-disk file from the active version, undoing an
    /// external write that failed validation.
    pub fn restore_active_to_disk(&self) -> AppResult<ConfigVersion> {
        let active = self
            .active()
            .ok_or_else(|| AppError::Version("no active version to restore".to_string()))?;
        self.store.write(&active.config)?;
        Ok(active.clone())
    }

    /// Top-level key diff between two stored versions.
    pub fn diff(&self, from_id: &str, to_id: &str) -> AppResult<VersionDiff> {
        let from = self
            .get(from_id)
            .ok_or_else(|| AppError::Version(format!("unknown version '{from_id}'")))?;
        let to = self
            .get(to_id)
            .ok_or_else(|| AppError::Version(format!("unknown version '{to_id}'")))?;

        let from_value = from.config.to_value()?;
        let to_value = to.config.to_value()?;
        let empty = serde_json::Map::new();
        let from_map = from_value.as_object().unwrap_or(&empty);
        let to_map = to_value.as_object().unwrap_or(&empty);

        let mut diff = VersionDiff {
            added: serde_json::Map::new(),
            removed: serde_json::Map::new(),
            modified: serde_json::Map::new(),
            unchanged: serde_json::Map::new(),
        };

        for (key, to_val) in to_map {
            match from_map.get(key) {
                None => {
                    diff.added.insert(key.clone(), to_val.clone());
                }
                Some(from_val) if from_val == to_val => {
                    diff.unchanged.insert(key.clone(), to_val.clone());
                }
                Some(from_val) => {
                    diff.modified.insert(
                        key.clone(),
                        serde_json::json!({"old": from_val, "new": to_val}),
                    );
                }
            }
        }
        for (key, from_val) in from_map {
            if !to_map.contains_key(key) {
                diff.removed.insert(key.clone(), from_val.clone());
            }
        }

        Ok(diff)
    }

    /// Recompute every stored checksum and assert exactly one active
    /// version.
    pub fn validate_integrity(&self) -> AppResult<()> {
        for version in &self.versions {
            let recomputed = checksum_value(&version.config.to_value()?);
            if recomputed != version.checksum {
                return Err(AppError::Version(format!(
                    "checksum mismatch for version '{}'",
                    version.id
                )));
            }
        }

        let active_count = self.versions.iter().filter(|v| v.is_active).count();
        if !self.versions.is_empty() && active_count != 1 {
            return Err(AppError::Version(format!(
                "expected exactly one active version, found {active_count}"
            )));
        }

        Ok(())
    }

    fn evict_over_capacity(&mut self) {
        while self.versions.len() > self.max_versions {
            // Oldest non-active entry goes first; the active version is
            // never evicted.
            let Some(index) = self.versions.iter().rposition(|v| !v.is_active) else {
                break;
            };
            let evicted = self.versions.remove(index);
            tracing::debug!(
                version_id = %evicted.id,
                ordinal = evicted.ordinal,
                "Version evicted from ring"
            );
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config_with_port(port: u16) -> ConfigDocument {
        ConfigDocument::from_json_str(&format!(
            r#"{{
                "Providers": [{{
                    "name": "p1",
                    "api_base_url": "https://api.example.com/v1",
                    "api_key": "key-0123456789",
                    "models": ["model-x"]
                }}],
                "Router": {{"default": "p1,model-x"}},
                "PORT": {port}
            }}"#
        ))
        .unwrap()
    }

    fn manager(dir: &tempfile::TempDir, max: usize) -> VersionManager {
        VersionManager::new(ConfigStore::new(dir.path().join("config.json")), max)
    }

    #[test]
    fn test_add_version_activates_exactly_one() {
        let dir = tempfile::tempdir().unwrap();
        let mut vm = manager(&dir, 10);

        vm.add_version(config_with_port(1), VersionSource::Manual, None)
            .unwrap();
        vm.add_version(config_with_port(2), VersionSource::Api, None)
            .unwrap();
        vm.add_version(config_with_port(3), VersionSource::FileWatch, None)
            .unwrap();

        assert_eq!(vm.versions().len(), 3);
        assert_eq!(vm.versions().iter().filter(|v| v.is_active).count(), 1);
        assert_eq!(vm.active().unwrap().config.port, Some(3));
        vm.validate_integrity().unwrap();
    }

    #[test]
    fn test_add_version_is_idempotent_on_canonical_equality() {
        let dir = tempfile::tempdir().unwrap();
        let mut vm = manager(&dir, 10);

        let first = vm
            .add_version(config_with_port(1), VersionSource::Manual, None)
            .unwrap();
        assert!(first.created);

        let second = vm
            .add_version(config_with_port(1), VersionSource::Api, None)
            .unwrap();
        assert!(!second.created);
        assert_eq!(second.version.id, first.version.id);
        assert_eq!(vm.versions().len(), 1);
    }

    #[test]
    fn test_ordinals_increase_monotonically() {
        let dir = tempfile::tempdir().unwrap();
        let mut vm = manager(&dir, 10);

        let a = vm
            .add_version(config_with_port(1), VersionSource::Manual, None)
            .unwrap();
        let b = vm
            .add_version(config_with_port(2), VersionSource::Manual, None)
            .unwrap();
        assert_eq!(b.version.ordinal, a.version.ordinal + 1);
    }

    #[test]
    fn test_eviction_never_removes_active() {
        let dir = tempfile::tempdir().unwrap();
        let mut vm = manager(&dir, 3);

        for port in 1..=6 {
            vm.add_version(config_with_port(port), VersionSource::Manual, None)
                .unwrap();
        }

        assert_eq!(vm.versions().len(), 3);
        assert!(vm.active().is_some());
        assert_eq!(vm.active().unwrap().config.port, Some(6));
        vm.validate_integrity().unwrap();
    }

    #[test]
    fn test_rollback_restores_config_and_writes_file() {
        let dir = tempfile::tempdir().unwrap();
        let mut vm = manager(&dir, 10);

        let v1 = vm
            .add_version(config_with_port(1), VersionSource::Manual, None)
            .unwrap();
        vm.add_version(config_with_port(2), VersionSource::Manual, None)
            .unwrap();
        let v3 = vm
            .add_version(config_with_port(3), VersionSource::Manual, None)
            .unwrap();

        let restored = vm.rollback_to(&v1.version.id).unwrap();
        assert_eq!(restored.config.port, Some(1));
        assert!(vm.active().unwrap().id == v1.version.id);

        // Audit sentinel for the outgoing active version.
        let sentinel_id = format!("backup-{}", v3.version.id);
        let sentinel = vm.get(&sentinel_id).expect("sentinel present");
        assert!(!sentinel.rollback_supported);
        assert!(!sentinel.is_active);

        // On-disk file now holds v1's config.
        let on_disk = vm.store().read().unwrap();
        assert_eq!(on_disk, v1.version.config);

        vm.validate_integrity().unwrap();
    }

    #[test]
    fn test_rollback_unknown_version_errors() {
        let dir = tempfile::tempdir().unwrap();
        let mut vm = manager(&dir, 10);
        vm.add_version(config_with_port(1), VersionSource::Manual, None)
            .unwrap();

        let err = vm.rollback_to("nope").unwrap_err();
        assert!(matches!(err, AppError::Version(_)));
    }

    #[test]
    fn test_rollback_sentinel_is_not_rollback_target() {
        let dir = tempfile::tempdir().unwrap();
        let mut vm = manager(&dir, 10);

        let v1 = vm
            .add_version(config_with_port(1), VersionSource::Manual, None)
            .unwrap();
        let v2 = vm
            .add_version(config_with_port(2), VersionSource::Manual, None)
            .unwrap();
        vm.rollback_to(&v1.version.id).unwrap();

        let sentinel_id = format!("backup-{}", v2.version.id);
        let err = vm.rollback_to(&sentinel_id).unwrap_err();
        assert!(matches!(err, AppError::Version(_)));
    }

    #[test]
    fn test_diff_of_version_with_itself_is_all_unchanged() {
        let dir = tempfile::tempdir().unwrap();
        let mut vm = manager(&dir, 10);
        let v1 = vm
            .add_version(config_with_port(1), VersionSource::Manual, None)
            .unwrap();

        let diff = vm.diff(&v1.version.id, &v1.version.id).unwrap();
        assert!(diff.added.is_empty());
        assert!(diff.removed.is_empty());
        assert!(diff.modified.is_empty());
        assert!(!diff.unchanged.is_empty());
    }

    #[test]
    fn test_diff_reports_modified_with_old_and_new() {
        let dir = tempfile::tempdir().unwrap();
        let mut vm = manager(&dir, 10);
        let v1 = vm
            .add_version(config_with_port(1), VersionSource::Manual, None)
            .unwrap();
        let v2 = vm
            .add_version(config_with_port(2), VersionSource::Manual, None)
            .unwrap();

        let diff = vm.diff(&v1.version.id, &v2.version.id).unwrap();
        let port = diff.modified.get("PORT").expect("PORT modified");
        assert_eq!(port["old"], serde_json::json!(1));
        assert_eq!(port["new"], serde_json::json!(2));
        assert!(diff.unchanged.contains_key("Router"));
    }

    #[test]
    fn test_restore_active_to_disk() {
        let dir = tempfile::tempdir().unwrap();
        let mut vm = manager(&dir, 10);
        vm.add_version(config_with_port(7), VersionSource::Manual, None)
            .unwrap();

        // Simulate an operator writing junk to the file.
        std::fs::write(dir.path().join("config.json"), "{broken").unwrap();

        vm.restore_active_to_disk().unwrap();
        assert_eq!(vm.store().read().unwrap().port, Some(7));
    }
}
