//! On-disk config store
//!
//! Reads the config document from a fixed path; writes go through a
//! timestamped backup of the current file followed by a same-directory
//! temp file and an atomic rename.

use std::path::{Path, PathBuf};

use chrono::Utc;

use crate::config::ConfigDocument;
use crate::error::{AppError, AppResult};

/// Handle on the operator-edited config file
#[derive(Debug, Clone)]
pub struct ConfigStore {
    path: PathBuf,
}

impl ConfigStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// Default location: `~/.polyroute/config.json`.
    pub fn default_path() -> PathBuf {
        dirs::home_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join(".polyroute")
            .join("config.json")
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Read and parse the config document.
    pub fn read(&self) -> AppResult<ConfigDocument> {
        let content = self.read_raw()?;
        ConfigDocument::from_json_str(&content)
    }

    /// Read the raw file content without parsing.
    pub fn read_raw(&self) -> AppResult<String> {
        std::fs::read_to_string(&self.path).map_err(|e| {
            AppError::ConfigIo(format!(
                "failed to read config file {}: {e}",
                self.path.display()
            ))
        })
    }

    /// Write the document: backup the current file, then replace the
    /// target atomically (temp file + rename in the same directory).
    ///
    /// Returns the backup path when a previous file existed.
    pub fn write(&self, config: &ConfigDocument) -> AppResult<Option<PathBuf>> {
        let serialized = serde_json::to_string_pretty(config)
            .map_err(|e| AppError::Internal(format!("config serialization failed: {e}")))?;

        let parent = self.path.parent().unwrap_or_else(|| Path::new("."));
        std::fs::create_dir_all(parent).map_err(|e| {
            AppError::ConfigIo(format!(
                "failed to create config directory {}: {e}",
                parent.display()
            ))
        })?;

        let backup = if self.path.exists() {
            let backup_path = PathBuf::from(format!(
                "{}.backup.{}",
                self.path.display(),
                Utc::now().timestamp()
            ));
            std::fs::copy(&self.path, &backup_path).map_err(|e| {
                AppError::ConfigIo(format!(
                    "failed to back up {} to {}: {e}",
                    self.path.display(),
                    backup_path.display()
                ))
            })?;
            Some(backup_path)
        } else {
            None
        };

        let temp_path = parent.join(format!(
            ".{}.{}.tmp",
            self.path
                .file_name()
                .and_then(|n| n.to_str())
                .unwrap_or("config.json"),
            uuid::Uuid::new_v4()
        ));
        std::fs::write(&temp_path, serialized.as_bytes()).map_err(|e| {
            AppError::ConfigIo(format!(
                "failed to write temp file {}: {e}",
                temp_path.display()
            ))
        })?;
        std::fs::rename(&temp_path, &self.path).map_err(|e| {
            let _ = std::fs::remove_file(&temp_path);
            AppError::ConfigIo(format!(
                "failed to replace config file {}: {e}",
                self.path.display()
            ))
        })?;

        tracing::debug!(
            path = %self.path.display(),
            backup = ?backup,
            "Config file written"
        );

        Ok(backup)
    }
}
