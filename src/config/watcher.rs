//! Config file watcher
//!
//! Bridges `notify` filesystem events onto the tokio runtime, debounces
//! bursts of writes, and only emits an event when the MD5 of the file
//! content actually changed since the last emission. A short write-settle
//! pause runs before hashing so a writer mid-save is not observed.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::time::Duration;

use chrono::{DateTime, Utc};
use notify::{Event, EventKind, RecommendedWatcher, RecursiveMode, Watcher};
use tokio::sync::mpsc;
use tokio::time::Instant;

use crate::error::{AppError, AppResult};

/// Which watched file changed
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ChangeKind {
    Config,
    CustomRouter,
}

/// A debounced, content-hashed change notification
#[derive(Debug, Clone)]
pub struct ConfigChangeEvent {
    pub kind: ChangeKind,
    pub path: PathBuf,
    pub content: Option<String>,
    /// MD5 of the content at emission time; empty when the read failed.
    pub checksum: String,
    pub timestamp: DateTime<Utc>,
    pub error: Option<String>,
}

/// Raw change notification fed into the debouncer
#[derive(Debug, Clone)]
pub struct RawChange {
    pub kind: ChangeKind,
    pub path: PathBuf,
}

#[derive(Debug, Clone)]
pub struct WatcherOptions {
    /// Minimum time between successive emissions for the same path.
    pub debounce: Duration,
    /// Pause before hashing, letting a writer finish its save.
    pub settle: Duration,
}

impl Default for WatcherOptions {
    fn default() -> Self {
        Self {
            debounce: Duration::from_millis(500),
            settle: Duration::from_millis(100),
        }
    }
}

/// Filesystem watcher over the config file and (optionally) the custom
/// router file. Dropping the watcher stops the event stream.
pub struct ConfigWatcher {
    _watcher: RecommendedWatcher,
}

impl ConfigWatcher {
    /// Start watching. Returns the watcher handle and the channel of
    /// debounced change events.
    pub fn spawn(
        config_path: PathBuf,
        custom_router_path: Option<PathBuf>,
        options: WatcherOptions,
    ) -> AppResult<(Self, mpsc::Receiver<ConfigChangeEvent>)> {
        let (raw_tx, raw_rx) = mpsc::unbounded_channel();

        let targets: Vec<(ChangeKind, PathBuf)> = std::iter::once((
            ChangeKind::Config,
            config_path.clone(),
        ))
        .chain(
            custom_router_path
                .iter()
                .map(|p| (ChangeKind::CustomRouter, p.clone())),
        )
        .collect();

        let classify_targets = targets.clone();
        let mut watcher = notify::recommended_watcher(move |res: notify::Result<Event>| {
            match res {
                Ok(event) => {
                    if matches!(event.kind, EventKind::Access(_)) {
                        return;
                    }
                    for path in &event.paths {
                        for (kind, target) in &classify_targets {
                            if same_file(path, target) {
                                let _ = raw_tx.send(RawChange {
                                    kind: *kind,
                                    path: target.clone(),
                                });
                            }
                        }
                    }
                }
                Err(err) => {
                    tracing::warn!(error = %err, "file watcher error");
                }
            }
        })
        .map_err(|e| AppError::ConfigIo(format!("failed to create file watcher: {e}")))?;

        // Watch the parent directory: editors and our own store replace
        // the file by rename, which drops a watch held on the file itself.
        for (_, target) in &targets {
            let dir = nearest_existing_ancestor(target).ok_or_else(|| {
                AppError::ConfigIo(format!("no watchable ancestor for {}", target.display()))
            })?;
            watcher
                .watch(&dir, RecursiveMode::NonRecursive)
                .map_err(|e| {
                    AppError::ConfigIo(format!("failed to watch {}: {e}", dir.display()))
                })?;
        }

        let rx = spawn_debouncer(raw_rx, options);
        Ok((Self { _watcher: watcher }, rx))
    }
}

/// Consume raw changes, coalesce bursts within the debounce window, and
/// emit at most one content-hashed event per window and path.
pub fn spawn_debouncer(
    mut raw_rx: mpsc::UnboundedReceiver<RawChange>,
    options: WatcherOptions,
) -> mpsc::Receiver<ConfigChangeEvent> {
    let (tx, rx) = mpsc::channel(32);

    tokio::spawn(async move {
        let mut pending: HashMap<ChangeKind, PathBuf> = HashMap::new();
        let mut last_checksums: HashMap<ChangeKind, String> = HashMap::new();
        let mut deadline: Option<Instant> = None;

        loop {
            let sleep_target = deadline.unwrap_or_else(|| {
                // Far future; replaced as soon as a change arrives.
                Instant::now() + Duration::from_secs(3600)
            });

            tokio::select! {
                maybe = raw_rx.recv() => {
                    match maybe {
                        Some(change) => {
                            pending.insert(change.kind, change.path);
                            if deadline.is_none() {
                                deadline = Some(Instant::now() + options.debounce);
                            }
                        }
                        None => break,
                    }
                }
                _ = tokio::time::sleep_until(sleep_target), if deadline.is_some() => {
                    deadline = None;
                    let batch: Vec<(ChangeKind, PathBuf)> = pending.drain().collect();

                    tokio::time::sleep(options.settle).await;

                    for (kind, path) in batch {
                        if let Some(event) = build_event(kind, &path, &mut last_checksums) {
                            if tx.send(event).await.is_err() {
                                return;
                            }
                        }
                    }
                }
            }
        }
    });

    rx
}

fn build_event(
    kind: ChangeKind,
    path: &Path,
    last_checksums: &mut HashMap<ChangeKind, String>,
) -> Option<ConfigChangeEvent> {
    match std::fs::read_to_string(path) {
        Ok(content) => {
            let checksum = format!("{:x}", md5::compute(content.as_bytes()));
            if last_checksums.get(&kind) == Some(&checksum) {
                tracing::debug!(
                    path = %path.display(),
                    %checksum,
                    "Change notification suppressed, content unchanged"
                );
                return None;
            }
            last_checksums.insert(kind, checksum.clone());
            Some(ConfigChangeEvent {
                kind,
                path: path.to_path_buf(),
                content: Some(content),
                checksum,
                timestamp: Utc::now(),
                error: None,
            })
        }
        Err(err) => Some(ConfigChangeEvent {
            kind,
            path: path.to_path_buf(),
            content: None,
            checksum: String::new(),
            timestamp: Utc::now(),
            error: Some(format!("failed to read {}: {err}", path.display())),
        }),
    }
}

fn same_file(a: &Path, b: &Path) -> bool {
    a == b || (a.file_name() == b.file_name() && a.parent() == b.parent())
}

fn nearest_existing_ancestor(path: &Path) -> Option<PathBuf> {
    let mut cursor = path.parent()?;
    loop {
        if cursor.exists() {
            return Some(cursor.to_path_buf());
        }
        cursor = cursor.parent()?;
    }
}
