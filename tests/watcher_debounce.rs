//! Debounced file watching against a real filesystem

use std::time::Duration;

use polyroute::config::watcher::{ChangeKind, ConfigWatcher, WatcherOptions};

fn fast_options() -> WatcherOptions {
    WatcherOptions {
        debounce: Duration::from_millis(150),
        settle: Duration::from_millis(20),
    }
}

#[tokio::test]
async fn test_write_burst_coalesces_to_one_event() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("config.json");
    std::fs::write(&path, r#"{"PORT": 0}"#).unwrap();

    let (_watcher, mut rx) = ConfigWatcher::spawn(path.clone(), None, fast_options()).unwrap();

    // A burst of writes well inside the debounce window.
    for i in 1..=100 {
        std::fs::write(&path, format!(r#"{{"PORT": {i}}}"#)).unwrap();
    }

    let event = tokio::time::timeout(Duration::from_secs(5), rx.recv())
        .await
        .expect("one event within the window")
        .expect("channel open");
    assert_eq!(event.kind, ChangeKind::Config);
    assert_eq!(event.content.as_deref(), Some(r#"{"PORT": 100}"#));
    assert!(event.error.is_none());

    // The burst produced exactly one event.
    let extra = tokio::time::timeout(Duration::from_millis(500), rx.recv()).await;
    assert!(extra.is_err(), "burst must coalesce to a single event");
}

#[tokio::test]
async fn test_second_distinct_write_emits_again() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("config.json");
    std::fs::write(&path, r#"{"PORT": 1}"#).unwrap();

    let (_watcher, mut rx) = ConfigWatcher::spawn(path.clone(), None, fast_options()).unwrap();

    std::fs::write(&path, r#"{"PORT": 2}"#).unwrap();
    let first = tokio::time::timeout(Duration::from_secs(5), rx.recv())
        .await
        .expect("first event")
        .unwrap();

    std::fs::write(&path, r#"{"PORT": 3}"#).unwrap();
    let second = tokio::time::timeout(Duration::from_secs(5), rx.recv())
        .await
        .expect("second event")
        .unwrap();

    assert_ne!(first.checksum, second.checksum);
    assert_eq!(second.content.as_deref(), Some(r#"{"PORT": 3}"#));
}

#[tokio::test]
async fn test_rewrite_with_same_content_is_suppressed() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("config.json");
    std::fs::write(&path, r#"{"PORT": 1}"#).unwrap();

    let (_watcher, mut rx) = ConfigWatcher::spawn(path.clone(), None, fast_options()).unwrap();

    std::fs::write(&path, r#"{"PORT": 2}"#).unwrap();
    tokio::time::timeout(Duration::from_secs(5), rx.recv())
        .await
        .expect("first event")
        .unwrap();

    // Touch the file with identical bytes.
    std::fs::write(&path, r#"{"PORT": 2}"#).unwrap();
    let extra = tokio::time::timeout(Duration::from_millis(500), rx.recv()).await;
    assert!(extra.is_err(), "unchanged content must not re-emit");
}

#[tokio::test]
async fn test_custom_router_file_is_watched_separately() {
    let dir = tempfile::tempdir().unwrap();
    let config_path = dir.path().join("config.json");
    let rules_path = dir.path().join("rules.json");
    std::fs::write(&config_path, r#"{"PORT": 1}"#).unwrap();
    std::fs::write(&rules_path, r#"[]"#).unwrap();

    let (_watcher, mut rx) =
        ConfigWatcher::spawn(config_path, Some(rules_path.clone()), fast_options()).unwrap();

    std::fs::write(&rules_path, r#"[{"route": "p,m"}]"#).unwrap();
    let event = tokio::time::timeout(Duration::from_secs(5), rx.recv())
        .await
        .expect("rules event")
        .unwrap();
    assert_eq!(event.kind, ChangeKind::CustomRouter);
    assert_eq!(event.content.as_deref(), Some(r#"[{"route": "p,m"}]"#));
}
