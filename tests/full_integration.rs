//! End-to-end tests driving a ConfigWatcher against real files.

use config_hotreload::core::WatcherState;
use config_hotreload::prelude::*;
use serde::Deserialize;
use std::fs;
use std::path::Path;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;
use tempfile::TempDir;
use tokio::sync::mpsc;

#[derive(Debug, Clone, Deserialize, PartialEq)]
struct IntegrationConfig {
    server: ServerConfig,
    workers: u32,
}

#[derive(Debug, Clone, Deserialize, PartialEq)]
struct ServerConfig {
    port: u16,
    host: String,
}

const POLL: Duration = Duration::from_millis(20);
const WAIT: Duration = Duration::from_secs(5);

/// Replace the file in one step so a poll never observes a half-written document.
fn replace_file(path: &Path, contents: &str) {
    let staging = path.with_extension("staging");
    fs::write(&staging, contents).unwrap();
    fs::rename(&staging, path).unwrap();
}

fn write_config(path: &Path, port: u16, workers: u32) {
    replace_file(
        path,
        &format!(
            "server:\n  port: {}\n  host: \"localhost\"\nworkers: {}\n",
            port, workers
        ),
    );
}

fn build_watcher(path: &Path) -> ConfigWatcher<IntegrationConfig> {
    ConfigWatcher::builder(path)
        .with_detected_format()
        .unwrap()
        .with_validation(|cfg: &IntegrationConfig| {
            if cfg.workers == 0 {
                return Err(ValidationError::invalid_field("workers", "must be > 0"));
            }
            Ok(())
        })
        .with_poll_interval(POLL)
        .with_callback_timeout(Duration::from_millis(200))
        .with_grace_period(Duration::from_millis(20))
        .build()
        .unwrap()
}

/// Subscribe a channel that receives every outcome.
async fn outcomes(
    watcher: &ConfigWatcher<IntegrationConfig>,
) -> mpsc::UnboundedReceiver<ReloadOutcome<IntegrationConfig>> {
    let (tx, rx) = mpsc::unbounded_channel();
    watcher
        .subscribe_named("recorder", move |_token, outcome| {
            let tx = tx.clone();
            async move {
                let _ = tx.send(outcome);
            }
        })
        .await;
    rx
}

async fn next_outcome(
    rx: &mut mpsc::UnboundedReceiver<ReloadOutcome<IntegrationConfig>>,
) -> ReloadOutcome<IntegrationConfig> {
    tokio::time::timeout(WAIT, rx.recv())
        .await
        .expect("no reload outcome within the wait window")
        .expect("outcome channel closed")
}

#[tokio::test]
async fn test_change_is_reloaded_and_dispatched() {
    let temp_dir = TempDir::new().unwrap();
    let config_path = temp_dir.path().join("config.yaml");
    write_config(&config_path, 8080, 4);

    let watcher = build_watcher(&config_path);
    let mut rx = outcomes(&watcher).await;
    tokio_test::assert_ok!(watcher.start().await);
    assert_eq!(watcher.current().unwrap().server.port, 8080);

    write_config(&config_path, 9090, 16);
    let outcome = next_outcome(&mut rx).await;
    let cfg = outcome.config().expect("reload should succeed");
    assert_eq!(cfg.server.port, 9090);
    assert_eq!(cfg.workers, 16);
    assert_eq!(watcher.current().unwrap().server.port, 9090);

    let stats = watcher.stats();
    assert_eq!(stats.reloads, 2);
    assert_eq!(stats.failures, 0);
    assert!(stats.dispatch.total >= 1);

    watcher.stop().await;
}

#[tokio::test]
async fn test_validation_failure_keeps_last_good_config() {
    let temp_dir = TempDir::new().unwrap();
    let config_path = temp_dir.path().join("config.yaml");
    write_config(&config_path, 8080, 4);

    let watcher = build_watcher(&config_path);
    let mut rx = outcomes(&watcher).await;
    watcher.start().await.unwrap();

    write_config(&config_path, 70, 0);
    let outcome = next_outcome(&mut rx).await;
    assert!(matches!(outcome.error(), Some(ConfigError::ValidationError(_))));
    assert_eq!(watcher.current().unwrap().server.port, 8080);
    assert_eq!(watcher.stats().failures, 1);

    watcher.stop().await;
}

#[tokio::test]
async fn test_parse_error_is_dispatched() {
    let temp_dir = TempDir::new().unwrap();
    let config_path = temp_dir.path().join("config.yaml");
    write_config(&config_path, 8080, 4);

    let watcher = build_watcher(&config_path);
    let mut rx = outcomes(&watcher).await;
    watcher.start().await.unwrap();

    replace_file(&config_path, "server: [unclosed\n");
    let outcome = next_outcome(&mut rx).await;
    assert!(matches!(
        outcome.error(),
        Some(ConfigError::ParseError(_) | ConfigError::DeserializationError(_))
    ));
    assert_eq!(watcher.current().unwrap().server.port, 8080);

    watcher.stop().await;
}

#[tokio::test]
async fn test_deleted_file_reports_io_errors_until_restored() {
    let temp_dir = TempDir::new().unwrap();
    let config_path = temp_dir.path().join("config.yaml");
    write_config(&config_path, 8080, 4);

    let watcher = build_watcher(&config_path);
    let mut rx = outcomes(&watcher).await;
    watcher.start().await.unwrap();

    fs::remove_file(&config_path).unwrap();
    for _ in 0..2 {
        let outcome = next_outcome(&mut rx).await;
        assert!(matches!(outcome.error(), Some(ConfigError::IoError(_))));
    }
    assert!(watcher.stats().io_errors >= 2);

    write_config(&config_path, 6060, 2);
    let restored = loop {
        let outcome = next_outcome(&mut rx).await;
        if let Some(cfg) = outcome.config() {
            break Arc::clone(cfg);
        }
    };
    assert_eq!(restored.server.port, 6060);

    watcher.stop().await;
}

#[tokio::test]
async fn test_reload_now_dispatches_to_subscribers() {
    let temp_dir = TempDir::new().unwrap();
    let config_path = temp_dir.path().join("config.json");
    fs::write(
        &config_path,
        r#"{"server": {"port": 3000, "host": "0.0.0.0"}, "workers": 8}"#,
    )
    .unwrap();

    let watcher = build_watcher(&config_path);
    let mut rx = outcomes(&watcher).await;

    // Works before start as well.
    let outcome = watcher.reload_now().await.unwrap();
    assert_eq!(outcome.config().unwrap().server.host, "0.0.0.0");
    let dispatched = next_outcome(&mut rx).await;
    assert!(dispatched.is_reloaded());
    assert_eq!(watcher.state(), WatcherState::Idle);
}

#[tokio::test]
async fn test_slow_and_panicking_subscribers_are_isolated() {
    let temp_dir = TempDir::new().unwrap();
    let config_path = temp_dir.path().join("config.toml");
    fs::write(
        &config_path,
        "workers = 2\n[server]\nport = 8080\nhost = \"localhost\"\n",
    )
    .unwrap();

    let watcher = build_watcher(&config_path);
    let delivered = Arc::new(AtomicUsize::new(0));

    watcher
        .subscribe_named("stuck", |_token, _outcome| async move {
            tokio::time::sleep(Duration::from_secs(60)).await;
        })
        .await;
    watcher
        .subscribe_named("broken", |_token, _outcome| async move {
            panic!("subscriber bug");
        })
        .await;
    let counter = Arc::clone(&delivered);
    watcher
        .subscribe_named("healthy", move |_token, _outcome| {
            let counter = Arc::clone(&counter);
            async move {
                counter.fetch_add(1, Ordering::SeqCst);
            }
        })
        .await;

    let outcome = watcher.reload_now().await.unwrap();
    assert!(outcome.is_reloaded());
    assert_eq!(delivered.load(Ordering::SeqCst), 1);

    let dispatch = watcher.stats().dispatch;
    assert_eq!(dispatch.timed_out, 1);
    assert_eq!(dispatch.panicked, 1);
    assert_eq!(dispatch.abandoned, 1);
    // The stuck subscriber is abandoned but still running, so it still holds a slot.
    assert_eq!(dispatch.active, 1);
}

#[tokio::test]
async fn test_unsubscribed_callback_is_not_invoked() {
    let temp_dir = TempDir::new().unwrap();
    let config_path = temp_dir.path().join("config.yaml");
    write_config(&config_path, 8080, 4);

    let watcher = build_watcher(&config_path);
    let calls = Arc::new(AtomicUsize::new(0));
    let counter = Arc::clone(&calls);
    let id = watcher
        .subscribe(move |_token, _outcome| {
            let counter = Arc::clone(&counter);
            async move {
                counter.fetch_add(1, Ordering::SeqCst);
            }
        })
        .await;

    watcher.reload_now().await.unwrap();
    assert!(watcher.unsubscribe(id).await);
    assert!(!watcher.unsubscribe(id).await);
    watcher.reload_now().await.unwrap();

    assert_eq!(calls.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn test_stop_is_idempotent_and_terminal() {
    let temp_dir = TempDir::new().unwrap();
    let config_path = temp_dir.path().join("config.yaml");
    write_config(&config_path, 8080, 4);

    let watcher = Arc::new(build_watcher(&config_path));
    watcher.start().await.unwrap();

    let stoppers: Vec<_> = (0..4)
        .map(|_| {
            let watcher = Arc::clone(&watcher);
            tokio::spawn(async move { watcher.stop().await })
        })
        .collect();
    for stopper in stoppers {
        stopper.await.unwrap();
    }

    assert_eq!(watcher.state(), WatcherState::Stopped);
    tokio_test::assert_err!(watcher.start().await);

    // Changes after stop are not picked up.
    write_config(&config_path, 9999, 4);
    tokio::time::sleep(POLL * 5).await;
    assert_eq!(watcher.current().unwrap().server.port, 8080);
}
