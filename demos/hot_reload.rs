//! Example demonstrating polling hot-reload with subscribers.
//!
//! This example shows how to:
//! - Build a watcher with validation and custom tunables
//! - Subscribe to reload outcomes, including failures
//! - Cooperate with cancellation in a slow subscriber
//!
//! Run with: RUST_LOG=config_hotreload=debug cargo run --example hot_reload
//!
//! While running, edit the printed file to see reloads. Setting `workers: 0`
//! shows a rejected reload; the previous configuration stays in effect.

use config_hotreload::prelude::*;
use serde::Deserialize;
use std::time::Duration;
use tracing_subscriber::EnvFilter;

#[derive(Debug, Deserialize, Clone)]
struct AppConfig {
    server: ServerConfig,
    workers: u32,
}

#[derive(Debug, Deserialize, Clone)]
struct ServerConfig {
    port: u16,
    host: String,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let dir = std::env::temp_dir().join("config-hotreload-demo");
    std::fs::create_dir_all(&dir)?;
    let config_path = dir.join("app.yaml");
    if !config_path.exists() {
        std::fs::write(
            &config_path,
            r#"server:
  port: 8080
  host: localhost
workers: 4
"#,
        )?;
    }
    println!("Watching {}", config_path.display());

    let watcher = ConfigWatcher::<AppConfig>::builder(&config_path)
        .with_detected_format()?
        .with_validation(|cfg: &AppConfig| {
            if cfg.workers == 0 {
                return Err(ValidationError::invalid_field("workers", "must be > 0"));
            }
            Ok(())
        })
        .with_poll_interval(Duration::from_millis(250))
        .with_callback_timeout(Duration::from_secs(2))
        .build()?;

    watcher
        .subscribe_named("printer", |_token, outcome: ReloadOutcome<AppConfig>| async move {
            match outcome {
                ReloadOutcome::Reloaded(cfg) => println!(
                    "[printer] listening on {}:{} with {} workers",
                    cfg.server.host, cfg.server.port, cfg.workers
                ),
                ReloadOutcome::Failed(err) => println!("[printer] reload rejected: {}", err),
            }
        })
        .await;

    watcher
        .subscribe_named(
            "pool-resizer",
            |token: CancellationToken, outcome: ReloadOutcome<AppConfig>| async move {
                let Some(cfg) = outcome.config() else {
                    return;
                };
                tokio::select! {
                    _ = token.cancelled() => println!("[pool-resizer] cancelled"),
                    _ = tokio::time::sleep(Duration::from_millis(500)) => {
                        println!("[pool-resizer] resized to {} workers", cfg.workers);
                    }
                }
            },
        )
        .await;

    watcher.start().await?;
    if let Some(cfg) = watcher.current() {
        println!("Initial configuration: {:?}", cfg);
    }

    println!("Press Ctrl+C to stop");
    let _ = tokio::signal::ctrl_c().await;

    watcher.stop().await;
    let stats = watcher.stats();
    println!(
        "Reloads: {}, failures: {}, cache hit rate: {:.0}%, callbacks timed out: {}",
        stats.reloads,
        stats.failures,
        stats.cache.hit_rate() * 100.0,
        stats.dispatch.timed_out
    );
    Ok(())
}
