//! Periscope probe runner
//!
//! Run with: cargo run -- <rows.json> [query] [name]
//!
//! `rows.json` holds the probe result as a JSON array of row objects; it is
//! served for `query` (default `SELECT * FROM probe`) by an in-memory
//! executor.
//!
//! Environment variables:
//! - PERISCOPE_WEBHOOK / PERISCOPE_WEBHOOK_{CHANNEL}: Webhook URL (notifications are skipped without one)
//! - PERISCOPE_CHANNEL: Channel used to pick the webhook (default: default)
//! - PERISCOPE_SOURCE: Message source (default: periscope)
//! - PERISCOPE_INTERRUPT_ON_ERROR: Exit non-zero on ERROR outcomes (default: true)
//! - PERISCOPE_HISTORY_FILE: JSON file history is loaded from and saved to
//! - PERISCOPE_TRACK_VALUE: Column tracked for change-rate detection
//! - PERISCOPE_CHANGE_THRESHOLD: Change-rate anomaly threshold in percent
//! - PERISCOPE_WATCH_INTERVAL_SECS: Re-run on this interval instead of once
//! - RUST_LOG: Log level (default: periscope=info)
//!
//! Exit status is 2 when the outcome interrupts the pipeline.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use periscope::config::{NotifyConfig, ProbeConfig};
use periscope::data::Row;
use periscope::notify::{Notifier, SweepWorker};
use periscope::probe::{ExecuteOptions, Outcome, Probe, ProbeError, QueryRows, StaticExecutor};
use periscope::HistoryStore;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

const DEFAULT_QUERY: &str = "SELECT * FROM probe";

fn load_rows(path: &Path) -> Result<Vec<Row>, Box<dyn std::error::Error>> {
    let text = std::fs::read_to_string(path)?;
    Ok(serde_json::from_str(&text)?)
}

/// Re-run the probe on every tick until a run fails. A rows file that cannot
/// be loaded ends the watch with the outer error.
async fn watch(
    probe: &Probe<StaticExecutor>,
    query: &str,
    options: &ExecuteOptions,
    rows_path: &Path,
    interval: Duration,
) -> Result<Result<Outcome, ProbeError>, Box<dyn std::error::Error>> {
    let mut ticker = tokio::time::interval(interval);
    loop {
        ticker.tick().await;
        probe
            .executor()
            .register_rows(query, QueryRows::from_rows(load_rows(rows_path)?));
        match probe.execute_async(query, options).await {
            Ok(outcome) => {
                tracing::info!(alert = %outcome.name, severity = %outcome.severity, "{}", outcome.content);
            }
            Err(e) => return Ok(Err(e)),
        }
    }
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Initialize logging
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "periscope=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let mut args = std::env::args().skip(1);
    let rows_path: PathBuf = args
        .next()
        .ok_or("usage: periscope <rows.json> [query] [name]")?
        .into();
    let query = args.next().unwrap_or_else(|| DEFAULT_QUERY.to_string());
    let name = args.next();

    let probe_config = ProbeConfig::from_env();
    let notify_config = NotifyConfig::from_env();
    let history_file = std::env::var("PERISCOPE_HISTORY_FILE").ok().map(PathBuf::from);
    let watch_interval = std::env::var("PERISCOPE_WATCH_INTERVAL_SECS")
        .ok()
        .and_then(|s| s.parse::<u64>().ok())
        .filter(|secs| *secs > 0)
        .map(Duration::from_secs);

    let mut options = ExecuteOptions::new();
    if let Some(name) = name {
        options = options.with_name(name);
    }
    if let Ok(column) = std::env::var("PERISCOPE_TRACK_VALUE") {
        options = options.with_track_value(column);
    }
    if let Some(threshold) = std::env::var("PERISCOPE_CHANGE_THRESHOLD")
        .ok()
        .and_then(|t| t.parse::<f64>().ok())
    {
        options = options.with_change_detection(threshold);
    }

    tracing::info!("Periscope configuration:");
    tracing::info!("  Rows: {}", rows_path.display());
    tracing::info!("  Channel: {}", notify_config.channel);
    tracing::info!("  Webhook: {}", if notify_config.webhook_url.is_some() { "configured" } else { "none" });
    tracing::info!("  Interrupt on error: {}", probe_config.interrupt_on_error);
    if let Some(interval) = watch_interval {
        tracing::info!("  Watch interval: {} seconds", interval.as_secs());
    }

    let history = Arc::new(HistoryStore::new(probe_config.history_max_records));
    if let Some(path) = history_file.as_ref().filter(|p| p.exists()) {
        history.load_json(path)?;
        tracing::info!(keys = history.keys().len(), "history loaded");
    }

    let notifier = Arc::new(Notifier::from_config(&notify_config)?);
    let executor = StaticExecutor::new().with_rows(&query, load_rows(&rows_path)?);
    let probe = Probe::new(executor, probe_config)
        .with_notifier(Arc::clone(&notifier))
        .with_history(Arc::clone(&history));

    let run = match watch_interval {
        None => Ok(probe.execute_async(&query, &options).await),
        Some(interval) => {
            let sweeper = Arc::new(SweepWorker::new(notifier.filter(), notify_config.sweep_interval));
            let sweep_handle = Arc::clone(&sweeper).start();

            let run = watch(&probe, &query, &options, &rows_path, interval).await;

            sweeper.stop();
            sweep_handle.abort();
            run
        }
    };

    if let Some(path) = &history_file {
        history.save_json(path)?;
    }

    match run? {
        Ok(outcome) => {
            println!("[{}] {}: {}", outcome.severity, outcome.name, outcome.content);
            Ok(())
        }
        Err(ProbeError::Interrupted { reason, outcome }) => {
            println!("[{}] {}: {}", outcome.severity, outcome.name, outcome.content);
            tracing::error!(alert = %outcome.name, "{}", reason);
            std::process::exit(2);
        }
        Err(e) => Err(e.into()),
    }
}
