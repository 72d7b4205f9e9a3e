//! Periscope: SQL probe alerting
//!
//! Runs probe queries whose rows say whether something is wrong, resolves
//! them into a severity, keeps a bounded run history with change-rate
//! anomaly detection, and delivers notifications to a webhook behind a
//! dedup filter and rate limiter.
//!
//! # Features
//!
//! - **Row interpretation**: `is_warning` / `alert_info` / `status` columns
//!   mapped onto DEBUG..CRITICAL
//! - **Overrides**: forced or capped severity per run
//! - **Conditions**: aggregate a column and compare it with a threshold
//! - **History**: per-check records, change rates, statistics, JSON export
//! - **Delivery**: card payloads, bounded retries, blocking and async senders
//! - **Interrupts**: CRITICAL (and optionally ERROR) outcomes stop the caller
//!
//! # Example
//!
//! ```no_run
//! use periscope::config::ProbeConfig;
//! use periscope::data::Row;
//! use periscope::probe::{ExecuteOptions, Probe, StaticExecutor};
//!
//! let rows = vec![Row::new()
//!     .with("alert_name", "orders backlog")
//!     .with("is_warning", 1)
//!     .with("alert_info", "1200 orders pending")
//!     .with("status", "AbnormalYellow")];
//! let executor = StaticExecutor::new().with_rows("SELECT * FROM checks", rows);
//! let probe = Probe::new(executor, ProbeConfig::default());
//!
//! let outcome = probe
//!     .execute("SELECT * FROM checks", &ExecuteOptions::new())
//!     .unwrap();
//! println!("{}: {}", outcome.severity, outcome.content);
//! ```

pub mod config;
pub mod data;
pub mod history;
pub mod notify;
pub mod probe;
pub mod template;

// Re-export commonly used types
pub use config::{NotifyConfig, ProbeConfig};
pub use data::{Row, Value};
pub use history::HistoryStore;
pub use notify::{Notifier, NotifyMessage, SendResult};
pub use probe::{ExecuteOptions, Outcome, Probe, ProbeError, Severity};
