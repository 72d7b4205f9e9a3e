//! Run history and change-rate detection
//!
//! Keeps a bounded series of records per check name. The series feed the
//! change-rate anomaly check and summary statistics, and can be exported to
//! or imported from JSON. Nothing is persisted automatically.

pub mod record;
pub mod store;

pub use record::{AnomalyReport, ChangeRate, HistoryRecord, HistoryStats, TrackedStats, Trend};
pub use store::{extract_tracked_value, HistoryStore};

/// History persistence errors
#[derive(Debug, thiserror::Error)]
pub enum HistoryError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}
