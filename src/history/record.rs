use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::probe::{Outcome, Severity};

const SNIPPET_CHARS: usize = 200;

/// One recorded check run
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HistoryRecord {
    pub key: String,
    pub severity: Severity,
    pub flagged: bool,
    /// Metric used for change-rate detection
    pub tracked_value: Option<f64>,
    pub content_snippet: String,
    pub row_count: usize,
    pub duration_secs: f64,
    pub timestamp: DateTime<Utc>,
}

impl HistoryRecord {
    pub fn from_outcome(outcome: &Outcome, tracked_value: Option<f64>) -> Self {
        Self {
            key: outcome.name.clone(),
            severity: outcome.severity,
            flagged: outcome.flagged,
            tracked_value,
            content_snippet: outcome.content.chars().take(SNIPPET_CHARS).collect(),
            row_count: outcome.row_count,
            duration_secs: outcome.duration_secs,
            timestamp: outcome.timestamp,
        }
    }
}

/// Direction of the latest change
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Trend {
    Up,
    Down,
    Stable,
}

/// Change between the two most recent tracked values
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ChangeRate {
    pub current: f64,
    pub previous: f64,
    pub change: f64,
    /// Percent change, rounded to two decimals
    pub rate_percent: f64,
    pub trend: Trend,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AnomalyReport {
    pub is_anomaly: bool,
    pub rate_percent: f64,
    pub trend: Option<Trend>,
    pub current: Option<f64>,
    pub previous: Option<f64>,
    pub message: String,
}

/// Summary of the tracked metric over a window
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TrackedStats {
    pub mean: f64,
    pub min: f64,
    pub max: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct HistoryStats {
    pub count: usize,
    pub flagged_count: usize,
    pub flagged_rate_percent: f64,
    pub mean_duration_secs: f64,
    pub tracked: Option<TrackedStats>,
}
