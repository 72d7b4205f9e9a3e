//! Per-row details, verdicts and the final check outcome

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::severity::Severity;
use crate::data::Row;

/// Interpretation of a single result row
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RowDetail {
    /// Value of `alert_name`, or "unnamed"
    pub name: String,
    /// Truthiness of `is_warning`
    pub flagged: bool,
    /// Value of `alert_info`, or empty
    pub info: String,
    /// Trimmed `status`, or the default token for the flag
    pub status_token: String,
    pub severity: Severity,
    /// The row as returned by the engine
    pub raw: Row,
    /// False when a flagged row carried a status outside the token table
    #[serde(default = "default_recognized")]
    pub status_recognized: bool,
}

fn default_recognized() -> bool {
    true
}

/// Combined severity and flag over a set of details
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Verdict {
    pub severity: Severity,
    pub flagged: bool,
}

/// Result of one check, or of a batch of checks
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Outcome {
    pub name: String,
    pub severity: Severity,
    pub flagged: bool,
    /// Human-readable summary
    pub content: String,
    pub details: Vec<RowDetail>,
    pub row_count: usize,
    pub duration_secs: f64,
    pub timestamp: DateTime<Utc>,
    pub sql_text: String,
    /// False only when the query itself failed
    pub ok: bool,
    pub error_message: Option<String>,
}

impl Outcome {
    /// Number of flagged details
    pub fn flagged_count(&self) -> usize {
        self.details.iter().filter(|d| d.flagged).count()
    }

    pub fn verdict(&self) -> Verdict {
        Verdict {
            severity: self.severity,
            flagged: self.flagged,
        }
    }

    /// Mark the outcome as an anomaly: append the note, raise the severity
    /// to at least WARNING and set the flag.
    pub fn mark_anomaly(&mut self, message: &str) {
        self.content
            .push_str(&format!("\n\nchange-rate anomaly: {}", message));
        self.severity = self.severity.max(Severity::Warning);
        self.flagged = true;
    }
}
