//! Alert severity and the status-token table

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// Ordered alert level. Variants are declared in rank order, so the derived
/// ordering matches [`Severity::rank`].
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize,
)]
#[serde(rename_all = "UPPERCASE")]
pub enum Severity {
    Debug,
    #[default]
    Info,
    Warning,
    Error,
    Critical,
}

impl Severity {
    pub const ALL: [Severity; 5] = [
        Severity::Debug,
        Severity::Info,
        Severity::Warning,
        Severity::Error,
        Severity::Critical,
    ];

    /// Canonical integer rank
    pub fn rank(self) -> u8 {
        match self {
            Severity::Debug => 0,
            Severity::Info => 10,
            Severity::Warning => 20,
            Severity::Error => 30,
            Severity::Critical => 40,
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            Severity::Debug => "DEBUG",
            Severity::Info => "INFO",
            Severity::Warning => "WARNING",
            Severity::Error => "ERROR",
            Severity::Critical => "CRITICAL",
        }
    }

    /// Look up a status token. Returns `None` for tokens outside the table.
    pub fn lookup_status(status: &str) -> Option<Severity> {
        match status.trim().to_ascii_lowercase().as_str() {
            "normal" | "normalgreen" | "ok" | "info" | "green" => Some(Severity::Info),
            "abnormalyellow" | "warning" | "yellow" | "warn" => Some(Severity::Warning),
            "abnormalred" | "error" | "red" | "err" => Some(Severity::Error),
            "critical" | "urgent" | "fatal" => Some(Severity::Critical),
            _ => None,
        }
    }

    /// Map a status token to a severity; unknown tokens read as INFO
    pub fn from_status(status: &str) -> Severity {
        Self::lookup_status(status).unwrap_or(Severity::Info)
    }

    /// Whether an alert at this level is worth a notification
    pub fn should_notify(self) -> bool {
        self >= Severity::Warning
    }

    pub fn emoji(self) -> &'static str {
        match self {
            Severity::Debug => "🔍",
            Severity::Info => "ℹ️",
            Severity::Warning => "⚠️",
            Severity::Error => "❌",
            Severity::Critical => "🚨",
        }
    }

    /// Card header color
    pub fn color(self) -> &'static str {
        match self {
            Severity::Debug => "grey",
            Severity::Info => "blue",
            Severity::Warning => "yellow",
            Severity::Error => "orange",
            Severity::Critical => "red",
        }
    }
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unknown severity: {0}")]
pub struct ParseSeverityError(pub String);

impl FromStr for Severity {
    type Err = ParseSeverityError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Severity::ALL
            .into_iter()
            .find(|level| level.name().eq_ignore_ascii_case(s.trim()))
            .ok_or_else(|| ParseSeverityError(s.to_string()))
    }
}
