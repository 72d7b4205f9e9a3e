//! Probe errors

use super::outcome::Outcome;

const QUERY_PREVIEW_CHARS: usize = 200;

/// Errors surfaced by a probe run
#[derive(Debug, thiserror::Error)]
pub enum ProbeError {
    #[error("Query execution failed: {message} (query: {})", preview(.query))]
    Execution { message: String, query: String },

    #[error("Result is missing required columns {missing:?} (got {actual:?})")]
    Validation {
        missing: Vec<String>,
        actual: Vec<String>,
    },

    #[error("{reason} [severity: {}, alert: {}]", .outcome.severity, .outcome.name)]
    Interrupted {
        reason: String,
        outcome: Box<Outcome>,
    },
}

impl ProbeError {
    pub fn execution(message: impl Into<String>, query: impl Into<String>) -> Self {
        ProbeError::Execution {
            message: message.into(),
            query: query.into(),
        }
    }

    /// The outcome that caused an interrupt, if any
    pub fn outcome(&self) -> Option<&Outcome> {
        match self {
            ProbeError::Interrupted { outcome, .. } => Some(outcome),
            _ => None,
        }
    }
}

fn preview(query: &str) -> String {
    if query.chars().count() > QUERY_PREVIEW_CHARS {
        let head: String = query.chars().take(QUERY_PREVIEW_CHARS).collect();
        format!("{}...", head)
    } else {
        query.to_string()
    }
}
