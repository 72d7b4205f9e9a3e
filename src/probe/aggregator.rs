//! Outcome construction
//!
//! Builds the [`Outcome`] of a single check from its row details, folds the
//! outcomes of a batch into one, and produces the outcomes used for failed
//! queries, empty results and condition checks.

use chrono::Utc;

use super::condition::ConditionReport;
use super::options::EmptyResultPolicy;
use super::outcome::{Outcome, RowDetail};
use super::severity::Severity;

const DEFAULT_NAME: &str = "unnamed";
const CONDITION_NAME: &str = "condition check";
const PREVIEW_CHARS: usize = 50;

/// Build the outcome of one check
pub fn aggregate(
    details: Vec<RowDetail>,
    severity: Severity,
    duration_secs: f64,
    sql_text: &str,
    name: Option<&str>,
) -> Outcome {
    let flagged = details.iter().any(|d| d.flagged);
    let name = name
        .filter(|n| !n.is_empty())
        .map(str::to_string)
        .or_else(|| details.first().map(|d| d.name.clone()))
        .unwrap_or_else(|| DEFAULT_NAME.to_string());
    let content = summarize(&details);

    Outcome {
        name,
        severity,
        flagged,
        content,
        row_count: details.len(),
        details,
        duration_secs,
        timestamp: Utc::now(),
        sql_text: sql_text.to_string(),
        ok: true,
        error_message: None,
    }
}

fn summarize(details: &[RowDetail]) -> String {
    let flagged: Vec<&RowDetail> = details.iter().filter(|d| d.flagged).collect();
    match flagged.as_slice() {
        [] => "all checks normal".to_string(),
        [only] => format!("[{}] {}", only.status_token, only.info),
        many => {
            let mut lines = vec![format!("{} checks flagged:", many.len())];
            for (i, d) in many.iter().enumerate() {
                lines.push(format!("  {}. [{}] {}", i + 1, d.status_token, d.info));
            }
            lines.join("\n")
        }
    }
}

/// Fold the outcomes of a batch into one
pub fn aggregate_batch(outcomes: Vec<Outcome>, name: &str) -> Outcome {
    if outcomes.is_empty() {
        return Outcome {
            name: name.to_string(),
            severity: Severity::Info,
            flagged: false,
            content: "no checks".to_string(),
            details: Vec::new(),
            row_count: 0,
            duration_secs: 0.0,
            timestamp: Utc::now(),
            sql_text: String::new(),
            ok: true,
            error_message: None,
        };
    }

    let severity = outcomes
        .iter()
        .map(|o| o.severity)
        .max()
        .unwrap_or(Severity::Info);
    let flagged = outcomes.iter().any(|o| o.flagged);
    let duration_secs = outcomes.iter().map(|o| o.duration_secs).sum();
    let content = summarize_batch(&outcomes);
    let details: Vec<RowDetail> = outcomes.into_iter().flat_map(|o| o.details).collect();

    Outcome {
        name: name.to_string(),
        severity,
        flagged,
        content,
        row_count: details.len(),
        details,
        duration_secs,
        timestamp: Utc::now(),
        sql_text: String::new(),
        ok: true,
        error_message: None,
    }
}

fn summarize_batch(outcomes: &[Outcome]) -> String {
    let flagged: Vec<&Outcome> = outcomes.iter().filter(|o| o.flagged).collect();
    if flagged.is_empty() {
        return format!("all {} checks passed", outcomes.len());
    }

    let mut lines = vec![format!(
        "{}/{} checks flagged:",
        flagged.len(),
        outcomes.len()
    )];
    for o in flagged {
        lines.push(format!(
            "  - [{}] {}: {}",
            o.severity,
            o.name,
            preview(&o.content)
        ));
    }
    lines.join("\n")
}

fn preview(content: &str) -> String {
    if content.chars().count() > PREVIEW_CHARS {
        let head: String = content.chars().take(PREVIEW_CHARS).collect();
        format!("{}...", head)
    } else {
        content.to_string()
    }
}

/// Outcome for a query that could not run
pub fn error_outcome(message: &str, sql_text: &str, name: &str, duration_secs: f64) -> Outcome {
    Outcome {
        name: name.to_string(),
        severity: Severity::Error,
        flagged: true,
        content: format!("execution failed: {}", message),
        details: Vec::new(),
        row_count: 0,
        duration_secs,
        timestamp: Utc::now(),
        sql_text: sql_text.to_string(),
        ok: false,
        error_message: Some(message.to_string()),
    }
}

/// Outcome for a query that returned no rows
pub fn empty_outcome(
    policy: EmptyResultPolicy,
    duration_secs: f64,
    sql_text: &str,
    name: &str,
) -> Outcome {
    let severity = policy.severity();
    Outcome {
        name: name.to_string(),
        severity,
        flagged: severity >= Severity::Warning,
        content: format!("empty result treated as {}", policy),
        details: Vec::new(),
        row_count: 0,
        duration_secs,
        timestamp: Utc::now(),
        sql_text: sql_text.to_string(),
        ok: true,
        error_message: None,
    }
}

/// Outcome for a check judged by an aggregation condition
pub fn condition_outcome(
    report: &ConditionReport,
    row_count: usize,
    duration_secs: f64,
    sql_text: &str,
    name: Option<&str>,
) -> Outcome {
    Outcome {
        name: name.unwrap_or(CONDITION_NAME).to_string(),
        severity: if report.triggered {
            Severity::Warning
        } else {
            Severity::Info
        },
        flagged: report.triggered,
        content: report.message.clone(),
        details: Vec::new(),
        row_count,
        duration_secs,
        timestamp: Utc::now(),
        sql_text: sql_text.to_string(),
        ok: true,
        error_message: None,
    }
}
