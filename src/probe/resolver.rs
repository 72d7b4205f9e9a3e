//! Verdict resolution over interpreted rows

use super::interpreter::interpret_rows;
use super::outcome::{RowDetail, Verdict};
use super::severity::Severity;
use crate::data::Row;

/// Interpret every row and return the highest severity among them.
///
/// An empty result resolves to INFO with no details.
pub fn resolve(rows: &[Row]) -> (Severity, Vec<RowDetail>) {
    let details = interpret_rows(rows);
    let severity = details
        .iter()
        .map(|d| d.severity)
        .max()
        .unwrap_or(Severity::Info);
    (severity, details)
}

/// Apply caller overrides. `force` wins unconditionally; otherwise the
/// severity is clamped to `max`.
pub fn apply_overrides(
    severity: Severity,
    force: Option<Severity>,
    max: Option<Severity>,
) -> Severity {
    if let Some(forced) = force {
        return forced;
    }
    match max {
        Some(cap) if severity > cap => cap,
        _ => severity,
    }
}

/// Combined verdict: flagged if any detail is flagged, severity is the
/// maximum over flagged details.
pub fn verdict(details: &[RowDetail]) -> Verdict {
    let severity = details
        .iter()
        .filter(|d| d.flagged)
        .map(|d| d.severity)
        .max()
        .unwrap_or(Severity::Info);
    Verdict {
        severity,
        flagged: details.iter().any(|d| d.flagged),
    }
}

/// Details whose row was flagged, in order
pub fn flagged_rows(details: &[RowDetail]) -> Vec<&RowDetail> {
    details.iter().filter(|d| d.flagged).collect()
}
