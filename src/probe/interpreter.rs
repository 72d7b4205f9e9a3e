//! Row interpretation
//!
//! Reads the probe columns (`is_warning`, `alert_info`, `status`,
//! `alert_name`) out of one result row.

use super::outcome::RowDetail;
use super::severity::Severity;
use crate::data::Row;

const DEFAULT_NAME: &str = "unnamed";
const FLAGGED_STATUS: &str = "AbnormalRed";
const NORMAL_STATUS: &str = "Normal";

/// Interpret one result row. Never fails: missing columns fall back to
/// their defaults.
pub fn interpret_row(row: &Row) -> RowDetail {
    let flagged = row.get("is_warning").map(|v| v.truthy()).unwrap_or(false);
    let info = row.get("alert_info").map(|v| v.to_text()).unwrap_or_default();
    let name = row
        .get("alert_name")
        .filter(|v| !v.is_null())
        .map(|v| v.to_text())
        .unwrap_or_else(|| DEFAULT_NAME.to_string());

    let status_token = row
        .get("status")
        .filter(|v| !v.is_null())
        .map(|v| v.to_text().trim().to_string())
        .filter(|s| !s.is_empty())
        .unwrap_or_else(|| {
            if flagged {
                FLAGGED_STATUS.to_string()
            } else {
                NORMAL_STATUS.to_string()
            }
        });

    let mut status_recognized = true;
    let severity = if flagged {
        match Severity::lookup_status(&status_token) {
            Some(severity) => severity,
            None => {
                status_recognized = false;
                tracing::warn!(
                    alert = %name,
                    status = %status_token,
                    "unknown status, treating as INFO"
                );
                Severity::Info
            }
        }
    } else {
        Severity::Info
    };

    RowDetail {
        name,
        flagged,
        info,
        status_token,
        severity,
        raw: row.clone(),
        status_recognized,
    }
}

/// Interpret every row, in order
pub fn interpret_rows(rows: &[Row]) -> Vec<RowDetail> {
    rows.iter().map(interpret_row).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::Value;

    #[test]
    fn test_flagged_row_uses_status() {
        let row = Row::new()
            .with("alert_name", "orders")
            .with("is_warning", 1)
            .with("alert_info", "backlog 120")
            .with("status", "AbnormalYellow");

        let detail = interpret_row(&row);
        assert!(detail.flagged);
        assert_eq!(detail.severity, Severity::Warning);
        assert_eq!(detail.name, "orders");
        assert_eq!(detail.info, "backlog 120");
        assert_eq!(detail.status_token, "AbnormalYellow");
    }

    #[test]
    fn test_unflagged_row_is_info_regardless_of_status() {
        let row = Row::new()
            .with("is_warning", 0)
            .with("alert_info", "fine")
            .with("status", "critical");

        let detail = interpret_row(&row);
        assert!(!detail.flagged);
        assert_eq!(detail.severity, Severity::Info);
        assert_eq!(detail.status_token, "critical");
    }

    #[test]
    fn test_missing_status_defaults_by_flag() {
        let flagged = interpret_row(&Row::new().with("is_warning", 1).with("alert_info", "x"));
        assert_eq!(flagged.status_token, "AbnormalRed");
        assert_eq!(flagged.severity, Severity::Error);

        let normal = interpret_row(&Row::new().with("is_warning", 0).with("alert_info", "x"));
        assert_eq!(normal.status_token, "Normal");
        assert_eq!(normal.severity, Severity::Info);
    }

    #[test]
    fn test_blank_or_null_status_defaults() {
        let row = Row::new()
            .with("is_warning", "1")
            .with("alert_info", "x")
            .with("status", "   ");
        assert_eq!(interpret_row(&row).status_token, "AbnormalRed");

        let row = Row::new()
            .with("is_warning", true)
            .with("alert_info", "x")
            .with("status", Value::Null);
        assert_eq!(interpret_row(&row).severity, Severity::Error);
    }

    #[test]
    fn test_missing_columns_never_fail() {
        let detail = interpret_row(&Row::new());
        assert!(!detail.flagged);
        assert_eq!(detail.name, "unnamed");
        assert_eq!(detail.info, "");
        assert_eq!(detail.severity, Severity::Info);
    }

    #[test]
    fn test_unknown_status_is_info_and_unrecognized() {
        let row = Row::new()
            .with("is_warning", 1)
            .with("alert_info", "x")
            .with("status", "Abnromal Red");

        let detail = interpret_row(&row);
        assert!(detail.flagged);
        assert_eq!(detail.severity, Severity::Info);
        assert!(!detail.status_recognized);
    }

    #[test]
    fn test_case_insensitive_columns() {
        let row = Row::new()
            .with("IS_WARNING", 1)
            .with("Alert_Info", "upper")
            .with("STATUS", "fatal");

        let detail = interpret_row(&row);
        assert_eq!(detail.severity, Severity::Critical);
        assert_eq!(detail.info, "upper");
    }
}
