//! Query executor seam and result validation

use std::collections::HashMap;
use std::time::{Duration, Instant};

use parking_lot::RwLock;
use serde::Serialize;
use sqlparser::ast::Statement;
use sqlparser::dialect::GenericDialect;
use sqlparser::parser::Parser;

use super::error::ProbeError;
use crate::data::Row;

/// Columns every probe query must return
pub const REQUIRED_COLUMNS: [&str; 2] = ["is_warning", "alert_info"];

/// Columns a probe query may return
pub const OPTIONAL_COLUMNS: [&str; 2] = ["alert_name", "status"];

/// Rows returned by one query
#[derive(Debug, Clone, Default)]
pub struct QueryRows {
    /// Result schema. May be empty when the engine only reports rows.
    pub columns: Vec<String>,
    pub rows: Vec<Row>,
    pub duration: Duration,
}

impl QueryRows {
    pub fn new(columns: Vec<String>, rows: Vec<Row>) -> Self {
        Self {
            columns,
            rows,
            duration: Duration::ZERO,
        }
    }

    /// Build from rows alone, taking the schema from the first row
    pub fn from_rows(rows: Vec<Row>) -> Self {
        let columns = rows.first().map(|r| r.column_names()).unwrap_or_default();
        Self::new(columns, rows)
    }

    pub fn with_duration(mut self, duration: Duration) -> Self {
        self.duration = duration;
        self
    }

    /// Schema if reported, otherwise the first row's field names
    pub fn column_names(&self) -> Vec<String> {
        if self.columns.is_empty() {
            self.rows
                .first()
                .map(|r| r.column_names())
                .unwrap_or_default()
        } else {
            self.columns.clone()
        }
    }
}

/// A query engine the probe can run SQL against
pub trait QueryExecutor: Send + Sync {
    /// Run a query and collect its rows
    fn execute(&self, query: &str) -> Result<QueryRows, ProbeError>;

    /// Report the columns a query would return without fetching rows
    fn describe(&self, query: &str) -> Result<Vec<String>, ProbeError> {
        Ok(self.execute(&dry_run_query(query))?.columns)
    }
}

/// Wrap a query so that the engine only resolves its schema.
///
/// The newline before the closing parenthesis keeps a trailing `--`
/// comment from swallowing it.
pub fn dry_run_query(query: &str) -> String {
    let cleaned = query.trim().trim_end_matches(';');
    format!("SELECT * FROM ({}\n) t LIMIT 0", cleaned)
}

/// Required columns absent from `columns` (case-insensitive)
pub fn missing_required(columns: &[String]) -> Vec<String> {
    REQUIRED_COLUMNS
        .iter()
        .filter(|required| !columns.iter().any(|c| c.eq_ignore_ascii_case(required)))
        .map(|c| c.to_string())
        .collect()
}

/// Result of a dry-run validation
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ValidationReport {
    pub valid: bool,
    pub columns: Vec<String>,
    pub missing: Vec<String>,
    pub error: Option<String>,
}

impl ValidationReport {
    fn invalid(columns: Vec<String>, missing: Vec<String>, error: String) -> Self {
        Self {
            valid: false,
            columns,
            missing,
            error: Some(error),
        }
    }
}

/// Reject text that parses but is not exactly one query statement.
/// Text the generic dialect cannot parse is left to the engine.
fn precheck(query: &str) -> Result<(), String> {
    let dialect = GenericDialect {};
    let statements = match Parser::parse_sql(&dialect, query) {
        Ok(statements) => statements,
        Err(e) => {
            tracing::debug!(error = %e, "generic parse failed, deferring to engine");
            return Ok(());
        }
    };

    match statements.as_slice() {
        [Statement::Query(_)] => Ok(()),
        [_] => Err("expected a query statement".to_string()),
        many => Err(format!(
            "expected a single query statement, found {}",
            many.len()
        )),
    }
}

/// Dry-run a probe query and check its schema
pub fn validate<E: QueryExecutor + ?Sized>(executor: &E, query: &str) -> ValidationReport {
    if let Err(error) = precheck(query) {
        return ValidationReport::invalid(Vec::new(), Vec::new(), error);
    }

    let columns = match executor.describe(query) {
        Ok(columns) => columns,
        Err(e) => {
            tracing::warn!(error = %e, "query validation failed");
            return ValidationReport::invalid(Vec::new(), Vec::new(), e.to_string());
        }
    };

    let missing = missing_required(&columns);
    if missing.is_empty() {
        ValidationReport {
            valid: true,
            columns,
            missing,
            error: None,
        }
    } else {
        let error = format!("missing required columns: {:?}", missing);
        ValidationReport::invalid(columns, missing, error)
    }
}

#[derive(Debug, Clone)]
enum Response {
    Rows(QueryRows),
    Failure(String),
}

/// In-memory executor serving registered responses, keyed by the trimmed
/// query text
#[derive(Debug, Default)]
pub struct StaticExecutor {
    responses: RwLock<HashMap<String, Response>>,
}

impl StaticExecutor {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register rows for a query, with the schema taken from the first row
    pub fn with_rows(self, query: &str, rows: Vec<Row>) -> Self {
        self.register_rows(query, QueryRows::from_rows(rows));
        self
    }

    /// Register a failure for a query
    pub fn with_failure(self, query: &str, message: impl Into<String>) -> Self {
        self.register_failure(query, message);
        self
    }

    pub fn register_rows(&self, query: &str, rows: QueryRows) {
        self.responses
            .write()
            .insert(query.trim().to_string(), Response::Rows(rows));
    }

    pub fn register_failure(&self, query: &str, message: impl Into<String>) {
        self.responses
            .write()
            .insert(query.trim().to_string(), Response::Failure(message.into()));
    }

    fn lookup(&self, query: &str) -> Result<QueryRows, ProbeError> {
        match self.responses.read().get(query.trim()) {
            Some(Response::Rows(rows)) => Ok(rows.clone()),
            Some(Response::Failure(message)) => Err(ProbeError::execution(message.clone(), query)),
            None => Err(ProbeError::execution("no response registered", query)),
        }
    }
}

impl QueryExecutor for StaticExecutor {
    fn execute(&self, query: &str) -> Result<QueryRows, ProbeError> {
        let start = Instant::now();
        let rows = self.lookup(query)?;
        Ok(rows.with_duration(start.elapsed()))
    }

    fn describe(&self, query: &str) -> Result<Vec<String>, ProbeError> {
        self.lookup(query).map(|r| r.column_names())
    }
}
