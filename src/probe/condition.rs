//! Aggregation conditions over a result column
//!
//! A condition reduces the numeric values of one column to a single number
//! and compares it against a threshold. Conditions can be combined with
//! [`ConditionSet::all`] or [`ConditionSet::any`].

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::data::Row;

/// How the column values are reduced
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Aggregation {
    Sum,
    Avg,
    Max,
    Min,
    Count,
    First,
    Last,
}

impl Aggregation {
    fn apply(self, values: &[f64]) -> f64 {
        match self {
            Aggregation::Sum => values.iter().sum(),
            Aggregation::Avg => values.iter().sum::<f64>() / values.len() as f64,
            Aggregation::Max => values.iter().copied().fold(f64::NEG_INFINITY, f64::max),
            Aggregation::Min => values.iter().copied().fold(f64::INFINITY, f64::min),
            Aggregation::Count => values.len() as f64,
            Aggregation::First => values[0],
            Aggregation::Last => values[values.len() - 1],
        }
    }
}

impl fmt::Display for Aggregation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Aggregation::Sum => "sum",
            Aggregation::Avg => "avg",
            Aggregation::Max => "max",
            Aggregation::Min => "min",
            Aggregation::Count => "count",
            Aggregation::First => "first",
            Aggregation::Last => "last",
        };
        f.write_str(name)
    }
}

/// Comparison against the threshold
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Comparator {
    #[serde(rename = ">")]
    Gt,
    #[serde(rename = ">=")]
    Gte,
    #[serde(rename = "<")]
    Lt,
    #[serde(rename = "<=")]
    Lte,
    #[serde(rename = "==")]
    Eq,
    #[serde(rename = "!=")]
    Neq,
}

impl Comparator {
    pub fn compare(self, value: f64, threshold: f64) -> bool {
        match self {
            Comparator::Gt => value > threshold,
            Comparator::Gte => value >= threshold,
            Comparator::Lt => value < threshold,
            Comparator::Lte => value <= threshold,
            Comparator::Eq => value == threshold,
            Comparator::Neq => value != threshold,
        }
    }

    pub fn symbol(self) -> &'static str {
        match self {
            Comparator::Gt => ">",
            Comparator::Gte => ">=",
            Comparator::Lt => "<",
            Comparator::Lte => "<=",
            Comparator::Eq => "==",
            Comparator::Neq => "!=",
        }
    }
}

/// Result of evaluating a condition
#[derive(Debug, Clone, PartialEq)]
pub struct ConditionReport {
    pub triggered: bool,
    /// Aggregated value, when any numeric values were found
    pub value: Option<f64>,
    pub message: String,
}

/// Single column condition
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Condition {
    pub column: String,
    pub aggregation: Aggregation,
    pub comparator: Comparator,
    pub threshold: f64,
}

impl Condition {
    pub fn new(
        column: impl Into<String>,
        aggregation: Aggregation,
        comparator: Comparator,
        threshold: f64,
    ) -> Self {
        Self {
            column: column.into(),
            aggregation,
            comparator,
            threshold,
        }
    }

    /// Evaluate the condition against result rows
    pub fn evaluate(&self, rows: &[Row]) -> ConditionReport {
        if rows.is_empty() {
            return ConditionReport {
                triggered: false,
                value: None,
                message: "no data".to_string(),
            };
        }

        let values: Vec<f64> = rows
            .iter()
            .filter_map(|row| row.get(&self.column))
            .filter_map(|v| v.as_f64().or_else(|| v.as_number()))
            .collect();

        if values.is_empty() {
            return ConditionReport {
                triggered: false,
                value: None,
                message: format!("column {} has no numeric values", self.column),
            };
        }

        let value = self.aggregation.apply(&values);
        let triggered = self.comparator.compare(value, self.threshold);

        ConditionReport {
            triggered,
            value: Some(value),
            message: format!(
                "{}({}) = {:.2} {} {}: {}",
                self.aggregation,
                self.column,
                value,
                self.comparator.symbol(),
                self.threshold,
                triggered
            ),
        }
    }
}

/// How a set of conditions combines
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Logic {
    All,
    Any,
}

/// One or more conditions combined with AND / OR
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConditionSet {
    pub conditions: Vec<Condition>,
    pub logic: Logic,
}

impl ConditionSet {
    /// Triggered when every condition triggers
    pub fn all(conditions: Vec<Condition>) -> Self {
        Self {
            conditions,
            logic: Logic::All,
        }
    }

    /// Triggered when any condition triggers
    pub fn any(conditions: Vec<Condition>) -> Self {
        Self {
            conditions,
            logic: Logic::Any,
        }
    }

    pub fn evaluate(&self, rows: &[Row]) -> ConditionReport {
        let reports: Vec<ConditionReport> =
            self.conditions.iter().map(|c| c.evaluate(rows)).collect();

        let (triggered, joiner) = match self.logic {
            Logic::All => (
                !reports.is_empty() && reports.iter().all(|r| r.triggered),
                " and ",
            ),
            Logic::Any => (reports.iter().any(|r| r.triggered), " or "),
        };

        ConditionReport {
            triggered,
            value: reports.first().and_then(|r| r.value),
            message: reports
                .iter()
                .map(|r| r.message.as_str())
                .collect::<Vec<_>>()
                .join(joiner),
        }
    }
}

impl From<Condition> for ConditionSet {
    fn from(condition: Condition) -> Self {
        ConditionSet::all(vec![condition])
    }
}
