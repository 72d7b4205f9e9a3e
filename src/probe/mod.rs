//! SQL probes
//!
//! A probe query returns one row per check with an `is_warning` flag, an
//! `alert_info` description and optionally a `status` token and an
//! `alert_name`. Rows are interpreted into severities, resolved into a
//! single [`Outcome`] and passed through the interrupt gate by [`Probe`].

pub mod aggregator;
pub mod condition;
pub mod error;
pub mod executor;
pub mod interpreter;
pub mod interrupt;
pub mod options;
pub mod outcome;
pub mod pipeline;
pub mod resolver;
pub mod severity;

pub use condition::{Aggregation, Comparator, Condition, ConditionReport, ConditionSet, Logic};
pub use error::ProbeError;
pub use executor::{QueryExecutor, QueryRows, StaticExecutor, ValidationReport};
pub use options::{BatchOptions, BatchTask, EmptyResultPolicy, ExecuteOptions};
pub use outcome::{Outcome, RowDetail, Verdict};
pub use pipeline::Probe;
pub use severity::{ParseSeverityError, Severity};
