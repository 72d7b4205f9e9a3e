//! `{variable}` templates for notification content
//!
//! Variables available when rendering an [`Outcome`]:
//!
//! | name | value |
//! |------|-------|
//! | `name` | check name |
//! | `severity` | severity name, e.g. `WARNING` |
//! | `emoji` | severity emoji |
//! | `content` | outcome summary |
//! | `row_count` | rows returned |
//! | `flagged_count` | flagged rows |
//! | `duration` | seconds, two decimals |
//! | `timestamp` | `%Y-%m-%d %H:%M:%S` UTC |
//! | `flagged` | `yes` / `no` |
//! | `value` | `alert_info` of the first row |
//! | `details` | numbered list of every row |
//! | `ok` | `yes` / `no` |
//! | `error_message` | query error, or empty |
//!
//! Unknown variables are left in place.

use std::collections::HashMap;
use std::sync::OnceLock;

use regex::{Captures, Regex};

use crate::probe::Outcome;

pub const DEFAULT_TEMPLATE: &str = "{content}

**Severity**: {emoji} {severity}
**Flagged rows**: {flagged_count}/{row_count}
**Duration**: {duration}s";

pub const SIMPLE_TEMPLATE: &str = "{emoji} {name}: {content}";

pub const DETAILED_TEMPLATE: &str = "## {name}

**Severity**: {emoji} {severity}
**Flagged**: {flagged}
**Content**: {content}

### Run
- Rows: {row_count}
- Flagged rows: {flagged_count}
- Duration: {duration}s
- Time: {timestamp}

### Details
{details}";

fn pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| Regex::new(r"\{(\w+)\}").expect("static pattern"))
}

/// Renders templates against outcomes
#[derive(Debug, Clone, Default)]
pub struct TemplateEngine;

impl TemplateEngine {
    pub fn new() -> Self {
        Self
    }

    /// Preset by name: `default`, `simple` or `detailed`. Unknown names
    /// give the default preset.
    pub fn preset(name: &str) -> &'static str {
        match name {
            "simple" => SIMPLE_TEMPLATE,
            "detailed" => DETAILED_TEMPLATE,
            _ => DEFAULT_TEMPLATE,
        }
    }

    /// A preset name resolves to that preset; any other text is a template
    /// of its own.
    pub fn resolve(template: &str) -> &str {
        match template {
            "default" | "simple" | "detailed" => Self::preset(template),
            other => other,
        }
    }

    /// Render against an outcome. `extra` entries override built-in
    /// variables of the same name.
    pub fn render(
        &self,
        template: &str,
        outcome: &Outcome,
        extra: Option<&HashMap<String, String>>,
    ) -> String {
        let mut vars = Self::variables(outcome);
        if let Some(extra) = extra {
            vars.extend(extra.iter().map(|(k, v)| (k.clone(), v.clone())));
        }
        substitute(template, &vars)
    }

    fn variables(outcome: &Outcome) -> HashMap<String, String> {
        let yes_no = |b: bool| if b { "yes" } else { "no" }.to_string();
        let value = outcome
            .details
            .first()
            .map(|d| d.info.clone())
            .unwrap_or_default();

        HashMap::from([
            ("name".to_string(), outcome.name.clone()),
            ("severity".to_string(), outcome.severity.to_string()),
            ("emoji".to_string(), outcome.severity.emoji().to_string()),
            ("content".to_string(), outcome.content.clone()),
            ("row_count".to_string(), outcome.row_count.to_string()),
            ("flagged_count".to_string(), outcome.flagged_count().to_string()),
            ("duration".to_string(), format!("{:.2}", outcome.duration_secs)),
            (
                "timestamp".to_string(),
                outcome.timestamp.format("%Y-%m-%d %H:%M:%S").to_string(),
            ),
            ("flagged".to_string(), yes_no(outcome.flagged)),
            ("value".to_string(), value),
            ("details".to_string(), format_details(outcome)),
            ("ok".to_string(), yes_no(outcome.ok)),
            (
                "error_message".to_string(),
                outcome.error_message.clone().unwrap_or_default(),
            ),
        ])
    }
}

fn format_details(outcome: &Outcome) -> String {
    if outcome.details.is_empty() {
        return "none".to_string();
    }
    outcome
        .details
        .iter()
        .enumerate()
        .map(|(i, d)| {
            let mark = if d.flagged { "⚠️" } else { "✅" };
            format!("{}. {} [{}] {}", i + 1, mark, d.status_token, d.info)
        })
        .collect::<Vec<_>>()
        .join("\n")
}

/// Replace `{name}` with `vars[name]`, leaving unknown names untouched
pub fn substitute(template: &str, vars: &HashMap<String, String>) -> String {
    pattern()
        .replace_all(template, |caps: &Captures| match vars.get(&caps[1]) {
            Some(value) => value.clone(),
            None => caps[0].to_string(),
        })
        .into_owned()
}
