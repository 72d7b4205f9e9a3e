//! Per-call options for probe runs

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use super::condition::ConditionSet;
use super::severity::Severity;
use crate::notify::message::Link;

/// How an empty result is judged
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EmptyResultPolicy {
    #[default]
    Ok,
    Warning,
    Error,
}

impl EmptyResultPolicy {
    pub fn severity(self) -> Severity {
        match self {
            EmptyResultPolicy::Ok => Severity::Info,
            EmptyResultPolicy::Warning => Severity::Warning,
            EmptyResultPolicy::Error => Severity::Error,
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            EmptyResultPolicy::Ok => "ok",
            EmptyResultPolicy::Warning => "warning",
            EmptyResultPolicy::Error => "error",
        }
    }
}

impl fmt::Display for EmptyResultPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for EmptyResultPolicy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "ok" => Ok(EmptyResultPolicy::Ok),
            "warning" => Ok(EmptyResultPolicy::Warning),
            "error" => Ok(EmptyResultPolicy::Error),
            other => Err(format!("unknown empty result policy: {}", other)),
        }
    }
}

/// Options for a single probe run
#[derive(Debug, Clone)]
pub struct ExecuteOptions {
    /// Check name; falls back to the first row's `alert_name`
    pub name: Option<String>,
    /// Interrupt on ERROR; `None` uses the probe's configured default
    pub interrupt_on_error: Option<bool>,
    /// Skip notifications
    pub silent: bool,
    pub title_prefix: String,
    pub mentions: Vec<String>,
    pub links: Vec<Link>,
    pub force_level: Option<Severity>,
    pub max_level: Option<Severity>,
    /// Send a notification when a flagged check turns normal
    pub notify_on_recovery: bool,
    pub empty_result_policy: EmptyResultPolicy,
    /// Content template; the default preset is used when unset
    pub template: Option<String>,
    /// Judge the result by an aggregation condition instead of the probe
    /// columns
    pub condition: Option<ConditionSet>,
    /// Column whose value is tracked in history
    pub track_value: Option<String>,
    pub detect_change: bool,
    pub change_threshold_percent: f64,
}

impl Default for ExecuteOptions {
    fn default() -> Self {
        Self {
            name: None,
            interrupt_on_error: None,
            silent: false,
            title_prefix: String::new(),
            mentions: Vec::new(),
            links: Vec::new(),
            force_level: None,
            max_level: None,
            notify_on_recovery: false,
            empty_result_policy: EmptyResultPolicy::Ok,
            template: None,
            condition: None,
            track_value: None,
            detect_change: false,
            change_threshold_percent: 50.0,
        }
    }
}

impl ExecuteOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    pub fn with_interrupt_on_error(mut self, interrupt: bool) -> Self {
        self.interrupt_on_error = Some(interrupt);
        self
    }

    pub fn with_silent(mut self, silent: bool) -> Self {
        self.silent = silent;
        self
    }

    pub fn with_title_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.title_prefix = prefix.into();
        self
    }

    pub fn with_mention(mut self, user_id: impl Into<String>) -> Self {
        self.mentions.push(user_id.into());
        self
    }

    pub fn with_link(mut self, link: Link) -> Self {
        self.links.push(link);
        self
    }

    pub fn with_force_level(mut self, severity: Severity) -> Self {
        self.force_level = Some(severity);
        self
    }

    pub fn with_max_level(mut self, severity: Severity) -> Self {
        self.max_level = Some(severity);
        self
    }

    pub fn with_notify_on_recovery(mut self, notify: bool) -> Self {
        self.notify_on_recovery = notify;
        self
    }

    pub fn with_empty_result_policy(mut self, policy: EmptyResultPolicy) -> Self {
        self.empty_result_policy = policy;
        self
    }

    pub fn with_template(mut self, template: impl Into<String>) -> Self {
        self.template = Some(template.into());
        self
    }

    pub fn with_condition(mut self, condition: impl Into<ConditionSet>) -> Self {
        self.condition = Some(condition.into());
        self
    }

    pub fn with_track_value(mut self, column: impl Into<String>) -> Self {
        self.track_value = Some(column.into());
        self
    }

    /// Enable change-rate detection with the given threshold in percent
    pub fn with_change_detection(mut self, threshold_percent: f64) -> Self {
        self.detect_change = true;
        self.change_threshold_percent = threshold_percent;
        self
    }
}

/// One query of a batch
#[derive(Debug, Clone)]
pub struct BatchTask {
    pub query: String,
    pub name: Option<String>,
    /// Options for this task. Notifications and interrupts are always
    /// suppressed per task; the batch decides both.
    pub options: ExecuteOptions,
}

impl BatchTask {
    pub fn new(query: impl Into<String>) -> Self {
        Self {
            query: query.into(),
            name: None,
            options: ExecuteOptions::default(),
        }
    }

    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    pub fn with_options(mut self, options: ExecuteOptions) -> Self {
        self.options = options;
        self
    }
}

/// Options applied to the aggregated batch outcome
#[derive(Debug, Clone, Default)]
pub struct BatchOptions {
    pub interrupt_on_error: Option<bool>,
    pub silent: bool,
    pub title_prefix: String,
    pub mentions: Vec<String>,
    pub links: Vec<Link>,
}

impl BatchOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_interrupt_on_error(mut self, interrupt: bool) -> Self {
        self.interrupt_on_error = Some(interrupt);
        self
    }

    pub fn with_silent(mut self, silent: bool) -> Self {
        self.silent = silent;
        self
    }

    pub fn with_title_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.title_prefix = prefix.into();
        self
    }

    pub fn with_mention(mut self, user_id: impl Into<String>) -> Self {
        self.mentions.push(user_id.into());
        self
    }

    pub fn with_link(mut self, link: Link) -> Self {
        self.links.push(link);
        self
    }
}
