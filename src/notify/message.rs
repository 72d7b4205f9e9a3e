//! Notification message model

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value as JsonValue};

use crate::probe::Severity;

/// Action button attached to a message
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Link {
    pub text: String,
    pub url: String,
    #[serde(default)]
    pub is_danger: bool,
}

impl Link {
    pub fn new(text: impl Into<String>, url: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            url: url.into(),
            is_danger: false,
        }
    }

    pub fn danger(text: impl Into<String>, url: impl Into<String>) -> Self {
        Self {
            is_danger: true,
            ..Self::new(text, url)
        }
    }
}

/// A message bound for the webhook sink
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NotifyMessage {
    pub severity: Severity,
    pub title: String,
    pub content: String,
    /// Originating system, part of the dedup and rate-limit keys
    pub source: String,
    pub task_name: Option<String>,
    pub error_msg: Option<String>,
    pub links: Vec<Link>,
    /// User ids to mention
    pub mentions: Vec<String>,
    pub mention_all: bool,
    /// Explicit dedup key; content-derived when unset
    pub dedupe_key: Option<String>,
    pub metrics: Map<String, JsonValue>,
    pub extra: Map<String, JsonValue>,
    pub timestamp: DateTime<Utc>,
    /// Marks an all-clear after a flagged run
    pub recovery: bool,
}

impl NotifyMessage {
    pub fn new(severity: Severity, title: impl Into<String>, content: impl Into<String>) -> Self {
        Self {
            severity,
            title: title.into(),
            content: content.into(),
            source: "default".to_string(),
            task_name: None,
            error_msg: None,
            links: Vec::new(),
            mentions: Vec::new(),
            mention_all: false,
            dedupe_key: None,
            metrics: Map::new(),
            extra: Map::new(),
            timestamp: Utc::now(),
            recovery: false,
        }
    }

    /// INFO-level all-clear message
    pub fn recovery(title: impl Into<String>, content: impl Into<String>) -> Self {
        Self {
            recovery: true,
            ..Self::new(Severity::Info, title, content)
        }
    }

    pub fn with_source(mut self, source: impl Into<String>) -> Self {
        self.source = source.into();
        self
    }

    pub fn with_task_name(mut self, task_name: impl Into<String>) -> Self {
        self.task_name = Some(task_name.into());
        self
    }

    pub fn with_error(mut self, error_msg: impl Into<String>) -> Self {
        self.error_msg = Some(error_msg.into());
        self
    }

    pub fn with_link(mut self, link: Link) -> Self {
        self.links.push(link);
        self
    }

    pub fn with_links(mut self, links: impl IntoIterator<Item = Link>) -> Self {
        self.links.extend(links);
        self
    }

    pub fn with_mention(mut self, user_id: impl Into<String>) -> Self {
        let user_id = user_id.into();
        if !self.mentions.contains(&user_id) {
            self.mentions.push(user_id);
        }
        self
    }

    pub fn with_mentions(self, user_ids: impl IntoIterator<Item = String>) -> Self {
        user_ids.into_iter().fold(self, |msg, id| msg.with_mention(id))
    }

    pub fn with_mention_all(mut self, mention_all: bool) -> Self {
        self.mention_all = mention_all;
        self
    }

    pub fn with_dedupe_key(mut self, key: impl Into<String>) -> Self {
        self.dedupe_key = Some(key.into());
        self
    }

    pub fn with_metric(mut self, key: impl Into<String>, value: impl Into<JsonValue>) -> Self {
        self.metrics.insert(key.into(), value.into());
        self
    }

    pub fn with_extra(mut self, key: impl Into<String>, value: impl Into<JsonValue>) -> Self {
        self.extra.insert(key.into(), value.into());
        self
    }

    pub fn with_timestamp(mut self, timestamp: DateTime<Utc>) -> Self {
        self.timestamp = timestamp;
        self
    }

    /// Title with the severity marker, e.g. `⚠️ [WARNING] orders`
    pub fn formatted_title(&self) -> String {
        if self.recovery {
            format!("✅ [RECOVERED] {}", self.title)
        } else {
            format!(
                "{} [{}] {}",
                self.severity.emoji(),
                self.severity,
                self.title
            )
        }
    }

    pub fn formatted_timestamp(&self) -> String {
        self.timestamp.format("%Y-%m-%d %H:%M:%S").to_string()
    }
}
