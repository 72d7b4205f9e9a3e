//! Probe and notification configuration
//!
//! Both structs carry defaults and can be loaded from `PERISCOPE_*`
//! environment variables; values that are missing or fail to parse keep
//! their defaults.

use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Probe behaviour
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProbeConfig {
    /// Interrupt on ERROR when a run does not say otherwise
    pub interrupt_on_error: bool,
    /// Records kept per history key
    pub history_max_records: usize,
}

impl Default for ProbeConfig {
    fn default() -> Self {
        Self {
            interrupt_on_error: true,
            history_max_records: 1000,
        }
    }
}

impl ProbeConfig {
    /// - `PERISCOPE_INTERRUPT_ON_ERROR`: `true` / `false`
    /// - `PERISCOPE_HISTORY_MAX_RECORDS`
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            interrupt_on_error: env_parse("PERISCOPE_INTERRUPT_ON_ERROR")
                .unwrap_or(defaults.interrupt_on_error),
            history_max_records: env_parse("PERISCOPE_HISTORY_MAX_RECORDS")
                .unwrap_or(defaults.history_max_records),
        }
    }
}

/// Notification delivery, filtering and mention settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NotifyConfig {
    /// Explicit webhook; resolved from the channel variables when unset
    pub webhook_url: Option<String>,
    pub channel: String,
    /// Source stamped on messages that do not name one
    pub source: String,
    #[serde(with = "duration_serde")]
    pub timeout: Duration,
    pub max_retries: u32,
    #[serde(with = "duration_serde")]
    pub retry_delay: Duration,
    pub dedup_enabled: bool,
    #[serde(with = "duration_serde")]
    pub dedup_ttl: Duration,
    pub rate_limit_enabled: bool,
    #[serde(with = "duration_serde")]
    pub rate_limit_window: Duration,
    pub rate_limit_max: usize,
    /// Mention everyone on CRITICAL messages without explicit mentions
    pub critical_mention_all: bool,
    pub default_mentions: Vec<String>,
    /// How often the sweep worker expires filter state
    #[serde(with = "duration_serde")]
    pub sweep_interval: Duration,
}

impl Default for NotifyConfig {
    fn default() -> Self {
        Self {
            webhook_url: None,
            channel: "default".to_string(),
            source: "periscope".to_string(),
            timeout: Duration::from_secs(10),
            max_retries: 3,
            retry_delay: Duration::from_secs(1),
            dedup_enabled: true,
            dedup_ttl: Duration::from_secs(300),
            rate_limit_enabled: true,
            rate_limit_window: Duration::from_secs(60),
            rate_limit_max: 10,
            critical_mention_all: true,
            default_mentions: Vec::new(),
            sweep_interval: Duration::from_secs(60),
        }
    }
}

impl NotifyConfig {
    /// Load from the environment:
    ///
    /// - `PERISCOPE_WEBHOOK`, `PERISCOPE_WEBHOOK_{CHANNEL}`
    /// - `PERISCOPE_CHANNEL`, `PERISCOPE_SOURCE`
    /// - `PERISCOPE_TIMEOUT_SECS`, `PERISCOPE_MAX_RETRIES`, `PERISCOPE_RETRY_DELAY_MS`
    /// - `PERISCOPE_DEDUP_ENABLED`, `PERISCOPE_DEDUP_TTL_SECS`
    /// - `PERISCOPE_RATE_LIMIT_ENABLED`, `PERISCOPE_RATE_LIMIT_WINDOW_SECS`, `PERISCOPE_RATE_LIMIT_MAX`
    /// - `PERISCOPE_CRITICAL_MENTION_ALL`
    /// - `PERISCOPE_MENTIONS`: comma-separated user ids
    /// - `PERISCOPE_SWEEP_INTERVAL_SECS`
    pub fn from_env() -> Self {
        let defaults = Self::default();
        let channel = std::env::var("PERISCOPE_CHANNEL").unwrap_or(defaults.channel);
        let webhook_url = resolve_webhook(None, &channel);

        let default_mentions = std::env::var("PERISCOPE_MENTIONS")
            .ok()
            .map(|ids| {
                ids.split(',')
                    .map(str::trim)
                    .filter(|s| !s.is_empty())
                    .map(String::from)
                    .collect()
            })
            .unwrap_or_default();

        Self {
            webhook_url,
            channel,
            source: std::env::var("PERISCOPE_SOURCE").unwrap_or(defaults.source),
            timeout: env_parse("PERISCOPE_TIMEOUT_SECS")
                .map(Duration::from_secs)
                .unwrap_or(defaults.timeout),
            max_retries: env_parse("PERISCOPE_MAX_RETRIES").unwrap_or(defaults.max_retries),
            retry_delay: env_parse("PERISCOPE_RETRY_DELAY_MS")
                .map(Duration::from_millis)
                .unwrap_or(defaults.retry_delay),
            dedup_enabled: env_parse("PERISCOPE_DEDUP_ENABLED").unwrap_or(defaults.dedup_enabled),
            dedup_ttl: env_parse("PERISCOPE_DEDUP_TTL_SECS")
                .map(Duration::from_secs)
                .unwrap_or(defaults.dedup_ttl),
            rate_limit_enabled: env_parse("PERISCOPE_RATE_LIMIT_ENABLED")
                .unwrap_or(defaults.rate_limit_enabled),
            rate_limit_window: env_parse("PERISCOPE_RATE_LIMIT_WINDOW_SECS")
                .map(Duration::from_secs)
                .unwrap_or(defaults.rate_limit_window),
            rate_limit_max: env_parse("PERISCOPE_RATE_LIMIT_MAX").unwrap_or(defaults.rate_limit_max),
            critical_mention_all: env_parse("PERISCOPE_CRITICAL_MENTION_ALL")
                .unwrap_or(defaults.critical_mention_all),
            default_mentions,
            sweep_interval: env_parse("PERISCOPE_SWEEP_INTERVAL_SECS")
                .map(Duration::from_secs)
                .unwrap_or(defaults.sweep_interval),
        }
    }

    pub fn with_webhook(mut self, url: impl Into<String>) -> Self {
        self.webhook_url = Some(url.into());
        self
    }

    pub fn with_source(mut self, source: impl Into<String>) -> Self {
        self.source = source.into();
        self
    }

    pub fn with_dedup(mut self, enabled: bool) -> Self {
        self.dedup_enabled = enabled;
        self
    }

    pub fn with_rate_limit(mut self, enabled: bool) -> Self {
        self.rate_limit_enabled = enabled;
        self
    }

    pub fn with_retry(mut self, max_retries: u32, retry_delay: Duration) -> Self {
        self.max_retries = max_retries;
        self.retry_delay = retry_delay;
        self
    }
}

/// Webhook for a channel: the explicit URL, then
/// `PERISCOPE_WEBHOOK_{CHANNEL}`, then `PERISCOPE_WEBHOOK`
pub fn resolve_webhook(explicit: Option<&str>, channel: &str) -> Option<String> {
    resolve_webhook_with(explicit, channel, |key| std::env::var(key).ok())
}

fn resolve_webhook_with(
    explicit: Option<&str>,
    channel: &str,
    lookup: impl Fn(&str) -> Option<String>,
) -> Option<String> {
    if let Some(url) = explicit.filter(|u| !u.trim().is_empty()) {
        return Some(url.to_string());
    }

    let channel_key = format!(
        "PERISCOPE_WEBHOOK_{}",
        channel.trim().to_ascii_uppercase().replace('-', "_")
    );
    lookup(&channel_key)
        .or_else(|| lookup("PERISCOPE_WEBHOOK"))
        .filter(|u| !u.trim().is_empty())
}

fn env_parse<T: std::str::FromStr>(key: &str) -> Option<T> {
    std::env::var(key).ok().and_then(|v| v.trim().parse().ok())
}

/// Serde helper storing a `Duration` as `{secs, nanos}`
pub mod duration_serde {
    use serde::{Deserialize, Deserializer, Serialize, Serializer};
    use std::time::Duration;

    #[derive(Serialize, Deserialize)]
    struct DurationHelper {
        secs: u64,
        #[serde(default)]
        nanos: u32,
    }

    pub fn serialize<S>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        DurationHelper {
            secs: duration.as_secs(),
            nanos: duration.subsec_nanos(),
        }
        .serialize(serializer)
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Duration, D::Error>
    where
        D: Deserializer<'de>,
    {
        let helper = DurationHelper::deserialize(deserializer)?;
        Ok(Duration::new(helper.secs, helper.nanos))
    }
}
