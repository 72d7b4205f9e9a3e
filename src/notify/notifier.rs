//! Notification front door: filtering, rendering and delivery

use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::RwLock;
use serde::{Deserialize, Serialize};

use super::dedup::DedupFilter;
use super::filter::MessageFilter;
use super::message::NotifyMessage;
use super::rate_limit::RateLimiter;
use super::render::{CardRenderer, Render};
use super::sender::{SendResult, Sender, SenderConfig};
use super::NotifyError;
use crate::config::NotifyConfig;
use crate::probe::Severity;
use crate::template::substitute;

/// A named message shape whose title and content take `{variable}`
/// arguments
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MessageTemplate {
    pub severity: Severity,
    pub title: String,
    pub content: String,
}

impl MessageTemplate {
    pub fn new(severity: Severity, title: impl Into<String>, content: impl Into<String>) -> Self {
        Self {
            severity,
            title: title.into(),
            content: content.into(),
        }
    }

    pub fn build(&self, args: &HashMap<String, String>) -> NotifyMessage {
        NotifyMessage::new(
            self.severity,
            substitute(&self.title, args),
            substitute(&self.content, args),
        )
    }
}

/// Sends messages through the filter, renderer and sender.
///
/// Without a webhook every send is skipped with a "no webhook configured"
/// result.
pub struct Notifier {
    filter: Arc<MessageFilter>,
    renderer: Box<dyn Render>,
    sender: Option<Sender>,
    templates: RwLock<HashMap<String, MessageTemplate>>,
    source: String,
    critical_mention_all: bool,
    default_mentions: Vec<String>,
}

impl Notifier {
    pub fn new(filter: MessageFilter, sender: Option<Sender>) -> Self {
        let defaults = NotifyConfig::default();
        Self {
            filter: Arc::new(filter),
            renderer: Box::new(CardRenderer::new()),
            sender,
            templates: RwLock::new(HashMap::new()),
            source: defaults.source,
            critical_mention_all: defaults.critical_mention_all,
            default_mentions: defaults.default_mentions,
        }
    }

    /// Build the filter and sender from configuration
    pub fn from_config(config: &NotifyConfig) -> Result<Self, NotifyError> {
        let dedup = config
            .dedup_enabled
            .then(|| DedupFilter::new(config.dedup_ttl));
        let rate_limiter = config
            .rate_limit_enabled
            .then(|| RateLimiter::new(config.rate_limit_window, config.rate_limit_max));

        let sender = match &config.webhook_url {
            Some(url) => Some(Sender::new(SenderConfig {
                webhook_url: url.clone(),
                timeout: config.timeout,
                max_retries: config.max_retries,
                retry_delay: config.retry_delay,
            })?),
            None => {
                tracing::warn!(channel = %config.channel, "no webhook configured, notifications disabled");
                None
            }
        };

        Ok(Self {
            source: config.source.clone(),
            critical_mention_all: config.critical_mention_all,
            default_mentions: config.default_mentions.clone(),
            ..Self::new(MessageFilter::new(dedup, rate_limiter), sender)
        })
    }

    pub fn with_renderer(mut self, renderer: impl Render + 'static) -> Self {
        self.renderer = Box::new(renderer);
        self
    }

    pub fn with_template(self, name: impl Into<String>, template: MessageTemplate) -> Self {
        self.register_template(name, template);
        self
    }

    pub fn register_template(&self, name: impl Into<String>, template: MessageTemplate) {
        self.templates.write().insert(name.into(), template);
    }

    /// Shared handle for the sweep worker
    pub fn filter(&self) -> Arc<MessageFilter> {
        Arc::clone(&self.filter)
    }

    pub fn has_sender(&self) -> bool {
        self.sender.is_some()
    }

    /// Fill in the configured source and default mentions
    fn prepare(&self, mut message: NotifyMessage) -> NotifyMessage {
        if message.source == "default" {
            message.source = self.source.clone();
        }
        if message.mentions.is_empty() && !message.mention_all {
            message = message.with_mentions(self.default_mentions.iter().cloned());
        }
        message
    }

    /// Run the filter and finish the message. `Err` carries the result of
    /// a send that must not reach the sink.
    fn admit(&self, message: NotifyMessage, force: bool) -> Result<NotifyMessage, SendResult> {
        let mut message = self.prepare(message);

        if !force {
            let decision = self.filter.should_send(&message);
            if !decision.is_allowed() {
                tracing::info!(title = %message.title, reason = %decision, "notification filtered");
                return Err(SendResult::skipped(decision.to_string()));
            }
        }

        if message.severity == Severity::Critical
            && self.critical_mention_all
            && message.mentions.is_empty()
        {
            message.mention_all = true;
        }
        Ok(message)
    }

    fn settle(&self, message: &NotifyMessage, result: SendResult) -> SendResult {
        if result.success {
            self.filter.mark_sent(message);
        } else {
            tracing::warn!(title = %message.title, error = %result.message, "notification not delivered");
        }
        result
    }

    /// Filter (unless forced), render and deliver, awaiting between retries
    pub async fn send(&self, message: NotifyMessage, force: bool) -> SendResult {
        let message = match self.admit(message, force) {
            Ok(message) => message,
            Err(skipped) => return skipped,
        };
        let Some(sender) = &self.sender else {
            return SendResult::skipped("no webhook configured");
        };

        let payload = self.renderer.render(&message);
        let result = sender.send(&payload).await;
        self.settle(&message, result)
    }

    /// Blocking counterpart of [`Notifier::send`]; call it off the async
    /// runtime threads
    pub fn send_blocking(&self, message: NotifyMessage, force: bool) -> SendResult {
        let message = match self.admit(message, force) {
            Ok(message) => message,
            Err(skipped) => return skipped,
        };
        let Some(sender) = &self.sender else {
            return SendResult::skipped("no webhook configured");
        };

        let payload = self.renderer.render(&message);
        let result = sender.send_blocking(&payload);
        self.settle(&message, result)
    }

    /// Build a message from a registered template
    pub fn message_from_template(
        &self,
        name: &str,
        args: &HashMap<String, String>,
    ) -> Result<NotifyMessage, NotifyError> {
        self.templates
            .read()
            .get(name)
            .map(|t| t.build(args))
            .ok_or_else(|| NotifyError::TemplateNotFound(name.to_string()))
    }

    pub async fn send_template(
        &self,
        name: &str,
        args: &HashMap<String, String>,
    ) -> Result<SendResult, NotifyError> {
        let message = self.message_from_template(name, args)?;
        let force = message.severity == Severity::Critical;
        Ok(self.send(message, force).await)
    }

    pub fn send_template_blocking(
        &self,
        name: &str,
        args: &HashMap<String, String>,
    ) -> Result<SendResult, NotifyError> {
        let message = self.message_from_template(name, args)?;
        let force = message.severity == Severity::Critical;
        Ok(self.send_blocking(message, force))
    }
}
