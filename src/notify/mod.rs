//! Notification delivery
//!
//! Messages pass the dedup filter and rate limiter, are rendered into a
//! card payload and posted to a webhook with bounded retries. Delivery
//! failures are reported as [`SendResult`] values rather than errors.

pub mod dedup;
pub mod filter;
pub mod message;
pub mod notifier;
pub mod rate_limit;
pub mod render;
pub mod sender;
pub mod sweep;

#[cfg(test)]
pub(crate) mod mock_sink;

pub use dedup::{DedupFilter, DedupRecord};
pub use filter::{FilterDecision, MessageFilter};
pub use message::{Link, NotifyMessage};
pub use notifier::{MessageTemplate, Notifier};
pub use rate_limit::RateLimiter;
pub use render::{CardRenderer, Render};
pub use sender::{SendResult, Sender, SenderConfig};
pub use sweep::SweepWorker;

/// Notifier errors
#[derive(Debug, thiserror::Error)]
pub enum NotifyError {
    #[error("Template not found: {0}")]
    TemplateNotFound(String),

    #[error("HTTP client error: {0}")]
    Client(#[from] reqwest::Error),
}
