//! Admission decision combining dedup and rate limiting

use std::fmt;
use std::time::Duration;

use chrono::{DateTime, Utc};

use super::dedup::DedupFilter;
use super::message::NotifyMessage;
use super::rate_limit::RateLimiter;

/// Outcome of [`MessageFilter::should_send`]
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FilterDecision {
    Allowed,
    Duplicate {
        count: u64,
        first_seen: DateTime<Utc>,
    },
    RateLimited {
        count: usize,
        window: Duration,
    },
}

impl FilterDecision {
    pub fn is_allowed(&self) -> bool {
        matches!(self, FilterDecision::Allowed)
    }
}

impl fmt::Display for FilterDecision {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FilterDecision::Allowed => write!(f, "allowed"),
            FilterDecision::Duplicate { count, .. } => {
                write!(f, "duplicate, seen {} times", count)
            }
            FilterDecision::RateLimited { count, window } => {
                write!(f, "rate limited, {} in {}s window", count, window.as_secs())
            }
        }
    }
}

/// Dedup filter and rate limiter; either may be disabled
pub struct MessageFilter {
    dedup: Option<DedupFilter>,
    rate_limiter: Option<RateLimiter>,
}

impl MessageFilter {
    pub fn new(dedup: Option<DedupFilter>, rate_limiter: Option<RateLimiter>) -> Self {
        Self {
            dedup,
            rate_limiter,
        }
    }

    /// A filter that admits everything
    pub fn disabled() -> Self {
        Self::new(None, None)
    }

    pub fn dedup(&self) -> Option<&DedupFilter> {
        self.dedup.as_ref()
    }

    pub fn rate_limiter(&self) -> Option<&RateLimiter> {
        self.rate_limiter.as_ref()
    }

    pub fn should_send(&self, message: &NotifyMessage) -> FilterDecision {
        self.should_send_at(message, Utc::now())
    }

    /// Dedup is consulted before the rate limit
    pub fn should_send_at(&self, message: &NotifyMessage, now: DateTime<Utc>) -> FilterDecision {
        if let Some(record) = self
            .dedup
            .as_ref()
            .and_then(|dedup| dedup.is_duplicate_at(message, now))
        {
            return FilterDecision::Duplicate {
                count: record.count,
                first_seen: record.first_seen,
            };
        }

        if let Some(limiter) = &self.rate_limiter {
            let (allowed, count) = limiter.is_allowed_at(message, now);
            if !allowed {
                return FilterDecision::RateLimited {
                    count,
                    window: limiter.window(),
                };
            }
        }

        FilterDecision::Allowed
    }

    pub fn mark_sent(&self, message: &NotifyMessage) {
        self.mark_sent_at(message, Utc::now());
    }

    pub fn mark_sent_at(&self, message: &NotifyMessage, now: DateTime<Utc>) {
        if let Some(dedup) = &self.dedup {
            dedup.mark_at(message, now);
        }
        if let Some(limiter) = &self.rate_limiter {
            limiter.record_at(message, now);
        }
    }

    /// Expire dedup entries and prune rate windows
    pub fn sweep(&self) -> usize {
        let now = Utc::now();
        let expired = self.dedup.as_ref().map_or(0, |d| d.sweep_at(now));
        let pruned = self.rate_limiter.as_ref().map_or(0, |r| r.sweep_at(now));
        expired + pruned
    }
}

impl Default for MessageFilter {
    fn default() -> Self {
        Self::new(
            Some(DedupFilter::new(Duration::from_secs(300))),
            Some(RateLimiter::new(Duration::from_secs(60), 10)),
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::probe::Severity;
    use chrono::Duration as ChronoDuration;

    fn filter(max_count: usize) -> MessageFilter {
        MessageFilter::new(
            Some(DedupFilter::new(Duration::from_secs(300))),
            Some(RateLimiter::new(Duration::from_secs(60), max_count)),
        )
    }

    fn message(content: &str) -> NotifyMessage {
        NotifyMessage::new(Severity::Warning, "orders", content)
    }

    #[test]
    fn test_duplicate_after_mark() {
        let filter = filter(10);
        let now = Utc::now();
        let msg = message("backlog");

        assert_eq!(filter.should_send_at(&msg, now), FilterDecision::Allowed);
        filter.mark_sent_at(&msg, now);

        let decision = filter.should_send_at(&msg, now + ChronoDuration::seconds(1));
        assert_eq!(
            decision,
            FilterDecision::Duplicate {
                count: 1,
                first_seen: now
            }
        );
        assert_eq!(decision.to_string(), "duplicate, seen 1 times");
    }

    #[test]
    fn test_rate_limited() {
        let filter = filter(2);
        let now = Utc::now();
        filter.mark_sent_at(&message("a"), now);
        filter.mark_sent_at(&message("b"), now);

        let decision = filter.should_send_at(&message("c"), now);
        assert!(!decision.is_allowed());
        assert_eq!(decision.to_string(), "rate limited, 2 in 60s window");
    }

    #[test]
    fn test_dedup_checked_first() {
        let filter = filter(1);
        let now = Utc::now();
        filter.mark_sent_at(&message("a"), now);
        assert!(matches!(
            filter.should_send_at(&message("a"), now),
            FilterDecision::Duplicate { .. }
        ));
    }

    #[test]
    fn test_disabled_admits_everything() {
        let filter = MessageFilter::disabled();
        let msg = message("a");
        filter.mark_sent(&msg);
        filter.mark_sent(&msg);
        assert!(filter.should_send(&msg).is_allowed());
        assert_eq!(filter.sweep(), 0);
    }
}
