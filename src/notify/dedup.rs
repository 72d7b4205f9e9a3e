//! Duplicate suppression with a sliding TTL

use std::time::Duration;

use chrono::{DateTime, Utc};
use dashmap::DashMap;
use serde::Serialize;

use super::message::NotifyMessage;

/// Bookkeeping for one dedup key
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DedupRecord {
    pub key: String,
    pub first_seen: DateTime<Utc>,
    pub last_seen: DateTime<Utc>,
    /// Times the key has been marked while live
    pub count: u64,
    pub last_content_hash: String,
}

#[derive(Debug, Clone)]
struct Entry {
    record: DedupRecord,
    expires_at: DateTime<Utc>,
}

impl Entry {
    fn fresh(key: &str, now: DateTime<Utc>) -> Self {
        Self {
            record: DedupRecord {
                key: key.to_string(),
                first_seen: now,
                last_seen: now,
                count: 0,
                last_content_hash: String::new(),
            },
            expires_at: now,
        }
    }
}

/// Suppresses messages whose key was marked within the TTL.
///
/// Every mark pushes the key's expiry to `now + ttl`, so a message repeated
/// more often than the TTL stays suppressed.
pub struct DedupFilter {
    ttl: chrono::Duration,
    entries: DashMap<String, Entry>,
}

impl DedupFilter {
    pub fn new(ttl: Duration) -> Self {
        Self {
            ttl: chrono::Duration::from_std(ttl)
                .unwrap_or_else(|_| chrono::Duration::days(36_500)),
            entries: DashMap::new(),
        }
    }

    /// `dedup:{dedupe_key}`, or a digest of severity, source, title and
    /// content
    pub fn key(message: &NotifyMessage) -> String {
        match &message.dedupe_key {
            Some(key) => format!("dedup:{}", key),
            None => {
                let material = format!(
                    "{}:{}:{}:{}",
                    message.severity, message.source, message.title, message.content
                );
                format!("dedup:auto:{:016x}", fxhash::hash64(&material))
            }
        }
    }

    fn content_hash(message: &NotifyMessage) -> String {
        let material = format!(
            "{}:{}:{}",
            message.title,
            message.content,
            message.error_msg.as_deref().unwrap_or("")
        );
        format!("{:016x}", fxhash::hash64(&material))
    }

    pub fn is_duplicate(&self, message: &NotifyMessage) -> Option<DedupRecord> {
        self.is_duplicate_at(message, Utc::now())
    }

    /// Live record for the message's key. Expired entries are dropped.
    pub fn is_duplicate_at(&self, message: &NotifyMessage, now: DateTime<Utc>) -> Option<DedupRecord> {
        let key = Self::key(message);
        let live = self
            .entries
            .get(&key)
            .map(|entry| (entry.expires_at > now).then(|| entry.record.clone()));

        match live {
            Some(Some(record)) => Some(record),
            Some(None) => {
                self.entries.remove_if(&key, |_, entry| entry.expires_at <= now);
                None
            }
            None => None,
        }
    }

    pub fn mark(&self, message: &NotifyMessage) -> DedupRecord {
        self.mark_at(message, Utc::now())
    }

    /// Record a send. Fresh or expired keys restart at count 1.
    pub fn mark_at(&self, message: &NotifyMessage, now: DateTime<Utc>) -> DedupRecord {
        let key = Self::key(message);
        let mut entry = self
            .entries
            .entry(key.clone())
            .or_insert_with(|| Entry::fresh(&key, now));

        if entry.expires_at <= now {
            *entry = Entry::fresh(&key, now);
        }

        entry.record.count += 1;
        entry.record.last_seen = now;
        entry.record.last_content_hash = Self::content_hash(message);
        entry.expires_at = now + self.ttl;
        entry.record.clone()
    }

    /// Forget the message's key
    pub fn clear(&self, message: &NotifyMessage) {
        self.entries.remove(&Self::key(message));
    }

    pub fn sweep(&self) -> usize {
        self.sweep_at(Utc::now())
    }

    /// Drop expired entries, returning how many were removed
    pub fn sweep_at(&self, now: DateTime<Utc>) -> usize {
        let mut removed = 0;
        self.entries.retain(|_, entry| {
            let keep = entry.expires_at > now;
            if !keep {
                removed += 1;
            }
            keep
        });
        removed
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::probe::Severity;
    use chrono::Duration as ChronoDuration;

    fn message(content: &str) -> NotifyMessage {
        NotifyMessage::new(Severity::Warning, "orders", content).with_source("etl")
    }

    #[test]
    fn test_key_derivation() {
        let explicit = message("a").with_dedupe_key("orders-backlog");
        assert_eq!(DedupFilter::key(&explicit), "dedup:orders-backlog");

        let auto = DedupFilter::key(&message("a"));
        assert!(auto.starts_with("dedup:auto:"));
        assert_eq!(auto.len(), "dedup:auto:".len() + 16);
        assert_eq!(auto, DedupFilter::key(&message("a")));
        assert_ne!(auto, DedupFilter::key(&message("b")));
    }

    #[test]
    fn test_duplicate_within_ttl() {
        let filter = DedupFilter::new(Duration::from_secs(300));
        let now = Utc::now();
        let msg = message("backlog");

        assert!(filter.is_duplicate_at(&msg, now).is_none());
        filter.mark_at(&msg, now);

        let record = filter
            .is_duplicate_at(&msg, now + ChronoDuration::seconds(10))
            .unwrap();
        assert_eq!(record.count, 1);
        assert_eq!(record.first_seen, now);
    }

    #[test]
    fn test_expired_entry_is_absent_and_removed() {
        let filter = DedupFilter::new(Duration::from_secs(60));
        let now = Utc::now();
        let msg = message("backlog");
        filter.mark_at(&msg, now);

        assert!(filter
            .is_duplicate_at(&msg, now + ChronoDuration::seconds(61))
            .is_none());
        assert!(filter.is_empty());
    }

    #[test]
    fn test_mark_slides_expiry() {
        let filter = DedupFilter::new(Duration::from_secs(60));
        let t0 = Utc::now();
        let msg = message("backlog");

        filter.mark_at(&msg, t0);
        let second = filter.mark_at(&msg, t0 + ChronoDuration::seconds(50));
        assert_eq!(second.count, 2);
        assert_eq!(second.first_seen, t0);

        // Still live 100s after the first mark because the second one slid it
        assert!(filter
            .is_duplicate_at(&msg, t0 + ChronoDuration::seconds(100))
            .is_some());
    }

    #[test]
    fn test_mark_after_expiry_restarts_count() {
        let filter = DedupFilter::new(Duration::from_secs(60));
        let t0 = Utc::now();
        let msg = message("backlog");

        filter.mark_at(&msg, t0);
        filter.mark_at(&msg, t0 + ChronoDuration::seconds(10));
        let later = t0 + ChronoDuration::seconds(200);
        let record = filter.mark_at(&msg, later);
        assert_eq!(record.count, 1);
        assert_eq!(record.first_seen, later);
    }

    #[test]
    fn test_clear_and_sweep() {
        let filter = DedupFilter::new(Duration::from_secs(60));
        let now = Utc::now();
        filter.mark_at(&message("a"), now);
        filter.mark_at(&message("b"), now);
        filter.mark_at(&message("c"), now + ChronoDuration::seconds(120));

        filter.clear(&message("a"));
        assert_eq!(filter.len(), 2);

        assert_eq!(filter.sweep_at(now + ChronoDuration::seconds(90)), 1);
        assert_eq!(filter.len(), 1);
    }
}
