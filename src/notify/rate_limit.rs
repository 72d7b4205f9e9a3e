//! Sliding-window rate limiting per source and severity

use std::collections::{HashMap, VecDeque};
use std::time::Duration;

use chrono::{DateTime, Utc};
use parking_lot::Mutex;

use super::message::NotifyMessage;
use crate::probe::Severity;

/// Caps sends per `(source, severity)` within a sliding window.
/// ERROR and CRITICAL messages are never limited.
pub struct RateLimiter {
    window: Duration,
    chrono_window: chrono::Duration,
    max_count: usize,
    windows: Mutex<HashMap<String, VecDeque<DateTime<Utc>>>>,
}

impl RateLimiter {
    pub fn new(window: Duration, max_count: usize) -> Self {
        Self {
            window,
            chrono_window: chrono::Duration::from_std(window)
                .unwrap_or_else(|_| chrono::Duration::days(36_500)),
            max_count,
            windows: Mutex::new(HashMap::new()),
        }
    }

    pub fn window(&self) -> Duration {
        self.window
    }

    pub fn max_count(&self) -> usize {
        self.max_count
    }

    pub fn key(message: &NotifyMessage) -> String {
        format!("ratelimit:{}:{}", message.source, message.severity)
    }

    fn prune(timestamps: &mut VecDeque<DateTime<Utc>>, cutoff: DateTime<Utc>) {
        timestamps.retain(|ts| *ts > cutoff);
    }

    pub fn is_allowed(&self, message: &NotifyMessage) -> (bool, usize) {
        self.is_allowed_at(message, Utc::now())
    }

    /// Whether the message may be sent, and how many sends the window holds
    pub fn is_allowed_at(&self, message: &NotifyMessage, now: DateTime<Utc>) -> (bool, usize) {
        let key = Self::key(message);
        let cutoff = now - self.chrono_window;

        let mut windows = self.windows.lock();
        let count = match windows.get_mut(&key) {
            Some(timestamps) => {
                Self::prune(timestamps, cutoff);
                timestamps.len()
            }
            None => 0,
        };

        if matches!(message.severity, Severity::Critical | Severity::Error) {
            return (true, count);
        }
        (count < self.max_count, count)
    }

    pub fn record(&self, message: &NotifyMessage) {
        self.record_at(message, Utc::now());
    }

    pub fn record_at(&self, message: &NotifyMessage, now: DateTime<Utc>) {
        self.windows
            .lock()
            .entry(Self::key(message))
            .or_default()
            .push_back(now);
    }

    pub fn remaining(&self, message: &NotifyMessage) -> usize {
        self.remaining_at(message, Utc::now())
    }

    /// Sends left in the current window
    pub fn remaining_at(&self, message: &NotifyMessage, now: DateTime<Utc>) -> usize {
        let cutoff = now - self.chrono_window;
        let windows = self.windows.lock();
        let used = windows
            .get(&Self::key(message))
            .map_or(0, |ts| ts.iter().filter(|t| **t > cutoff).count());
        self.max_count.saturating_sub(used)
    }

    /// Reset one message's window, or all of them
    pub fn reset(&self, message: Option<&NotifyMessage>) {
        let mut windows = self.windows.lock();
        match message {
            Some(message) => {
                windows.remove(&Self::key(message));
            }
            None => windows.clear(),
        }
    }

    pub fn sweep(&self) -> usize {
        self.sweep_at(Utc::now())
    }

    /// Prune every window and drop empty ones. Returns the number of
    /// timestamps removed.
    pub fn sweep_at(&self, now: DateTime<Utc>) -> usize {
        let cutoff = now - self.chrono_window;
        let mut windows = self.windows.lock();
        let mut removed = 0;
        windows.retain(|_, timestamps| {
            let before = timestamps.len();
            Self::prune(timestamps, cutoff);
            removed += before - timestamps.len();
            !timestamps.is_empty()
        });
        removed
    }
}
