use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::time;

use super::filter::MessageFilter;

/// Background worker that expires dedup entries and prunes rate windows
pub struct SweepWorker {
    filter: Arc<MessageFilter>,
    interval: Duration,
    running: Arc<AtomicBool>,
}

impl SweepWorker {
    pub fn new(filter: Arc<MessageFilter>, interval: Duration) -> Self {
        Self {
            filter,
            interval,
            running: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Start the background worker
    pub fn start(self: Arc<Self>) -> tokio::task::JoinHandle<()> {
        self.running.store(true, Ordering::SeqCst);

        tokio::spawn(async move {
            tracing::info!("sweep worker started with interval {:?}", self.interval);

            let mut interval = time::interval(self.interval);

            while self.running.load(Ordering::SeqCst) {
                interval.tick().await;

                let removed = run_sweep(&self.filter);
                if removed > 0 {
                    tracing::debug!(removed, "sweep worker pruned filter state");
                }
            }

            tracing::info!("sweep worker stopped");
        })
    }

    /// Stop the worker after its current tick
    pub fn stop(&self) {
        self.running.store(false, Ordering::SeqCst);
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }
}

/// Run one sweep (for manual/testing use)
pub fn run_sweep(filter: &MessageFilter) -> usize {
    filter.sweep()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::notify::{DedupFilter, NotifyMessage, RateLimiter};
    use crate::probe::Severity;

    fn short_lived_filter() -> Arc<MessageFilter> {
        Arc::new(MessageFilter::new(
            Some(DedupFilter::new(Duration::from_millis(20))),
            Some(RateLimiter::new(Duration::from_millis(20), 5)),
        ))
    }

    #[test]
    fn test_run_sweep() {
        let filter = short_lived_filter();
        let msg = NotifyMessage::new(Severity::Warning, "orders", "backlog");
        filter.mark_sent_at(&msg, chrono::Utc::now() - chrono::Duration::seconds(1));

        // One dedup entry and one rate-limit timestamp
        assert_eq!(run_sweep(&filter), 2);
        assert_eq!(run_sweep(&filter), 0);
        assert!(filter.should_send(&msg).is_allowed());
    }

    #[tokio::test]
    async fn test_worker_start_stop() {
        let filter = short_lived_filter();
        let msg = NotifyMessage::new(Severity::Warning, "orders", "backlog");
        filter.mark_sent(&msg);

        let worker = Arc::new(SweepWorker::new(Arc::clone(&filter), Duration::from_millis(10)));
        let handle = Arc::clone(&worker).start();
        assert!(worker.is_running());

        tokio::time::sleep(Duration::from_millis(80)).await;
        assert_eq!(filter.dedup().map(|d| d.len()), Some(0));

        worker.stop();
        assert!(!worker.is_running());
        handle.await.unwrap();
    }
}
