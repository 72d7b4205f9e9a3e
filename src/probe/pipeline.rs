//! Probe runs: query, judge, record, notify, gate
//!
//! A run executes the query through the [`QueryExecutor`], turns the rows
//! into an [`Outcome`], records it in history, optionally raises it on a
//! change-rate anomaly, notifies when it is flagged (or has recovered) and
//! finally passes it through the interrupt gate.
//!
//! [`Probe::execute`] delivers notifications with the blocking sender and
//! must not be called from async runtime threads; [`Probe::execute_async`]
//! awaits delivery instead. Both share every other step.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Instant;

use parking_lot::RwLock;

use super::aggregator::{aggregate, aggregate_batch, condition_outcome, empty_outcome, error_outcome};
use super::error::ProbeError;
use super::executor::{self, missing_required, QueryExecutor, ValidationReport};
use super::interrupt;
use super::options::{BatchOptions, BatchTask, ExecuteOptions};
use super::outcome::Outcome;
use super::resolver::{apply_overrides, resolve};
use super::severity::Severity;
use crate::config::ProbeConfig;
use crate::history::{extract_tracked_value, HistoryStore};
use crate::notify::{Link, NotifyMessage, Notifier, SendResult};
use crate::template::{TemplateEngine, DEFAULT_TEMPLATE};

const DEFAULT_NAME: &str = "unnamed";
const ANOMALY_MIN_RECORDS: usize = 2;

/// A notification ready for delivery
struct Dispatch {
    message: NotifyMessage,
    force: bool,
}

/// Runs probe queries against one executor
pub struct Probe<E: QueryExecutor> {
    executor: E,
    config: ProbeConfig,
    notifier: Option<Arc<Notifier>>,
    history: Arc<HistoryStore>,
    /// Last flagged state per check name
    alert_status: RwLock<HashMap<String, bool>>,
    templates: TemplateEngine,
}

impl<E: QueryExecutor> Probe<E> {
    pub fn new(executor: E, config: ProbeConfig) -> Self {
        let history = Arc::new(HistoryStore::new(config.history_max_records));
        Self {
            executor,
            config,
            notifier: None,
            history,
            alert_status: RwLock::new(HashMap::new()),
            templates: TemplateEngine::new(),
        }
    }

    pub fn with_notifier(mut self, notifier: Arc<Notifier>) -> Self {
        self.notifier = Some(notifier);
        self
    }

    /// Share a history store between probes
    pub fn with_history(mut self, history: Arc<HistoryStore>) -> Self {
        self.history = history;
        self
    }

    pub fn executor(&self) -> &E {
        &self.executor
    }

    pub fn config(&self) -> &ProbeConfig {
        &self.config
    }

    pub fn history(&self) -> &Arc<HistoryStore> {
        &self.history
    }

    pub fn notifier(&self) -> Option<&Arc<Notifier>> {
        self.notifier.as_ref()
    }

    /// Flagged state of the last run of `name`
    pub fn alert_status(&self, name: &str) -> Option<bool> {
        self.alert_status.read().get(name).copied()
    }

    /// Dry-run the query and check it returns the probe columns
    pub fn validate(&self, query: &str) -> ValidationReport {
        executor::validate(&self.executor, query)
    }

    /// Run one check, delivering notifications on the calling thread
    pub fn execute(&self, query: &str, options: &ExecuteOptions) -> Result<Outcome, ProbeError> {
        let outcome = self.evaluate(query, options)?;
        let was_flagged = self.transition(&outcome);
        if let Some(dispatch) = self.plan(&outcome, options, was_flagged) {
            self.deliver_blocking(&outcome.name, dispatch);
        }
        interrupt::check(outcome, self.interrupt_on_error(options.interrupt_on_error))
    }

    /// Run one check, awaiting notification delivery
    pub async fn execute_async(
        &self,
        query: &str,
        options: &ExecuteOptions,
    ) -> Result<Outcome, ProbeError> {
        let outcome = self.evaluate(query, options)?;
        let was_flagged = self.transition(&outcome);
        if let Some(dispatch) = self.plan(&outcome, options, was_flagged) {
            self.deliver(&outcome.name, dispatch).await;
        }
        interrupt::check(outcome, self.interrupt_on_error(options.interrupt_on_error))
    }

    /// Run every task and judge them as one outcome named
    /// `{title_prefix}batch check`.
    ///
    /// Tasks never notify or interrupt on their own, and a task that fails
    /// becomes an ERROR outcome instead of aborting the batch.
    pub fn execute_batch(
        &self,
        tasks: &[BatchTask],
        options: &BatchOptions,
    ) -> Result<Outcome, ProbeError> {
        let outcome = self.run_batch(tasks, options);
        if let Some(dispatch) = self.plan_batch(&outcome, options) {
            self.deliver_blocking(&outcome.name, dispatch);
        }
        interrupt::check(outcome, self.interrupt_on_error(options.interrupt_on_error))
    }

    pub async fn execute_batch_async(
        &self,
        tasks: &[BatchTask],
        options: &BatchOptions,
    ) -> Result<Outcome, ProbeError> {
        let outcome = self.run_batch(tasks, options);
        if let Some(dispatch) = self.plan_batch(&outcome, options) {
            self.deliver(&outcome.name, dispatch).await;
        }
        interrupt::check(outcome, self.interrupt_on_error(options.interrupt_on_error))
    }

    fn interrupt_on_error(&self, requested: Option<bool>) -> bool {
        requested.unwrap_or(self.config.interrupt_on_error)
    }

    /// Execute, judge, record and check for anomalies
    fn evaluate(&self, query: &str, options: &ExecuteOptions) -> Result<Outcome, ProbeError> {
        let start = Instant::now();
        let result = self.executor.execute(query).map_err(|e| {
            tracing::error!(error = %e, "probe query failed");
            e
        })?;
        let duration_secs = if result.duration.is_zero() {
            start.elapsed().as_secs_f64()
        } else {
            result.duration.as_secs_f64()
        };

        if options.condition.is_none() {
            let columns = result.column_names();
            if !columns.is_empty() {
                let missing = missing_required(&columns);
                if !missing.is_empty() {
                    tracing::error!(missing = ?missing, "probe result is missing required columns");
                    return Err(ProbeError::Validation {
                        missing,
                        actual: columns,
                    });
                }
            }
        }

        let rows = &result.rows;
        let name = options.name.as_deref();
        let mut outcome = if rows.is_empty() {
            empty_outcome(
                options.empty_result_policy,
                duration_secs,
                query,
                name.unwrap_or(DEFAULT_NAME),
            )
        } else if let Some(condition) = &options.condition {
            let report = condition.evaluate(rows);
            condition_outcome(&report, rows.len(), duration_secs, query, name)
        } else {
            let (severity, details) = resolve(rows);
            aggregate(details, severity, duration_secs, query, name)
        };
        outcome.severity = apply_overrides(outcome.severity, options.force_level, options.max_level);

        let tracked = extract_tracked_value(rows, options.track_value.as_deref());
        self.history.record(&outcome, tracked);

        if options.detect_change {
            let report = self.history.detect_anomaly(
                &outcome.name,
                options.change_threshold_percent,
                ANOMALY_MIN_RECORDS,
            );
            if report.is_anomaly {
                tracing::warn!(alert = %outcome.name, rate = report.rate_percent, "change-rate anomaly");
                outcome.mark_anomaly(&report.message);
            }
        }

        tracing::debug!(
            alert = %outcome.name,
            severity = %outcome.severity,
            flagged = outcome.flagged,
            rows = outcome.row_count,
            "probe evaluated"
        );
        Ok(outcome)
    }

    /// Decide what, if anything, to send for a single run
    fn plan(&self, outcome: &Outcome, options: &ExecuteOptions, was_flagged: bool) -> Option<Dispatch> {
        if options.silent || self.notifier.is_none() {
            return None;
        }

        if was_flagged && !outcome.flagged {
            if !options.notify_on_recovery {
                return None;
            }
            let title = format!("{}{}", options.title_prefix, outcome.name);
            let content = format!("alert recovered\n\n**Duration**: {:.2}s", outcome.duration_secs);
            let message = NotifyMessage::recovery(title, content)
                .with_task_name(outcome.name.clone())
                .with_mentions(options.mentions.iter().cloned())
                .with_links(options.links.iter().cloned());
            return Some(Dispatch {
                message,
                force: false,
            });
        }

        if !outcome.flagged || !outcome.severity.should_notify() {
            return None;
        }
        let title = format!("{}{}", options.title_prefix, outcome.name);
        let template = options
            .template
            .as_deref()
            .map(TemplateEngine::resolve)
            .unwrap_or(DEFAULT_TEMPLATE);
        Some(self.alert(outcome, title, template, &options.mentions, &options.links))
    }

    fn plan_batch(&self, outcome: &Outcome, options: &BatchOptions) -> Option<Dispatch> {
        if options.silent
            || self.notifier.is_none()
            || !outcome.flagged
            || !outcome.severity.should_notify()
        {
            return None;
        }
        Some(self.alert(
            outcome,
            outcome.name.clone(),
            DEFAULT_TEMPLATE,
            &options.mentions,
            &options.links,
        ))
    }

    fn alert(
        &self,
        outcome: &Outcome,
        title: String,
        template: &str,
        mentions: &[String],
        links: &[Link],
    ) -> Dispatch {
        // Rendered content carries the run duration, so key on the summary
        let dedupe_key = format!("{}:{}:{}", title, outcome.severity, outcome.content);
        let content = self.templates.render(template, outcome, None);
        let mut message = NotifyMessage::new(outcome.severity, title, content)
            .with_dedupe_key(dedupe_key)
            .with_task_name(outcome.name.clone())
            .with_mentions(mentions.iter().cloned())
            .with_links(links.iter().cloned())
            .with_metric("row_count", outcome.row_count)
            .with_metric("flagged_count", outcome.flagged_count())
            .with_metric("duration_secs", (outcome.duration_secs * 100.0).round() / 100.0);
        if let Some(error) = &outcome.error_message {
            message = message.with_error(error.clone());
        }

        Dispatch {
            message,
            force: outcome.severity >= Severity::Critical,
        }
    }

    fn deliver_blocking(&self, alert: &str, dispatch: Dispatch) {
        if let Some(notifier) = &self.notifier {
            let result = notifier.send_blocking(dispatch.message, dispatch.force);
            log_delivery(alert, &result);
        }
    }

    async fn deliver(&self, alert: &str, dispatch: Dispatch) {
        if let Some(notifier) = &self.notifier {
            let result = notifier.send(dispatch.message, dispatch.force).await;
            log_delivery(alert, &result);
        }
    }

    /// Store the run's flagged state and return the previous one, under a
    /// single write lock so concurrent runs see each transition once
    fn transition(&self, outcome: &Outcome) -> bool {
        self.alert_status
            .write()
            .insert(outcome.name.clone(), outcome.flagged)
            .unwrap_or(false)
    }

    fn run_batch(&self, tasks: &[BatchTask], options: &BatchOptions) -> Outcome {
        let outcomes: Vec<Outcome> = tasks.iter().map(|task| self.run_task(task)).collect();
        let name = format!("{}batch check", options.title_prefix);
        let outcome = aggregate_batch(outcomes, &name);
        tracing::info!(
            batch = %outcome.name,
            tasks = tasks.len(),
            severity = %outcome.severity,
            flagged = outcome.flagged,
            "batch evaluated"
        );
        outcome
    }

    fn run_task(&self, task: &BatchTask) -> Outcome {
        let mut options = task.options.clone();
        options.silent = true;
        options.interrupt_on_error = Some(false);
        if let Some(name) = &task.name {
            options.name = Some(name.clone());
        }

        let start = Instant::now();
        match self.evaluate(&task.query, &options) {
            Ok(outcome) => {
                self.transition(&outcome);
                outcome
            }
            Err(e) => {
                let name = options.name.as_deref().unwrap_or(DEFAULT_NAME);
                tracing::warn!(task = %name, error = %e, "batch task failed");
                let message = match &e {
                    ProbeError::Execution { message, .. } => message.clone(),
                    other => other.to_string(),
                };
                error_outcome(&message, &task.query, name, start.elapsed().as_secs_f64())
            }
        }
    }
}

fn log_delivery(alert: &str, result: &SendResult) {
    if result.success {
        tracing::info!(alert = %alert, retries = result.retries, "notification delivered");
    } else {
        tracing::warn!(alert = %alert, reason = %result.message, "notification not delivered");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::NotifyConfig;
    use crate::data::Row;
    use crate::notify::mock_sink::{MockSink, Reply};
    use crate::probe::condition::{Aggregation, Comparator, Condition};
    use crate::probe::executor::{QueryRows, StaticExecutor};
    use crate::probe::options::EmptyResultPolicy;
    use std::time::Duration;

    const QUERY: &str = "SELECT * FROM checks";

    fn row(name: &str, flagged: bool, status: &str, info: &str) -> Row {
        Row::new()
            .with("alert_name", name)
            .with("is_warning", flagged as i64)
            .with("alert_info", info)
            .with("status", status)
    }

    fn probe(rows: Vec<Row>) -> Probe<StaticExecutor> {
        Probe::new(StaticExecutor::new().with_rows(QUERY, rows), ProbeConfig::default())
    }

    fn notifier(sink: &MockSink) -> Arc<Notifier> {
        let config = NotifyConfig::default()
            .with_webhook(sink.url())
            .with_retry(0, Duration::from_millis(10));
        Arc::new(Notifier::from_config(&config).unwrap())
    }

    fn sent_text(sink: &MockSink, index: usize) -> String {
        sink.received()[index].to_string()
    }

    #[test]
    fn test_warning_notifies() {
        let sink = MockSink::start(vec![Reply::ok()]);
        let probe = probe(vec![
            row("orders", true, "AbnormalYellow", "backlog 120"),
            row("orders", false, "Normal", "latency fine"),
        ])
        .with_notifier(notifier(&sink));

        let opts = ExecuteOptions::new().with_title_prefix("[etl] ");
        let outcome = probe.execute(QUERY, &opts).unwrap();

        assert_eq!(outcome.severity, Severity::Warning);
        assert!(outcome.flagged);
        assert_eq!(outcome.name, "orders");
        assert_eq!(outcome.content, "[AbnormalYellow] backlog 120");
        assert_eq!(sink.hits(), 1);
        assert!(sent_text(&sink, 0).contains("[etl] orders"));
        assert_eq!(probe.alert_status("orders"), Some(true));
        assert_eq!(probe.history().len("orders"), 1);
    }

    #[test]
    fn test_normal_run_is_quiet() {
        let sink = MockSink::start(vec![Reply::ok()]);
        let probe = probe(vec![row("orders", false, "Normal", "fine")]).with_notifier(notifier(&sink));

        let outcome = probe.execute(QUERY, &ExecuteOptions::new()).unwrap();
        assert!(!outcome.flagged);
        assert_eq!(outcome.content, "all checks normal");
        assert_eq!(sink.hits(), 0);
    }

    #[test]
    fn test_silent_skips_notification() {
        let sink = MockSink::start(vec![Reply::ok()]);
        let probe = probe(vec![row("orders", true, "warning", "x")]).with_notifier(notifier(&sink));

        probe
            .execute(QUERY, &ExecuteOptions::new().with_silent(true))
            .unwrap();
        assert_eq!(sink.hits(), 0);
    }

    #[test]
    fn test_critical_interrupts_and_is_forced() {
        let sink = MockSink::start(vec![Reply::ok()]);
        let notifier = notifier(&sink);
        let probe = probe(vec![row("db", true, "critical", "replica down")])
            .with_notifier(Arc::clone(&notifier));

        // A prior identical send would make this a duplicate without force
        for _ in 0..2 {
            let err = probe
                .execute(QUERY, &ExecuteOptions::new().with_interrupt_on_error(false))
                .unwrap_err();
            let outcome = err.outcome().unwrap();
            assert_eq!(outcome.severity, Severity::Critical);
            assert!(err.to_string().starts_with("critical alert, pipeline interrupted: db"));
        }
        assert_eq!(sink.hits(), 2);
        assert!(sent_text(&sink, 0).contains("<at id=all></at>"));
    }

    #[test]
    fn test_error_interrupt_follows_option() {
        let probe = probe(vec![row("etl", true, "AbnormalRed", "job failed")]);

        let err = probe.execute(QUERY, &ExecuteOptions::new()).unwrap_err();
        assert!(matches!(err, ProbeError::Interrupted { .. }));

        let outcome = probe
            .execute(QUERY, &ExecuteOptions::new().with_interrupt_on_error(false))
            .unwrap();
        assert_eq!(outcome.severity, Severity::Error);
    }

    #[test]
    fn test_overrides() {
        let probe = probe(vec![row("etl", true, "AbnormalRed", "job failed")]);

        let capped = probe
            .execute(QUERY, &ExecuteOptions::new().with_max_level(Severity::Warning))
            .unwrap();
        assert_eq!(capped.severity, Severity::Warning);

        let forced = probe
            .execute(
                QUERY,
                &ExecuteOptions::new()
                    .with_force_level(Severity::Info)
                    .with_max_level(Severity::Warning),
            )
            .unwrap();
        assert_eq!(forced.severity, Severity::Info);
        assert!(forced.flagged);
    }

    #[test]
    fn test_execution_failure_propagates() {
        let probe = Probe::new(
            StaticExecutor::new().with_failure(QUERY, "table not found"),
            ProbeConfig::default(),
        );
        let err = probe.execute(QUERY, &ExecuteOptions::new()).unwrap_err();
        assert!(matches!(err, ProbeError::Execution { ref message, .. } if message == "table not found"));
    }

    #[test]
    fn test_missing_columns_fail_validation() {
        let probe = probe(vec![Row::new().with("is_warning", 1)]);
        let err = probe.execute(QUERY, &ExecuteOptions::new()).unwrap_err();
        match err {
            ProbeError::Validation { missing, actual } => {
                assert_eq!(missing, vec!["alert_info".to_string()]);
                assert_eq!(actual, vec!["is_warning".to_string()]);
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn test_empty_result_policy_with_cap() {
        let probe = probe(Vec::new());

        let outcome = probe
            .execute(
                QUERY,
                &ExecuteOptions::new()
                    .with_name("orders")
                    .with_empty_result_policy(EmptyResultPolicy::Error)
                    .with_max_level(Severity::Warning),
            )
            .unwrap();
        assert_eq!(outcome.severity, Severity::Warning);
        assert!(outcome.flagged);
        assert_eq!(outcome.content, "empty result treated as error");
        assert_eq!(outcome.name, "orders");
    }

    #[test]
    fn test_condition_skips_column_validation() {
        let probe = probe(vec![
            Row::new().with("lag_seconds", 5),
            Row::new().with("lag_seconds", 45),
        ]);
        let condition = Condition::new("lag_seconds", Aggregation::Max, Comparator::Gt, 30.0);

        let outcome = probe
            .execute(
                QUERY,
                &ExecuteOptions::new().with_name("replication lag").with_condition(condition),
            )
            .unwrap();
        assert_eq!(outcome.severity, Severity::Warning);
        assert!(outcome.flagged);
        assert_eq!(outcome.row_count, 2);
        assert_eq!(outcome.name, "replication lag");
    }

    #[test]
    fn test_recovery_fires_once() {
        let sink = MockSink::start(vec![Reply::ok()]);
        let probe = probe(vec![row("orders", true, "warning", "backlog")]).with_notifier(notifier(&sink));
        let opts = ExecuteOptions::new().with_notify_on_recovery(true);

        probe.execute(QUERY, &opts).unwrap();
        probe
            .executor()
            .register_rows(QUERY, QueryRows::from_rows(vec![row("orders", false, "Normal", "ok")]));
        probe.execute(QUERY, &opts).unwrap();
        probe.execute(QUERY, &opts).unwrap();

        assert_eq!(sink.hits(), 2);
        assert!(sent_text(&sink, 1).contains("[RECOVERED] orders"));
        assert_eq!(probe.alert_status("orders"), Some(false));
    }

    #[test]
    fn test_recovery_needs_opt_in() {
        let sink = MockSink::start(vec![Reply::ok()]);
        let probe = probe(vec![row("orders", true, "warning", "backlog")]).with_notifier(notifier(&sink));

        probe.execute(QUERY, &ExecuteOptions::new()).unwrap();
        probe
            .executor()
            .register_rows(QUERY, QueryRows::from_rows(vec![row("orders", false, "Normal", "ok")]));
        probe.execute(QUERY, &ExecuteOptions::new()).unwrap();

        assert_eq!(sink.hits(), 1);
    }

    #[test]
    fn test_change_rate_anomaly_raises() {
        let probe = probe(vec![row("orders", false, "Normal", "ok").with("pending", 100)]);
        let opts = ExecuteOptions::new()
            .with_track_value("pending")
            .with_change_detection(50.0);

        let first = probe.execute(QUERY, &opts).unwrap();
        assert!(!first.flagged);

        probe.executor().register_rows(
            QUERY,
            QueryRows::from_rows(vec![row("orders", false, "Normal", "ok").with("pending", 180)]),
        );
        let second = probe.execute(QUERY, &opts).unwrap();
        assert!(second.flagged);
        assert_eq!(second.severity, Severity::Warning);
        assert!(second
            .content
            .ends_with("change-rate anomaly: orders went up by 80.0%"));
    }

    #[test]
    fn test_batch_isolates_failures() {
        let executor = StaticExecutor::new()
            .with_rows("q_ok", vec![row("orders", false, "Normal", "ok")])
            .with_rows("q_warn", vec![row("latency", true, "warning", "p99 2s")])
            .with_failure("q_fail", "syntax error");
        let probe = Probe::new(executor, ProbeConfig::default());

        let tasks = vec![
            BatchTask::new("q_ok"),
            BatchTask::new("q_warn"),
            BatchTask::new("q_fail").with_name("broken"),
        ];
        let outcome = probe
            .execute_batch(
                &tasks,
                &BatchOptions::new()
                    .with_title_prefix("nightly ")
                    .with_interrupt_on_error(false),
            )
            .unwrap();

        assert_eq!(outcome.name, "nightly batch check");
        assert_eq!(outcome.severity, Severity::Error);
        assert!(outcome.content.starts_with("2/3 checks flagged:"));
        assert!(outcome.content.contains("[ERROR] broken: execution failed: syntax error"));
        assert_eq!(probe.alert_status("latency"), Some(true));
    }

    #[test]
    fn test_batch_tasks_do_not_interrupt_or_notify_alone() {
        let sink = MockSink::start(vec![Reply::ok()]);
        let executor = StaticExecutor::new()
            .with_rows("q_crit", vec![row("db", true, "fatal", "down")])
            .with_rows("q_ok", vec![row("orders", false, "Normal", "ok")]);
        let probe = Probe::new(executor, ProbeConfig::default()).with_notifier(notifier(&sink));

        let err = probe
            .execute_batch(
                &[BatchTask::new("q_crit"), BatchTask::new("q_ok")],
                &BatchOptions::new(),
            )
            .unwrap_err();

        assert_eq!(err.outcome().map(|o| o.name.as_str()), Some("batch check"));
        // Only the aggregate is sent
        assert_eq!(sink.hits(), 1);
    }

    #[test]
    fn test_empty_batch() {
        let outcome = probe(Vec::new())
            .execute_batch(&[], &BatchOptions::new())
            .unwrap();
        assert_eq!(outcome.content, "no checks");
        assert!(!outcome.flagged);
    }

    #[test]
    fn test_validate() {
        let probe = probe(vec![row("orders", false, "Normal", "ok")]);
        assert!(probe.validate(QUERY).valid);
        assert!(!probe.validate("DROP TABLE checks").valid);
    }

    /// Serves the same rows with a different duration on every run
    struct TimedExecutor {
        rows: Vec<Row>,
        durations: parking_lot::Mutex<Vec<Duration>>,
    }

    impl QueryExecutor for TimedExecutor {
        fn execute(&self, _query: &str) -> Result<QueryRows, ProbeError> {
            let duration = self.durations.lock().pop().unwrap_or_default();
            Ok(QueryRows::from_rows(self.rows.clone()).with_duration(duration))
        }
    }

    #[test]
    fn test_repeated_alert_deduplicated_across_durations() {
        let sink = MockSink::start(vec![Reply::ok()]);
        let executor = TimedExecutor {
            rows: vec![row("orders", true, "AbnormalYellow", "backlog 120")],
            durations: parking_lot::Mutex::new(vec![
                Duration::from_millis(1500),
                Duration::from_millis(1000),
            ]),
        };
        let probe = Probe::new(executor, ProbeConfig::default()).with_notifier(notifier(&sink));

        let first = probe.execute(QUERY, &ExecuteOptions::new()).unwrap();
        let second = probe.execute(QUERY, &ExecuteOptions::new()).unwrap();

        assert_ne!(first.duration_secs, second.duration_secs);
        assert!(second.flagged);
        assert_eq!(sink.hits(), 1);
    }

    #[test]
    fn test_changed_summary_is_not_a_duplicate() {
        let sink = MockSink::start(vec![Reply::ok()]);
        let probe = probe(vec![row("orders", true, "warning", "backlog 120")]).with_notifier(notifier(&sink));

        probe.execute(QUERY, &ExecuteOptions::new()).unwrap();
        probe.executor().register_rows(
            QUERY,
            QueryRows::from_rows(vec![row("orders", true, "warning", "backlog 900")]),
        );
        probe.execute(QUERY, &ExecuteOptions::new()).unwrap();

        assert_eq!(sink.hits(), 2);
    }

    #[test]
    fn test_template_preset_by_name() {
        let sink = MockSink::start(vec![Reply::ok()]);
        let probe = probe(vec![row("orders", true, "warning", "backlog")]).with_notifier(notifier(&sink));

        probe
            .execute(QUERY, &ExecuteOptions::new().with_template("simple"))
            .unwrap();

        let text = sent_text(&sink, 0);
        assert!(text.contains("orders: [warning] backlog"));
        assert!(!text.contains("**Flagged rows**"));
    }

    #[test]
    fn test_concurrent_recovery_sent_once() {
        let sink = MockSink::start(vec![Reply::ok()]);
        let config = NotifyConfig::default()
            .with_webhook(sink.url())
            .with_dedup(false)
            .with_rate_limit(false)
            .with_retry(0, Duration::from_millis(10));
        let notifier = Arc::new(Notifier::from_config(&config).unwrap());
        let probe = probe(vec![row("orders", true, "warning", "backlog")]).with_notifier(notifier);
        let opts = ExecuteOptions::new().with_notify_on_recovery(true);

        probe.execute(QUERY, &opts).unwrap();
        probe
            .executor()
            .register_rows(QUERY, QueryRows::from_rows(vec![row("orders", false, "Normal", "ok")]));

        std::thread::scope(|scope| {
            for _ in 0..8 {
                scope.spawn(|| probe.execute(QUERY, &opts).unwrap());
            }
        });

        // One alert, one recovery
        assert_eq!(sink.hits(), 2);
        assert!(sent_text(&sink, 1).contains("[RECOVERED] orders"));
    }

    #[tokio::test]
    async fn test_execute_async_notifies() {
        let sink = MockSink::start(vec![Reply::raw(502, "bad gateway"), Reply::ok()]);
        let config = NotifyConfig::default()
            .with_webhook(sink.url())
            .with_retry(2, Duration::from_millis(10));
        let notifier = Arc::new(Notifier::from_config(&config).unwrap());
        let probe = probe(vec![row("orders", true, "warning", "backlog")]).with_notifier(notifier);

        let outcome = probe.execute_async(QUERY, &ExecuteOptions::new()).await.unwrap();
        assert!(outcome.flagged);
        assert_eq!(sink.hits(), 2);
    }

    #[tokio::test]
    async fn test_delivery_failure_does_not_fail_run() {
        let sink = MockSink::start(vec![Reply::raw(500, "down")]);
        let probe = probe(vec![row("orders", true, "warning", "backlog")]).with_notifier(notifier(&sink));

        let outcome = probe.execute_async(QUERY, &ExecuteOptions::new()).await.unwrap();
        assert_eq!(outcome.severity, Severity::Warning);
        assert_eq!(sink.hits(), 1);
    }
}
