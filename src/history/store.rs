//! Bounded in-process run history

use std::collections::{BTreeMap, HashMap, VecDeque};
use std::path::Path;

use chrono::{DateTime, Duration, Utc};
use parking_lot::RwLock;

use super::record::{
    AnomalyReport, ChangeRate, HistoryRecord, HistoryStats, TrackedStats, Trend,
};
use super::HistoryError;
use crate::data::Row;
use crate::probe::Outcome;

/// Columns never considered when looking for a tracked value
const PROBE_COLUMNS: [&str; 4] = ["alert_name", "is_warning", "alert_info", "status"];

/// Per-key history of check runs, keeping at most `max_records` per key
pub struct HistoryStore {
    max_records: usize,
    series: RwLock<HashMap<String, VecDeque<HistoryRecord>>>,
}

impl HistoryStore {
    pub fn new(max_records: usize) -> Self {
        Self {
            max_records: max_records.max(1),
            series: RwLock::new(HashMap::new()),
        }
    }

    pub fn max_records(&self) -> usize {
        self.max_records
    }

    /// Record an outcome under its name
    pub fn record(&self, outcome: &Outcome, tracked_value: Option<f64>) {
        self.push(HistoryRecord::from_outcome(outcome, tracked_value));
    }

    /// Append a record, evicting the oldest ones past the bound
    pub fn push(&self, record: HistoryRecord) {
        let mut series = self.series.write();
        let records = series.entry(record.key.clone()).or_default();
        records.push_back(record);
        while records.len() > self.max_records {
            records.pop_front();
        }
    }

    /// Records for a key, newest first
    pub fn get(
        &self,
        key: &str,
        limit: usize,
        since: Option<DateTime<Utc>>,
    ) -> Vec<HistoryRecord> {
        let series = self.series.read();
        let Some(records) = series.get(key) else {
            return Vec::new();
        };

        let mut selected: Vec<HistoryRecord> = records
            .iter()
            .rev()
            .filter(|r| since.map_or(true, |since| r.timestamp >= since))
            .cloned()
            .collect();
        // Stable sort keeps insertion order among equal timestamps
        selected.sort_by(|a, b| b.timestamp.cmp(&a.timestamp));
        selected.truncate(limit);
        selected
    }

    pub fn keys(&self) -> Vec<String> {
        self.series.read().keys().cloned().collect()
    }

    /// Number of records held for a key
    pub fn len(&self, key: &str) -> usize {
        self.series.read().get(key).map_or(0, |r| r.len())
    }

    pub fn is_empty(&self) -> bool {
        self.series.read().values().all(|r| r.is_empty())
    }

    /// Change between the two most recent records carrying a tracked value
    pub fn change_rate(&self, key: &str) -> Option<ChangeRate> {
        let values: Vec<f64> = self
            .get(key, usize::MAX, None)
            .iter()
            .filter_map(|r| r.tracked_value)
            .take(2)
            .collect();

        let &[current, previous] = values.as_slice() else {
            return None;
        };

        let change = current - previous;
        let rate = if previous != 0.0 {
            change / previous.abs() * 100.0
        } else if change > 0.0 {
            100.0
        } else {
            0.0
        };

        let trend = if rate.abs() < 1.0 {
            Trend::Stable
        } else if rate > 0.0 {
            Trend::Up
        } else {
            Trend::Down
        };

        Some(ChangeRate {
            current,
            previous,
            change,
            rate_percent: round2(rate),
            trend,
        })
    }

    /// Flag a change at least `threshold_percent` in magnitude
    pub fn detect_anomaly(
        &self,
        key: &str,
        threshold_percent: f64,
        min_records: usize,
    ) -> AnomalyReport {
        if self.len(key) < min_records {
            return AnomalyReport {
                is_anomaly: false,
                rate_percent: 0.0,
                trend: None,
                current: None,
                previous: None,
                message: format!(
                    "insufficient history (need at least {} records)",
                    min_records
                ),
            };
        }

        let Some(change) = self.change_rate(key) else {
            return AnomalyReport {
                is_anomaly: false,
                rate_percent: 0.0,
                trend: None,
                current: None,
                previous: None,
                message: "change rate unavailable".to_string(),
            };
        };

        let rate = change.rate_percent;
        let is_anomaly = rate.abs() >= threshold_percent;
        let message = if is_anomaly {
            let direction = if rate > 0.0 { "up" } else { "down" };
            format!("{} went {} by {:.1}%", key, direction, rate.abs())
        } else {
            format!("{} changed by {:.1}%, within normal range", key, rate)
        };

        AnomalyReport {
            is_anomaly,
            rate_percent: rate,
            trend: Some(change.trend),
            current: Some(change.current),
            previous: Some(change.previous),
            message,
        }
    }

    /// Statistics over the last `window_days` days
    pub fn statistics(&self, key: &str, window_days: i64) -> HistoryStats {
        self.statistics_at(key, window_days, Utc::now())
    }

    pub fn statistics_at(&self, key: &str, window_days: i64, now: DateTime<Utc>) -> HistoryStats {
        let since = now - Duration::days(window_days);
        let records = self.get(key, usize::MAX, Some(since));

        if records.is_empty() {
            return HistoryStats {
                count: 0,
                flagged_count: 0,
                flagged_rate_percent: 0.0,
                mean_duration_secs: 0.0,
                tracked: None,
            };
        }

        let count = records.len();
        let flagged_count = records.iter().filter(|r| r.flagged).count();
        let total_duration: f64 = records.iter().map(|r| r.duration_secs).sum();
        let values: Vec<f64> = records.iter().filter_map(|r| r.tracked_value).collect();

        let tracked = if values.is_empty() {
            None
        } else {
            Some(TrackedStats {
                mean: round2(values.iter().sum::<f64>() / values.len() as f64),
                min: values.iter().copied().fold(f64::INFINITY, f64::min),
                max: values.iter().copied().fold(f64::NEG_INFINITY, f64::max),
            })
        };

        HistoryStats {
            count,
            flagged_count,
            flagged_rate_percent: round2(flagged_count as f64 / count as f64 * 100.0),
            mean_duration_secs: round2(total_duration / count as f64),
            tracked,
        }
    }

    /// Drop one key, or everything
    pub fn clear(&self, key: Option<&str>) {
        let mut series = self.series.write();
        match key {
            Some(key) => {
                series.remove(key);
            }
            None => series.clear(),
        }
    }

    /// Snapshot of every series, oldest record first
    pub fn export(&self) -> BTreeMap<String, Vec<HistoryRecord>> {
        self.series
            .read()
            .iter()
            .map(|(k, v)| (k.clone(), v.iter().cloned().collect()))
            .collect()
    }

    /// Replace the named series. Only the newest `max_records` of each are kept.
    pub fn import(&self, data: BTreeMap<String, Vec<HistoryRecord>>) {
        let mut series = self.series.write();
        for (key, records) in data {
            let skip = records.len().saturating_sub(self.max_records);
            series.insert(key, records.into_iter().skip(skip).collect());
        }
    }

    pub fn save_json(&self, path: impl AsRef<Path>) -> Result<(), HistoryError> {
        let json = serde_json::to_string_pretty(&self.export())?;
        std::fs::write(path.as_ref(), json)?;
        tracing::debug!(path = %path.as_ref().display(), "history saved");
        Ok(())
    }

    pub fn load_json(&self, path: impl AsRef<Path>) -> Result<(), HistoryError> {
        let json = std::fs::read_to_string(path.as_ref())?;
        let data: BTreeMap<String, Vec<HistoryRecord>> = serde_json::from_str(&json)?;
        self.import(data);
        Ok(())
    }
}

impl Default for HistoryStore {
    fn default() -> Self {
        Self::new(1000)
    }
}

/// Pick the metric to track from a result.
///
/// A named field is read from the first row only. Without a name, the first
/// numeric field of the first row that is not a probe column is used.
pub fn extract_tracked_value(rows: &[Row], field: Option<&str>) -> Option<f64> {
    let first = rows.first()?;
    match field {
        Some(name) => first.get(name).and_then(|v| v.as_number()),
        None => first
            .iter()
            .filter(|(k, _)| !PROBE_COLUMNS.iter().any(|p| p.eq_ignore_ascii_case(k)))
            .find_map(|(_, v)| v.as_number()),
    }
}

fn round2(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}
