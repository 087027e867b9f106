//! Request statistics: totals, latency window, time-bucketed aggregates.
//!
//! Totals obey `received == succeeded + failed + currently-pending`, where
//! pending is the live size of the engine's pending table.

use chrono::Utc;
use serde::Serialize;
use std::collections::HashMap;
use std::sync::Mutex;
use std::time::Duration;

/// Rolling latency window length.
const LATENCY_WINDOW: usize = 100;

/// Horizon for the hourly and daily bucket maps.
const BUCKET_RETENTION_DAYS: i64 = 30;

#[derive(Debug, Default)]
struct StatsInner {
    received: u64,
    succeeded: u64,
    failed: u64,
    /// Completion latencies, newest last, capped at `LATENCY_WINDOW`.
    latencies: Vec<Duration>,
    /// Completions per hour, keyed `YYYY-MM-DD-HH` (UTC).
    hourly: HashMap<String, u64>,
    /// Completions per day, keyed `YYYY-MM-DD` (UTC).
    daily: HashMap<String, u64>,
}

/// Cumulative broker statistics.
pub struct Stats {
    inner: Mutex<StatsInner>,
}

/// Serialisable snapshot for `/api/status` and the stats fan-out frame.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StatsSnapshot {
    pub received: u64,
    pub succeeded: u64,
    pub failed: u64,
    pub avg_response_ms: u64,
    pub p95_response_ms: u64,
    pub hourly: HashMap<String, u64>,
    pub daily: HashMap<String, u64>,
}

impl Stats {
    pub fn new() -> Self {
        Self {
            inner: Mutex::new(StatsInner::default()),
        }
    }

    /// Count an admitted request.
    pub fn on_received(&self) {
        let mut inner = self.inner.lock().expect("stats mutex poisoned");
        inner.received += 1;
    }

    /// Count a request that completed with a handler response.
    pub fn on_succeeded(&self, latency: Duration) {
        let mut inner = self.inner.lock().expect("stats mutex poisoned");
        inner.succeeded += 1;
        if inner.latencies.len() == LATENCY_WINDOW {
            inner.latencies.remove(0);
        }
        inner.latencies.push(latency);
        bucket_completion(&mut inner);
    }

    /// Count a request that completed with a failure verdict.
    pub fn on_failed(&self) {
        let mut inner = self.inner.lock().expect("stats mutex poisoned");
        inner.failed += 1;
        bucket_completion(&mut inner);
    }

    /// Trim the latency window and expire old hour/day buckets.
    pub fn collapse(&self) {
        let mut inner = self.inner.lock().expect("stats mutex poisoned");
        let excess = inner.latencies.len().saturating_sub(LATENCY_WINDOW);
        if excess > 0 {
            inner.latencies.drain(..excess);
        }

        let hour_cutoff = (Utc::now() - chrono::Duration::days(BUCKET_RETENTION_DAYS))
            .format("%Y-%m-%d-%H")
            .to_string();
        let day_cutoff = (Utc::now() - chrono::Duration::days(BUCKET_RETENTION_DAYS))
            .format("%Y-%m-%d")
            .to_string();
        // Keys are zero-padded, so lexicographic order is chronological order.
        inner.hourly.retain(|key, _| *key >= hour_cutoff);
        inner.daily.retain(|key, _| *key >= day_cutoff);
    }

    pub fn snapshot(&self) -> StatsSnapshot {
        let inner = self.inner.lock().expect("stats mutex poisoned");

        let avg_response_ms = if inner.latencies.is_empty() {
            0
        } else {
            let total: Duration = inner.latencies.iter().sum();
            (total / inner.latencies.len() as u32).as_millis() as u64
        };

        let p95_response_ms = if inner.latencies.is_empty() {
            0
        } else {
            let mut sorted = inner.latencies.clone();
            sorted.sort();
            let idx = ((sorted.len() as f64) * 0.95).ceil() as usize;
            sorted[idx.saturating_sub(1).min(sorted.len() - 1)].as_millis() as u64
        };

        StatsSnapshot {
            received: inner.received,
            succeeded: inner.succeeded,
            failed: inner.failed,
            avg_response_ms,
            p95_response_ms,
            hourly: inner.hourly.clone(),
            daily: inner.daily.clone(),
        }
    }

    /// `received - succeeded - failed`, i.e. what the pending table should hold.
    pub fn outstanding(&self) -> u64 {
        let inner = self.inner.lock().expect("stats mutex poisoned");
        inner.received - inner.succeeded - inner.failed
    }
}

fn bucket_completion(inner: &mut StatsInner) {
    let now = Utc::now();
    let hour = now.format("%Y-%m-%d-%H").to_string();
    let day = now.format("%Y-%m-%d").to_string();
    *inner.hourly.entry(hour).or_insert(0) += 1;
    *inner.daily.entry(day).or_insert(0) += 1;
}

impl Default for Stats {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_totals_add_up() {
        let stats = Stats::new();
        for _ in 0..5 {
            stats.on_received();
        }
        stats.on_succeeded(Duration::from_millis(10));
        stats.on_failed();

        let snap = stats.snapshot();
        assert_eq!(snap.received, 5);
        assert_eq!(snap.succeeded, 1);
        assert_eq!(snap.failed, 1);
        assert_eq!(stats.outstanding(), 3);
    }

    #[test]
    fn test_latency_window_is_capped() {
        let stats = Stats::new();
        for i in 0..150 {
            stats.on_received();
            stats.on_succeeded(Duration::from_millis(i));
        }
        // Window holds the last 100 samples: 50..149, mean 99.5 → 99ms.
        let snap = stats.snapshot();
        assert_eq!(snap.avg_response_ms, 99);
    }

    #[test]
    fn test_p95_on_known_distribution() {
        let stats = Stats::new();
        for i in 1..=100u64 {
            stats.on_received();
            stats.on_succeeded(Duration::from_millis(i));
        }
        let snap = stats.snapshot();
        assert_eq!(snap.p95_response_ms, 95);
    }

    #[test]
    fn test_completions_land_in_current_buckets() {
        let stats = Stats::new();
        stats.on_received();
        stats.on_succeeded(Duration::from_millis(1));
        stats.on_received();
        stats.on_failed();

        let snap = stats.snapshot();
        let hour = Utc::now().format("%Y-%m-%d-%H").to_string();
        let day = Utc::now().format("%Y-%m-%d").to_string();
        assert_eq!(snap.hourly.get(&hour), Some(&2));
        assert_eq!(snap.daily.get(&day), Some(&2));
    }

    #[test]
    fn test_collapse_keeps_recent_buckets() {
        let stats = Stats::new();
        stats.on_received();
        stats.on_succeeded(Duration::from_millis(1));
        stats.collapse();
        let snap = stats.snapshot();
        assert_eq!(snap.hourly.len(), 1);
        assert_eq!(snap.daily.len(), 1);
    }
}
