//! In-memory log ring and dashboard fan-out.
//!
//! # Responsibilities
//! - Keep a bounded ring of recent broker events
//! - Push each new record to attached dashboard sessions, best-effort
//! - Enforce the retention horizon
//!
//! # Design Decisions
//! - Fan-out uses a broadcast channel; slow dashboards lag and drop
//! - The ring is capped at 1000 records, oldest evicted
//! - Every record is also emitted through `tracing`

use serde::Serialize;
use serde_json::{json, Value};
use std::collections::VecDeque;
use std::sync::Mutex;
use std::time::{Duration, SystemTime, UNIX_EPOCH};
use tokio::sync::broadcast;

/// Ring capacity.
const RING_CAPACITY: usize = 1000;

/// Default retention horizon for ring records.
const RETENTION: Duration = Duration::from_secs(7 * 24 * 60 * 60);

/// Fan-out channel depth; laggards lose the oldest frames.
const FANOUT_CAPACITY: usize = 256;

/// Severity tags, a closed set.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum LogKind {
    Http,
    Control,
    Security,
    Server,
    Error,
}

impl LogKind {
    pub fn as_str(self) -> &'static str {
        match self {
            LogKind::Http => "http",
            LogKind::Control => "control",
            LogKind::Security => "security",
            LogKind::Server => "server",
            LogKind::Error => "error",
        }
    }
}

/// One observability record.
#[derive(Debug, Clone)]
pub struct LogRecord {
    pub at: SystemTime,
    pub kind: LogKind,
    pub message: String,
}

impl LogRecord {
    fn to_json(&self) -> Value {
        json!({
            "timestamp": epoch_millis(self.at),
            "kind": self.kind.as_str(),
            "message": self.message,
        })
    }
}

fn epoch_millis(at: SystemTime) -> u64 {
    at.duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_millis() as u64
}

/// Bounded log ring with dashboard fan-out.
pub struct LogSink {
    ring: Mutex<VecDeque<LogRecord>>,
    fanout: broadcast::Sender<Value>,
}

impl LogSink {
    pub fn new() -> Self {
        let (fanout, _) = broadcast::channel(FANOUT_CAPACITY);
        Self {
            ring: Mutex::new(VecDeque::with_capacity(RING_CAPACITY)),
            fanout,
        }
    }

    /// Append a record, evicting the oldest on overflow, and fan it out.
    pub fn log(&self, kind: LogKind, message: impl Into<String>) {
        let record = LogRecord {
            at: SystemTime::now(),
            kind,
            message: message.into(),
        };

        match kind {
            LogKind::Error => tracing::error!(kind = kind.as_str(), "{}", record.message),
            LogKind::Security => tracing::warn!(kind = kind.as_str(), "{}", record.message),
            _ => tracing::info!(kind = kind.as_str(), "{}", record.message),
        }

        let frame = json!({ "type": "log", "entry": record.to_json() });

        let mut ring = self.ring.lock().expect("log ring mutex poisoned");
        if ring.len() == RING_CAPACITY {
            ring.pop_front();
        }
        ring.push_back(record);
        drop(ring);

        // Best-effort: no receivers is fine, laggards drop.
        let _ = self.fanout.send(frame);
    }

    /// Subscribe a dashboard session to the fan-out stream.
    pub fn subscribe(&self) -> broadcast::Receiver<Value> {
        self.fanout.subscribe()
    }

    /// Push a pre-shaped frame (`{type: "status"|"stats", ...}`) to dashboards.
    pub fn broadcast(&self, frame: Value) {
        let _ = self.fanout.send(frame);
    }

    /// Drop records older than the retention horizon.
    pub fn prune(&self) {
        let cutoff = SystemTime::now()
            .checked_sub(RETENTION)
            .unwrap_or(UNIX_EPOCH);
        let mut ring = self.ring.lock().expect("log ring mutex poisoned");
        while let Some(front) = ring.front() {
            if front.at < cutoff {
                ring.pop_front();
            } else {
                break;
            }
        }
    }

    /// The most recent `n` records, newest last.
    pub fn recent(&self, n: usize) -> Vec<Value> {
        let ring = self.ring.lock().expect("log ring mutex poisoned");
        ring.iter()
            .rev()
            .take(n)
            .collect::<Vec<_>>()
            .into_iter()
            .rev()
            .map(LogRecord::to_json)
            .collect()
    }

    pub fn len(&self) -> usize {
        self.ring.lock().expect("log ring mutex poisoned").len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl Default for LogSink {
    fn default() -> Self {
        Self::new()
    }
}
