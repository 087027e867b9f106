//! Observability subsystem.
//!
//! # Data Flow
//! ```text
//! All subsystems produce:
//!     → logging.rs (structured log events via tracing)
//!     → metrics.rs (counters, gauges, histograms)
//!     → sink.rs (bounded log ring + dashboard fan-out)
//!     → stats.rs (totals, latency window, hourly/daily buckets)
//!
//! Consumers:
//!     → stdout (tracing subscriber)
//!     → Metrics endpoint (Prometheus scrape, optional)
//!     → Dashboard sessions over the control channel
//! ```
//!
//! # Design Decisions
//! - Fan-out is best-effort; a slow dashboard never stalls the engine
//! - Ring and stats structures are append-only from the engine's view
//! - Metrics are cheap (atomic increments behind the facade)

pub mod logging;
pub mod metrics;
pub mod sink;
pub mod stats;

pub use sink::{LogKind, LogSink};
pub use stats::Stats;
