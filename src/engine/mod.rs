//! The dispatch engine subsystem.
//!
//! # Data Flow
//! ```text
//! Admitted HTTP request
//!     → dispatch.rs (submit: forward or enqueue, await verdict)
//!     → registry.rs (slug → at-most-one binding)
//!     → pending.rs (request id → in-flight record)
//!
//! Control channel
//!     → dispatch.rs (registration, response delivery, session loss)
//! ```
//!
//! # Design Decisions
//! - The engine is one explicitly passed handle, never ambient state
//! - Every terminal path converges on one atomic remove-by-id
//! - Deadlines: 150 s after forwarding, 30 s while queued

pub mod dispatch;
pub mod pending;
pub mod registry;

pub use dispatch::{CapturedRequest, ClientView, Engine, EngineTuning, Verdict};
