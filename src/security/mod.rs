//! Security subsystem.
//!
//! # Data Flow
//! ```text
//! Incoming request:
//!     → rate_limit.rs (check per-IP sliding windows)
//!     → validate.rs (slug syntax, injection screen, header filter)
//!     → headers.rs (stamp security + CORS headers on the reply)
//! ```
//!
//! # Design Decisions
//! - Defense in depth: multiple layers of protection
//! - Fail closed: reject on any security check failure
//! - No trust in client input

pub mod headers;
pub mod rate_limit;
pub mod validate;

pub use rate_limit::RateTracker;
