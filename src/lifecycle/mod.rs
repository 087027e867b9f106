//! Lifecycle management subsystem.
//!
//! # Data Flow
//! ```text
//! Startup (main.rs):
//!     Load config → Validate → Bind listener → Run server
//!
//! Shutdown (shutdown.rs):
//!     Signal received → Cancel pending records → Close sessions → Exit
//!
//! Signals (signals.rs):
//!     Ctrl+C → Trigger graceful shutdown
//!     Second Ctrl+C or 10 s deadline → Forced exit
//! ```
//!
//! # Design Decisions
//! - Ordered startup: config first, then core, then the listener
//! - Shutdown has a timeout: forced exit after the deadline

pub mod shutdown;
pub mod signals;

pub use shutdown::{Shutdown, ShutdownReason};
