//! Control-channel subsystem.
//!
//! # Data Flow
//! ```text
//! WebSocket upgrade at /ws
//!     → session.rs (reader task + bounded writer task)
//!     → frame.rs (decode ingress, serialise egress)
//!     → dispatch engine (registration, responses, session loss)
//! ```
//!
//! # Design Decisions
//! - One reader task and one writer task per session
//! - All frames are discrete JSON text messages; no partial frames
//! - Protocol errors answer with an error hint and keep the session open

pub mod frame;
pub mod session;

pub use frame::{Egress, HandlerResponse, Ingress};
pub use session::SessionHandle;
