//! HTTP protocol handling subsystem.
//!
//! # Data Flow
//! ```text
//! TCP connection
//!     → server.rs (Axum setup, routes, middleware)
//!     → ingress.rs (slug admission, capture)
//!     → [dispatch engine forwards or queues]
//!     → reply.rs (verdict → HTTP reply)
//! ```

pub mod ingress;
pub mod reply;
pub mod server;

pub use server::BrokerServer;
