//! burrow — a reverse request broker.
//!
//! Inbound HTTP requests on short URL paths ("slugs") are dispatched to
//! remote handlers connected over persistent WebSocket control channels.
//! The handler initiates the long-lived channel outward; the broker is the
//! public ingress.

pub mod admin;
pub mod channel;
pub mod config;
pub mod engine;
pub mod http;
pub mod lifecycle;
pub mod observability;
pub mod security;

pub use config::BrokerConfig;
pub use engine::{Engine, EngineTuning};
pub use http::BrokerServer;
pub use lifecycle::{Shutdown, ShutdownReason};
