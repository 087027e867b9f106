//! Admin surface: password login, bearer verification, status API.
//!
//! The status HTML itself is served unconditionally; only the data it
//! fetches is gated.

pub mod auth;
pub mod handlers;

pub use auth::TokenKeeper;
