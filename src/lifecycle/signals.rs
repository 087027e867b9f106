//! OS signal handling.
//!
//! # Responsibilities
//! - Translate Ctrl+C into the shutdown signal
//! - Escalate a repeated Ctrl+C to an immediate exit
//! - Enforce the hard exit deadline once shutdown has started

use std::time::Duration;

use crate::lifecycle::{Shutdown, ShutdownReason};

/// Hard ceiling on how long a graceful shutdown may take.
const HARD_EXIT_DEADLINE: Duration = Duration::from_secs(10);

/// Spawn the signal listener.
///
/// The first Ctrl+C starts the graceful wind-down. After that, whichever
/// comes first forces the process down: a second Ctrl+C or the hard exit
/// deadline.
pub fn spawn_signal_listener(shutdown: Shutdown) {
    tokio::spawn(async move {
        tokio::signal::ctrl_c()
            .await
            .expect("Failed to install Ctrl+C handler");

        if shutdown.trigger(ShutdownReason::Signal) {
            tracing::info!("Shutdown signal received");
        }

        tokio::select! {
            _ = tokio::signal::ctrl_c() => {
                tracing::warn!("Second shutdown signal, forcing exit");
            }
            _ = tokio::time::sleep(HARD_EXIT_DEADLINE) => {
                tracing::error!("Shutdown deadline exceeded, forcing exit");
            }
        }
        std::process::exit(1);
    });
}
