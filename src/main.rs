//! burrow — reverse request broker.
//!
//! # Architecture Overview
//!
//! ```text
//!                    ┌────────────────────────────────────────────────┐
//!                    │                    BROKER                       │
//!   Client request   │  ┌──────┐   ┌─────────┐   ┌─────────────────┐  │
//!   ─────────────────┼─▶│ http │──▶│ ingress │──▶│ dispatch engine │  │
//!                    │  └──────┘   └─────────┘   └───────┬─────────┘  │
//!                    │                                   │            │
//!                    │                       registry + pending table │
//!                    │                                   │            │
//!   Client response  │  ┌───────┐   ┌─────────────┐      ▼            │
//!   ◀────────────────┼──│ reply │◀──│   verdict   │◀─ control channel ┼──── Handler
//!                    │  └───────┘   └─────────────┘      (/ws)        │    (connects out)
//!                    │                                                │
//!                    │  config · security · observability · lifecycle │
//!                    └────────────────────────────────────────────────┘
//! ```

use std::path::PathBuf;
use tokio::net::TcpListener;

use burrow::config::loader::resolve_config;
use burrow::lifecycle::{signals, Shutdown};
use burrow::observability::{logging, metrics};
use burrow::BrokerServer;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    logging::init();

    tracing::info!("burrow v{} starting", env!("CARGO_PKG_VERSION"));

    // Optional config path as the first argument; defaults otherwise.
    let config_path = std::env::args().nth(1).map(PathBuf::from);
    let config = resolve_config(config_path.as_deref())?;

    tracing::info!(
        port = config.listener.port,
        rate_limit = config.rate_limit.enabled,
        require_auth = config.auth.require_auth,
        "Configuration loaded"
    );

    if config.observability.metrics_enabled {
        match config.observability.metrics_address.parse() {
            Ok(addr) => {
                if let Err(e) = metrics::init_metrics(addr) {
                    tracing::error!(error = %e, "Failed to install metrics exporter");
                }
            }
            Err(_) => {
                tracing::error!(
                    metrics_address = %config.observability.metrics_address,
                    "Failed to parse metrics address"
                );
            }
        }
    }

    let listener =
        TcpListener::bind((config.listener.host.as_str(), config.listener.port)).await?;
    tracing::info!(address = %listener.local_addr()?, "Listening for connections");

    let shutdown = Shutdown::new();
    signals::spawn_signal_listener(shutdown.clone());

    let server = BrokerServer::new(config);
    server.run(listener, shutdown).await?;

    tracing::info!("Shutdown complete");
    Ok(())
}
