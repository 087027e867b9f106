//! HTTP server setup and configuration.
//!
//! # Responsibilities
//! - Create the Axum router with all handlers
//! - Wire up middleware (tracing, security headers, rate limiting)
//! - Accept control-channel upgrades at /ws
//! - Spawn periodic maintenance tasks
//! - Run with graceful shutdown

use axum::{
    body::Body,
    extract::{ConnectInfo, State, WebSocketUpgrade},
    http::Request,
    middleware::{self, Next},
    response::{Html, IntoResponse, Response},
    routing::{get, post},
    Router,
};
use serde_json::json;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::{Duration, SystemTime};
use tokio::net::TcpListener;
use tower_http::trace::TraceLayer;

use crate::admin::{self, TokenKeeper};
use crate::channel::session;
use crate::config::BrokerConfig;
use crate::engine::{Engine, EngineTuning};
use crate::http::ingress::ingress;
use crate::http::reply::error_reply;
use crate::lifecycle::{Shutdown, ShutdownReason};
use crate::observability::{LogKind, LogSink, Stats};
use crate::security::headers::{security_headers_middleware, HeaderPlan};
use crate::security::RateTracker;

/// The dashboard document, served unconditionally at /status.
const DASHBOARD_HTML: &str = include_str!("../../static/dashboard.html");

/// Cadence of rate-bucket pruning and log-retention sweeps.
const PRUNE_INTERVAL: Duration = Duration::from_secs(60);

/// Cadence of statistics collapse and the stats fan-out frame.
const STATS_INTERVAL: Duration = Duration::from_secs(5 * 60);

/// Application state injected into handlers.
#[derive(Clone)]
pub struct AppState {
    pub engine: Arc<Engine>,
    pub config: Arc<BrokerConfig>,
    pub tokens: Arc<TokenKeeper>,
    pub limiter: Arc<RateTracker>,
    pub sink: Arc<LogSink>,
    pub stats: Arc<Stats>,
    pub headers: Arc<HeaderPlan>,
    pub started_at: SystemTime,
}

/// HTTP server for the broker.
pub struct BrokerServer {
    state: AppState,
    router: Router,
}

impl BrokerServer {
    /// Create a new server with the given configuration.
    pub fn new(config: BrokerConfig) -> Self {
        Self::with_tuning(config, EngineTuning::default())
    }

    /// Create a server with explicit engine deadlines (used by tests).
    pub fn with_tuning(config: BrokerConfig, tuning: EngineTuning) -> Self {
        let config = Arc::new(config);
        let stats = Arc::new(Stats::new());
        let sink = Arc::new(LogSink::new());
        let engine = Arc::new(Engine::new(stats.clone(), sink.clone(), tuning));
        let tokens = Arc::new(TokenKeeper::new(&config.auth));
        let limiter = Arc::new(RateTracker::new(config.rate_limit.clone()));
        let headers = Arc::new(HeaderPlan::new(&config.cors));

        let state = AppState {
            engine,
            config,
            tokens,
            limiter,
            sink,
            stats,
            headers,
            started_at: SystemTime::now(),
        };

        let router = Self::build_router(state.clone());
        Self { state, router }
    }

    /// Build the Axum router with all middleware layers.
    fn build_router(state: AppState) -> Router {
        Router::new()
            .route("/auth/login", post(admin::handlers::login))
            .route("/status", get(status_page))
            .route("/api/status", get(admin::handlers::api_status))
            .route("/ws", get(ws_upgrade))
            .fallback(ingress)
            .layer(middleware::from_fn_with_state(
                state.clone(),
                rate_limit_middleware,
            ))
            .layer(middleware::from_fn_with_state(
                state.headers.clone(),
                security_headers_middleware,
            ))
            .layer(TraceLayer::new_for_http())
            .with_state(state)
    }

    /// A handle to the dispatch engine.
    pub fn engine(&self) -> Arc<Engine> {
        self.state.engine.clone()
    }

    /// Run the server, accepting connections on the given listener.
    pub async fn run(self, listener: TcpListener, shutdown: Shutdown) -> Result<(), std::io::Error> {
        let addr = listener.local_addr()?;
        tracing::info!(address = %addr, "HTTP server starting");

        self.spawn_maintenance(&shutdown);
        self.state
            .sink
            .log(LogKind::Server, format!("broker listening on {addr}"));

        let app = self
            .router
            .into_make_service_with_connect_info::<SocketAddr>();

        // The engine winds down as soon as the signal fires, which releases
        // every open control channel so serve can finish draining.
        let engine = self.state.engine.clone();
        let mut rx = shutdown.subscribe();
        let graceful = async move {
            let reason = rx.recv().await.unwrap_or(ShutdownReason::Fault);
            tracing::info!(reason = %reason, "Winding down");
            engine.shutdown();
        };

        axum::serve(listener, app)
            .with_graceful_shutdown(graceful)
            .await?;

        tracing::info!("HTTP server stopped");
        Ok(())
    }

    fn spawn_maintenance(&self, shutdown: &Shutdown) {
        let limiter = self.state.limiter.clone();
        let sink = self.state.sink.clone();
        let mut prune_rx = shutdown.subscribe();
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(PRUNE_INTERVAL);
            ticker.tick().await;
            loop {
                tokio::select! {
                    _ = ticker.tick() => {
                        limiter.prune_idle();
                        sink.prune();
                    }
                    _ = prune_rx.recv() => break,
                }
            }
        });

        let stats = self.state.stats.clone();
        let sink = self.state.sink.clone();
        let mut stats_rx = shutdown.subscribe();
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(STATS_INTERVAL);
            ticker.tick().await;
            loop {
                tokio::select! {
                    _ = ticker.tick() => {
                        stats.collapse();
                        sink.broadcast(json!({ "type": "stats", "stats": stats.snapshot() }));
                    }
                    _ = stats_rx.recv() => break,
                }
            }
        });
    }
}

/// GET /status — the dashboard document, no auth required.
async fn status_page() -> Html<&'static str> {
    Html(DASHBOARD_HTML)
}

/// GET /ws — control-channel upgrade, gated by the per-IP open window.
async fn ws_upgrade(
    State(state): State<AppState>,
    ConnectInfo(addr): ConnectInfo<SocketAddr>,
    ws: WebSocketUpgrade,
) -> Response {
    if !state.limiter.allow_connection(addr.ip()) {
        state.sink.log(
            LogKind::Security,
            format!("refused control channel from {}: connection limit", addr.ip()),
        );
        return error_reply(429, "Too many connections");
    }

    let engine = state.engine.clone();
    let sink = state.sink.clone();
    ws.on_upgrade(move |socket| session::run(socket, engine, sink, addr))
        .into_response()
}

/// Middleware applying the per-IP HTTP window to everything but /ws.
async fn rate_limit_middleware(
    State(state): State<AppState>,
    ConnectInfo(addr): ConnectInfo<SocketAddr>,
    request: Request<Body>,
    next: Next,
) -> Response {
    let path = request.uri().path();
    // Control-channel opens are counted in their own window at the upgrade handler.
    if path == "/ws" {
        return next.run(request).await;
    }

    if !state.limiter.allow_request(addr.ip()) {
        state.sink.log(
            LogKind::Security,
            format!("rate limit exceeded for {}", addr.ip()),
        );
        if is_brokered_path(path) {
            state.stats.on_received();
            state.stats.on_failed();
        }
        return error_reply(429, "Rate limit exceeded");
    }

    next.run(request).await
}

fn is_brokered_path(path: &str) -> bool {
    !matches!(path, "/auth/login" | "/status" | "/api/status" | "/ws")
}
