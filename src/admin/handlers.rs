//! Admin HTTP handlers: login and the status API.

use axum::{
    extract::State,
    http::{header::AUTHORIZATION, HeaderMap, StatusCode},
    response::{IntoResponse, Response},
    Json,
};
use serde::Deserialize;
use serde_json::json;
use std::time::{SystemTime, UNIX_EPOCH};

use crate::http::server::AppState;
use crate::observability::LogKind;

#[derive(Debug, Deserialize)]
pub struct LoginBody {
    pub password: String,
}

/// POST /auth/login — exchange the admin password for a bearer token.
pub async fn login(State(state): State<AppState>, Json(body): Json<LoginBody>) -> Response {
    if body.password != state.config.auth.admin_password {
        state
            .sink
            .log(LogKind::Security, "rejected admin login attempt".to_string());
        return (
            StatusCode::UNAUTHORIZED,
            Json(json!({ "error": "Invalid password" })),
        )
            .into_response();
    }

    match state.tokens.mint() {
        Ok(token) => (
            StatusCode::OK,
            Json(json!({
                "token": token,
                "expiresIn": state.tokens.lifetime_secs(),
            })),
        )
            .into_response(),
        Err(e) => {
            tracing::error!(error = %e, "Failed to mint admin token");
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(json!({ "error": "Internal server error" })),
            )
                .into_response()
        }
    }
}

/// GET /api/status — live broker state. Gated by bearer when configured.
pub async fn api_status(State(state): State<AppState>, headers: HeaderMap) -> Response {
    if state.config.auth.require_auth && !bearer_is_valid(&state, &headers) {
        return (
            StatusCode::UNAUTHORIZED,
            Json(json!({ "error": "Unauthorized" })),
        )
            .into_response();
    }

    let (active_clients, pending_requests) = state.engine.snapshot();
    Json(json!({
        "serverStartTime": epoch_millis(state.started_at),
        "activeClients": active_clients,
        "pendingRequests": pending_requests,
        "stats": state.stats.snapshot(),
    }))
    .into_response()
}

fn bearer_is_valid(state: &AppState, headers: &HeaderMap) -> bool {
    headers
        .get(AUTHORIZATION)
        .and_then(|value| value.to_str().ok())
        .and_then(|value| value.strip_prefix("Bearer "))
        .map(|token| state.tokens.verify(token).is_ok())
        .unwrap_or(false)
}

fn epoch_millis(at: SystemTime) -> u64 {
    at.duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_millis() as u64
}
