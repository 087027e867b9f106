//! Slug ingress: admission, capture, and hand-off to the dispatch engine.
//!
//! # Responsibilities
//! - Route the request path to a slug
//! - Validate the slug, whitelist, method, and target
//! - Capture the request (sanitised headers, bounded body)
//! - Submit to the engine and render its verdict
//!
//! # Design Decisions
//! - Admission rejections are terminal here and counted as failed
//! - The body is rejected during accumulation once it exceeds the cap
//! - `status/...` paths are slugs with a `/` in them, which fails slug
//!   validation, so only the exact `/status` route serves the dashboard

use axum::{
    body::Body,
    extract::{ConnectInfo, State},
    http::Request,
    response::Response,
};
use std::net::SocketAddr;

use crate::engine::CapturedRequest;
use crate::http::reply::{error_reply, render};
use crate::http::server::AppState;
use crate::observability::LogKind;
use crate::security::validate;

/// Fallback handler: everything that is not a reserved route is slug traffic.
pub async fn ingress(
    State(state): State<AppState>,
    ConnectInfo(addr): ConnectInfo<SocketAddr>,
    request: Request<Body>,
) -> Response {
    let path = request.uri().path().to_string();
    let slug = path.trim_start_matches('/').to_string();

    if slug.is_empty() {
        return reject(
            &state,
            LogKind::Http,
            400,
            "Missing slug",
            format!("rejected request from {addr}: missing slug"),
        );
    }

    if !validate::valid_slug(&slug) || slug == validate::RESERVED_SLUG {
        return reject(
            &state,
            LogKind::Http,
            400,
            "Invalid slug",
            format!("rejected request from {addr}: invalid slug '{slug}'"),
        );
    }

    let whitelist = &state.config.security.slug_whitelist;
    if !whitelist.is_empty() && !whitelist.iter().any(|allowed| allowed == &slug) {
        return reject(
            &state,
            LogKind::Security,
            403,
            "Slug not allowed",
            format!("rejected request from {addr}: slug '{slug}' not on whitelist"),
        );
    }

    let method = request.method().as_str().to_string();
    let target = request
        .uri()
        .path_and_query()
        .map(|pq| pq.as_str().to_string())
        .unwrap_or_else(|| path.clone());

    if validate::suspicious(&method) || validate::suspicious(&target) {
        return reject(
            &state,
            LogKind::Security,
            400,
            "Invalid request",
            format!("rejected request from {addr}: injection pattern in request line"),
        );
    }

    let headers: Vec<(String, String)> = request
        .headers()
        .iter()
        .map(|(name, value)| {
            (
                name.as_str().to_string(),
                String::from_utf8_lossy(value.as_bytes()).into_owned(),
            )
        })
        .collect();
    let headers = validate::sanitize_headers(headers);

    let max = state.config.security.max_request_size;
    let body = match axum::body::to_bytes(request.into_body(), max).await {
        Ok(bytes) => bytes.to_vec(),
        // to_bytes stops reading the moment the cap is crossed.
        Err(_) => {
            return reject(
                &state,
                LogKind::Security,
                413,
                "Request body too large",
                format!("rejected request from {addr}: body exceeds {max} bytes"),
            );
        }
    };

    let captured = CapturedRequest {
        method,
        target,
        headers,
        body,
    };

    let verdict = state.engine.submit(slug, captured).await;
    render(verdict)
}

/// Terminal admission rejection: counted, logged, rendered.
fn reject(
    state: &AppState,
    kind: LogKind,
    status: u16,
    message: &'static str,
    detail: String,
) -> Response {
    state.stats.on_received();
    state.stats.on_failed();
    state.sink.log(kind, detail);
    error_reply(status, message)
}
