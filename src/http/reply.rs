//! Rendering verdicts and broker errors as HTTP replies.
//!
//! Every broker-originated error is a JSON body with a single `error`
//! string. Handler responses are rendered bit-for-bit: their status code
//! (default 200), their headers, their body.

use axum::{
    body::Body,
    http::{HeaderName, HeaderValue, StatusCode},
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;

use crate::channel::HandlerResponse;
use crate::engine::Verdict;

/// A broker-originated JSON error reply.
pub fn error_reply(status: u16, message: &str) -> Response {
    let status = StatusCode::from_u16(status).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
    (status, Json(json!({ "error": message }))).into_response()
}

/// Render a terminal verdict as the HTTP reply.
pub fn render(verdict: Verdict) -> Response {
    match verdict {
        Verdict::Failed { status, message } => error_reply(status, message),
        Verdict::Delivered(response) => render_delivered(response),
    }
}

fn render_delivered(response: HandlerResponse) -> Response {
    let status = StatusCode::from_u16(response.status()).unwrap_or(StatusCode::OK);
    let mut builder = Response::builder().status(status);

    if let Some(headers) = &response.headers {
        for (name, value) in headers {
            let Some(value) = value.as_str() else { continue };
            // Unusable header names or values from the handler are skipped,
            // not fatal.
            if let (Ok(name), Ok(value)) = (
                HeaderName::from_bytes(name.as_bytes()),
                HeaderValue::from_str(value),
            ) {
                builder = builder.header(name, value);
            }
        }
    }

    let body = response.body.unwrap_or_default();
    builder
        .body(Body::from(body))
        .unwrap_or_else(|_| error_reply(500, "Internal server error"))
}
