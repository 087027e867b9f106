//! Security and CORS response headers.
//!
//! # Responsibilities
//! - Add the fixed security header set to every broker reply
//! - Add CORS headers when enabled
//!
//! # Design Decisions
//! - Applied as the outermost layer so rejection replies carry them too
//! - Header values are static except the CORS origin, which is
//!   precomputed from config

use axum::{
    body::Body,
    http::{HeaderValue, Request},
    middleware::Next,
    response::Response,
};
use std::sync::Arc;

use crate::config::schema::CorsConfig;

/// The fixed security header set emitted on every reply.
const SECURITY_HEADERS: [(&str, &str); 5] = [
    ("X-Content-Type-Options", "nosniff"),
    ("X-Frame-Options", "DENY"),
    ("X-XSS-Protection", "1; mode=block"),
    ("Referrer-Policy", "strict-origin-when-cross-origin"),
    (
        "Permissions-Policy",
        "geolocation=(), microphone=(), camera=()",
    ),
];

/// Precomputed reply-header plan shared by the middleware.
pub struct HeaderPlan {
    cors_origin: Option<HeaderValue>,
}

impl HeaderPlan {
    pub fn new(cors: &CorsConfig) -> Self {
        let cors_origin = if cors.enabled {
            HeaderValue::from_str(&cors.origin_header_value()).ok()
        } else {
            None
        };
        Self { cors_origin }
    }

    fn apply(&self, response: &mut Response) {
        let headers = response.headers_mut();
        for (name, value) in SECURITY_HEADERS {
            headers.insert(name, HeaderValue::from_static(value));
        }
        if let Some(origin) = &self.cors_origin {
            headers.insert("Access-Control-Allow-Origin", origin.clone());
            headers.insert(
                "Access-Control-Allow-Methods",
                HeaderValue::from_static("GET, POST, PUT, DELETE, OPTIONS"),
            );
            headers.insert(
                "Access-Control-Allow-Headers",
                HeaderValue::from_static("Content-Type, Authorization"),
            );
        }
    }
}

/// Middleware stamping the header plan onto every reply.
pub async fn security_headers_middleware(
    axum::extract::State(plan): axum::extract::State<Arc<HeaderPlan>>,
    request: Request<Body>,
    next: Next,
) -> Response {
    let mut response = next.run(request).await;
    plan.apply(&mut response);
    response
}
