//! Control-channel wire frames.
//!
//! Each frame is one JSON object in a WebSocket text message. Ingress frames
//! are discriminated structurally (which fields are present) and decoded to a
//! tagged variant up front; dispatch happens on the tag.

use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value};
use thiserror::Error;

/// Error hint text sent back for any undecodable frame.
pub const INVALID_FRAME_HINT: &str = "Invalid message format";

/// Structured response payload produced by a handler.
///
/// Every field is optional on the wire: status defaults to 200, headers and
/// body to empty.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct HandlerResponse {
    pub status_code: Option<u16>,
    pub headers: Option<Map<String, Value>>,
    pub body: Option<String>,
}

impl HandlerResponse {
    pub fn status(&self) -> u16 {
        self.status_code.unwrap_or(200)
    }

    pub fn body_bytes(&self) -> &[u8] {
        self.body.as_deref().unwrap_or("").as_bytes()
    }
}

/// Decoded ingress frame.
#[derive(Debug)]
pub enum Ingress {
    /// `{slug}` — bind the sending session to a slug.
    Register { slug: String },
    /// `{slug, requestId, response}` — complete a forwarded request.
    Respond {
        slug: String,
        request_id: String,
        response: HandlerResponse,
    },
    /// `{type: "status-client"}` — subscribe to observability fan-out.
    AttachDashboard,
}

#[derive(Debug, Error)]
pub enum FrameError {
    #[error("invalid JSON: {0}")]
    Json(#[from] serde_json::Error),
    #[error("unrecognised frame shape")]
    Shape,
}

#[derive(Deserialize)]
struct RespondWire {
    slug: String,
    #[serde(rename = "requestId")]
    request_id: String,
    response: HandlerResponse,
}

impl Ingress {
    /// Decode one frame. The three variants are distinguished by field
    /// presence: a `type` tag, then `requestId`, then bare `slug`.
    pub fn decode(text: &str) -> Result<Self, FrameError> {
        let value: Value = serde_json::from_str(text)?;
        let (is_attach, has_request_id, register_slug) = {
            let obj = value.as_object().ok_or(FrameError::Shape)?;
            (
                obj.get("type").and_then(Value::as_str) == Some("status-client"),
                obj.contains_key("requestId"),
                obj.get("slug").and_then(Value::as_str).map(str::to_string),
            )
        };

        if is_attach {
            return Ok(Ingress::AttachDashboard);
        }

        if has_request_id {
            let wire: RespondWire = serde_json::from_value(value)?;
            return Ok(Ingress::Respond {
                slug: wire.slug,
                request_id: wire.request_id,
                response: wire.response,
            });
        }

        if let Some(slug) = register_slug {
            return Ok(Ingress::Register { slug });
        }

        Err(FrameError::Shape)
    }
}

/// Request payload forwarded to a handler.
#[derive(Debug, Clone, Serialize)]
pub struct ForwardedRequest {
    pub method: String,
    pub url: String,
    pub headers: Map<String, Value>,
    pub body: String,
}

/// Egress frame, queued to a session's writer.
#[derive(Debug, Clone)]
pub enum Egress {
    /// `{type: "registered", slug}` — registration acknowledgement.
    Registered { slug: String },
    /// `{slug, requestId, request}` — forwarded HTTP request.
    Forward {
        slug: String,
        request_id: String,
        request: ForwardedRequest,
    },
    /// `{error}` — protocol error hint; the session stays open.
    ErrorHint { error: String },
    /// Pre-shaped observability frame (`{type: "log"|"status"|"stats", ...}`).
    Fanout(Value),
    /// Instructs the writer to close the socket with code "normal".
    Close { reason: &'static str },
}

impl Egress {
    /// Serialise to frame text. `Close` carries no payload.
    pub fn to_text(&self) -> Option<String> {
        let value = match self {
            Egress::Registered { slug } => json!({ "type": "registered", "slug": slug }),
            Egress::Forward {
                slug,
                request_id,
                request,
            } => json!({
                "slug": slug,
                "requestId": request_id,
                "request": request,
            }),
            Egress::ErrorHint { error } => json!({ "error": error }),
            Egress::Fanout(value) => value.clone(),
            Egress::Close { .. } => return None,
        };
        Some(value.to_string())
    }
}
