//! Control-channel session loop.
//!
//! # Responsibilities
//! - Own the WebSocket and pump its two halves
//! - Decode ingress frames and hand them to the dispatch engine
//! - Serialise egress frames through a bounded writer queue
//! - Report session loss to the engine exactly once
//!
//! # Design Decisions
//! - The reader funnels events to the engine as calls; the engine never
//!   touches the socket directly
//! - The writer queue is bounded; the engine uses non-blocking sends and
//!   treats a full queue as a failed forward
//! - A kill signal lets the engine force the session down without waiting
//!   on the peer

use axum::extract::ws::{CloseFrame, Message, WebSocket};
use futures_util::{SinkExt, StreamExt};
use std::net::SocketAddr;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{broadcast, mpsc, Notify};

use crate::channel::frame::{Egress, FrameError, Ingress, INVALID_FRAME_HINT};
use crate::engine::Engine;
use crate::observability::{metrics, LogKind, LogSink};
use crate::security::validate;

/// Depth of the per-session writer queue.
const OUTBOUND_CAPACITY: usize = 64;

/// How long session teardown waits for the writer to flush a close frame.
const WRITER_FLUSH_TIMEOUT: Duration = Duration::from_secs(1);

static NEXT_SESSION_ID: AtomicU64 = AtomicU64::new(1);

/// Cheap, cloneable handle to a live session's writer.
#[derive(Debug, Clone)]
pub struct SessionHandle {
    id: u64,
    outbound: mpsc::Sender<Egress>,
    kill: Arc<Notify>,
}

impl SessionHandle {
    /// Create a handle and the receiving end of its writer queue.
    pub fn new() -> (Self, mpsc::Receiver<Egress>) {
        let (tx, rx) = mpsc::channel(OUTBOUND_CAPACITY);
        let handle = Self {
            id: NEXT_SESSION_ID.fetch_add(1, Ordering::Relaxed),
            outbound: tx,
            kill: Arc::new(Notify::new()),
        };
        (handle, rx)
    }

    pub fn id(&self) -> u64 {
        self.id
    }

    /// Queue a frame without blocking. A full or closed queue is an error;
    /// the caller decides whether that fails a record or drops the frame.
    pub fn send_or_drop(&self, frame: Egress) -> Result<(), ()> {
        self.outbound.try_send(frame).map_err(|_| ())
    }

    /// Ask the session to close: queue a close frame (best-effort) and
    /// signal the reader to stop.
    pub fn request_close(&self, reason: &'static str) {
        let _ = self.outbound.try_send(Egress::Close { reason });
        self.kill.notify_one();
    }

    async fn killed(&self) {
        self.kill.notified().await;
    }
}

/// Drive one control-channel session to completion.
pub async fn run(socket: WebSocket, engine: Arc<Engine>, sink: Arc<LogSink>, addr: SocketAddr) {
    let (handle, outbound_rx) = SessionHandle::new();
    let session_id = handle.id();

    engine.attach_session(handle.clone(), addr);
    metrics::record_session(1);
    sink.log(
        LogKind::Control,
        format!("control channel opened from {addr}"),
    );

    let (socket_tx, mut socket_rx) = socket.split();
    let mut writer = tokio::spawn(write_loop(socket_tx, outbound_rx));
    let mut fanout_forwarder: Option<tokio::task::JoinHandle<()>> = None;

    loop {
        tokio::select! {
            _ = handle.killed() => break,
            msg = socket_rx.next() => match msg {
                Some(Ok(Message::Text(text))) => {
                    handle_frame(&engine, &sink, &handle, &mut fanout_forwarder, text.as_str());
                }
                Some(Ok(Message::Close(_))) | None => break,
                Some(Ok(_)) => {} // ping/pong/binary: nothing to do
                Some(Err(e)) => {
                    sink.log(
                        LogKind::Control,
                        format!("control channel error from {addr}: {e}"),
                    );
                    break;
                }
            },
        }
    }

    if let Some(task) = fanout_forwarder {
        task.abort();
    }

    engine.on_session_loss(session_id);
    metrics::record_session(-1);
    sink.log(
        LogKind::Control,
        format!("control channel from {addr} closed"),
    );

    // Let the writer flush a queued close frame before tearing it down.
    drop(handle);
    let _ = tokio::time::timeout(WRITER_FLUSH_TIMEOUT, &mut writer).await;
    writer.abort();
}

fn handle_frame(
    engine: &Arc<Engine>,
    sink: &Arc<LogSink>,
    handle: &SessionHandle,
    fanout_forwarder: &mut Option<tokio::task::JoinHandle<()>>,
    text: &str,
) {
    let frame = match Ingress::decode(text) {
        Ok(frame) => frame,
        Err(FrameError::Json(_)) | Err(FrameError::Shape) => {
            let _ = handle.send_or_drop(Egress::ErrorHint {
                error: INVALID_FRAME_HINT.to_string(),
            });
            return;
        }
    };

    match frame {
        Ingress::Register { slug } => {
            if !validate::valid_slug(&slug) || slug == validate::RESERVED_SLUG {
                sink.log(
                    LogKind::Security,
                    format!("rejected registration for invalid slug '{slug}'"),
                );
                let _ = handle.send_or_drop(Egress::ErrorHint {
                    error: "Invalid slug".to_string(),
                });
                return;
            }
            engine.on_registration(handle, slug);
        }
        Ingress::Respond {
            slug,
            request_id,
            response,
        } => {
            engine.on_response(handle.id(), &slug, &request_id, response);
        }
        Ingress::AttachDashboard => {
            if fanout_forwarder.is_none() {
                // Subscribe first so the attach record itself reaches this
                // dashboard.
                *fanout_forwarder = Some(spawn_fanout_forwarder(
                    sink.subscribe(),
                    handle.clone(),
                ));
                engine.on_dashboard_attach(handle.id());
            }
        }
    }
}

/// Forward observability frames to one dashboard session, best-effort.
fn spawn_fanout_forwarder(
    mut rx: broadcast::Receiver<serde_json::Value>,
    handle: SessionHandle,
) -> tokio::task::JoinHandle<()> {
    tokio::spawn(async move {
        loop {
            match rx.recv().await {
                // A full writer queue drops the frame; dashboards tolerate gaps.
                Ok(frame) => {
                    let _ = handle.send_or_drop(Egress::Fanout(frame));
                }
                Err(broadcast::error::RecvError::Lagged(_)) => continue,
                Err(broadcast::error::RecvError::Closed) => break,
            }
        }
    })
}

async fn write_loop(
    mut socket_tx: futures_util::stream::SplitSink<WebSocket, Message>,
    mut rx: mpsc::Receiver<Egress>,
) {
    while let Some(frame) = rx.recv().await {
        match frame {
            Egress::Close { reason } => {
                let _ = socket_tx
                    .send(Message::Close(Some(CloseFrame {
                        code: 1000,
                        reason: reason.into(),
                    })))
                    .await;
                break;
            }
            other => {
                let Some(text) = other.to_text() else { continue };
                if socket_tx.send(Message::Text(text.into())).await.is_err() {
                    break;
                }
            }
        }
    }
}
