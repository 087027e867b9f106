//! The dispatch engine.
//!
//! # Responsibilities
//! - Orchestrate the ingress pipeline: lookup → forward or enqueue → await
//!   reply or deadline
//! - Bind and replace slug registrations, draining queued requests
//! - Correlate handler responses with pending records
//! - Cancel everything cleanly on session loss and shutdown
//!
//! # Design Decisions
//! - One mutex over registry + pending table + session map; never held
//!   across an await
//! - Every pending record owns one timer task; all terminal paths converge
//!   on a single atomic remove-by-id, so whichever actor removes the record
//!   wins and everyone else discards
//! - Responses are accepted only from the slug's current holder

use serde::Serialize;
use serde_json::{json, Map, Value};
use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant, SystemTime, UNIX_EPOCH};
use tokio::sync::oneshot;
use uuid::Uuid;

use crate::channel::frame::{Egress, ForwardedRequest, HandlerResponse};
use crate::channel::SessionHandle;
use crate::engine::pending::{PendingRecord, PendingTable, Phase};
use crate::engine::registry::{Binding, Registry};
use crate::observability::{metrics, LogKind, LogSink, Stats};

/// Failure bodies surfaced to HTTP callers.
pub const MSG_QUEUE_TIMEOUT: &str = "No WebSocket client connected within timeout";
pub const MSG_FORWARD_TIMEOUT: &str = "Request timeout";
pub const MSG_SESSION_LOST: &str = "No active WebSocket client for this slug";
pub const MSG_SEND_FAILED: &str = "Failed to forward request";
pub const MSG_SHUTDOWN: &str = "Server is shutting down";
pub const MSG_INTERNAL: &str = "Internal server error";

/// Close reasons sent on the control channel.
pub const CLOSE_REASON_REPLACED: &str = "replaced";
pub const CLOSE_REASON_SHUTDOWN: &str = "server shutting down";
pub const CLOSE_REASON_SLOW: &str = "slow consumer";

/// A sanitised, fully buffered inbound request.
#[derive(Debug, Clone)]
pub struct CapturedRequest {
    pub method: String,
    /// Original path and query, e.g. `/svc-a?x=1`.
    pub target: String,
    /// Sanitised headers, original name case preserved.
    pub headers: Vec<(String, String)>,
    pub body: Vec<u8>,
}

/// Terminal outcome of a submitted request.
#[derive(Debug)]
pub enum Verdict {
    /// The handler answered; render its structured response.
    Delivered(HandlerResponse),
    /// The broker answered; render a JSON error body.
    Failed { status: u16, message: &'static str },
}

impl Verdict {
    pub fn failed(status: u16, message: &'static str) -> Self {
        Verdict::Failed { status, message }
    }
}

/// Deadline knobs, compile-time defaults; the test suite shrinks them.
#[derive(Debug, Clone, Copy)]
pub struct EngineTuning {
    /// Maximum time between forwarding and the handler's response.
    pub forward_deadline: Duration,
    /// Maximum time a request may wait for a handler to bind.
    pub queue_wait: Duration,
}

impl Default for EngineTuning {
    fn default() -> Self {
        Self {
            forward_deadline: Duration::from_secs(150),
            queue_wait: Duration::from_secs(30),
        }
    }
}

/// A slug's live handler, as reported by `/api/status`.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ClientView {
    pub slug: String,
    pub connected_at: u64,
    pub remote_addr: String,
}

#[derive(Debug)]
struct SessionInfo {
    handle: SessionHandle,
    addr: SocketAddr,
    slug: Option<String>,
    dashboard: bool,
}

#[derive(Default)]
struct EngineState {
    registry: Registry,
    pending: PendingTable,
    sessions: HashMap<u64, SessionInfo>,
}

/// The broker's single long-lived dispatch object, passed around as a handle.
pub struct Engine {
    state: Mutex<EngineState>,
    stats: Arc<Stats>,
    sink: Arc<LogSink>,
    tuning: EngineTuning,
    shutting_down: AtomicBool,
}

impl Engine {
    pub fn new(stats: Arc<Stats>, sink: Arc<LogSink>, tuning: EngineTuning) -> Self {
        Self {
            state: Mutex::new(EngineState::default()),
            stats,
            sink,
            tuning,
            shutting_down: AtomicBool::new(false),
        }
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, EngineState> {
        self.state.lock().expect("engine state mutex poisoned")
    }

    /// Track a freshly opened control-channel session.
    pub fn attach_session(&self, handle: SessionHandle, addr: SocketAddr) {
        let mut st = self.lock();
        st.sessions.insert(
            handle.id(),
            SessionInfo {
                handle,
                addr,
                slug: None,
                dashboard: false,
            },
        );
    }

    /// Submit an admitted request and suspend until its terminal event.
    pub async fn submit(self: &Arc<Self>, slug: String, captured: CapturedRequest) -> Verdict {
        if self.shutting_down.load(Ordering::SeqCst) {
            return Verdict::failed(503, MSG_SHUTDOWN);
        }

        let id = Uuid::new_v4();
        let (reply_tx, reply_rx) = oneshot::channel();
        let born = Instant::now();
        let forwarded;
        {
            let mut st = self.lock();
            self.stats.on_received();

            let holder = st.registry.get(&slug).map(|b| b.session.clone());
            match holder {
                Some(session) => {
                    let frame = Egress::Forward {
                        slug: slug.clone(),
                        request_id: id.to_string(),
                        request: forward_payload(&captured),
                    };
                    if session.send_or_drop(frame).is_err() {
                        // Saturated writer: fail the record and drop the session.
                        session.request_close(CLOSE_REASON_SLOW);
                        self.stats.on_failed();
                        self.sink.log(
                            LogKind::Error,
                            format!("forward to '{slug}' failed: session writer saturated"),
                        );
                        metrics::record_brokered(500, born.elapsed());
                        return Verdict::failed(500, MSG_SEND_FAILED);
                    }
                    st.pending.insert(
                        id,
                        PendingRecord {
                            slug: slug.clone(),
                            reply: reply_tx,
                            phase: Phase::Forwarded {
                                session_id: session.id(),
                            },
                            born,
                            deadline_gen: 0,
                            timer: None,
                        },
                    );
                    forwarded = true;
                }
                None => {
                    st.pending.insert(
                        id,
                        PendingRecord {
                            slug: slug.clone(),
                            reply: reply_tx,
                            phase: Phase::Queued { captured },
                            born,
                            deadline_gen: 0,
                            timer: None,
                        },
                    );
                    forwarded = false;
                }
            }
            metrics::record_pending(st.pending.len());
        }

        if forwarded {
            self.arm_timer(id, self.tuning.forward_deadline);
        } else {
            self.sink.log(
                LogKind::Http,
                format!("queued request {id} for '{slug}': no handler bound"),
            );
            self.arm_timer(id, self.tuning.queue_wait);
        }

        match reply_rx.await {
            Ok(verdict) => verdict,
            // The sender is only dropped without a verdict on an engine bug.
            Err(_) => Verdict::failed(500, MSG_INTERNAL),
        }
    }

    /// Bind `slug` to the session, replacing any existing holder, then drain
    /// the slug's queued records in admission order.
    pub fn on_registration(self: &Arc<Self>, handle: &SessionHandle, slug: String) {
        let mut replaced = false;
        let mut rearm = Vec::new();
        let mut drain_failure: Option<PendingRecord> = None;
        {
            let mut st = self.lock();

            // A session re-registering under a new slug gives up its old one.
            let prev_slug = st.sessions.get(&handle.id()).and_then(|i| i.slug.clone());
            if let Some(prev) = prev_slug {
                if prev != slug && st.registry.holder_id(&prev) == Some(handle.id()) {
                    st.registry.remove(&prev);
                }
            }

            // Replacement: ask the old holder to close before the new binding
            // becomes visible, so its in-flight responses are discarded as
            // stale from here on.
            let displaced = st
                .registry
                .get(&slug)
                .filter(|old| old.session.id() != handle.id())
                .map(|old| old.session.clone());
            if let Some(old_session) = displaced {
                old_session.request_close(CLOSE_REASON_REPLACED);
                if let Some(info) = st.sessions.get_mut(&old_session.id()) {
                    info.slug = None;
                }
                replaced = true;
            }

            st.registry.insert(
                slug.clone(),
                Binding {
                    session: handle.clone(),
                    bound_at: SystemTime::now(),
                },
            );
            if let Some(info) = st.sessions.get_mut(&handle.id()) {
                info.slug = Some(slug.clone());
            }

            let _ = handle.send_or_drop(Egress::Registered { slug: slug.clone() });

            // Drain the queue against the new binding, oldest first. The
            // first send failure completes that record as 500 and aborts the
            // drain; later records keep their queue-wait deadlines.
            for id in st.pending.queued_ids(&slug) {
                let frame = {
                    let Some(record) = st.pending.get(&id) else {
                        continue;
                    };
                    let Phase::Queued { captured } = &record.phase else {
                        continue;
                    };
                    Egress::Forward {
                        slug: slug.clone(),
                        request_id: id.to_string(),
                        request: forward_payload(captured),
                    }
                };
                if handle.send_or_drop(frame).is_ok() {
                    if let Some(record) = st.pending.get_mut(&id) {
                        record.cancel_timer();
                        record.deadline_gen += 1;
                        record.phase = Phase::Forwarded {
                            session_id: handle.id(),
                        };
                    }
                    rearm.push(id);
                } else {
                    drain_failure = st.pending.remove(&id);
                    break;
                }
            }
        }

        for id in rearm {
            self.arm_timer(id, self.tuning.forward_deadline);
        }

        if let Some(mut record) = drain_failure {
            record.cancel_timer();
            self.stats.on_failed();
            metrics::record_brokered(500, record.born.elapsed());
            self.sink.log(
                LogKind::Error,
                format!("queue drain for '{slug}' aborted: session writer saturated"),
            );
            let _ = record.reply.send(Verdict::failed(500, MSG_SEND_FAILED));
        }

        if replaced {
            self.sink.log(
                LogKind::Control,
                format!("replaced existing handler for '{slug}'"),
            );
        } else {
            self.sink
                .log(LogKind::Control, format!("handler registered for '{slug}'"));
        }
        self.broadcast_status();
    }

    /// Deliver a handler response to its pending record.
    ///
    /// Accepted only when the record exists, its slug matches, and the
    /// sending session is the slug's current holder. Anything else is
    /// discarded with a log entry.
    pub fn on_response(
        &self,
        session_id: u64,
        slug: &str,
        request_id: &str,
        response: HandlerResponse,
    ) {
        let Ok(id) = Uuid::parse_str(request_id) else {
            self.sink.log(
                LogKind::Control,
                format!("discarded response with malformed request id '{request_id}'"),
            );
            return;
        };

        let removed = {
            let mut st = self.lock();
            let holder_ok = st.registry.holder_id(slug) == Some(session_id);
            let record_ok = matches!(
                st.pending.get(&id),
                Some(record) if record.slug == slug
                    && matches!(record.phase, Phase::Forwarded { .. })
            );
            if holder_ok && record_ok {
                let removed = st.pending.remove(&id);
                metrics::record_pending(st.pending.len());
                removed
            } else {
                None
            }
        };

        match removed {
            Some(mut record) => {
                record.cancel_timer();
                let latency = record.born.elapsed();
                self.stats.on_succeeded(latency);
                metrics::record_brokered(response.status(), latency);
                let _ = record.reply.send(Verdict::Delivered(response));
            }
            None => {
                self.sink.log(
                    LogKind::Control,
                    format!("discarded stale or unknown response for {request_id} on '{slug}'"),
                );
            }
        }
    }

    /// Tear down a closed session: drop its binding and fail everything
    /// forwarded through it. Queued records stay for the next binding.
    pub fn on_session_loss(&self, session_id: u64) {
        let (slug, victims) = {
            let mut st = self.lock();
            let Some(info) = st.sessions.remove(&session_id) else {
                return;
            };
            if let Some(slug) = &info.slug {
                if st.registry.holder_id(slug) == Some(session_id) {
                    st.registry.remove(slug);
                }
            }
            let mut victims = Vec::new();
            for id in st.pending.forwarded_via(session_id) {
                if let Some(record) = st.pending.remove(&id) {
                    victims.push(record);
                }
            }
            metrics::record_pending(st.pending.len());
            (info.slug, victims)
        };

        for mut record in victims {
            record.cancel_timer();
            self.stats.on_failed();
            metrics::record_brokered(503, record.born.elapsed());
            let _ = record.reply.send(Verdict::failed(503, MSG_SESSION_LOST));
        }

        if let Some(slug) = slug {
            self.sink
                .log(LogKind::Control, format!("handler for '{slug}' disconnected"));
        }
        self.broadcast_status();
    }

    /// Mark a session as a dashboard subscriber.
    pub fn on_dashboard_attach(&self, session_id: u64) {
        let attached = {
            let mut st = self.lock();
            if let Some(info) = st.sessions.get_mut(&session_id) {
                info.dashboard = true;
            }
            st.sessions.values().filter(|info| info.dashboard).count()
        };
        self.sink.log(
            LogKind::Control,
            format!("dashboard session attached ({attached} total)"),
        );
    }

    /// Cancel every pending record with 503 and close every session.
    pub fn shutdown(&self) {
        self.shutting_down.store(true, Ordering::SeqCst);

        let (victims, sessions) = {
            let mut st = self.lock();
            let victims = st.pending.drain_all();
            let sessions: Vec<SessionHandle> =
                st.sessions.drain().map(|(_, info)| info.handle).collect();
            metrics::record_pending(0);
            (victims, sessions)
        };

        for mut record in victims {
            record.cancel_timer();
            self.stats.on_failed();
            let _ = record.reply.send(Verdict::failed(503, MSG_SHUTDOWN));
        }
        for session in sessions {
            session.request_close(CLOSE_REASON_SHUTDOWN);
        }

        self.sink
            .log(LogKind::Server, "broker shutting down".to_string());
    }

    /// Live bindings and pending-table size for `/api/status`.
    pub fn snapshot(&self) -> (Vec<ClientView>, usize) {
        let st = self.lock();
        let mut clients: Vec<ClientView> = st
            .registry
            .iter()
            .map(|(slug, binding)| ClientView {
                slug: slug.clone(),
                connected_at: epoch_millis(binding.bound_at),
                remote_addr: st
                    .sessions
                    .get(&binding.session.id())
                    .map(|info| info.addr.to_string())
                    .unwrap_or_default(),
            })
            .collect();
        clients.sort_by(|a, b| a.slug.cmp(&b.slug));
        (clients, st.pending.len())
    }

    pub fn pending_len(&self) -> usize {
        self.lock().pending.len()
    }

    /// Arm (or re-arm) the deadline timer for a record's current generation.
    fn arm_timer(self: &Arc<Self>, id: Uuid, after: Duration) {
        let generation = match self.lock().pending.get(&id) {
            Some(record) => record.deadline_gen,
            // Already completed; nothing to time out.
            None => return,
        };

        let engine = Arc::clone(self);
        let handle = tokio::spawn(async move {
            tokio::time::sleep(after).await;
            engine.expire(id, generation);
        });

        let mut st = self.lock();
        match st.pending.get_mut(&id) {
            Some(record) if record.deadline_gen == generation => {
                if let Some(old) = record.timer.replace(handle) {
                    old.abort();
                }
            }
            // Completed or transitioned while we were spawning.
            _ => handle.abort(),
        }
    }

    /// Deadline expiry. Only fires for the generation it was armed against.
    fn expire(&self, id: Uuid, generation: u32) {
        let removed = {
            let mut st = self.lock();
            let current = matches!(
                st.pending.get(&id),
                Some(record) if record.deadline_gen == generation
            );
            if current {
                let removed = st.pending.remove(&id);
                metrics::record_pending(st.pending.len());
                removed
            } else {
                None
            }
        };

        let Some(record) = removed else { return };
        let message = match record.phase {
            Phase::Queued { .. } => MSG_QUEUE_TIMEOUT,
            Phase::Forwarded { .. } => MSG_FORWARD_TIMEOUT,
        };
        self.stats.on_failed();
        metrics::record_brokered(504, record.born.elapsed());
        self.sink.log(
            LogKind::Error,
            format!("request {id} for '{}' timed out", record.slug),
        );
        let _ = record.reply.send(Verdict::failed(504, message));
    }

    fn broadcast_status(&self) {
        let (clients, pending) = self.snapshot();
        self.sink.broadcast(json!({
            "type": "status",
            "activeClients": clients,
            "pendingRequests": pending,
        }));
    }
}

fn forward_payload(captured: &CapturedRequest) -> ForwardedRequest {
    let mut headers = Map::new();
    for (name, value) in &captured.headers {
        match headers.get_mut(name.as_str()) {
            // Repeated names collapse to a comma-joined value.
            Some(Value::String(existing)) => {
                existing.push_str(", ");
                existing.push_str(value);
            }
            _ => {
                headers.insert(name.clone(), Value::String(value.clone()));
            }
        }
    }
    ForwardedRequest {
        method: captured.method.clone(),
        url: captured.target.clone(),
        headers,
        body: String::from_utf8_lossy(&captured.body).into_owned(),
    }
}

fn epoch_millis(at: SystemTime) -> u64 {
    at.duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_millis() as u64
}
