//! The pending-request correlation table.
//!
//! Records are keyed by request id. A secondary per-slug index preserves
//! admission order so queue drains and per-slug cancellation stay O(k) for
//! the k records of a slug.

use std::collections::HashMap;
use std::time::Instant;
use tokio::sync::oneshot;
use uuid::Uuid;

use crate::engine::dispatch::{CapturedRequest, Verdict};

/// Where a record is in its lifecycle.
#[derive(Debug)]
pub enum Phase {
    /// No handler was bound at admission; the captured request is retained
    /// until a drain forwards it or the queue-wait deadline fires.
    Queued { captured: CapturedRequest },
    /// Forwarded over the given session; awaiting the handler's response.
    Forwarded { session_id: u64 },
}

/// One in-flight request.
#[derive(Debug)]
pub struct PendingRecord {
    pub slug: String,
    pub reply: oneshot::Sender<Verdict>,
    pub phase: Phase,
    pub born: Instant,
    /// Bumped on every deadline transition; a timer only fires for its own
    /// generation, which makes expiry race-safe against drains.
    pub deadline_gen: u32,
    pub timer: Option<tokio::task::JoinHandle<()>>,
}

impl PendingRecord {
    /// Release the record's timer, if armed.
    pub fn cancel_timer(&mut self) {
        if let Some(timer) = self.timer.take() {
            timer.abort();
        }
    }
}

/// Request id → record, with a per-slug admission-order index.
#[derive(Debug, Default)]
pub struct PendingTable {
    records: HashMap<Uuid, PendingRecord>,
    by_slug: HashMap<String, Vec<Uuid>>,
}

impl PendingTable {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, id: Uuid, record: PendingRecord) {
        debug_assert!(!self.records.contains_key(&id));
        self.by_slug
            .entry(record.slug.clone())
            .or_default()
            .push(id);
        self.records.insert(id, record);
    }

    /// The single removal point all terminal paths converge on. Whoever
    /// removes the record wins the race; everyone else gets `None`.
    pub fn remove(&mut self, id: &Uuid) -> Option<PendingRecord> {
        let record = self.records.remove(id)?;
        if let Some(ids) = self.by_slug.get_mut(&record.slug) {
            ids.retain(|existing| existing != id);
            if ids.is_empty() {
                self.by_slug.remove(&record.slug);
            }
        }
        Some(record)
    }

    pub fn get(&self, id: &Uuid) -> Option<&PendingRecord> {
        self.records.get(id)
    }

    pub fn get_mut(&mut self, id: &Uuid) -> Option<&mut PendingRecord> {
        self.records.get_mut(id)
    }

    /// Unforwarded record ids for a slug, in admission order.
    pub fn queued_ids(&self, slug: &str) -> Vec<Uuid> {
        self.by_slug
            .get(slug)
            .map(|ids| {
                ids.iter()
                    .filter(|id| {
                        matches!(
                            self.records.get(id).map(|r| &r.phase),
                            Some(Phase::Queued { .. })
                        )
                    })
                    .copied()
                    .collect()
            })
            .unwrap_or_default()
    }

    /// Ids of records forwarded through the given session.
    pub fn forwarded_via(&self, session_id: u64) -> Vec<Uuid> {
        self.records
            .iter()
            .filter(|(_, record)| {
                matches!(record.phase, Phase::Forwarded { session_id: s } if s == session_id)
            })
            .map(|(id, _)| *id)
            .collect()
    }

    pub fn drain_all(&mut self) -> Vec<PendingRecord> {
        self.by_slug.clear();
        self.records.drain().map(|(_, record)| record).collect()
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }
}
