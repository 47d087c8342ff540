//! In-memory implementation of `AuditWriter`.
//!
//! `InMemoryAuditWriter` keeps every event in a `Vec` behind a `Mutex`.
//! Clones share the same state, so a test (or the simulator) can hand one
//! clone to the executor and inspect another.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard};

use tracing::info;

use opsgate_contracts::{
    error::{OpsError, OpsResult},
    execution::AuditRecord,
};
use opsgate_core::traits::AuditWriter;

use crate::{
    chain::verify_runs,
    event::{AuditEvent, ChainHead},
};

// ── Internal mutable state ────────────────────────────────────────────────────

#[derive(Default)]
pub(crate) struct InMemoryState {
    /// All events written so far, in append order.
    pub(crate) events: Vec<AuditEvent>,

    /// Open chains, keyed by run id. Removed on finalize.
    pub(crate) heads: HashMap<String, ChainHead>,

    /// Run ids in the order they were finalized.
    pub(crate) finalized: Vec<String>,
}

// ── Public writer ─────────────────────────────────────────────────────────────

#[derive(Clone, Default)]
pub struct InMemoryAuditWriter {
    pub(crate) state: Arc<Mutex<InMemoryState>>,
}

impl InMemoryAuditWriter {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> OpsResult<MutexGuard<'_, InMemoryState>> {
        self.state.lock().map_err(|e| OpsError::AuditWriteFailed {
            reason: format!("audit state lock poisoned: {e}"),
        })
    }

    /// Every event written so far, across runs.
    pub fn events(&self) -> Vec<AuditEvent> {
        self.lock().map(|s| s.events.clone()).unwrap_or_default()
    }

    /// Events of one run, in chain order.
    pub fn events_for(&self, run_id: &str) -> Vec<AuditEvent> {
        self.events().into_iter().filter(|e| e.run_id == run_id).collect()
    }

    pub fn finalized_runs(&self) -> Vec<String> {
        self.lock().map(|s| s.finalized.clone()).unwrap_or_default()
    }

    /// True when every run's chain is intact.
    pub fn verify_integrity(&self) -> bool {
        self.lock().map(|s| verify_runs(&s.events)).unwrap_or(false)
    }
}

// ── AuditWriter impl ──────────────────────────────────────────────────────────

impl AuditWriter for InMemoryAuditWriter {
    fn write(&self, run_id: &str, record: &AuditRecord) -> OpsResult<()> {
        let mut state = self.lock()?;
        let event = state.heads.entry(run_id.to_string()).or_default().link(run_id, record);
        state.events.push(event);
        Ok(())
    }

    fn finalize(&self, run_id: &str) -> OpsResult<()> {
        let mut state = self.lock()?;
        let head = state.heads.remove(run_id).unwrap_or_default();
        state.finalized.push(run_id.to_string());

        info!(
            run_id = %run_id,
            event_count = head.sequence,
            terminal_hash = %head.last_hash,
            "audit chain finalized"
        );
        Ok(())
    }
}
