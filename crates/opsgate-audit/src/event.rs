//! Audit event types.
//!
//! `AuditEvent` is one line of the journal: an `AuditRecord` wrapped with its
//! run, its position in that run's chain, and the hashes that make tampering
//! detectable.

use serde::{Deserialize, Serialize};

use opsgate_contracts::execution::AuditRecord;

/// A single entry in the SHA-256 hash chain of one run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuditEvent {
    /// Position in the run's chain, starting at 0.
    pub sequence: u64,

    pub run_id: String,

    /// One dispatch attempt.
    pub record: AuditRecord,

    /// `this_hash` of the previous event of the same run, or `GENESIS_HASH`.
    pub prev_hash: String,

    /// SHA-256 (hex) over (run_id, sequence, prev_hash, canonical record JSON).
    pub this_hash: String,
}

impl AuditEvent {
    /// The sentinel `prev_hash` of the first event in every chain.
    pub const GENESIS_HASH: &'static str =
        "0000000000000000000000000000000000000000000000000000000000000000";
}

/// Per-run chain cursor shared by the writers.
#[derive(Debug, Clone)]
pub(crate) struct ChainHead {
    pub(crate) sequence: u64,
    pub(crate) last_hash: String,
}

impl Default for ChainHead {
    fn default() -> Self {
        Self { sequence: 0, last_hash: AuditEvent::GENESIS_HASH.to_string() }
    }
}

impl ChainHead {
    /// Link `record` onto this chain and advance the cursor.
    pub(crate) fn link(&mut self, run_id: &str, record: &AuditRecord) -> AuditEvent {
        let this_hash = crate::chain::hash_event(run_id, self.sequence, record, &self.last_hash);
        let event = AuditEvent {
            sequence: self.sequence,
            run_id: run_id.to_string(),
            record: record.clone(),
            prev_hash: std::mem::replace(&mut self.last_hash, this_hash.clone()),
            this_hash,
        };
        self.sequence += 1;
        event
    }
}
