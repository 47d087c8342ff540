//! Hash-chain primitives: hashing and chain integrity verification.
//!
//! Hash input layout (bytes, in order):
//!   1. run_id as UTF-8 bytes
//!   2. sequence as 8-byte little-endian
//!   3. prev_hash as UTF-8 bytes (64 ASCII hex chars)
//!   4. canonical JSON of record (serde_json with no pretty-printing)

use sha2::{Digest, Sha256};

use opsgate_contracts::execution::AuditRecord;

use crate::event::AuditEvent;

/// Compute the SHA-256 hash for a single audit event.
///
/// Returns a lowercase 64-character hex string.
///
/// # Panics
///
/// Panics if `record` cannot be serialized to JSON, which cannot happen for
/// the plain-data `AuditRecord` type.
pub fn hash_event(run_id: &str, sequence: u64, record: &AuditRecord, prev_hash: &str) -> String {
    let record_json =
        serde_json::to_vec(record).expect("AuditRecord must always be serializable to JSON");

    let mut hasher = Sha256::new();
    hasher.update(run_id.as_bytes());
    hasher.update(sequence.to_le_bytes());
    hasher.update(prev_hash.as_bytes());
    hasher.update(&record_json);

    hex::encode(hasher.finalize())
}

/// Verify one run's chain.
///
/// Valid when every event links to its predecessor (or `GENESIS_HASH`),
/// carries the expected sequence number, and its `this_hash` recomputes.
/// An empty chain is valid.
pub fn verify_chain(events: &[AuditEvent]) -> bool {
    let mut expected_prev = AuditEvent::GENESIS_HASH.to_string();

    for (position, event) in events.iter().enumerate() {
        if event.prev_hash != expected_prev || event.sequence != position as u64 {
            return false;
        }

        let recomputed = hash_event(&event.run_id, event.sequence, &event.record, &event.prev_hash);
        if event.this_hash != recomputed {
            return false;
        }

        expected_prev = event.this_hash.clone();
    }

    true
}

/// Verify a journal holding the chains of many runs, interleaved or not.
pub fn verify_runs(events: &[AuditEvent]) -> bool {
    let mut runs: Vec<(&str, Vec<AuditEvent>)> = Vec::new();
    for event in events {
        match runs.iter_mut().find(|(id, _)| *id == event.run_id) {
            Some((_, chain)) => chain.push(event.clone()),
            None => runs.push((event.run_id.as_str(), vec![event.clone()])),
        }
    }
    runs.iter().all(|(_, chain)| verify_chain(chain))
}
