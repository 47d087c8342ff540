//! # opsgate-audit
//!
//! Local, append-only records of what a run did.
//!
//! ## Overview
//!
//! - A SHA-256 hash-chained audit journal. Every dispatch attempt becomes an
//!   `AuditEvent` linked to the previous event of the same run; tampering
//!   with any byte breaks the chain and `verify_chain` detects it.
//!   `InMemoryAuditWriter` keeps the chain in memory, `FileAuditWriter`
//!   appends it to a JSONL journal.
//! - `FileArtifactStore`, which keeps full copies of oversized outputs.
//! - `ReportStore`, which writes each run report once, atomically.
//!
//! Outputs and reports are listed in an append-only `index.jsonl`.
//!
//! ## Usage
//!
//! ```rust,ignore
//! use opsgate_audit::{FileAuditWriter, ReportStore};
//!
//! let audit = FileAuditWriter::new("artifacts/audit.jsonl");
//! // hand `audit` to the executor, then:
//! let path = ReportStore::new("artifacts").save(&report)?;
//! ```

pub mod artifacts;
pub mod chain;
pub mod event;
pub mod file;
pub mod index;
pub mod memory;
pub mod report_store;

pub use artifacts::FileArtifactStore;
pub use chain::{hash_event, verify_chain, verify_runs};
pub use event::AuditEvent;
pub use file::{read_journal, verify_journal, FileAuditWriter};
pub use index::{read_index, ArtifactKind, IndexEntry};
pub use memory::InMemoryAuditWriter;
pub use report_store::ReportStore;

// ── Tests ─────────────────────────────────────────────────────────────────────
