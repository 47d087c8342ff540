//! # opsgate-sim
//!
//! A simulated target host for exercising the full opsgate pipeline without
//! a network.
//!
//! [`SimHost`] plays the on-host dispatcher (site states, a workflow store,
//! an append-only audit log). [`Harness`] wires it to the real
//! `ManifestPolicy`, `ResponseVerifier` and `InMemoryAuditWriter` through
//! both channels. The [`scenarios`] module holds the four end-to-end runs:
//!
//! 1. **Site block**: a high-danger apply with flag and token succeeds.
//! 2. **Blocked fix**: the same class of action without the flag is
//!    BLOCKED before any dispatch.
//! 3. **Fallback recovery**: the primary endpoint is dead; an allowlisted
//!    action is served over the fallback channel.
//! 4. **Fingerprint mismatch**: the integrity guard stops a workflow write.

pub mod channels;
pub mod harness;
pub mod host;
pub mod scenarios;

pub use channels::{SimAuditLookup, SimProbe, SimTransport};
pub use harness::{Harness, BAD_ENDPOINT};
pub use host::{HostLogLine, SimHost, SiteState, Workflow, DEMO_WORKFLOW};
pub use scenarios::{run_all, ScenarioOutcome};

// ── Tests ─────────────────────────────────────────────────────────────────────
