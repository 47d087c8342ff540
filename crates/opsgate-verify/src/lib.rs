//! # opsgate-verify
//!
//! Trusted checks on what comes back from the target host.
//!
//! - [`ResponseVerifier`] holds both channels to the same dispatcher response
//!   contract (JSON Schema plus echo checks) and fingerprints content for the
//!   integrity guard.
//! - [`HttpHealthProbe`] is the post-apply reachability check.

pub mod fingerprint;
pub mod probe;
pub mod response;

pub use fingerprint::sha256_hex;
pub use probe::HttpHealthProbe;
pub use response::{response_schema, ResponseVerifier};

// ── Tests ─────────────────────────────────────────────────────────────────────
