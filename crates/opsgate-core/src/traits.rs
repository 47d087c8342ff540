//! Core trait definitions for the opsgate run pipeline.
//!
//! These traits define the trust boundary:
//!
//! - `PolicyEngine`: trusted gate (validates structure, then gates danger)
//! - `Transport`   : untrusted channel to the target dispatcher
//! - `Verifier`    : trusted normalizer of whatever a transport returns
//! - `AuditWriter` : trusted sink (records every dispatch attempt)
//! - `AuditLookup`, `HealthProbe`: read-only views of the target host
//! - `ArtifactSink`: local store for oversized outputs
//!
//! The executor wires them together in the correct order. No `Transport` is
//! ever called for an invocation the `PolicyEngine` has not allowed.

use opsgate_contracts::{
    action::ActionDescriptor,
    error::{OpsResult, TransportError},
    execution::{AuditRecord, Channel, DispatchRequest, ExecutionResult, RequestId},
    gate::{GateDecision, SafetyConfig},
    plan::{Invocation, Plan, PlanRejection},
};

/// The policy engine: structural validation plus danger gating.
///
/// Implementations are **trusted** and must be pure. Neither method may
/// touch the network or the target host.
pub trait PolicyEngine: Send + Sync {
    /// Turn a candidate plan into typed invocations, preserving order.
    fn validate(&self, plan: &Plan) -> Result<Vec<Invocation>, PlanRejection>;

    /// Decide whether one validated invocation may run under `safety`.
    fn evaluate(&self, invocation: &Invocation, safety: &SafetyConfig) -> GateDecision;

    /// Look up the descriptor for an action name.
    fn descriptor(&self, action: &str) -> Option<&ActionDescriptor>;
}

/// One execution channel to the target dispatcher.
///
/// Implementations return the raw decoded JSON body; normalization is the
/// verifier's job so both channels are held to the same response contract.
pub trait Transport: Send + Sync {
    fn channel(&self) -> Channel;

    /// Deliver `request` and wait (bounded) for the dispatcher's reply.
    fn send(&self, request: &DispatchRequest) -> Result<serde_json::Value, TransportError>;
}

/// The response verifier.
pub trait Verifier: Send + Sync {
    /// Normalize a raw response body into an `ExecutionResult`.
    ///
    /// A body that does not satisfy the response contract is a
    /// `TransportError` of kind `Malformed`, never a remote failure.
    fn normalize(
        &self,
        request: &DispatchRequest,
        channel: Channel,
        body: &serde_json::Value,
    ) -> Result<ExecutionResult, TransportError>;

    /// Content fingerprint used by the integrity guard.
    fn fingerprint(&self, content: &str) -> String;
}

/// The local audit journal.
///
/// Every dispatch attempt produces exactly one `AuditRecord`. A failed write
/// is fatal for the run: a dispatch that cannot be audited is not reported
/// as if it were.
pub trait AuditWriter: Send + Sync {
    /// Append one record to the chain of run `run_id`. Implementations must
    /// never rewrite earlier records.
    fn write(&self, run_id: &str, record: &AuditRecord) -> OpsResult<()>;

    /// Mark the run as complete. Called once at the end of every run.
    fn finalize(&self, run_id: &str) -> OpsResult<()>;
}

/// Read-only correlation against the target host's own audit log.
pub trait AuditLookup: Send + Sync {
    /// True when `request_id` appears in the target's audit log.
    fn find(&self, request_id: &RequestId) -> OpsResult<bool>;
}

/// Result of one end-to-end reachability probe.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProbeOutcome {
    pub reachable: bool,
    pub detail: String,
}

/// Independent reachability check against the target system.
pub trait HealthProbe: Send + Sync {
    fn probe(&self) -> ProbeOutcome;
}

/// Local store for outputs too large to keep inline in the report.
pub trait ArtifactSink: Send + Sync {
    /// Save `content` in full and return the path it was written to.
    fn spill(
        &self,
        request_id: &RequestId,
        action: &str,
        stream: &str,
        content: &str,
    ) -> OpsResult<String>;
}
