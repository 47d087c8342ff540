//! Dispatch wire shapes, normalized results, and audit records.
//!
//! `DispatchRequest` is what leaves the core for a transport.
//! `ExecutionResult` is the normalized response, one per invocation.
//! `AuditRecord` is appended to the local journal for every dispatch attempt.

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::action::Mode;
use crate::plan::Invocation;

/// Unique identifier for one run of the control loop.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct RunId(pub uuid::Uuid);

impl RunId {
    pub fn new() -> Self {
        Self(uuid::Uuid::new_v4())
    }
}

impl Default for RunId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for RunId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

/// Globally unique identifier for one dispatched request.
///
/// Generated before dispatch and carried to the target host, which writes it
/// into its own audit log so the two sides can be correlated later.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RequestId(pub String);

impl RequestId {
    pub fn new() -> Self {
        Self(uuid::Uuid::new_v4().to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Default for RequestId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for RequestId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Which execution channel served (or attempted) a request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Channel {
    /// The remote workflow-automation webhook.
    Primary,
    /// The direct administrative session, restricted to an allowlist.
    Fallback,
}

impl fmt::Display for Channel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Channel::Primary => f.write_str("primary"),
            Channel::Fallback => f.write_str("fallback"),
        }
    }
}

/// `params` block of a dispatch request.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DispatchParams {
    pub action: String,
    pub mode: Mode,
    pub args: serde_json::Value,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub confirm: Option<String>,
}

/// The JSON object sent to the target dispatcher.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DispatchRequest {
    /// Human-readable `"<mode>: <action>"` label.
    pub task: String,
    pub params: DispatchParams,
    pub request_id: RequestId,
}

impl DispatchRequest {
    /// Build the request for `invocation`, stamped with `request_id`.
    pub fn for_invocation(invocation: &Invocation, request_id: RequestId) -> Self {
        Self {
            task: format!("{}: {}", invocation.mode, invocation.action),
            params: DispatchParams {
                action: invocation.action.clone(),
                mode: invocation.mode,
                args: invocation.args.to_wire(),
                confirm: invocation.confirm_token.clone(),
            },
            request_id,
        }
    }

    /// The same request in a different mode, under a fresh request id.
    pub fn with_mode(&self, mode: Mode) -> Self {
        let mut next = self.clone();
        next.task = format!("{}: {}", mode, self.params.action);
        next.params.mode = mode;
        next.request_id = RequestId::new();
        next
    }
}

/// `meta` block of a response.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResultMeta {
    #[serde(default)]
    pub changed: bool,
    #[serde(default)]
    pub warnings: Vec<String>,
}

/// The normalized outcome of one invocation.
///
/// Deserializes directly from the dispatcher's response object; the
/// correlation fields are filled in by the executor.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExecutionResult {
    pub ok: bool,
    pub exit_code: i32,
    pub action: String,
    pub mode: Mode,
    #[serde(default)]
    pub stdout: String,
    #[serde(default)]
    pub stderr: String,
    #[serde(default)]
    pub artifacts: Vec<String>,
    #[serde(default)]
    pub meta: ResultMeta,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub request_id: Option<RequestId>,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub channel: Option<Channel>,
}

impl ExecutionResult {
    /// A failed result that never reached (or never completed on) a transport.
    pub fn failed(action: impl Into<String>, mode: Mode, stderr: impl Into<String>) -> Self {
        Self {
            ok: false,
            exit_code: 1,
            action: action.into(),
            mode,
            stdout: String::new(),
            stderr: stderr.into(),
            artifacts: Vec::new(),
            meta: ResultMeta::default(),
            request_id: None,
            channel: None,
        }
    }

    /// True when this result is a successful mutation that changed state.
    pub fn mutated(&self) -> bool {
        self.ok && self.mode.is_mutating() && self.meta.changed
    }
}

/// Outcome class recorded in the audit journal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AuditOutcome {
    Ok,
    RemoteFailure,
    TransportFailure,
}

impl fmt::Display for AuditOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            AuditOutcome::Ok => "ok",
            AuditOutcome::RemoteFailure => "remote_failure",
            AuditOutcome::TransportFailure => "transport_failure",
        };
        f.write_str(s)
    }
}

/// One immutable record per dispatch attempt.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuditRecord {
    pub request_id: RequestId,
    pub action: String,
    pub mode: Mode,
    pub channel: Channel,
    pub outcome: AuditOutcome,
    pub timestamp: DateTime<Utc>,
}
