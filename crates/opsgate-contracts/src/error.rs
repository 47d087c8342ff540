//! Error taxonomy for the opsgate control loop.
//!
//! `Validation` and `GateDenied` are resolved before any I/O and are always
//! recoverable by the operator. `TransportFailure`, `RemoteFailure` and
//! `IntegrityMismatch` are folded into the run report rather than crashing
//! the process. The remaining variants are faults of the local machinery.

use thiserror::Error;

use crate::execution::Channel;

#[derive(Debug, Error)]
pub enum OpsError {
    /// Unknown action or malformed plan structure.
    #[error("invalid plan: {reason}")]
    Validation { reason: String },

    /// A danger-level or confirmation requirement was not met.
    #[error("blocked: {reason}")]
    GateDenied { reason: String },

    /// A channel could not deliver the request or its response.
    #[error("transport failure on {channel}: {reason}")]
    TransportFailure { channel: String, reason: String },

    /// The target dispatcher reported a non-ok outcome.
    #[error("remote failure for action '{action}': {reason}")]
    RemoteFailure { action: String, reason: String },

    /// A guarded artifact's fingerprint did not match the expected value.
    #[error("fingerprint mismatch for '{subject}': expected {expected}, found {actual}")]
    IntegrityMismatch { subject: String, expected: String, actual: String },

    #[error("configuration error: {reason}")]
    ConfigError { reason: String },

    /// The local audit journal could not persist a record.
    #[error("audit write failed: {reason}")]
    AuditWriteFailed { reason: String },

    #[error("report write failed: {reason}")]
    ReportWriteFailed { reason: String },
}

pub type OpsResult<T> = Result<T, OpsError>;

/// Class of a transport-level failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransportErrorKind {
    /// Connection refused, DNS failure, broken pipe, non-zero session exit.
    Network,
    /// The bounded wait for a response elapsed.
    Timeout,
    /// Non-2xx HTTP status.
    Status,
    /// The response was not a well-formed dispatcher response.
    Malformed,
    /// The channel is not configured for this run.
    NotConfigured,
}

impl std::fmt::Display for TransportErrorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            TransportErrorKind::Network => "network error",
            TransportErrorKind::Timeout => "timeout",
            TransportErrorKind::Status => "bad status",
            TransportErrorKind::Malformed => "malformed response",
            TransportErrorKind::NotConfigured => "not configured",
        };
        f.write_str(s)
    }
}

/// A failure of one channel to deliver a request or its response.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{channel} channel {kind}: {detail}")]
pub struct TransportError {
    pub channel: Channel,
    pub kind: TransportErrorKind,
    pub detail: String,
}

impl TransportError {
    pub fn new(channel: Channel, kind: TransportErrorKind, detail: impl Into<String>) -> Self {
        Self { channel, kind, detail: detail.into() }
    }

    pub fn malformed(channel: Channel, detail: impl Into<String>) -> Self {
        Self::new(channel, TransportErrorKind::Malformed, detail)
    }
}

impl From<TransportError> for OpsError {
    fn from(err: TransportError) -> Self {
        OpsError::TransportFailure { channel: err.channel.to_string(), reason: err.to_string() }
    }
}
