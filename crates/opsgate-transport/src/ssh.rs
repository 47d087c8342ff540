//! Fallback channel: a direct administrative session on the target host.
//!
//! The session runs the on-host dispatcher, feeds it the `DispatchRequest`
//! on stdin and reads its JSON reply from stdout:
//!
//! ```text
//! <program> <options...> <host> <remote_command>   < request.json
//! ```
//!
//! `program` is normally `ssh`. It is configurable so the session can be
//! wrapped (or faked in tests) without touching the transport.

use std::process::Command;
use std::time::Duration;

use serde_json::Value;
use tracing::debug;

use opsgate_contracts::{
    error::{OpsError, OpsResult, TransportError, TransportErrorKind},
    execution::{Channel, DispatchRequest, RequestId},
};
use opsgate_core::traits::{AuditLookup, Transport};

use crate::session::{last_line, run_bounded, SessionError};

/// How to open a session on the target host.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionSpec {
    pub program: String,
    /// Arguments placed before the host, e.g. `-o BatchMode=yes`.
    pub options: Vec<String>,
    pub host: String,
    pub timeout: Duration,
}

impl SessionSpec {
    fn command(&self, remote: &[&str]) -> Command {
        let mut command = Command::new(&self.program);
        command.args(&self.options).arg(&self.host).args(remote);
        command
    }
}

pub struct SshTransport {
    session: SessionSpec,
    remote_command: String,
}

impl SshTransport {
    pub fn new(session: SessionSpec, remote_command: impl Into<String>) -> Self {
        Self { session, remote_command: remote_command.into() }
    }

    fn error(&self, kind: TransportErrorKind, detail: impl Into<String>) -> TransportError {
        TransportError::new(Channel::Fallback, kind, detail)
    }
}

impl Transport for SshTransport {
    fn channel(&self) -> Channel {
        Channel::Fallback
    }

    fn send(&self, request: &DispatchRequest) -> Result<Value, TransportError> {
        let payload = serde_json::to_vec(request)
            .map_err(|e| self.error(TransportErrorKind::Malformed, format!("encoding request: {e}")))?;

        let mut command = self.session.command(&[self.remote_command.as_str()]);
        let output = run_bounded(&mut command, Some(payload), self.session.timeout).map_err(|e| {
            let kind = match &e {
                SessionError::TimedOut(_) => TransportErrorKind::Timeout,
                SessionError::Spawn(_) | SessionError::Wait(_) => TransportErrorKind::Network,
            };
            self.error(kind, format!("{} {}: {e}", self.session.program, self.session.host))
        })?;

        debug!(
            request_id = %request.request_id,
            host = %self.session.host,
            status = ?output.status.code(),
            "session finished"
        );

        // The dispatcher exits non-zero when the action fails but still
        // prints its JSON reply; a parseable reply wins over the exit status.
        match serde_json::from_str::<Value>(output.stdout.trim()) {
            Ok(body) => Ok(body),
            Err(_) if !output.status.success() => Err(self.error(
                TransportErrorKind::Network,
                format!(
                    "session to {} exited with {}: {}",
                    self.session.host,
                    output.status,
                    last_line(&output.stderr)
                ),
            )),
            Err(e) => Err(self.error(
                TransportErrorKind::Malformed,
                format!("dispatcher reply is not JSON: {e}"),
            )),
        }
    }
}

/// Looks a request id up in the target host's own audit log.
pub struct SshAuditLookup {
    session: SessionSpec,
    remote_log: String,
}

impl SshAuditLookup {
    pub fn new(session: SessionSpec, remote_log: impl Into<String>) -> Self {
        Self { session, remote_log: remote_log.into() }
    }
}

impl AuditLookup for SshAuditLookup {
    fn find(&self, request_id: &RequestId) -> OpsResult<bool> {
        let mut command =
            self.session.command(&["grep", "-F", "-q", "--", request_id.as_str(), self.remote_log.as_str()]);
        let output = run_bounded(&mut command, None, self.session.timeout).map_err(|e| {
            OpsError::TransportFailure { channel: Channel::Fallback.to_string(), reason: e.to_string() }
        })?;

        // grep: 0 found, 1 not found, anything else is an error.
        match output.status.code() {
            Some(0) => Ok(true),
            Some(1) => Ok(false),
            _ => Err(OpsError::TransportFailure {
                channel: Channel::Fallback.to_string(),
                reason: format!(
                    "audit lookup on {} exited with {}: {}",
                    self.session.host,
                    output.status,
                    last_line(&output.stderr)
                ),
            }),
        }
    }
}
