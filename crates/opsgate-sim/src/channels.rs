//! Core trait implementations backed by a `SimHost`.

use opsgate_contracts::{
    error::{OpsResult, TransportError, TransportErrorKind},
    execution::{Channel, DispatchRequest, RequestId},
};
use opsgate_core::traits::{AuditLookup, HealthProbe, ProbeOutcome, Transport};

use crate::host::SimHost;

/// A channel to the simulated host. An unreachable channel refuses every
/// request, standing in for a bad endpoint override.
pub struct SimTransport {
    host: Option<SimHost>,
    channel: Channel,
    endpoint: String,
}

impl SimTransport {
    pub fn new(host: SimHost, channel: Channel) -> Self {
        Self { host: Some(host), channel, endpoint: format!("sim://{channel}") }
    }

    pub fn unreachable(channel: Channel, endpoint: impl Into<String>) -> Self {
        Self { host: None, channel, endpoint: endpoint.into() }
    }
}

impl Transport for SimTransport {
    fn channel(&self) -> Channel {
        self.channel
    }

    fn send(&self, request: &DispatchRequest) -> Result<serde_json::Value, TransportError> {
        match &self.host {
            Some(host) => Ok(host.dispatch(request, self.channel)),
            None => Err(TransportError::new(
                self.channel,
                TransportErrorKind::Network,
                format!("connection refused: {}", self.endpoint),
            )),
        }
    }
}

/// Reachability of the host's automation endpoint.
pub struct SimProbe {
    host: SimHost,
}

impl SimProbe {
    pub fn new(host: SimHost) -> Self {
        Self { host }
    }
}

impl HealthProbe for SimProbe {
    fn probe(&self) -> ProbeOutcome {
        if self.host.automation_running() {
            ProbeOutcome { reachable: true, detail: "HTTP 200 from sim://healthz".into() }
        } else {
            ProbeOutcome { reachable: false, detail: "HTTP 502 from sim://healthz".into() }
        }
    }
}

/// Searches the host's audit log the way the remote `grep` does.
pub struct SimAuditLookup {
    host: SimHost,
}

impl SimAuditLookup {
    pub fn new(host: SimHost) -> Self {
        Self { host }
    }
}

impl AuditLookup for SimAuditLookup {
    fn find(&self, request_id: &RequestId) -> OpsResult<bool> {
        Ok(self.host.log_text().contains(request_id.as_str()))
    }
}
