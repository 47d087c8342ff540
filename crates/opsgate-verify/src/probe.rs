//! End-to-end reachability probe over HTTP.

use std::time::Duration;

use reqwest::blocking::Client;
use tracing::debug;

use opsgate_contracts::error::{OpsError, OpsResult};
use opsgate_core::traits::{HealthProbe, ProbeOutcome};

/// Probes a URL with a bounded GET; any 2xx counts as reachable.
pub struct HttpHealthProbe {
    url: String,
    client: Client,
}

impl HttpHealthProbe {
    pub fn new(url: impl Into<String>, timeout: Duration) -> OpsResult<Self> {
        let client = Client::builder().timeout(timeout).build().map_err(|e| OpsError::ConfigError {
            reason: format!("failed to build healthcheck client: {e}"),
        })?;
        Ok(Self { url: url.into(), client })
    }
}

impl HealthProbe for HttpHealthProbe {
    fn probe(&self) -> ProbeOutcome {
        let outcome = match self.client.get(&self.url).send() {
            Ok(response) => {
                let status = response.status();
                ProbeOutcome {
                    reachable: status.is_success(),
                    detail: format!("HTTP {} from {}", status.as_u16(), self.url),
                }
            }
            Err(e) if e.is_timeout() => ProbeOutcome {
                reachable: false,
                detail: format!("timed out probing {}", self.url),
            },
            Err(e) => ProbeOutcome { reachable: false, detail: format!("{}: {e}", self.url) },
        };
        debug!(url = %self.url, reachable = outcome.reachable, "reachability probe");
        outcome
    }
}
