//! Builds the executor from a `RuntimeConfig`.

use opsgate_audit::{FileArtifactStore, FileAuditWriter};
use opsgate_contracts::{
    error::{OpsError, OpsResult, TransportError, TransportErrorKind},
    execution::{Channel, DispatchRequest, RequestId},
};
use opsgate_core::{
    traits::{AuditLookup, Transport},
    Executor, FallbackPolicy, PostApplyHealthcheck, TransportSelector,
};
use opsgate_policy::ManifestPolicy;
use opsgate_transport::{SessionSpec, SshAuditLookup, SshTransport, WebhookTransport};
use opsgate_verify::{HttpHealthProbe, ResponseVerifier};
use tracing::debug;

use crate::config::RuntimeConfig;

/// Primary channel when no endpoint is configured. Gating still works; any
/// dispatch fails as `NotConfigured`.
struct UnconfiguredPrimary;

impl Transport for UnconfiguredPrimary {
    fn channel(&self) -> Channel {
        Channel::Primary
    }

    fn send(&self, _request: &DispatchRequest) -> Result<serde_json::Value, TransportError> {
        Err(TransportError::new(
            Channel::Primary,
            TransportErrorKind::NotConfigured,
            "no webhook URL: set AGENT_EXEC_URL or N8N_BASE_URL, or [primary] url",
        ))
    }
}

/// Audit lookup when no administrative session is configured.
struct NoSession;

impl AuditLookup for NoSession {
    fn find(&self, _request_id: &RequestId) -> OpsResult<bool> {
        Err(OpsError::ConfigError { reason: "no [fallback] host to search the remote audit log".into() })
    }
}

fn session(config: &RuntimeConfig) -> Option<SessionSpec> {
    config.fallback.host.as_ref().map(|host| SessionSpec {
        program: config.fallback.program.clone(),
        options: config.fallback.options.clone(),
        host: host.clone(),
        timeout: config.fallback_timeout(),
    })
}

pub fn build_executor(config: &RuntimeConfig, policy: ManifestPolicy) -> OpsResult<Executor> {
    let primary: Box<dyn Transport> = match &config.primary.url {
        Some(url) => Box::new(WebhookTransport::new(
            url.clone(),
            config.primary.api_key.clone(),
            config.primary_timeout(),
        )?),
        None => Box::new(UnconfiguredPrimary),
    };

    let session = session(config);
    let fallback: Option<Box<dyn Transport>> = session
        .clone()
        .map(|s| Box::new(SshTransport::new(s, config.fallback.remote_command.clone())) as Box<dyn Transport>);
    debug!(
        primary = config.primary.url.as_deref().unwrap_or("<none>"),
        fallback = config.fallback.host.as_deref().unwrap_or("<none>"),
        "channels configured"
    );

    let selector = TransportSelector::new(
        primary,
        fallback,
        FallbackPolicy::new(config.fallback.allowlist.clone(), config.fallback.forced.clone()),
    );

    let mut executor = Executor::new(
        Box::new(policy),
        selector,
        Box::new(ResponseVerifier::new()?),
        Box::new(FileAuditWriter::new(config.audit.journal.clone())),
    )
    .with_artifacts(
        Box::new(FileArtifactStore::new(config.artifacts.dir.clone())),
        config.artifacts.max_inline_output,
    );

    if let Some(url) = &config.healthcheck.url {
        let lookup: Box<dyn AuditLookup> = match session {
            Some(s) => Box::new(SshAuditLookup::new(s, config.audit.remote_log.clone())),
            None => Box::new(NoSession),
        };
        let probe = HttpHealthProbe::new(url.clone(), config.healthcheck_timeout())?;
        executor = executor.with_healthcheck(PostApplyHealthcheck::new(Box::new(probe), lookup));
    }
    Ok(executor)
}
