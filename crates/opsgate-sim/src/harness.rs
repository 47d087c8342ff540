//! Wires the real policy, verifier and audit crates around a `SimHost`.

use std::path::PathBuf;

use opsgate_audit::{FileArtifactStore, InMemoryAuditWriter};
use opsgate_contracts::{
    error::OpsResult,
    execution::Channel,
    gate::SafetyConfig,
    plan::Plan,
    report::RunReport,
};
use opsgate_core::{
    traits::Transport, Executor, FallbackPolicy, PostApplyHealthcheck, TransportSelector,
};
use opsgate_policy::ManifestPolicy;
use opsgate_verify::ResponseVerifier;

use crate::channels::{SimAuditLookup, SimProbe, SimTransport};
use crate::host::SimHost;

/// Endpoint reported by a primary channel forced unreachable.
pub const BAD_ENDPOINT: &str = "http://127.0.0.1:9/webhook/agent-exec";

/// One simulated deployment: a host, both channels, and a local journal.
///
/// `audit` is shared with every executor the harness builds, so events from
/// several runs accumulate in one place.
pub struct Harness {
    pub host: SimHost,
    pub audit: InMemoryAuditWriter,
    primary_reachable: bool,
    fallback: bool,
    artifacts: Option<(PathBuf, usize)>,
}

impl Harness {
    pub fn new(host: SimHost) -> Self {
        Self {
            host,
            audit: InMemoryAuditWriter::new(),
            primary_reachable: true,
            fallback: true,
            artifacts: None,
        }
    }

    /// Point the primary channel at an endpoint nothing listens on.
    pub fn primary_unreachable(mut self) -> Self {
        self.primary_reachable = false;
        self
    }

    pub fn without_fallback(mut self) -> Self {
        self.fallback = false;
        self
    }

    pub fn with_artifacts(mut self, dir: impl Into<PathBuf>, max_inline_output: usize) -> Self {
        self.artifacts = Some((dir.into(), max_inline_output));
        self
    }

    pub fn executor(&self) -> OpsResult<Executor> {
        let primary: Box<dyn Transport> = if self.primary_reachable {
            Box::new(SimTransport::new(self.host.clone(), Channel::Primary))
        } else {
            Box::new(SimTransport::unreachable(Channel::Primary, BAD_ENDPOINT))
        };
        let fallback: Option<Box<dyn Transport>> = if self.fallback {
            Some(Box::new(SimTransport::new(self.host.clone(), Channel::Fallback)))
        } else {
            None
        };

        let selector = TransportSelector::new(primary, fallback, FallbackPolicy::standard());
        let healthcheck = PostApplyHealthcheck::new(
            Box::new(SimProbe::new(self.host.clone())),
            Box::new(SimAuditLookup::new(self.host.clone())),
        );

        let mut executor = Executor::new(
            Box::new(ManifestPolicy::builtin()?),
            selector,
            Box::new(ResponseVerifier::new()?),
            Box::new(self.audit.clone()),
        )
        .with_healthcheck(healthcheck);

        if let Some((dir, max)) = &self.artifacts {
            executor = executor.with_artifacts(Box::new(FileArtifactStore::new(dir.clone())), *max);
        }
        Ok(executor)
    }

    pub fn run(&self, plan: &Plan, task: &str, safety: SafetyConfig) -> OpsResult<RunReport> {
        self.executor()?.run(plan, task, safety)
    }
}
