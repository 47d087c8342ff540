//! Post-apply healthcheck.
//!
//! Runs only after an OK run in which at least one `apply` changed state.
//! It re-checks reachability of the target and looks for the run's last
//! request id in the target's audit log. Its findings are attached to the
//! report but never alter the status or exit code: the mutation has already
//! completed, so a failed healthcheck is a warning.

use tracing::{info, warn};

use opsgate_contracts::{
    execution::{ExecutionResult, RequestId},
    report::HealthcheckReport,
};

use crate::traits::{AuditLookup, HealthProbe};

pub struct PostApplyHealthcheck {
    probe: Box<dyn HealthProbe>,
    lookup: Box<dyn AuditLookup>,
}

impl PostApplyHealthcheck {
    pub fn new(probe: Box<dyn HealthProbe>, lookup: Box<dyn AuditLookup>) -> Self {
        Self { probe, lookup }
    }

    /// True when the results contain a successful, state-changing apply.
    pub fn is_triggered(results: &[ExecutionResult]) -> bool {
        results.iter().any(ExecutionResult::mutated)
    }

    pub fn run(&self, last_request: Option<&RequestId>) -> HealthcheckReport {
        let mut warnings = Vec::new();

        let probe = self.probe.probe();
        if !probe.reachable {
            warnings.push(format!("target unreachable after apply: {}", probe.detail));
        }

        let audit_matched = match last_request {
            None => {
                warnings.push("no request id to correlate".to_string());
                false
            }
            Some(request_id) => match self.lookup.find(request_id) {
                Ok(true) => true,
                Ok(false) => {
                    warnings.push(format!("request {request_id} not found in target audit log"));
                    false
                }
                Err(e) => {
                    warnings.push(format!("audit lookup failed: {e}"));
                    false
                }
            },
        };

        let report = HealthcheckReport {
            reachable: probe.reachable,
            reachability_detail: probe.detail,
            request_id: last_request.cloned(),
            audit_matched,
            warnings,
        };

        if report.passed() {
            info!(request_id = ?report.request_id, "post-apply healthcheck passed");
        } else {
            warn!(
                reachable = report.reachable,
                audit_matched = report.audit_matched,
                "post-apply healthcheck reported problems"
            );
        }
        report
    }
}
