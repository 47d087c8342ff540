//! Scenario 4: integrity guard on a workflow publish.
//!
//! `workflow_put` is guarded: before the apply, the current definition is
//! fetched in check mode and fingerprinted. Here the expected fingerprint is
//! of a stale definition, so the run fails and nothing is written.

use opsgate_contracts::{
    action::Mode,
    error::OpsResult,
    gate::SafetyConfig,
    plan::{Plan, PlanStep},
};
use opsgate_verify::sha256_hex;
use tracing::info;

use crate::harness::Harness;
use crate::host::SimHost;

use super::ScenarioOutcome;

pub const WORKFLOW: &str = "agent-exec";

/// Switches needed for a workflow write.
pub fn write_safety() -> SafetyConfig {
    SafetyConfig { dangerous_allowed: true, write_allowed: true }
}

/// A `workflow_put` apply expecting the definition to hash to `expected`.
pub fn plan(expected: &str) -> Plan {
    Plan::new(vec![PlanStep::new("workflow_put", Mode::Apply)
        .with_arg("workflow_id", WORKFLOW)
        .with_arg("expected_sha256", expected)
        .with_confirm("PUT_AGENT-EXEC")])
}

pub fn run_scenario() -> OpsResult<ScenarioOutcome> {
    let harness = Harness::new(SimHost::demo());
    let stale = sha256_hex(r#"{"name":"agent-exec","nodes":[]}"#);
    let report = harness.run(&plan(&stale), "workflow: put agent-exec apply=1", write_safety())?;

    let untouched = harness.host.workflow(WORKFLOW).is_some_and(|w| !w.active);
    let passed = report.exit_code() == 1
        && report.reason.as_deref().is_some_and(|r| r.contains("fingerprint mismatch"))
        && untouched;
    info!(scenario = "fingerprint_mismatch", status = %report.status, passed, "scenario finished");
    Ok(ScenarioOutcome { name: "fingerprint_mismatch", report, harness, passed })
}

#[cfg(test)]
mod tests {
    use opsgate_contracts::report::RunStatus;

    use super::*;
    use crate::host::DEMO_WORKFLOW;

    #[test]
    fn mismatch_fails_without_writing() {
        let outcome = run_scenario().unwrap();

        assert!(outcome.passed);
        assert_eq!(outcome.report.status, RunStatus::Fail);
        assert_eq!(outcome.report.exit_code(), 1);
        assert!(outcome.report.reason.as_deref().unwrap().contains("fingerprint mismatch"));

        // Only the read-only pre-check reached the host.
        let log = outcome.harness.host.log();
        assert_eq!(log.len(), 1);
        assert_eq!(log[0].mode, Mode::Check);
        assert!(!outcome.harness.host.workflow(WORKFLOW).unwrap().active);
    }

    #[test]
    fn matching_fingerprint_lets_the_apply_through() {
        let harness = Harness::new(SimHost::demo());

        let report = harness
            .run(&plan(&sha256_hex(DEMO_WORKFLOW).to_uppercase()), "workflow: put", write_safety())
            .unwrap();

        assert!(report.is_ok(), "{:?}", report.reason);
        assert!(harness.host.workflow(WORKFLOW).unwrap().active);
        let modes: Vec<Mode> = harness.host.log().iter().map(|l| l.mode).collect();
        assert_eq!(modes, vec![Mode::Check, Mode::Apply]);
    }

    #[test]
    fn workflow_write_needs_its_own_flag() {
        let harness = Harness::new(SimHost::demo());

        let report = harness
            .run(&plan(&sha256_hex(DEMO_WORKFLOW)), "workflow: put", SafetyConfig::dangerous())
            .unwrap();

        assert_eq!(report.status, RunStatus::Blocked);
        assert!(report.reason.as_deref().unwrap().contains("MISSING_WRITE_FLAG"));
        assert!(harness.host.log().is_empty());
    }
}
