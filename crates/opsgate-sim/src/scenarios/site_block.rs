//! Scenario 1: block a site.
//!
//! `site_block demo6` in apply mode with the dangerous flag and the literal
//! confirm token. The site stops answering publicly (HTTP 404) and the run
//! is OK.

use opsgate_contracts::{
    action::Mode,
    error::OpsResult,
    gate::SafetyConfig,
    plan::{Plan, PlanStep},
};
use tracing::info;

use crate::harness::Harness;
use crate::host::SimHost;

use super::ScenarioOutcome;

pub const SITE: &str = "demo6";

pub fn plan() -> Plan {
    Plan::new(vec![PlanStep::new("site_block", Mode::Apply)
        .with_arg("name", SITE)
        .with_confirm("BLOCK_DEMO6")])
}

pub fn run_scenario() -> OpsResult<ScenarioOutcome> {
    let harness = Harness::new(SimHost::demo());
    let report = harness.run(&plan(), "site: block demo6 apply=1 confirm=BLOCK_DEMO6", SafetyConfig::dangerous())?;

    let passed = report.is_ok() && harness.host.http_status(SITE) == 404;
    info!(scenario = "site_block", status = %report.status, passed, "scenario finished");
    Ok(ScenarioOutcome { name: "site_block", report, harness, passed })
}

#[cfg(test)]
mod tests {
    use opsgate_contracts::{execution::Channel, report::RunStatus};

    use super::*;

    #[test]
    fn site_becomes_unreachable_and_run_is_ok() {
        let outcome = run_scenario().unwrap();

        assert!(outcome.passed);
        assert_eq!(outcome.report.status, RunStatus::Ok);
        assert_eq!(outcome.report.exit_code(), 0);
        assert_eq!(outcome.harness.host.http_status(SITE), 404);

        let result = &outcome.report.results[0];
        assert!(result.meta.changed);
        assert_eq!(result.channel, Some(Channel::Primary));
    }

    #[test]
    fn request_id_is_correlated_on_both_sides() {
        let outcome = run_scenario().unwrap();
        let request_id = outcome.report.results[0].request_id.clone().unwrap();

        assert!(outcome.harness.host.logged(request_id.as_str()));
        let local = outcome.harness.audit.events();
        assert_eq!(local.len(), 1);
        assert_eq!(local[0].record.request_id, request_id);

        let healthcheck = outcome.report.post_apply_healthcheck.as_ref().unwrap();
        assert!(healthcheck.passed());
        assert_eq!(healthcheck.request_id.as_ref(), Some(&request_id));
    }

    #[test]
    fn repeating_the_block_changes_nothing() {
        let outcome = run_scenario().unwrap();
        let again = outcome
            .harness
            .run(&plan(), "site: block demo6", SafetyConfig::dangerous())
            .unwrap();

        assert!(again.is_ok());
        assert!(!again.results[0].meta.changed);
        assert!(again.post_apply_healthcheck.is_none(), "nothing changed, no healthcheck");
    }
}
