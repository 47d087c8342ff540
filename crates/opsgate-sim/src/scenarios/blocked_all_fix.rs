//! Scenario 2: a high-danger apply without the dangerous flag.
//!
//! `all_fix` in apply mode with a locked `SafetyConfig` must be BLOCKED
//! before anything reaches the host.

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

pub fn plan() -> Plan {
    Plan::new(vec![PlanStep::new("all_fix", Mode::Apply)])
}

pub fn run_scenario() -> OpsResult<ScenarioOutcome> {
    let harness = Harness::new(SimHost::demo());
    let report = harness.run(&plan(), "all: fix apply=1", SafetyConfig::locked())?;

    let passed = report.exit_code() == 1 && harness.host.log().is_empty() && harness.audit.events().is_empty();
    info!(scenario = "blocked_all_fix", status = %report.status, passed, "scenario finished");
    Ok(ScenarioOutcome { name: "blocked_all_fix", report, harness, passed })
}

#[cfg(test)]
mod tests {
    use opsgate_contracts::report::RunStatus;

    use super::*;
    use crate::host::SiteState;

    #[test]
    fn run_is_blocked_and_nothing_is_dispatched() {
        let outcome = run_scenario().unwrap();

        assert!(outcome.passed);
        assert_eq!(outcome.report.status, RunStatus::Blocked);
        assert_eq!(outcome.report.exit_code(), 1);
        assert!(outcome.report.reason.as_deref().unwrap().contains("blocked"));
        assert!(outcome.harness.host.log().is_empty(), "host audit log unchanged");
        assert!(outcome.harness.audit.events().is_empty(), "no local dispatch records");
        assert_eq!(outcome.harness.host.site("demo5"), Some(SiteState::Down));
    }

    #[test]
    fn next_cmd_names_flag_and_token() {
        let outcome = run_scenario().unwrap();
        let next = outcome.report.next_cmd.unwrap();

        assert!(next.contains("ALLOW_DANGEROUS=1"), "{next}");
        assert!(next.contains("confirm=ALL_FIX"), "{next}");
    }

    #[test]
    fn supplying_flag_and_token_fixes_the_host() {
        let outcome = run_scenario().unwrap();
        let fixed = Plan::new(vec![PlanStep::new("all_fix", Mode::Apply).with_confirm("ALL_FIX")]);

        let report = outcome.harness.run(&fixed, "all: fix", SafetyConfig::dangerous()).unwrap();

        assert!(report.is_ok());
        assert_eq!(outcome.harness.host.site("demo5"), Some(SiteState::Up));
    }
}
