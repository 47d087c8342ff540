//! Scenario 3: recovery over the fallback channel.
//!
//! The primary endpoint is overridden to an address nothing listens on.
//! `site_up demo5` is allowlisted, so the selector retries it once over the
//! administrative session; the dispatch succeeds and its request id shows up
//! in the host's audit log.

use opsgate_contracts::{
    action::Mode,
    error::OpsResult,
    gate::SafetyConfig,
    plan::{Plan, PlanStep},
};
use tracing::info;

use crate::harness::Harness;
use crate::host::{SimHost, SiteState};

use super::ScenarioOutcome;

pub const SITE: &str = "demo5";

pub fn plan() -> Plan {
    Plan::new(vec![PlanStep::new("site_up", Mode::Apply).with_arg("name", SITE)])
}

pub fn run_scenario() -> OpsResult<ScenarioOutcome> {
    let harness = Harness::new(SimHost::demo()).primary_unreachable();
    let report = harness.run(&plan(), "site: up demo5 apply=1", SafetyConfig::dangerous())?;

    let logged = report
        .results
        .first()
        .and_then(|r| r.request_id.as_ref())
        .is_some_and(|id| harness.host.logged(id.as_str()));
    let passed = report.is_ok() && logged && harness.host.site(SITE) == Some(SiteState::Up);
    info!(scenario = "fallback_recovery", status = %report.status, passed, "scenario finished");
    Ok(ScenarioOutcome { name: "fallback_recovery", report, harness, passed })
}
