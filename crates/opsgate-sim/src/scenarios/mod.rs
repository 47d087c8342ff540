//! The four end-to-end scenarios, each against a fresh demo host.
//!
//! Every scenario returns its `ScenarioOutcome` so callers can inspect the
//! report, the local journal and the host afterwards.

use opsgate_contracts::{error::OpsResult, report::RunReport};

use crate::harness::Harness;

pub mod blocked_all_fix;
pub mod fallback_recovery;
pub mod fingerprint_mismatch;
pub mod site_block;

pub struct ScenarioOutcome {
    pub name: &'static str,
    pub report: RunReport,
    pub harness: Harness,
    /// Scenario-specific expectations held.
    pub passed: bool,
}

/// Run all four scenarios in order.
pub fn run_all() -> OpsResult<Vec<ScenarioOutcome>> {
    Ok(vec![
        site_block::run_scenario()?,
        blocked_all_fix::run_scenario()?,
        fallback_recovery::run_scenario()?,
        fingerprint_mismatch::run_scenario()?,
    ])
}
