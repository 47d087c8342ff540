//! Report & exit mapping.
//!
//! Folds the ordered results of a run into one `RunReport`:
//!
//! 1. any gate denied (or plan rejected) and nothing mutated → `BLOCKED`
//! 2. otherwise any result with `ok = false` → `FAIL`
//! 3. otherwise → `OK`
//!
//! `next_cmd` is a heuristic follow-up built from the first blocked or
//! failed step. It is advice for the operator and never executed.

use chrono::Utc;

use opsgate_contracts::{
    action::{ActionDescriptor, Mode},
    error::OpsError,
    execution::{ExecutionResult, RunId},
    gate::{GateDecision, GateReason, DANGEROUS_ENV, WRITE_ENV},
    plan::{Invocation, PlanRejection, PlanStep, RejectionKind},
    report::{RunReport, RunStatus},
};

/// Binary name used when rendering suggested commands.
pub const CLI_NAME: &str = "opsgate";

/// The first thing that went wrong in a run, if anything did.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Finding {
    /// The plan validator rejected the plan.
    Rejected(PlanRejection),
    /// The gate denied the step at `index`.
    Denied { index: usize, decision: GateDecision },
    /// The step at `index` was dispatched (or guarded) and failed.
    Failed { index: usize, cause: String },
}

impl Finding {
    fn is_gate(&self) -> bool {
        matches!(self, Finding::Rejected(_) | Finding::Denied { .. })
    }
}

/// Derive the run status from the gate outcome and the ordered results.
pub fn derive_status(gate_denied: bool, results: &[ExecutionResult]) -> RunStatus {
    // A mutating step counts as executed once it carries a request id,
    // i.e. once at least one transport was contacted for it.
    let mutated = results
        .iter()
        .any(|r| r.mode.is_mutating() && r.request_id.is_some());

    if gate_denied && !mutated {
        RunStatus::Blocked
    } else if results.iter().any(|r| !r.ok) {
        RunStatus::Fail
    } else {
        RunStatus::Ok
    }
}

/// Build the run report. `reason` is present iff the status is not OK.
pub fn map_report(
    run_id: RunId,
    task: &str,
    results: Vec<ExecutionResult>,
    finding: Option<Finding>,
    next_cmd: Option<String>,
) -> RunReport {
    let gate_denied = finding.as_ref().is_some_and(Finding::is_gate);
    let status = derive_status(gate_denied, &results);

    let reason = match status {
        RunStatus::Ok => None,
        RunStatus::Blocked | RunStatus::Fail => Some(reason_for(finding.as_ref(), &results)),
    };

    let summary = match (status, reason.as_deref()) {
        (RunStatus::Ok, _) => {
            let changed = results.iter().filter(|r| r.meta.changed).count();
            format!("OK: {} step(s) succeeded, {} changed", results.len(), changed)
        }
        (RunStatus::Blocked, Some(reason)) => format!("BLOCKED: {reason}"),
        (_, reason) => {
            let failed = results.iter().filter(|r| !r.ok).count();
            format!(
                "FAIL: {failed} of {} step(s) failed; {}",
                results.len(),
                reason.unwrap_or("unknown failure")
            )
        }
    };

    RunReport {
        run_id,
        task: task.to_string(),
        ts_utc: Utc::now(),
        status,
        reason,
        results,
        next_cmd: if status == RunStatus::Ok { None } else { next_cmd },
        post_apply_healthcheck: None,
        summary,
    }
}

fn reason_for(finding: Option<&Finding>, results: &[ExecutionResult]) -> String {
    match finding {
        Some(Finding::Rejected(rejection)) => {
            format!("blocked: {}", rejection.clone().into_error())
        }
        Some(Finding::Denied { index, decision }) => OpsError::GateDenied {
            reason: format!("step {}: {} [{}]", index + 1, decision.detail, decision.reason),
        }
        .to_string(),
        Some(Finding::Failed { index, cause }) => {
            let step = results.get(*index);
            let label = step
                .map(|r| format!("{} {}", r.action, r.mode))
                .unwrap_or_default();
            format!("step {} ({label}) failed: {cause}", index + 1)
        }
        None => results
            .iter()
            .position(|r| !r.ok)
            .map(|i| format!("step {} failed", i + 1))
            .unwrap_or_else(|| "no step failed".to_string()),
    }
}

// ── Suggested follow-up commands ─────────────────────────────────────────────

/// Render an invocation in the command grammar the CLI accepts:
/// `site_block name=demo6 mode=apply confirm=BLOCK_DEMO6`.
pub fn command_line(
    action: &str,
    mode: &str,
    args: &[(String, String)],
    confirm: Option<&str>,
) -> String {
    let mut parts = vec![action.to_string()];
    parts.extend(args.iter().map(|(k, v)| format!("{k}={v}")));
    parts.push(format!("mode={mode}"));
    if let Some(token) = confirm {
        parts.push(format!("confirm={token}"));
    }
    parts.join(" ")
}

fn wrap(env: &[&str], command: &str) -> String {
    let prefix: String = env.iter().map(|e| format!("{e}=1 ")).collect();
    format!("{prefix}{CLI_NAME} '{command}'")
}

fn invocation_args(invocation: &Invocation) -> Vec<(String, String)> {
    invocation
        .args
        .shape()
        .keys()
        .iter()
        .filter_map(|(key, _)| invocation.args.field(key).map(|v| (key.to_string(), v)))
        .collect()
}

/// Follow-up for a gate denial: the same command with whatever was missing.
pub fn next_cmd_for_denial(
    descriptor: &ActionDescriptor,
    invocation: &Invocation,
    decision: &GateDecision,
) -> Option<String> {
    let confirm = descriptor
        .expected_confirm(&invocation.args)
        .or_else(|| invocation.confirm_token.clone());

    let mut env = Vec::new();
    match decision.reason {
        GateReason::MissingDangerousFlag | GateReason::MissingOrWrongConfirm => {
            env.push(DANGEROUS_ENV);
            if descriptor.workflow_write {
                env.push(WRITE_ENV);
            }
        }
        GateReason::MissingWriteFlag => {
            env.push(DANGEROUS_ENV);
            env.push(WRITE_ENV);
        }
        GateReason::None | GateReason::UnknownAction | GateReason::UnsupportedMode => return None,
    }

    let command = command_line(
        &invocation.action,
        invocation.mode.as_str(),
        &invocation_args(invocation),
        confirm.as_deref(),
    );
    Some(wrap(&env, &command))
}

/// Follow-up for a rejected plan.
pub fn next_cmd_for_rejection(
    rejection: &PlanRejection,
    step: Option<&PlanStep>,
    descriptor: Option<&ActionDescriptor>,
) -> Option<String> {
    let list = format!("{CLI_NAME} --list-actions");
    let Some(step) = step else {
        return Some(list);
    };

    let raw_args: Vec<(String, String)> = step
        .args
        .iter()
        .filter(|(k, _)| k.as_str() != "confirm")
        .map(|(k, v)| (k.clone(), v.as_str().map(str::to_string).unwrap_or_else(|| v.to_string())))
        .collect();

    match rejection.kind {
        RejectionKind::MalformedPlan
        | RejectionKind::EmptyPlan
        | RejectionKind::UnknownAction
        | RejectionKind::InvalidArguments => {
            Some(list)
        }
        RejectionKind::InvalidMode => Some(wrap(
            &[],
            &command_line(&step.action, Mode::Check.as_str(), &raw_args, None),
        )),
        RejectionKind::UnsupportedMode => {
            let mode = descriptor.and_then(|d| d.modes.first().copied())?;
            Some(wrap(&[], &command_line(&step.action, mode.as_str(), &raw_args, None)))
        }
        RejectionKind::ConfirmInArguments => {
            let token = step.args.get("confirm").map(|v| {
                v.as_str().map(str::to_string).unwrap_or_else(|| v.to_string())
            });
            Some(wrap(&[], &command_line(&step.action, &step.mode, &raw_args, token.as_deref())))
        }
    }
}

/// Follow-up for a failed step: inspect it read-only, or check target health.
pub fn next_cmd_for_failure(
    descriptor: Option<&ActionDescriptor>,
    invocation: &Invocation,
) -> Option<String> {
    match descriptor {
        Some(d) if d.supports(Mode::Check) => Some(wrap(
            &[],
            &command_line(&invocation.action, Mode::Check.as_str(), &invocation_args(invocation), None),
        )),
        _ => Some(wrap(&[], "healthz")),
    }
}

// ── Tests ────────────────────────────────────────────────────────────────────
