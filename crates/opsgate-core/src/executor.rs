//! The opsgate executor: the gate-first run pipeline.
//!
//! The executor enforces the run model:
//!
//!   Validate → Gate (whole plan) → Select → Dispatch → Audit → Report → Healthcheck
//!
//! The safety invariant is absolute: no `Transport` is contacted for any step
//! of a plan until every step has passed validation AND the gate. This is
//! enforced structurally: `dispatch()` is only reachable after both checks
//! have returned for the whole plan.

use chrono::Utc;
use tracing::{debug, info, warn};

use opsgate_contracts::{
    action::Mode,
    error::{OpsError, OpsResult},
    execution::{AuditRecord, DispatchRequest, ExecutionResult, RequestId, RunId},
    gate::{GateDecision, SafetyConfig},
    plan::{Invocation, Plan, PlanRejection},
    report::RunReport,
};

use crate::{
    healthcheck::PostApplyHealthcheck,
    report::{self, Finding},
    selector::{Dispatch, TransportSelector},
    traits::{ArtifactSink, AuditWriter, PolicyEngine, Verifier},
};

/// Outputs longer than this many bytes are spilled to an artifact.
pub const DEFAULT_MAX_INLINE_OUTPUT: usize = 800;

const TRUNCATION_MARKER: &str = "\n...[truncated]...\n";

/// The central executor that drives one run of the control loop.
///
/// The executor owns the trusted components (policy, verifier, audit) and
/// the transport selector, and enforces the pipeline ordering on every call
/// to `run()`.
pub struct Executor {
    policy: Box<dyn PolicyEngine>,
    selector: TransportSelector,
    verifier: Box<dyn Verifier>,
    audit: Box<dyn AuditWriter>,
    artifacts: Option<Box<dyn ArtifactSink>>,
    max_inline_output: usize,
    healthcheck: Option<PostApplyHealthcheck>,
}

impl Executor {
    /// Create an executor with the given trusted components.
    pub fn new(
        policy: Box<dyn PolicyEngine>,
        selector: TransportSelector,
        verifier: Box<dyn Verifier>,
        audit: Box<dyn AuditWriter>,
    ) -> Self {
        Self {
            policy,
            selector,
            verifier,
            audit,
            artifacts: None,
            max_inline_output: DEFAULT_MAX_INLINE_OUTPUT,
            healthcheck: None,
        }
    }

    /// Spill outputs longer than `max_inline_output` bytes into `sink`.
    pub fn with_artifacts(mut self, sink: Box<dyn ArtifactSink>, max_inline_output: usize) -> Self {
        self.artifacts = Some(sink);
        self.max_inline_output = max_inline_output;
        self
    }

    /// Run `healthcheck` after every OK run that changed state.
    pub fn with_healthcheck(mut self, healthcheck: PostApplyHealthcheck) -> Self {
        self.healthcheck = Some(healthcheck);
        self
    }

    /// Execute one plan end to end and return its report.
    ///
    /// # Pipeline
    ///
    /// 1. `policy.validate()` the whole plan; a rejection → `BLOCKED`
    /// 2. `policy.evaluate()` every invocation; any denial → `BLOCKED`,
    ///    nothing is dispatched
    /// 3. Dispatch each invocation in order through the selector, writing one
    ///    audit record per attempt. After a failure, later `apply` steps are
    ///    skipped; later read-only steps still run
    /// 4. Fold the results into a `RunReport`
    /// 5. If the run is OK and something changed, attach the healthcheck
    ///
    /// # Errors
    ///
    /// Returns `Err` only when the local audit journal cannot be written.
    /// Validation, gate, transport, remote and integrity failures are NOT
    /// errors; they are reported through the `RunReport`.
    pub fn run(&self, plan: &Plan, task: &str, safety: SafetyConfig) -> OpsResult<RunReport> {
        let run_id = RunId::new();
        let run_key = run_id.to_string();

        debug!(
            run_id = %run_key,
            steps = plan.actions.len(),
            dangerous_allowed = safety.dangerous_allowed,
            write_allowed = safety.write_allowed,
            "run starting"
        );

        // ── Step 1: Structural validation ────────────────────────────────────
        let invocations = match self.policy.validate(plan) {
            Ok(invocations) => invocations,
            Err(rejection) => {
                warn!(run_id = %run_key, cause = %rejection.cause, "plan rejected");
                let report = self.rejected(run_id, task, plan, rejection);
                self.audit.finalize(&run_key)?;
                return Ok(report);
            }
        };

        // ── Step 2: Gate every invocation before any I/O ─────────────────────
        //
        // This is the primary trust gate. No transport is contacted until the
        // whole plan is allowed.
        let decisions: Vec<GateDecision> = invocations
            .iter()
            .map(|invocation| self.policy.evaluate(invocation, &safety))
            .collect();

        if let Some(index) = decisions.iter().position(|d| !d.allowed) {
            let decision = &decisions[index];
            warn!(
                run_id = %run_key,
                step = index + 1,
                action = %invocations[index].action,
                reason = %decision.reason,
                "gate denied invocation, run blocked"
            );
            let report = self.blocked(run_id, task, &invocations, &decisions, index);
            self.audit.finalize(&run_key)?;
            return Ok(report);
        }

        // ── Step 3: Sequential dispatch ──────────────────────────────────────
        let mut results = Vec::with_capacity(invocations.len());
        let mut finding: Option<Finding> = None;
        let mut failed_invocation: Option<&Invocation> = None;

        for (index, invocation) in invocations.iter().enumerate() {
            if let Some(Finding::Failed { index: failed_at, .. }) = &finding {
                if invocation.mode.is_mutating() {
                    info!(
                        run_id = %run_key,
                        step = index + 1,
                        action = %invocation.action,
                        "skipping apply after earlier failure"
                    );
                    results.push(ExecutionResult::failed(
                        invocation.action.clone(),
                        invocation.mode,
                        format!("skipped: step {} failed earlier in this run", failed_at + 1),
                    ));
                    continue;
                }
            }

            let result = self.execute(&run_key, invocation)?;
            if !result.ok && finding.is_none() {
                finding = Some(Finding::Failed { index, cause: failure_cause(&result) });
                failed_invocation = Some(invocation);
            }
            results.push(result);
        }

        // ── Step 4: Report ───────────────────────────────────────────────────
        let next_cmd = failed_invocation.and_then(|invocation| {
            report::next_cmd_for_failure(self.policy.descriptor(&invocation.action), invocation)
        });
        let mut run_report = report::map_report(run_id, task, results, finding, next_cmd);

        // ── Step 5: Post-apply healthcheck ───────────────────────────────────
        if run_report.is_ok() && PostApplyHealthcheck::is_triggered(&run_report.results) {
            if let Some(healthcheck) = &self.healthcheck {
                let last_request = run_report
                    .results
                    .iter()
                    .rev()
                    .find_map(|r| r.request_id.clone());
                run_report.post_apply_healthcheck = Some(healthcheck.run(last_request.as_ref()));
            }
        }

        info!(
            run_id = %run_key,
            status = %run_report.status,
            steps = run_report.results.len(),
            "run finished"
        );
        self.audit.finalize(&run_key)?;
        Ok(run_report)
    }

    /// Report a plan that could not even be decoded into steps.
    ///
    /// Takes the same `BLOCKED` path as a validator rejection: nothing is
    /// dispatched and the run still ends with a report.
    pub fn reject(&self, task: &str, rejection: PlanRejection) -> OpsResult<RunReport> {
        let run_id = RunId::new();
        let run_key = run_id.to_string();
        warn!(run_id = %run_key, cause = %rejection.cause, "plan rejected before decoding");

        let report = self.rejected(run_id, task, &Plan::default(), rejection);
        self.audit.finalize(&run_key)?;
        Ok(report)
    }

    // ── Per-invocation execution ─────────────────────────────────────────────

    fn execute(&self, run_key: &str, invocation: &Invocation) -> OpsResult<ExecutionResult> {
        // The request id is fixed before anything leaves the process.
        let request = DispatchRequest::for_invocation(invocation, RequestId::new());

        let guarded = self
            .policy
            .descriptor(&invocation.action)
            .is_some_and(|d| d.guarded);
        if guarded && invocation.mode.is_mutating() {
            if let Some(blocked) = self.guard_integrity(run_key, invocation, &request)? {
                return Ok(blocked);
            }
        }

        let mut result = self.dispatch(run_key, &request)?;
        enforce_read_only(run_key, &request, &mut result);

        self.spill_outputs(&mut result);
        Ok(result)
    }

    /// Dispatch through the selector and audit every attempt it made.
    fn dispatch(&self, run_key: &str, request: &DispatchRequest) -> OpsResult<ExecutionResult> {
        info!(
            run_id = %run_key,
            request_id = %request.request_id,
            action = %request.params.action,
            mode = %request.params.mode,
            "dispatching request"
        );

        let Dispatch { result, attempts } = self.selector.dispatch(request, self.verifier.as_ref());

        for attempt in &attempts {
            let record = AuditRecord {
                request_id: request.request_id.clone(),
                action: request.params.action.clone(),
                mode: request.params.mode,
                channel: attempt.channel,
                outcome: attempt.outcome,
                timestamp: Utc::now(),
            };
            self.audit.write(run_key, &record)?;
        }

        let mut result = match result {
            Ok(result) => result,
            Err(err) => {
                warn!(
                    run_id = %run_key,
                    request_id = %request.request_id,
                    error = %err,
                    "transport failure"
                );
                let mut failed = ExecutionResult::failed(
                    request.params.action.clone(),
                    request.params.mode,
                    err.to_string(),
                );
                failed.channel = Some(err.channel);
                failed
            }
        };

        if !attempts.is_empty() {
            result.request_id = Some(request.request_id.clone());
        }
        Ok(result)
    }

    /// Compare the current remote artifact against the expected fingerprint.
    ///
    /// Returns `Some(failed result)` when the apply must not proceed.
    fn guard_integrity(
        &self,
        run_key: &str,
        invocation: &Invocation,
        request: &DispatchRequest,
    ) -> OpsResult<Option<ExecutionResult>> {
        let Some(expected) = invocation.args.expected_fingerprint() else {
            return Ok(Some(ExecutionResult::failed(
                invocation.action.clone(),
                invocation.mode,
                "guarded action carries no expected fingerprint",
            )));
        };

        let check = request.with_mode(Mode::Check);
        let mut current = self.dispatch(run_key, &check)?;
        enforce_read_only(run_key, &check, &mut current);
        let check_id = current
            .request_id
            .as_ref()
            .map(ToString::to_string)
            .unwrap_or_default();

        if !current.ok {
            let mut failed = ExecutionResult::failed(
                invocation.action.clone(),
                invocation.mode,
                format!("integrity pre-check failed: {}", failure_cause(&current)),
            );
            failed.meta.warnings.push(format!("pre-check request {check_id}"));
            return Ok(Some(failed));
        }

        let actual = self.verifier.fingerprint(&current.stdout);
        if actual.eq_ignore_ascii_case(expected) {
            debug!(run_id = %run_key, action = %invocation.action, "fingerprint matches");
            return Ok(None);
        }

        let err = OpsError::IntegrityMismatch {
            subject: invocation.action.clone(),
            expected: expected.to_string(),
            actual,
        };
        warn!(run_id = %run_key, action = %invocation.action, error = %err, "integrity guard tripped");

        let mut failed =
            ExecutionResult::failed(invocation.action.clone(), invocation.mode, err.to_string());
        failed.channel = current.channel;
        failed.meta.warnings.push(format!("pre-check request {check_id}"));
        Ok(Some(failed))
    }

    fn spill_outputs(&self, result: &mut ExecutionResult) {
        let (Some(sink), Some(request_id)) = (self.artifacts.as_deref(), result.request_id.clone())
        else {
            return;
        };
        let max = self.max_inline_output;
        let action = result.action.clone();

        for (stream, text) in [("stdout", &mut result.stdout), ("stderr", &mut result.stderr)] {
            if text.len() <= max {
                continue;
            }
            match sink.spill(&request_id, &action, stream, text.as_str()) {
                Ok(path) => {
                    *text = truncate_inline(text.as_str(), max);
                    result.artifacts.push(path);
                }
                Err(e) => {
                    warn!(request_id = %request_id, stream, error = %e, "could not spill output");
                    result.meta.warnings.push(format!("{stream} kept inline: {e}"));
                }
            }
        }
    }

    // ── Synthesized reports ──────────────────────────────────────────────────

    fn rejected(&self, run_id: RunId, task: &str, plan: &Plan, rejection: PlanRejection) -> RunReport {
        let step = plan.actions.get(rejection.index);
        let next_cmd = report::next_cmd_for_rejection(
            &rejection,
            step,
            step.and_then(|s| self.policy.descriptor(&s.action)),
        );

        let results = plan
            .actions
            .iter()
            .enumerate()
            .map(|(i, s)| {
                let mode = s.mode.parse().unwrap_or(Mode::Check);
                let stderr = if i == rejection.index {
                    format!("rejected: {}", rejection.cause)
                } else {
                    format!("not dispatched: plan rejected at step {}", rejection.index + 1)
                };
                ExecutionResult::failed(s.action.clone(), mode, stderr)
            })
            .collect();

        report::map_report(run_id, task, results, Some(Finding::Rejected(rejection)), next_cmd)
    }

    fn blocked(
        &self,
        run_id: RunId,
        task: &str,
        invocations: &[Invocation],
        decisions: &[GateDecision],
        first_denied: usize,
    ) -> RunReport {
        let results = invocations
            .iter()
            .zip(decisions)
            .map(|(invocation, decision)| {
                let stderr = if decision.allowed {
                    format!("not dispatched: run blocked at step {}", first_denied + 1)
                } else {
                    format!("blocked: {} [{}]", decision.detail, decision.reason)
                };
                ExecutionResult::failed(invocation.action.clone(), invocation.mode, stderr)
            })
            .collect();

        let invocation = &invocations[first_denied];
        let decision = decisions[first_denied].clone();
        let next_cmd = self
            .policy
            .descriptor(&invocation.action)
            .and_then(|d| report::next_cmd_for_denial(d, invocation, &decision));

        report::map_report(
            run_id,
            task,
            results,
            Some(Finding::Denied { index: first_denied, decision }),
            next_cmd,
        )
    }
}

/// A `check` or `plan` response must not report a change. A violation
/// fails the result and names the violation in stderr when the remote left
/// it empty.
fn enforce_read_only(run_key: &str, request: &DispatchRequest, result: &mut ExecutionResult) {
    let mode = request.params.mode;
    if mode.is_mutating() || !result.ok || !result.meta.changed {
        return;
    }
    warn!(
        run_id = %run_key,
        request_id = %request.request_id,
        action = %request.params.action,
        mode = %mode,
        "remote reported a change for a read-only mode"
    );
    let violation = format!("contract violation: remote reported changed=true in read-only {mode} mode");
    result.ok = false;
    result.exit_code = 1;
    if result.stderr.trim().is_empty() {
        result.stderr = violation.clone();
    }
    result.meta.warnings.push(violation);
}

/// First non-empty line of stderr, falling back to stdout.
fn failure_cause(result: &ExecutionResult) -> String {
    [&result.stderr, &result.stdout]
        .iter()
        .flat_map(|s| s.lines())
        .map(str::trim)
        .find(|l| !l.is_empty())
        .map(str::to_string)
        .unwrap_or_else(|| format!("exit code {}", result.exit_code))
}

fn truncate_inline(text: &str, max: usize) -> String {
    let mut end = max.min(text.len());
    while !text.is_char_boundary(end) {
        end -= 1;
    }
    format!("{}{TRUNCATION_MARKER}", &text[..end])
}

// ── Tests ────────────────────────────────────────────────────────────────────
