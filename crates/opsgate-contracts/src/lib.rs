//! # opsgate-contracts
//!
//! Shared types, wire shapes, and contracts for the opsgate control loop.
//!
//! All crates in the workspace import from here. No business logic lives in
//! this crate, only data definitions, small pure helpers and error types.

pub mod action;
pub mod error;
pub mod execution;
pub mod gate;
pub mod plan;
pub mod report;

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;
    use action::{ActionArgs, ActionDescriptor, ArgsShape, DangerLevel, Mode};
    use error::OpsError;
    use execution::{DispatchRequest, ExecutionResult, RequestId};
    use plan::{Invocation, Plan};
    use report::RunStatus;

    fn site_block() -> ActionDescriptor {
        ActionDescriptor {
            name: "site_block".to_string(),
            description: "Block public access to a site".to_string(),
            danger: DangerLevel::High,
            modes: vec![Mode::Check, Mode::Plan, Mode::Apply],
            args: ArgsShape::Site,
            confirm: Some("BLOCK_{name}".to_string()),
            guarded: false,
            workflow_write: false,
            idempotent: true,
        }
    }

    // ── Modes and danger levels ──────────────────────────────────────────────

    #[test]
    fn mode_parses_case_insensitively_and_rejects_unknown() {
        assert_eq!("APPLY".parse::<Mode>().unwrap(), Mode::Apply);
        assert_eq!(" plan ".parse::<Mode>().unwrap(), Mode::Plan);

        let err = "destroy".parse::<Mode>().unwrap_err();
        assert!(err.contains("destroy"));
    }

    #[test]
    fn only_apply_is_mutating() {
        assert!(Mode::Apply.is_mutating());
        assert!(!Mode::Check.is_mutating());
        assert!(!Mode::Plan.is_mutating());
    }

    #[test]
    fn danger_levels_are_ordered_by_blast_radius() {
        assert!(DangerLevel::Safe < DangerLevel::Medium);
        assert!(DangerLevel::Medium < DangerLevel::High);
    }

    // ── Confirm token rendering ──────────────────────────────────────────────

    #[test]
    fn confirm_template_renders_uppercased_argument() {
        let args = ActionArgs::Site { name: "demo6".to_string() };
        assert_eq!(site_block().expected_confirm(&args).as_deref(), Some("BLOCK_DEMO6"));
    }

    #[test]
    fn descriptor_without_confirm_expects_no_token() {
        let mut d = site_block();
        d.confirm = None;
        assert!(d.expected_confirm(&ActionArgs::Site { name: "x".into() }).is_none());
    }

    // ── Wire shapes ──────────────────────────────────────────────────────────

    #[test]
    fn dispatch_request_matches_wire_layout() {
        let invocation = Invocation {
            action: "site_block".to_string(),
            mode: Mode::Apply,
            args: ActionArgs::Site { name: "demo6".to_string() },
            confirm_token: Some("BLOCK_DEMO6".to_string()),
        };
        let request = DispatchRequest::for_invocation(&invocation, RequestId("req-1".into()));
        let wire = serde_json::to_value(&request).unwrap();

        assert_eq!(
            wire,
            json!({
                "task": "apply: site_block",
                "params": {
                    "action": "site_block",
                    "mode": "apply",
                    "args": { "name": "demo6" },
                    "confirm": "BLOCK_DEMO6"
                },
                "request_id": "req-1"
            })
        );
    }

    #[test]
    fn dispatch_request_omits_absent_confirm() {
        let invocation = Invocation {
            action: "healthz".to_string(),
            mode: Mode::Check,
            args: ActionArgs::None,
            confirm_token: None,
        };
        let wire = serde_json::to_value(DispatchRequest::for_invocation(&invocation, RequestId::new()))
            .unwrap();
        assert!(wire["params"].get("confirm").is_none());
        assert_eq!(wire["params"]["args"], json!({}));
    }

    #[test]
    fn with_mode_issues_a_fresh_request_id() {
        let invocation = Invocation {
            action: "workflow_put".to_string(),
            mode: Mode::Apply,
            args: ActionArgs::None,
            confirm_token: None,
        };
        let apply = DispatchRequest::for_invocation(&invocation, RequestId::new());
        let check = apply.with_mode(Mode::Check);

        assert_eq!(check.params.mode, Mode::Check);
        assert_eq!(check.task, "check: workflow_put");
        assert_ne!(check.request_id, apply.request_id);
    }

    #[test]
    fn execution_result_decodes_dispatcher_response_with_defaults() {
        let body = json!({
            "ok": true,
            "exit_code": 0,
            "action": "healthz",
            "mode": "check"
        });
        let result: ExecutionResult = serde_json::from_value(body).unwrap();

        assert!(result.ok);
        assert!(result.stdout.is_empty());
        assert!(!result.meta.changed);
        assert!(result.meta.warnings.is_empty());
        assert!(result.request_id.is_none());
    }

    #[test]
    fn plan_steps_default_to_check_mode() {
        let plan: Plan = serde_json::from_value(json!({
            "actions": [ { "action": "healthz" } ]
        }))
        .unwrap();
        assert_eq!(plan.actions[0].mode, "check");
        assert!(plan.actions[0].confirm_token.is_none());
    }

    // ── Status and exit code ─────────────────────────────────────────────────

    #[test]
    fn exit_code_is_a_function_of_status() {
        assert_eq!(RunStatus::Ok.exit_code(), 0);
        assert_eq!(RunStatus::Fail.exit_code(), 1);
        assert_eq!(RunStatus::Blocked.exit_code(), 1);
        assert_eq!(serde_json::to_value(RunStatus::Blocked).unwrap(), json!("BLOCKED"));
    }

    // ── Error display ────────────────────────────────────────────────────────

    #[test]
    fn gate_denied_display_carries_blocked_marker() {
        let err = OpsError::GateDenied { reason: "all_fix needs ALLOW_DANGEROUS=1".into() };
        let msg = err.to_string();
        assert!(msg.starts_with("blocked"));
        assert!(msg.contains("all_fix"));
    }

    #[test]
    fn integrity_mismatch_display_names_both_fingerprints() {
        let err = OpsError::IntegrityMismatch {
            subject: "workflow_put".into(),
            expected: "aaa".into(),
            actual: "bbb".into(),
        };
        let msg = err.to_string();
        assert!(msg.contains("fingerprint mismatch"));
        assert!(msg.contains("aaa") && msg.contains("bbb"));
    }
}
