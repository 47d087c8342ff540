//! # opsgate-policy
//!
//! The action manifest, the plan validator, and the danger-tiered gate.
//!
//! ## Overview
//!
//! This crate provides [`ManifestPolicy`], which implements the
//! [`PolicyEngine`](opsgate_core::traits::PolicyEngine) trait. Actions are
//! declared in a TOML manifest (a default catalog is compiled in). Validation
//! is structural and pure; gating decides per invocation from the action's
//! danger level, the run's `SafetyConfig`, and the confirm token.
//!
//! ## Quick start
//!
//! ```rust,ignore
//! use opsgate_policy::ManifestPolicy;
//!
//! let policy = ManifestPolicy::builtin()?;
//! // Pass `policy` to `opsgate_core::Executor::new(...)`.
//! ```

pub mod engine;
pub mod manifest;
pub mod validator;

pub use engine::ManifestPolicy;
pub use manifest::{Manifest, DEFAULT_MANIFEST};
pub use validator::decode_plan;

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use serde_json::json;

    use opsgate_contracts::{
        action::{ActionArgs, DangerLevel, Mode},
        error::OpsError,
        gate::{GateReason, SafetyConfig},
        plan::{Invocation, Plan, PlanStep, RejectionKind},
    };
    use opsgate_core::traits::PolicyEngine;

    use crate::{decode_plan, ManifestPolicy};

    // ── Helpers ───────────────────────────────────────────────────────────────

    fn policy() -> ManifestPolicy {
        ManifestPolicy::builtin().unwrap()
    }

    fn one(step: PlanStep) -> Plan {
        Plan::new(vec![step])
    }

    fn invocation(policy: &ManifestPolicy, step: PlanStep) -> Invocation {
        policy.validate(&one(step)).unwrap().remove(0)
    }

    const SHA: &str = "9f86d081884c7d659a2feaa0c55ad015a3bf4f1b2b0b822cd15d6c15b0f00a08";

    // ── 1. default manifest ───────────────────────────────────────────────────

    #[test]
    fn test_builtin_catalog_loads() {
        let policy = policy();
        let names: Vec<&str> = policy.manifest().names().collect();

        assert_eq!(names.len(), 10);
        assert_eq!(policy.descriptor("site_block").unwrap().danger, DangerLevel::High);
        assert_eq!(policy.descriptor("healthz").unwrap().modes, vec![Mode::Check]);
        assert!(policy.descriptor("workflow_put").unwrap().guarded);
        assert!(policy.manifest().actions.iter().all(|d| d.idempotent));
    }

    // ── 2. manifest rules ─────────────────────────────────────────────────────

    #[test]
    fn test_manifest_rejects_bad_catalogs() {
        let cases = [
            (
                r#"
                [[actions]]
                name = "a"
                danger = "safe"
                modes = ["check"]
                idempotent = false
                "#,
                "not idempotent",
            ),
            (
                r#"
                [[actions]]
                name = "a"
                danger = "safe"
                modes = ["check"]

                [[actions]]
                name = "a"
                danger = "safe"
                modes = ["check"]
                "#,
                "more than once",
            ),
            (
                r#"
                [[actions]]
                name = "a"
                danger = "safe"
                modes = []
                "#,
                "no modes",
            ),
            (
                r#"
                [[actions]]
                name = "a"
                danger = "high"
                modes = ["apply"]
                "#,
                "confirm token",
            ),
            (
                r#"
                [[actions]]
                name = "a"
                danger = "high"
                modes = ["apply"]
                confirm = "A_{name}"
                "#,
                "placeholder",
            ),
        ];

        for (toml, expected) in cases {
            match ManifestPolicy::from_toml_str(toml) {
                Err(OpsError::ConfigError { reason }) => {
                    assert!(reason.contains(expected), "expected '{expected}' in: {reason}")
                }
                other => panic!("expected ConfigError for '{expected}', got {other:?}"),
            }
        }
    }

    #[test]
    fn test_toml_parse_error() {
        match ManifestPolicy::from_toml_str("this is not valid toml ][[[") {
            Err(OpsError::ConfigError { reason }) => {
                assert!(reason.contains("failed to parse action manifest"), "got: {reason}")
            }
            other => panic!("expected ConfigError, got {other:?}"),
        }
    }

    // ── 3. validation ─────────────────────────────────────────────────────────

    /// An unknown action is rejected by name; a placeholder never in the
    /// manifest must not slip through.
    #[test]
    fn test_unknown_action_is_named() {
        let rejection = policy()
            .validate(&Plan::new(vec![
                PlanStep::new("healthz", Mode::Check),
                PlanStep::new("do_the_thing", Mode::Check),
            ]))
            .unwrap_err();

        assert_eq!(rejection.kind, RejectionKind::UnknownAction);
        assert_eq!(rejection.index, 1);
        assert!(rejection.cause.contains("do_the_thing"));
    }

    /// `confirm` inside args is rejected regardless of its value, and distinctly
    /// from a merely missing confirm token (which validates and is gated).
    #[test]
    fn test_confirm_inside_args_is_rejected() {
        let policy = policy();
        for value in [json!("BLOCK_DEMO6"), json!(""), json!(1), json!(null)] {
            let step = PlanStep::new("site_block", Mode::Apply)
                .with_arg("name", "demo6")
                .with_arg("confirm", value);
            let rejection = policy.validate(&one(step)).unwrap_err();
            assert_eq!(rejection.kind, RejectionKind::ConfirmInArguments);
            assert!(rejection.cause.contains("confirm_token"));
        }

        let missing = PlanStep::new("site_block", Mode::Apply).with_arg("name", "demo6");
        assert!(policy.validate(&one(missing)).is_ok());
    }

    #[test]
    fn test_mode_rules() {
        let policy = policy();

        let bad = PlanStep { mode: "destroy".into(), ..PlanStep::new("healthz", Mode::Check) };
        assert_eq!(policy.validate(&one(bad)).unwrap_err().kind, RejectionKind::InvalidMode);

        let unsupported = PlanStep::new("healthz", Mode::Apply);
        let rejection = policy.validate(&one(unsupported)).unwrap_err();
        assert_eq!(rejection.kind, RejectionKind::UnsupportedMode);
        assert!(rejection.cause.contains("supported: check"));
    }

    #[test]
    fn test_arguments_are_typed() {
        let policy = policy();

        let site = invocation(&policy, PlanStep::new("site_up", Mode::Plan).with_arg("name", "demo6"));
        assert_eq!(site.args, ActionArgs::Site { name: "demo6".into() });

        let logs = invocation(&policy, PlanStep::new("caddy_logs", Mode::Check).with_arg("lines", "50"));
        assert_eq!(logs.args, ActionArgs::Logs { lines: Some(50) });

        let wf = invocation(
            &policy,
            PlanStep::new("workflow_put", Mode::Check)
                .with_arg("workflow_id", "wf-7")
                .with_arg("expected_sha256", SHA.to_uppercase()),
        );
        assert_eq!(wf.args.expected_fingerprint(), Some(SHA));
    }

    #[test]
    fn test_argument_errors_name_the_field() {
        let policy = policy();
        let cases = [
            (PlanStep::new("site_up", Mode::Check), "missing required argument 'name'"),
            (PlanStep::new("site_up", Mode::Check).with_arg("name", "a;rm -rf /"), "disallowed character"),
            (PlanStep::new("site_up", Mode::Check).with_arg("name", "x").with_arg("force", "1"), "unknown argument 'force'"),
            (PlanStep::new("caddy_logs", Mode::Check).with_arg("lines", "-3"), "'lines'"),
            (PlanStep::new("site_up", Mode::Check).with_arg("name", json!(["x"])), "string or integer"),
            (
                PlanStep::new("workflow_put", Mode::Check)
                    .with_arg("workflow_id", "wf")
                    .with_arg("expected_sha256", "abc"),
                "64 hex",
            ),
        ];

        for (step, expected) in cases {
            let rejection = policy.validate(&one(step)).unwrap_err();
            assert_eq!(rejection.kind, RejectionKind::InvalidArguments);
            assert!(rejection.cause.contains(expected), "expected '{expected}' in: {}", rejection.cause);
        }
    }

    #[test]
    fn test_empty_plan_is_rejected() {
        let rejection = policy().validate(&Plan::default()).unwrap_err();
        assert_eq!(rejection.kind, RejectionKind::EmptyPlan);
    }

    #[test]
    fn test_plan_document_decodes() {
        let plan = decode_plan(
            r#"{"summary": "unblock", "actions": [
                {"action": "site_unblock", "mode": "apply", "args": {"name": "demo6"}},
                {"action": "healthz", "confirm_token": null}
            ]}"#,
        )
        .unwrap();

        assert_eq!(plan.summary, "unblock");
        assert_eq!(plan.actions[1].mode, "check");
        assert!(policy().validate(&plan).is_ok());
    }

    /// A broken plan document is rejected with the path of the field at fault.
    #[test]
    fn test_malformed_plan_document_names_the_field() {
        let cases = [
            ("[1, 2]", "plan: expected an object"),
            ("{not json", "plan: not valid JSON"),
            (r#"{"summary": "s"}"#, "actions: missing required field"),
            (r#"{"actions": {"action": "healthz"}}"#, "actions: expected an array"),
            (r#"{"summary": 3, "actions": []}"#, "summary: expected a string"),
            (r#"{"actions": ["healthz"]}"#, "actions[0]: expected an object"),
            (r#"{"actions": [{"mode": "check"}]}"#, "actions[0].action: missing required field"),
            (r#"{"actions": [{"action": "healthz"}, {"action": "healthz", "mode": 5}]}"#, "actions[1].mode: expected a string"),
            (r#"{"actions": [{"action": "site_up", "args": ["demo6"]}]}"#, "actions[0].args: expected an object"),
            (r#"{"actions": [{"action": "site_block", "confirm_token": 1}]}"#, "actions[0].confirm_token"),
        ];

        for (text, expected) in cases {
            let rejection = decode_plan(text).unwrap_err();
            assert_eq!(rejection.kind, RejectionKind::MalformedPlan, "{text}");
            assert!(rejection.cause.starts_with(expected), "expected '{expected}' in: {}", rejection.cause);
        }

        let bad_mode = decode_plan(r#"{"actions": [{"action": "healthz"}, {"action": "healthz", "mode": 5}]}"#)
            .unwrap_err();
        assert_eq!(bad_mode.index, 1);
        match bad_mode.into_error() {
            OpsError::Validation { reason } => assert!(reason.starts_with("actions[1].mode"), "{reason}"),
            other => panic!("expected Validation, got {other:?}"),
        }
    }

    // ── 4. gating ─────────────────────────────────────────────────────────────

    #[test]
    fn test_read_only_modes_always_allowed() {
        let policy = policy();
        for action in ["site_block", "restart_n8n", "all_fix"] {
            for mode in [Mode::Check, Mode::Plan] {
                let mut step = PlanStep::new(action, mode);
                if action == "site_block" {
                    step = step.with_arg("name", "demo6");
                }
                let inv = invocation(&policy, step);
                assert!(policy.evaluate(&inv, &SafetyConfig::locked()).allowed, "{action} {mode}");
            }
        }
    }

    #[test]
    fn test_medium_apply_needs_dangerous_flag() {
        let policy = policy();
        let inv = invocation(&policy, PlanStep::new("site_up", Mode::Apply).with_arg("name", "demo6"));

        let denied = policy.evaluate(&inv, &SafetyConfig::locked());
        assert_eq!(denied.reason, GateReason::MissingDangerousFlag);
        assert!(denied.detail.contains("ALLOW_DANGEROUS=1"));

        assert!(policy.evaluate(&inv, &SafetyConfig::dangerous()).allowed);
    }

    #[test]
    fn test_high_apply_needs_flag_and_exact_token() {
        let policy = policy();
        let step = || PlanStep::new("site_block", Mode::Apply).with_arg("name", "demo6");

        let no_flag = invocation(&policy, step().with_confirm("BLOCK_DEMO6"));
        assert_eq!(
            policy.evaluate(&no_flag, &SafetyConfig::locked()).reason,
            GateReason::MissingDangerousFlag
        );

        let no_token = invocation(&policy, step());
        let denied = policy.evaluate(&no_token, &SafetyConfig::dangerous());
        assert_eq!(denied.reason, GateReason::MissingOrWrongConfirm);
        assert!(denied.detail.contains("confirm=BLOCK_DEMO6"));

        for near_miss in ["BLOCK_demo6", "BLOCK_DEMO", "BLOCK_DEMO6 ", "BLOCK_DEMO66"] {
            let inv = invocation(&policy, step().with_confirm(near_miss));
            assert!(!policy.evaluate(&inv, &SafetyConfig::dangerous()).allowed, "{near_miss}");
        }

        let exact = invocation(&policy, step().with_confirm("BLOCK_DEMO6"));
        assert!(policy.evaluate(&exact, &SafetyConfig::dangerous()).allowed);
    }

    #[test]
    fn test_workflow_write_needs_write_flag() {
        let policy = policy();
        let inv = invocation(
            &policy,
            PlanStep::new("workflow_put", Mode::Apply)
                .with_arg("workflow_id", "wf7")
                .with_arg("expected_sha256", SHA)
                .with_confirm("PUT_WF7"),
        );

        let denied = policy.evaluate(&inv, &SafetyConfig::dangerous());
        assert_eq!(denied.reason, GateReason::MissingWriteFlag);

        let both = SafetyConfig { dangerous_allowed: true, write_allowed: true };
        assert!(policy.evaluate(&inv, &both).allowed);
    }

    #[test]
    fn test_gate_does_not_trust_unvalidated_invocations() {
        let policy = policy();
        let forged = Invocation {
            action: "rm_everything".into(),
            mode: Mode::Apply,
            args: ActionArgs::None,
            confirm_token: None,
        };
        let both = SafetyConfig { dangerous_allowed: true, write_allowed: true };
        assert_eq!(policy.evaluate(&forged, &both).reason, GateReason::UnknownAction);

        let wrong_mode = Invocation { action: "healthz".into(), ..forged };
        assert_eq!(policy.evaluate(&wrong_mode, &both).reason, GateReason::UnsupportedMode);
    }
}
