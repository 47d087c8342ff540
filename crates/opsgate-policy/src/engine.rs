//! Manifest-driven policy engine.
//!
//! `ManifestPolicy` owns an immutable `Manifest` and implements the
//! `PolicyEngine` trait from opsgate-core.
//!
//! Gate algorithm, per invocation:
//!
//! 1. Unknown action or unsupported mode → deny (the validator normally
//!    catches both; the gate does not trust that it ran).
//! 2. `check` and `plan` → allow at every danger level.
//! 3. `apply`:
//!    a. `safe` → allow.
//!    b. `medium` → allow only with `dangerous_allowed`.
//!    c. `high` → allow only with `dangerous_allowed` AND a confirm token
//!       exactly equal to the descriptor's rendered token.
//!    d. `workflow_write` descriptors additionally need `write_allowed`.

use std::path::Path;

use tracing::{debug, warn};

use opsgate_contracts::{
    action::{ActionDescriptor, DangerLevel},
    error::OpsResult,
    gate::{GateDecision, GateReason, SafetyConfig, DANGEROUS_ENV, WRITE_ENV},
    plan::{Invocation, Plan, PlanRejection},
};
use opsgate_core::traits::PolicyEngine;

use crate::{manifest::Manifest, validator};

/// A `PolicyEngine` backed by an action manifest.
///
/// ```rust,ignore
/// use opsgate_policy::ManifestPolicy;
///
/// let policy = ManifestPolicy::from_file(Path::new("actions.toml"))?;
/// ```
#[derive(Debug)]
pub struct ManifestPolicy {
    manifest: Manifest,
}

impl ManifestPolicy {
    pub fn new(manifest: Manifest) -> Self {
        Self { manifest }
    }

    /// The policy over the embedded default catalog.
    pub fn builtin() -> OpsResult<Self> {
        Manifest::builtin().map(Self::new)
    }

    pub fn from_toml_str(s: &str) -> OpsResult<Self> {
        Manifest::from_toml_str(s).map(Self::new)
    }

    pub fn from_file(path: &Path) -> OpsResult<Self> {
        Manifest::from_file(path).map(Self::new)
    }

    pub fn manifest(&self) -> &Manifest {
        &self.manifest
    }
}

impl PolicyEngine for ManifestPolicy {
    fn validate(&self, plan: &Plan) -> Result<Vec<Invocation>, PlanRejection> {
        validator::validate_plan(&self.manifest, plan)
    }

    fn evaluate(&self, invocation: &Invocation, safety: &SafetyConfig) -> GateDecision {
        let Some(descriptor) = self.manifest.get(&invocation.action) else {
            warn!(action = %invocation.action, "gate: unknown action");
            return GateDecision::deny(
                GateReason::UnknownAction,
                format!("unknown action '{}'", invocation.action),
            );
        };

        let decision = gate(descriptor, invocation, safety);
        if decision.allowed {
            debug!(action = %invocation.action, mode = %invocation.mode, "gate: allowed");
        } else {
            warn!(
                action = %invocation.action,
                mode = %invocation.mode,
                danger = %descriptor.danger,
                reason = %decision.reason,
                "gate: denied"
            );
        }
        decision
    }

    fn descriptor(&self, action: &str) -> Option<&ActionDescriptor> {
        self.manifest.get(action)
    }
}

fn gate(descriptor: &ActionDescriptor, invocation: &Invocation, safety: &SafetyConfig) -> GateDecision {
    let name = &descriptor.name;
    let mode = invocation.mode;

    if !descriptor.supports(mode) {
        return GateDecision::deny(
            GateReason::UnsupportedMode,
            format!("action '{name}' does not support mode '{mode}'"),
        );
    }
    if !mode.is_mutating() {
        return GateDecision::allow();
    }

    match descriptor.danger {
        DangerLevel::Safe => {}
        DangerLevel::Medium => {
            if !safety.dangerous_allowed {
                return GateDecision::deny(
                    GateReason::MissingDangerousFlag,
                    format!("apply of medium-danger action '{name}' requires {DANGEROUS_ENV}=1"),
                );
            }
        }
        DangerLevel::High => {
            if !safety.dangerous_allowed {
                return GateDecision::deny(
                    GateReason::MissingDangerousFlag,
                    format!("apply of high-danger action '{name}' requires {DANGEROUS_ENV}=1"),
                );
            }
            let expected = descriptor.expected_confirm(&invocation.args);
            let supplied = invocation.confirm_token.as_deref();
            // Exact match only. A missing template denies rather than allows.
            let confirmed = matches!((expected.as_deref(), supplied), (Some(e), Some(s)) if e == s);
            if !confirmed {
                let hint = expected.map(|e| format!("confirm={e}")).unwrap_or_default();
                let detail = match supplied {
                    None => format!("apply of high-danger action '{name}' requires {hint}"),
                    Some(_) => format!("wrong confirm token for '{name}'; expected {hint}"),
                };
                return GateDecision::deny(GateReason::MissingOrWrongConfirm, detail);
            }
        }
    }

    if descriptor.workflow_write && !safety.write_allowed {
        return GateDecision::deny(
            GateReason::MissingWriteFlag,
            format!("apply of '{name}' writes to the automation endpoint and requires {WRITE_ENV}=1"),
        );
    }

    GateDecision::allow()
}
