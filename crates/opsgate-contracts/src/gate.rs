//! Safety configuration and gate decisions.
//!
//! The gate is deny-on-doubt: anything other than `GateDecision::allow()`
//! keeps the invocation away from every transport.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Environment switch that sets `SafetyConfig::dangerous_allowed`.
pub const DANGEROUS_ENV: &str = "ALLOW_DANGEROUS";

/// Environment switch that sets `SafetyConfig::write_allowed`.
pub const WRITE_ENV: &str = "ALLOW_N8N_WRITE";

/// Process-wide safety switches, built once per run and passed by value.
///
/// Library code never reads these from the environment; the entry point does
/// that exactly once and threads the result through.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SafetyConfig {
    /// Medium and high danger `apply` invocations may run.
    pub dangerous_allowed: bool,
    /// `apply` of actions that write to the workflow-automation endpoint may run.
    pub write_allowed: bool,
}

impl SafetyConfig {
    pub fn locked() -> Self {
        Self::default()
    }

    pub fn dangerous() -> Self {
        Self { dangerous_allowed: true, write_allowed: false }
    }
}

/// Why a gate decision came out the way it did.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum GateReason {
    None,
    MissingDangerousFlag,
    MissingOrWrongConfirm,
    MissingWriteFlag,
    UnknownAction,
    UnsupportedMode,
}

impl GateReason {
    pub fn code(self) -> &'static str {
        match self {
            GateReason::None => "NONE",
            GateReason::MissingDangerousFlag => "MISSING_DANGEROUS_FLAG",
            GateReason::MissingOrWrongConfirm => "MISSING_OR_WRONG_CONFIRM",
            GateReason::MissingWriteFlag => "MISSING_WRITE_FLAG",
            GateReason::UnknownAction => "UNKNOWN_ACTION",
            GateReason::UnsupportedMode => "UNSUPPORTED_MODE",
        }
    }
}

impl fmt::Display for GateReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.code())
    }
}

/// Outcome of gating one invocation. Derived, never persisted on its own.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GateDecision {
    pub allowed: bool,
    pub reason: GateReason,
    /// Operator-facing explanation; empty when allowed.
    pub detail: String,
}

impl GateDecision {
    pub fn allow() -> Self {
        Self { allowed: true, reason: GateReason::None, detail: String::new() }
    }

    pub fn deny(reason: GateReason, detail: impl Into<String>) -> Self {
        Self { allowed: false, reason, detail: detail.into() }
    }
}
