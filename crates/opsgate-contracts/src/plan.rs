//! Plan and invocation types.
//!
//! A `PlanStep` is what a plan source (the command grammar, a plan file, or an
//! external planner) produces: untyped and untrusted. The plan validator turns
//! an ordered list of steps into `Invocation`s, which are the only thing the
//! gate and executor ever consume.

use serde::{Deserialize, Serialize};

use crate::action::{ActionArgs, Mode};

/// One raw, unvalidated step of a candidate plan.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PlanStep {
    /// Action name as the plan source spelled it.
    pub action: String,
    /// Mode as a string; parsed by the validator so a bad value can be named.
    #[serde(default = "default_mode")]
    pub mode: String,
    /// Free-form argument map. Must not contain `confirm`.
    #[serde(default)]
    pub args: serde_json::Map<String, serde_json::Value>,
    /// Confirmation travels here, never inside `args`.
    #[serde(default)]
    pub confirm_token: Option<String>,
}

fn default_mode() -> String {
    Mode::Check.to_string()
}

impl PlanStep {
    pub fn new(action: impl Into<String>, mode: Mode) -> Self {
        Self {
            action: action.into(),
            mode: mode.to_string(),
            args: serde_json::Map::new(),
            confirm_token: None,
        }
    }

    pub fn with_arg(mut self, key: &str, value: impl Into<serde_json::Value>) -> Self {
        self.args.insert(key.to_string(), value.into());
        self
    }

    pub fn with_confirm(mut self, token: impl Into<String>) -> Self {
        self.confirm_token = Some(token.into());
        self
    }
}

/// A candidate plan as delivered by a plan source.
///
/// The JSON form matches what an external planner emits:
/// `{"summary": "...", "actions": [{"action": ..., "mode": ..., ...}]}`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Plan {
    #[serde(default)]
    pub summary: String,
    pub actions: Vec<PlanStep>,
}

impl Plan {
    pub fn new(actions: Vec<PlanStep>) -> Self {
        Self { summary: String::new(), actions }
    }
}

/// A structurally validated invocation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Invocation {
    pub action: String,
    pub mode: Mode,
    pub args: ActionArgs,
    pub confirm_token: Option<String>,
}

/// Which structural rule a rejected plan broke.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RejectionKind {
    /// The plan document itself does not have the plan structure.
    MalformedPlan,
    EmptyPlan,
    UnknownAction,
    InvalidMode,
    UnsupportedMode,
    ConfirmInArguments,
    InvalidArguments,
}

/// A plan rejected by the validator, pointing at the offending step.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PlanRejection {
    /// Zero-based index of the offending step.
    pub index: usize,
    pub action: String,
    pub kind: RejectionKind,
    /// Precise cause naming the offending field or action.
    pub cause: String,
}

impl PlanRejection {
    pub fn new(index: usize, action: &str, kind: RejectionKind, cause: impl Into<String>) -> Self {
        Self { index, action: action.to_string(), kind, cause: cause.into() }
    }

    pub fn into_error(self) -> crate::error::OpsError {
        // A malformed document's cause already carries its field path.
        let reason = match self.kind {
            RejectionKind::MalformedPlan => self.cause,
            _ => format!("step {}: {}", self.index + 1, self.cause),
        };
        crate::error::OpsError::Validation { reason }
    }
}
