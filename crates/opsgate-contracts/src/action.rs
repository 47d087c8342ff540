//! Action catalog types.
//!
//! An `ActionDescriptor` is one entry of the action manifest: a named remote
//! operation with a danger level, the modes it supports, and the shape of the
//! arguments it accepts. Descriptors are loaded once per run and never
//! mutated afterwards.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// Blast-radius classification of an action. Controls which gates apply.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DangerLevel {
    Safe,
    Medium,
    High,
}

impl fmt::Display for DangerLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            DangerLevel::Safe => "safe",
            DangerLevel::Medium => "medium",
            DangerLevel::High => "high",
        };
        f.write_str(s)
    }
}

/// Execution mode of one invocation.
///
/// `Check` and `Plan` are read-only by contract; only `Apply` may mutate.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Mode {
    /// Read-only inspection of current state.
    Check,
    /// Report the exact changes an apply would make, without making them.
    Plan,
    /// Perform the mutation. Must be idempotent.
    Apply,
}

impl Mode {
    /// True only for `Apply`.
    pub fn is_mutating(self) -> bool {
        matches!(self, Mode::Apply)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Mode::Check => "check",
            Mode::Plan => "plan",
            Mode::Apply => "apply",
        }
    }
}

impl fmt::Display for Mode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Mode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "check" => Ok(Mode::Check),
            "plan" => Ok(Mode::Plan),
            "apply" => Ok(Mode::Apply),
            other => Err(format!("unknown mode '{other}' (expected check, plan or apply)")),
        }
    }
}

/// The closed set of argument shapes an action may declare.
///
/// Each shape corresponds to exactly one `ActionArgs` variant.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ArgsShape {
    /// No arguments.
    None,
    /// `name` (required): a managed site.
    Site,
    /// `lines` (optional): how many log lines to return.
    Logs,
    /// `workflow_id` and `expected_sha256` (both required).
    Workflow,
}

impl ArgsShape {
    /// `(key, required)` pairs accepted by this shape, in positional order.
    pub fn keys(self) -> &'static [(&'static str, bool)] {
        match self {
            ArgsShape::None => &[],
            ArgsShape::Site => &[("name", true)],
            ArgsShape::Logs => &[("lines", false)],
            ArgsShape::Workflow => &[("workflow_id", true), ("expected_sha256", true)],
        }
    }
}

/// Typed, validated arguments for one invocation.
///
/// Produced by the plan validator from the raw argument map; never built from
/// untrusted input without going through validation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "shape", rename_all = "lowercase")]
pub enum ActionArgs {
    None,
    Site { name: String },
    Logs { lines: Option<u32> },
    Workflow { workflow_id: String, expected_sha256: String },
}

impl ActionArgs {
    pub fn shape(&self) -> ArgsShape {
        match self {
            ActionArgs::None => ArgsShape::None,
            ActionArgs::Site { .. } => ArgsShape::Site,
            ActionArgs::Logs { .. } => ArgsShape::Logs,
            ActionArgs::Workflow { .. } => ArgsShape::Workflow,
        }
    }

    /// Look up one argument by its wire key, rendered as a string.
    pub fn field(&self, key: &str) -> Option<String> {
        match (self, key) {
            (ActionArgs::Site { name }, "name") => Some(name.clone()),
            (ActionArgs::Logs { lines: Some(n) }, "lines") => Some(n.to_string()),
            (ActionArgs::Workflow { workflow_id, .. }, "workflow_id") => Some(workflow_id.clone()),
            (ActionArgs::Workflow { expected_sha256, .. }, "expected_sha256") => {
                Some(expected_sha256.clone())
            }
            _ => None,
        }
    }

    /// The plain `{key: value}` object sent as `params.args` on the wire.
    pub fn to_wire(&self) -> serde_json::Value {
        let mut map = serde_json::Map::new();
        match self {
            ActionArgs::None => {}
            ActionArgs::Site { name } => {
                map.insert("name".into(), name.clone().into());
            }
            ActionArgs::Logs { lines } => {
                if let Some(n) = lines {
                    map.insert("lines".into(), (*n).into());
                }
            }
            ActionArgs::Workflow { workflow_id, expected_sha256 } => {
                map.insert("workflow_id".into(), workflow_id.clone().into());
                map.insert("expected_sha256".into(), expected_sha256.clone().into());
            }
        }
        serde_json::Value::Object(map)
    }

    /// The expected content fingerprint, for guarded actions.
    pub fn expected_fingerprint(&self) -> Option<&str> {
        match self {
            ActionArgs::Workflow { expected_sha256, .. } => Some(expected_sha256.as_str()),
            _ => None,
        }
    }
}

/// One entry of the action manifest.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ActionDescriptor {
    /// Unique action name, e.g. `site_block`.
    pub name: String,
    #[serde(default)]
    pub description: String,
    pub danger: DangerLevel,
    /// Non-empty subset of {check, plan, apply}.
    pub modes: Vec<Mode>,
    #[serde(default = "default_shape")]
    pub args: ArgsShape,
    /// Literal confirm token for `apply`, with optional `{field}` placeholders.
    #[serde(default)]
    pub confirm: Option<String>,
    /// Apply is preceded by a fingerprint check of the current remote state.
    #[serde(default)]
    pub guarded: bool,
    /// Apply writes to the workflow-automation endpoint; needs the write flag.
    #[serde(default)]
    pub workflow_write: bool,
    /// Must be true for every descriptor the manifest accepts.
    #[serde(default = "default_true")]
    pub idempotent: bool,
}

fn default_shape() -> ArgsShape {
    ArgsShape::None
}

fn default_true() -> bool {
    true
}

impl ActionDescriptor {
    pub fn supports(&self, mode: Mode) -> bool {
        self.modes.contains(&mode)
    }

    /// Render the confirm token this action expects for the given arguments.
    ///
    /// `{field}` placeholders are replaced with the uppercased argument value,
    /// so `BLOCK_{name}` with `name = "demo6"` renders `BLOCK_DEMO6`.
    /// Placeholders for absent optional arguments are left verbatim.
    pub fn expected_confirm(&self, args: &ActionArgs) -> Option<String> {
        let template = self.confirm.as_ref()?;
        let mut rendered = template.clone();
        for (key, _) in self.args.keys() {
            let placeholder = format!("{{{key}}}");
            if let Some(value) = args.field(key) {
                rendered = rendered.replace(&placeholder, &value.to_uppercase());
            }
        }
        Some(rendered)
    }
}
