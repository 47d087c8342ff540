//! Plan validator.
//!
//! Converts an ordered list of raw `PlanStep`s into typed `Invocation`s,
//! or rejects the plan at the first offending step. Pure: it reads only the
//! manifest and the plan.
//!
//! Checks, per step and in this order:
//!
//! 1. the action exists in the manifest
//! 2. `args` carries no `confirm` key
//! 3. the mode parses and is supported by the descriptor
//! 4. the argument map fits the descriptor's argument shape
//!
//! `decode_plan` sits in front of all of this for plans that arrive as JSON
//! documents, so a structurally broken document is a rejection too.

use serde_json::{Map, Value};

use opsgate_contracts::{
    action::{ActionArgs, ActionDescriptor, ArgsShape, Mode},
    plan::{Invocation, Plan, PlanRejection, PlanStep, RejectionKind},
};

use crate::manifest::Manifest;

pub fn validate_plan(manifest: &Manifest, plan: &Plan) -> Result<Vec<Invocation>, PlanRejection> {
    if plan.actions.is_empty() {
        return Err(PlanRejection::new(0, "", RejectionKind::EmptyPlan, "plan contains no actions"));
    }

    plan.actions
        .iter()
        .enumerate()
        .map(|(index, step)| validate_step(manifest, index, step))
        .collect()
}

fn validate_step(manifest: &Manifest, index: usize, step: &PlanStep) -> Result<Invocation, PlanRejection> {
    let reject = |kind, cause: String| PlanRejection::new(index, &step.action, kind, cause);

    let descriptor = manifest.get(&step.action).ok_or_else(|| {
        reject(RejectionKind::UnknownAction, format!("unknown action '{}'", step.action))
    })?;

    if step.args.contains_key("confirm") {
        return Err(reject(
            RejectionKind::ConfirmInArguments,
            format!(
                "action '{}': confirmation must be supplied as confirm_token, not inside args",
                step.action
            ),
        ));
    }

    let mode: Mode = step.mode.parse().map_err(|e: String| {
        reject(RejectionKind::InvalidMode, format!("action '{}': {e}", step.action))
    })?;

    if !descriptor.supports(mode) {
        let supported: Vec<&str> = descriptor.modes.iter().map(|m| m.as_str()).collect();
        return Err(reject(
            RejectionKind::UnsupportedMode,
            format!(
                "action '{}' does not support mode '{mode}' (supported: {})",
                step.action,
                supported.join(", ")
            ),
        ));
    }

    let args = typed_args(descriptor, &step.args)
        .map_err(|cause| reject(RejectionKind::InvalidArguments, cause))?;

    Ok(Invocation {
        action: descriptor.name.clone(),
        mode,
        args,
        confirm_token: step.confirm_token.clone(),
    })
}

// ── Plan documents ───────────────────────────────────────────────────────────

/// Decode an external planner's JSON document into a `Plan`.
///
/// Any structural problem is a `MalformedPlan` rejection whose cause starts
/// with the offending field path, e.g. `actions[1].mode: expected a string`.
pub fn decode_plan(text: &str) -> Result<Plan, PlanRejection> {
    let malformed = |index: usize, field: &str, cause: String| {
        PlanRejection::new(index, "", RejectionKind::MalformedPlan, format!("{field}: {cause}"))
    };

    let root: Value = serde_json::from_str(text)
        .map_err(|e| malformed(0, "plan", format!("not valid JSON: {e}")))?;
    let Value::Object(fields) = &root else {
        return Err(malformed(0, "plan", expected("an object", &root)));
    };

    if let Some(summary) = fields.get("summary").filter(|v| !v.is_string()) {
        return Err(malformed(0, "summary", expected("a string", summary)));
    }
    let actions = match fields.get("actions") {
        Some(Value::Array(actions)) => actions,
        Some(other) => return Err(malformed(0, "actions", expected("an array", other))),
        None => return Err(malformed(0, "actions", "missing required field".to_string())),
    };

    let optional: [(&str, &str, fn(&Value) -> bool); 3] = [
        ("mode", "a string", Value::is_string),
        ("args", "an object", Value::is_object),
        ("confirm_token", "a string", |v| v.is_string() || v.is_null()),
    ];
    for (index, step) in actions.iter().enumerate() {
        let path = format!("actions[{index}]");
        let Value::Object(step) = step else {
            return Err(malformed(index, &path, expected("an object", step)));
        };
        match step.get("action") {
            Some(Value::String(_)) => {}
            Some(other) => return Err(malformed(index, &format!("{path}.action"), expected("a string", other))),
            None => return Err(malformed(index, &format!("{path}.action"), "missing required field".to_string())),
        }
        for (field, kind, fits) in optional {
            if let Some(value) = step.get(field).filter(|v| !fits(v)) {
                return Err(malformed(index, &format!("{path}.{field}"), expected(kind, value)));
            }
        }
    }

    serde_json::from_value(root).map_err(|e| malformed(0, "plan", e.to_string()))
}

fn expected(kind: &str, got: &Value) -> String {
    let found = match got {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "an array",
        Value::Object(_) => "an object",
    };
    format!("expected {kind}, got {found} ({got})")
}

// ── Argument typing ──────────────────────────────────────────────────────────

fn typed_args(descriptor: &ActionDescriptor, raw: &Map<String, Value>) -> Result<ActionArgs, String> {
    let keys = descriptor.args.keys();
    if let Some(unknown) = raw.keys().find(|k| !keys.iter().any(|(known, _)| *known == k.as_str())) {
        return Err(format!(
            "unknown argument '{unknown}' for action '{}'",
            descriptor.name
        ));
    }

    let required = |key: &str| -> Result<String, String> {
        let value = raw.get(key).ok_or_else(|| {
            format!("missing required argument '{key}' for action '{}'", descriptor.name)
        })?;
        scalar(key, value)
    };

    let args = match descriptor.args {
        ArgsShape::None => ActionArgs::None,
        ArgsShape::Site => ActionArgs::Site { name: identifier("name", required("name")?)? },
        ArgsShape::Logs => {
            let lines = match raw.get("lines") {
                None => None,
                Some(v) => Some(line_count(&scalar("lines", v)?)?),
            };
            ActionArgs::Logs { lines }
        }
        ArgsShape::Workflow => ActionArgs::Workflow {
            workflow_id: identifier("workflow_id", required("workflow_id")?)?,
            expected_sha256: sha256_hex(required("expected_sha256")?)?,
        },
    };
    Ok(args)
}

/// Strings pass through; integers are rendered. Anything else is rejected.
fn scalar(key: &str, value: &Value) -> Result<String, String> {
    match value {
        Value::String(s) => Ok(s.clone()),
        Value::Number(n) if n.is_i64() || n.is_u64() => Ok(n.to_string()),
        other => Err(format!("argument '{key}' must be a string or integer, got {other}")),
    }
}

/// Identifiers travel to the target host's shell; keep them to a safe alphabet.
fn identifier(key: &str, value: String) -> Result<String, String> {
    if value.is_empty() {
        return Err(format!("argument '{key}' must not be empty"));
    }
    if let Some(c) = value
        .chars()
        .find(|c| !(c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.')))
    {
        return Err(format!("argument '{key}' contains disallowed character '{c}'"));
    }
    Ok(value)
}

fn line_count(value: &str) -> Result<u32, String> {
    match value.parse::<u32>() {
        Ok(n) if n > 0 => Ok(n),
        _ => Err(format!("argument 'lines' must be a positive integer, got '{value}'")),
    }
}

fn sha256_hex(value: String) -> Result<String, String> {
    if value.len() == 64 && value.chars().all(|c| c.is_ascii_hexdigit()) {
        Ok(value.to_ascii_lowercase())
    } else {
        Err("argument 'expected_sha256' must be 64 hex characters".to_string())
    }
}
