//! The operator command grammar.
//!
//! ```text
//! command := step (";" step)*
//! step    := [domain ":"] word* option*
//! option  := key "=" value
//! ```
//!
//! Words resolve to the longest manifest name formed by joining them with
//! `_`, with or without the domain prefix, so `site: block demo6` becomes
//! `site_block` with `name = demo6`. Words left over after the name fill
//! the action's positional arguments in order.
//!
//! Options `apply=1`, `plan=1`, `mode=<m>` and `confirm=<token>` are
//! understood here; every other option becomes an argument. Values stay
//! strings exactly as typed (`007` is not `7`); the validator types them.
//! Parsing never
//! fails: anything that does not resolve is passed on under its joined name
//! so the plan validator can name it.

use serde_json::Value;

use opsgate_contracts::{
    action::Mode,
    plan::{Plan, PlanStep},
};
use opsgate_policy::Manifest;

/// Parse a whole command line into a candidate plan.
pub fn parse(text: &str, manifest: &Manifest) -> Plan {
    let actions = text
        .split(';')
        .map(str::trim)
        .filter(|segment| !segment.is_empty())
        .map(|segment| parse_step(segment, manifest))
        .collect();
    Plan { summary: text.trim().to_string(), actions }
}

fn parse_step(segment: &str, manifest: &Manifest) -> PlanStep {
    let (domain, rest) = split_domain(segment);

    let mut words = Vec::new();
    let mut options = Vec::new();
    for token in rest.split_whitespace() {
        match token.split_once('=') {
            Some((key, value)) if !key.is_empty() => options.push((key, value)),
            _ => words.push(token),
        }
    }

    let mut step = resolve(domain, &words, manifest);

    for (key, value) in options {
        match key {
            "apply" if truthy(value) => step.mode = Mode::Apply.to_string(),
            "plan" if truthy(value) => step.mode = Mode::Plan.to_string(),
            "apply" | "plan" => {}
            "mode" => step.mode = value.to_string(),
            "confirm" => step.confirm_token = Some(value.to_string()),
            _ => {
                step.args.insert(key.to_string(), Value::from(value));
            }
        }
    }
    step
}

/// `site: up demo6` -> (`Some("site")`, `up demo6`). A colon only marks a
/// domain when it ends the first token.
fn split_domain(segment: &str) -> (Option<&str>, &str) {
    if let Some((head, rest)) = segment.split_once(':') {
        let head = head.trim();
        if !head.is_empty() && !head.contains(char::is_whitespace) && !head.contains('=') {
            return (Some(head), rest.trim());
        }
    }
    (None, segment)
}

fn resolve(domain: Option<&str>, words: &[&str], manifest: &Manifest) -> PlanStep {
    for taken in (0..=words.len()).rev() {
        let joined = words[..taken].join("_");
        let candidates = [
            domain.map(|d| if joined.is_empty() { d.to_string() } else { format!("{d}_{joined}") }),
            (!joined.is_empty()).then(|| joined.clone()),
        ];

        for name in candidates.into_iter().flatten() {
            let Some(descriptor) = manifest.get(&name) else { continue };
            let positional = &words[taken..];
            let keys = descriptor.args.keys();
            if positional.len() > keys.len() {
                continue;
            }
            let mut step = PlanStep::new(name, Mode::Check);
            for ((key, _), value) in keys.iter().zip(positional) {
                step.args.insert(key.to_string(), Value::from(*value));
            }
            return step;
        }
    }

    let mut name: Vec<&str> = domain.into_iter().collect();
    name.extend(words);
    PlanStep::new(name.join("_"), Mode::Check)
}

fn truthy(value: &str) -> bool {
    matches!(value.to_ascii_lowercase().as_str(), "1" | "true" | "yes")
}
