//! What the binary prints on stdout.
//!
//! Text output stays at two or three short lines so it can be relayed to a
//! chat as is; `--json` prints one compact object per invocation.

use std::path::Path;

use serde::Serialize;
use serde_json::json;

use opsgate_contracts::{
    error::{OpsError, OpsResult},
    report::{RunReport, RunStatus},
};
use opsgate_policy::Manifest;
use opsgate_sim::ScenarioOutcome;

#[derive(Debug, Serialize)]
struct RunSummary<'a> {
    ok: bool,
    status: RunStatus,
    summary: &'a str,
    report: Option<String>,
    exit_code: i32,
    next_cmd: Option<&'a str>,
}

fn to_json(value: &impl Serialize) -> OpsResult<String> {
    serde_json::to_string(value).map_err(|e| OpsError::ReportWriteFailed {
        reason: format!("failed to render JSON output: {e}"),
    })
}

pub fn render_report(report: &RunReport, path: Option<&Path>, json: bool) -> OpsResult<String> {
    if json {
        return to_json(&RunSummary {
            ok: report.is_ok(),
            status: report.status,
            summary: &report.summary,
            report: path.map(|p| p.display().to_string()),
            exit_code: report.exit_code(),
            next_cmd: report.next_cmd.as_deref(),
        });
    }

    let mut lines = vec![report.summary.clone()];
    if let Some(path) = path {
        lines.push(format!("report: {}", path.display()));
    }
    if let Some(next) = &report.next_cmd {
        lines.push(format!("next: {next}"));
    }
    if let Some(hc) = &report.post_apply_healthcheck {
        if hc.passed() {
            lines.push("healthcheck: passed".to_string());
        } else {
            lines.push(format!("healthcheck: {}", hc.warnings.join("; ")));
        }
    }
    Ok(lines.join("\n"))
}

pub fn render_actions(manifest: &Manifest, json: bool) -> OpsResult<String> {
    let descriptors: Vec<_> = manifest.names().filter_map(|name| manifest.get(name)).collect();
    if json {
        return to_json(&descriptors);
    }

    let lines: Vec<String> = descriptors
        .iter()
        .map(|d| {
            let modes: Vec<&str> = d.modes.iter().map(|m| m.as_str()).collect();
            let keys: Vec<&str> = d.args.keys().iter().map(|(k, _)| *k).collect();
            let mut line = format!("{:<14} {:<7} {:<17}", d.name, d.danger, modes.join(","));
            if !keys.is_empty() {
                line.push_str(&format!(" args={}", keys.join(",")));
            }
            if let Some(confirm) = &d.confirm {
                line.push_str(&format!(" confirm={confirm}"));
            }
            line.trim_end().to_string()
        })
        .collect();
    Ok(lines.join("\n"))
}

pub fn render_scenarios(outcomes: &[ScenarioOutcome], json: bool) -> OpsResult<String> {
    if json {
        let rows: Vec<_> = outcomes
            .iter()
            .map(|o| {
                json!({
                    "name": o.name,
                    "passed": o.passed,
                    "status": o.report.status,
                    "summary": o.report.summary,
                })
            })
            .collect();
        return to_json(&rows);
    }

    let lines: Vec<String> = outcomes
        .iter()
        .enumerate()
        .map(|(i, o)| {
            let verdict = if o.passed { "PASS" } else { "FAIL" };
            format!("[{verdict}] scenario {} {}: {}", i + 1, o.name, o.report.summary)
        })
        .collect();
    Ok(lines.join("\n"))
}
