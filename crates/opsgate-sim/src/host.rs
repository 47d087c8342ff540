//! A simulated target host.
//!
//! `SimHost` plays the on-host dispatcher: it answers `DispatchRequest`s
//! with dispatcher-shaped JSON, keeps per-site state, a workflow store and
//! an append-only audit log with one line per request it served. Clones
//! share state, so a test can keep one handle while transports hold others.
//!
//! The dispatcher re-checks confirm tokens on its side, the way the real
//! host-side tool does, so a request that slipped past the gate would still
//! be refused here.

use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::sync::{Arc, Mutex, MutexGuard};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use tracing::debug;

use opsgate_contracts::{
    action::Mode,
    execution::{Channel, DispatchParams, DispatchRequest},
};

/// Log lines returned by `caddy_logs` when no `lines` argument is given.
pub const DEFAULT_LOG_LINES: u64 = 50;

/// Public state of a managed site.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SiteState {
    Up,
    Down,
    Blocked,
}

impl SiteState {
    /// Status the edge proxy answers with for a site in this state.
    pub fn http_status(self) -> u16 {
        match self {
            SiteState::Up => 200,
            SiteState::Down => 502,
            SiteState::Blocked => 404,
        }
    }
}

impl fmt::Display for SiteState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            SiteState::Up => "up",
            SiteState::Down => "down",
            SiteState::Blocked => "blocked",
        };
        f.write_str(s)
    }
}

/// A stored automation workflow.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Workflow {
    pub definition: String,
    pub active: bool,
}

/// One line of the host's own audit log.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HostLogLine {
    pub ts: DateTime<Utc>,
    pub request_id: String,
    pub action: String,
    pub mode: Mode,
    pub channel: Channel,
    pub ok: bool,
    pub changed: bool,
}

#[derive(Debug)]
struct HostState {
    sites: BTreeMap<String, SiteState>,
    workflows: BTreeMap<String, Workflow>,
    automation_running: bool,
    restarts: u32,
    backups: u32,
    failing: BTreeSet<String>,
    log: Vec<HostLogLine>,
}

impl Default for HostState {
    fn default() -> Self {
        Self {
            sites: BTreeMap::new(),
            workflows: BTreeMap::new(),
            automation_running: true,
            restarts: 0,
            backups: 0,
            failing: BTreeSet::new(),
            log: Vec::new(),
        }
    }
}

/// What an action did: `Ok((stdout, changed))` or `Err(stderr)`.
type Outcome = Result<(String, bool), String>;

#[derive(Clone, Default)]
pub struct SimHost {
    state: Arc<Mutex<HostState>>,
}

impl SimHost {
    pub fn new() -> Self {
        Self::default()
    }

    /// The demo host: six sites (`demo5` down), one inactive workflow.
    pub fn demo() -> Self {
        let host = Self::new();
        for i in 1..=6 {
            let state = if i == 5 { SiteState::Down } else { SiteState::Up };
            host.set_site(&format!("demo{i}"), state);
        }
        host.put_workflow("agent-exec", DEMO_WORKFLOW, false);
        host
    }

    fn lock(&self) -> MutexGuard<'_, HostState> {
        // Poisoning is ignored; host state stays readable.
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    // ── Fixture setup ────────────────────────────────────────────────────────

    pub fn set_site(&self, name: &str, state: SiteState) {
        self.lock().sites.insert(name.to_string(), state);
    }

    pub fn put_workflow(&self, id: &str, definition: &str, active: bool) {
        self.lock()
            .workflows
            .insert(id.to_string(), Workflow { definition: definition.to_string(), active });
    }

    /// Make the dispatcher report failure for every request for `action`.
    pub fn fail_action(&self, action: &str) {
        self.lock().failing.insert(action.to_string());
    }

    pub fn stop_automation(&self) {
        self.lock().automation_running = false;
    }

    // ── Inspection ───────────────────────────────────────────────────────────

    pub fn site(&self, name: &str) -> Option<SiteState> {
        self.lock().sites.get(name).copied()
    }

    /// What the edge proxy answers for `name`; unknown sites are 404.
    pub fn http_status(&self, name: &str) -> u16 {
        self.site(name).map_or(404, SiteState::http_status)
    }

    pub fn workflow(&self, id: &str) -> Option<Workflow> {
        self.lock().workflows.get(id).cloned()
    }

    pub fn automation_running(&self) -> bool {
        self.lock().automation_running
    }

    pub fn restarts(&self) -> u32 {
        self.lock().restarts
    }

    pub fn backups(&self) -> u32 {
        self.lock().backups
    }

    /// The host audit log, oldest first.
    pub fn log(&self) -> Vec<HostLogLine> {
        self.lock().log.clone()
    }

    /// The log as the JSONL text a remote `grep` would see.
    pub fn log_text(&self) -> String {
        self.log()
            .iter()
            .filter_map(|line| serde_json::to_string(line).ok())
            .map(|line| line + "\n")
            .collect()
    }

    pub fn logged(&self, request_id: &str) -> bool {
        self.lock().log.iter().any(|line| line.request_id == request_id)
    }

    // ── Dispatcher ───────────────────────────────────────────────────────────

    /// Serve one request arriving over `channel` and return the reply body.
    pub fn dispatch(&self, request: &DispatchRequest, channel: Channel) -> Value {
        let params = &request.params;
        let mut state = self.lock();

        let outcome = state.serve(params);
        let (ok, stdout, stderr, changed) = match outcome {
            Ok((stdout, changed)) => (true, stdout, String::new(), changed),
            Err(stderr) => (false, String::new(), stderr, false),
        };

        state.log.push(HostLogLine {
            ts: Utc::now(),
            request_id: request.request_id.to_string(),
            action: params.action.clone(),
            mode: params.mode,
            channel,
            ok,
            changed,
        });
        debug!(
            request_id = %request.request_id,
            action = %params.action,
            mode = %params.mode,
            %channel,
            ok,
            changed,
            "simulated host served request"
        );

        json!({
            "ok": ok,
            "exit_code": if ok { 0 } else { 1 },
            "action": params.action,
            "mode": params.mode,
            "stdout": stdout,
            "stderr": stderr,
            "artifacts": [],
            "meta": { "changed": changed, "warnings": [] },
            "request_id": request.request_id,
        })
    }
}

impl HostState {
    fn serve(&mut self, params: &DispatchParams) -> Outcome {
        let action = params.action.as_str();
        if self.failing.contains(action) {
            return Err(format!("{action}: simulated failure"));
        }
        if params.mode == Mode::Apply {
            check_confirm(params)?;
        }

        match (action, params.mode) {
            ("docker_status", Mode::Check) => Ok((self.containers(), false)),
            ("healthz", Mode::Check) => Ok((self.health(), false)),
            ("caddy_logs", Mode::Check) => {
                let lines = params.args.get("lines").and_then(Value::as_u64).unwrap_or(DEFAULT_LOG_LINES);
                let text: Vec<String> =
                    (1..=lines).map(|i| format!("caddy[{i}]: \"GET / HTTP/2.0\" 200")).collect();
                Ok((text.join("\n"), false))
            }
            ("backup_now", Mode::Plan) => {
                Ok((format!("would snapshot {} site volume(s)", self.sites.len()), false))
            }
            ("backup_now", Mode::Apply) => {
                self.backups += 1;
                Ok((format!("snapshot #{} written", self.backups), true))
            }
            ("site_up" | "site_block" | "site_unblock", mode) => self.site_action(action, mode, params),
            ("restart_n8n", Mode::Check) => Ok((self.automation_line(), false)),
            ("restart_n8n", Mode::Plan) => Ok(("would restart n8n".to_string(), false)),
            ("restart_n8n", Mode::Apply) => {
                self.restarts += 1;
                self.automation_running = true;
                Ok((format!("n8n restarted ({} total)", self.restarts), true))
            }
            ("all_fix", mode) => Ok(self.all_fix(mode)),
            ("workflow_put", mode) => self.workflow_action(mode, params),
            (other, mode) => Err(format!("unsupported request: {other} {mode}")),
        }
    }

    fn containers(&self) -> String {
        let n8n = if self.automation_running { "running" } else { "exited" };
        let mut lines = vec!["caddy running".to_string(), format!("n8n {n8n}")];
        lines.extend(self.sites.iter().map(|(name, state)| {
            let container = if *state == SiteState::Down { "exited" } else { "running" };
            format!("{name} {container}")
        }));
        lines.join("\n")
    }

    fn health(&self) -> String {
        self.sites
            .iter()
            .map(|(name, state)| format!("{name}: HTTP {}", state.http_status()))
            .collect::<Vec<_>>()
            .join("\n")
    }

    fn automation_line(&self) -> String {
        if self.automation_running { "n8n running".into() } else { "n8n exited".into() }
    }

    fn site_action(&mut self, action: &str, mode: Mode, params: &DispatchParams) -> Outcome {
        let name = string_arg(params, "name")?;
        let current = *self.sites.get(&name).ok_or_else(|| format!("unknown site '{name}'"))?;

        let target = match (action, current) {
            ("site_up", SiteState::Blocked) => {
                return Err(format!("{name} is blocked; unblock it first"));
            }
            ("site_up", _) => SiteState::Up,
            ("site_block", _) => SiteState::Blocked,
            (_, SiteState::Blocked) => SiteState::Up,
            (_, other) => other,
        };

        match mode {
            Mode::Check => Ok((format!("{name}: {current} (HTTP {})", current.http_status()), false)),
            Mode::Plan if target == current => Ok((format!("{name}: already {current}"), false)),
            Mode::Plan => Ok((format!("{name}: {current} -> {target}"), false)),
            Mode::Apply => {
                self.sites.insert(name.clone(), target);
                Ok((format!("{name}: {target}"), target != current))
            }
        }
    }

    fn all_fix(&mut self, mode: Mode) -> (String, bool) {
        let down: Vec<String> = self
            .sites
            .iter()
            .filter(|(_, state)| **state == SiteState::Down)
            .map(|(name, _)| name.clone())
            .collect();
        let restart = !self.automation_running;

        let mut lines: Vec<String> = down.iter().map(|name| format!("{name}: down -> up")).collect();
        if restart {
            lines.push("n8n: exited -> running".to_string());
        }
        if lines.is_empty() {
            lines.push("nothing to fix".to_string());
        }

        let changed = !down.is_empty() || restart;
        if mode == Mode::Apply {
            for name in down {
                self.sites.insert(name, SiteState::Up);
            }
            self.automation_running = true;
            return (lines.join("\n"), changed);
        }
        (lines.join("\n"), false)
    }

    fn workflow_action(&mut self, mode: Mode, params: &DispatchParams) -> Outcome {
        let id = string_arg(params, "workflow_id")?;
        let workflow = self.workflows.get_mut(&id).ok_or_else(|| format!("unknown workflow '{id}'"))?;

        match mode {
            Mode::Check => Ok((workflow.definition.clone(), false)),
            Mode::Plan if workflow.active => Ok((format!("{id}: already active"), false)),
            Mode::Plan => Ok((format!("{id}: would publish and activate"), false)),
            Mode::Apply => {
                let changed = !workflow.active;
                workflow.active = true;
                Ok((format!("{id}: active"), changed))
            }
        }
    }
}

fn string_arg(params: &DispatchParams, key: &str) -> Result<String, String> {
    params
        .args
        .get(key)
        .and_then(Value::as_str)
        .map(str::to_string)
        .ok_or_else(|| format!("missing argument '{key}'"))
}

/// Host-side copy of the confirm tokens for high-danger applies.
fn check_confirm(params: &DispatchParams) -> Result<(), String> {
    let upper = |key: &str| string_arg(params, key).map(|v| v.to_uppercase());
    let expected = match params.action.as_str() {
        "site_block" => format!("BLOCK_{}", upper("name")?),
        "restart_n8n" => "RESTART_N8N".to_string(),
        "all_fix" => "ALL_FIX".to_string(),
        "workflow_put" => format!("PUT_{}", upper("workflow_id")?),
        _ => return Ok(()),
    };
    if params.confirm.as_deref() == Some(expected.as_str()) {
        Ok(())
    } else {
        Err(format!("{}: refused, confirm={expected} required", params.action))
    }
}

/// Definition stored for the demo workflow.
pub const DEMO_WORKFLOW: &str =
    r#"{"name":"agent-exec","nodes":[{"type":"webhook","path":"agent-exec"},{"type":"ssh","command":"iibot dispatch"}]}"#;
