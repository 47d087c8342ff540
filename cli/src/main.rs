//! opsgate: gate-first remote operations from one command line.
//!
//! Usage:
//!   opsgate 'site: up demo6'
//!   ALLOW_DANGEROUS=1 opsgate 'site: block demo6 apply=1 confirm=BLOCK_DEMO6'
//!   opsgate --json --plan plan.json
//!   opsgate --file task.txt
//!   opsgate --list-actions
//!   opsgate --simulate
//!
//! Exit code: 0 when the run is OK, 1 when it is FAIL or BLOCKED (or opsgate
//! itself failed), 2 for usage errors.

mod command;
mod config;
mod output;
mod runtime;

use std::path::{Path, PathBuf};
use std::process::ExitCode;

use clap::Parser;
use tracing::{debug, info};
use tracing_subscriber::EnvFilter;

use opsgate_audit::ReportStore;
use opsgate_contracts::{
    error::{OpsError, OpsResult},
    gate::SafetyConfig,
    plan::{Plan, PlanRejection},
    report::RunReport,
};
use opsgate_core::Executor;
use opsgate_policy::ManifestPolicy;

use crate::config::{Env, RuntimeConfig};

// ── CLI definition ────────────────────────────────────────────────────────────

/// Run a gated operations command against the target host.
#[derive(Parser)]
#[command(
    name = "opsgate",
    about = "Gate-first remote operations",
    long_about = "Validates a command against the action manifest, gates it on danger level,\n\
                  flags and confirm token, dispatches it over the webhook (or the allowlisted\n\
                  administrative session) and writes one report per run."
)]
struct Cli {
    /// Print one JSON object instead of text.
    #[arg(long)]
    json: bool,

    /// Runtime configuration file (TOML).
    #[arg(long, value_name = "FILE")]
    config: Option<PathBuf>,

    /// Action manifest replacing the built-in catalog.
    #[arg(long, value_name = "FILE")]
    manifest: Option<PathBuf>,

    /// Run a JSON plan (`{"summary": ..., "actions": [...]}`) instead of a command.
    #[arg(long, value_name = "FILE", conflicts_with_all = ["file", "command"])]
    plan: Option<PathBuf>,

    /// Read the command text from a file.
    #[arg(long, value_name = "FILE", conflicts_with = "command")]
    file: Option<PathBuf>,

    /// Print the action catalog and exit.
    #[arg(long)]
    list_actions: bool,

    /// Run the end-to-end scenarios against a simulated host and exit.
    #[arg(long)]
    simulate: bool,

    /// Command text, e.g. `site: up demo6 apply=1`.
    #[arg(trailing_var_arg = true)]
    command: Vec<String>,
}

/// What the run should execute. A plan file that does not decode is still
/// an input: it runs to a BLOCKED report.
enum Input {
    Plan { plan: Result<Plan, PlanRejection>, task: String },
    Command(String),
}

// ── Entry point ───────────────────────────────────────────────────────────────

fn main() -> ExitCode {
    // Logs go to stderr so `--json` stdout stays machine-readable.
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")),
        )
        .with_target(false)
        .with_writer(std::io::stderr)
        .compact()
        .init();

    let cli = Cli::parse();
    match run(cli) {
        Ok(code) => ExitCode::from(code),
        Err(e) => {
            eprintln!("opsgate: {e}");
            ExitCode::from(1)
        }
    }
}

fn run(cli: Cli) -> OpsResult<u8> {
    let env = Env::from_process();
    let config = RuntimeConfig::load(cli.config.as_deref(), &env)?;

    let manifest_path = cli.manifest.clone().or_else(|| config.manifest.path.clone());
    let policy = match &manifest_path {
        Some(path) => ManifestPolicy::from_file(path)?,
        None => ManifestPolicy::builtin()?,
    };

    if cli.list_actions {
        println!("{}", output::render_actions(policy.manifest(), cli.json)?);
        return Ok(0);
    }

    if cli.simulate {
        let outcomes = opsgate_sim::run_all()?;
        println!("{}", output::render_scenarios(&outcomes, cli.json)?);
        return Ok(if outcomes.iter().all(|o| o.passed) { 0 } else { 1 });
    }

    let input = match read_input(&cli)? {
        Some(input) => input,
        None => {
            eprintln!("usage: opsgate [--json] [--config FILE] [--plan FILE | --file FILE | COMMAND...]");
            eprintln!("       opsgate --list-actions | --simulate");
            return Ok(2);
        }
    };
    let (plan, task) = match input {
        Input::Plan { plan, task } => (plan, task),
        Input::Command(text) => (Ok(command::parse(&text, policy.manifest())), text),
    };

    let executor = runtime::build_executor(&config, policy)?;
    let report = execute(&executor, &plan, &task, env.safety())?;

    let path = ReportStore::new(config.artifacts.dir.clone()).save(&report)?;
    info!(run_id = %report.run_id, path = %path.display(), "report written");

    println!("{}", output::render_report(&report, Some(&path), cli.json)?);
    Ok(if report.exit_code() == 0 { 0 } else { 1 })
}

fn execute(
    executor: &Executor,
    plan: &Result<Plan, PlanRejection>,
    task: &str,
    safety: SafetyConfig,
) -> OpsResult<RunReport> {
    match plan {
        Ok(plan) => {
            debug!(task = %task, steps = plan.actions.len(), "plan ready");
            executor.run(plan, task, safety)
        }
        Err(rejection) => executor.reject(task, rejection.clone()),
    }
}

fn read_input(cli: &Cli) -> OpsResult<Option<Input>> {
    if let Some(path) = &cli.plan {
        let plan = opsgate_policy::decode_plan(&read_text(path)?);
        let task = match &plan {
            Ok(plan) if !plan.summary.is_empty() => plan.summary.clone(),
            _ => format!("plan: {}", path.display()),
        };
        return Ok(Some(Input::Plan { plan, task }));
    }

    let text = match &cli.file {
        Some(path) => read_text(path)?,
        None => cli.command.join(" "),
    };
    let text = text.trim();
    Ok((!text.is_empty()).then(|| Input::Command(text.to_string())))
}

fn read_text(path: &Path) -> OpsResult<String> {
    std::fs::read_to_string(path).map_err(|e| OpsError::ConfigError {
        reason: format!("failed to read '{}': {e}", path.display()),
    })
}
