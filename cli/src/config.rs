//! Runtime configuration.
//!
//! Settings come from an optional TOML file, then the process environment is
//! overlaid. The environment is read exactly once, in `main`, into an `Env`
//! snapshot; nothing below this module looks at process state.
//!
//! ```toml
//! [primary]
//! url = "https://n8n.example.org/webhook/agent-exec"
//! timeout_secs = 30
//!
//! [fallback]
//! host = "ops@edge.example.org"
//! allowlist = ["healthz", "site_up"]
//!
//! [artifacts]
//! dir = "artifacts"
//! ```

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::Deserialize;

use opsgate_contracts::{
    error::{OpsError, OpsResult},
    gate::{SafetyConfig, DANGEROUS_ENV, WRITE_ENV},
};
use opsgate_core::{DEFAULT_FALLBACK_ALLOWLIST, DEFAULT_FORCED_FALLBACK, DEFAULT_MAX_INLINE_OUTPUT};

/// Explicit config file path.
pub const CONFIG_ENV: &str = "OPSGATE_CONFIG";
/// Config file picked up from the working directory when present.
pub const DEFAULT_CONFIG_FILE: &str = "opsgate.toml";

pub const BASE_URL_ENV: &str = "N8N_BASE_URL";
pub const API_KEY_ENV: &str = "N8N_API_KEY";
pub const EXEC_URL_ENV: &str = "AGENT_EXEC_URL";
/// Wins over every other source of the primary URL. Used to force fallback.
pub const EXEC_URL_OVERRIDE_ENV: &str = "AGENT_EXEC_URL_OVERRIDE";

const WEBHOOK_PATH: &str = "/webhook/agent-exec";

// ── Environment snapshot ─────────────────────────────────────────────────────

/// The environment variables opsgate recognizes, captured once.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Env {
    vars: BTreeMap<String, String>,
}

impl Env {
    const KEYS: [&'static str; 7] = [
        DANGEROUS_ENV,
        WRITE_ENV,
        BASE_URL_ENV,
        API_KEY_ENV,
        EXEC_URL_ENV,
        EXEC_URL_OVERRIDE_ENV,
        CONFIG_ENV,
    ];

    pub fn from_process() -> Self {
        let vars = Self::KEYS
            .iter()
            .filter_map(|key| std::env::var(key).ok().map(|v| (key.to_string(), v)))
            .collect();
        Self { vars }
    }

    pub fn from_pairs<'a>(pairs: impl IntoIterator<Item = (&'a str, &'a str)>) -> Self {
        let vars = pairs.into_iter().map(|(k, v)| (k.to_string(), v.to_string())).collect();
        Self { vars }
    }

    /// A set, non-blank variable.
    pub fn get(&self, key: &str) -> Option<&str> {
        self.vars.get(key).map(|v| v.trim()).filter(|v| !v.is_empty())
    }

    /// Switches are on only when set to exactly `1`.
    pub fn flag(&self, key: &str) -> bool {
        self.get(key) == Some("1")
    }

    pub fn safety(&self) -> SafetyConfig {
        SafetyConfig {
            dangerous_allowed: self.flag(DANGEROUS_ENV),
            write_allowed: self.flag(WRITE_ENV),
        }
    }
}

// ── File sections ────────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct PrimaryConfig {
    pub url: Option<String>,
    pub timeout_secs: u64,
    /// Only ever taken from the environment.
    #[serde(skip)]
    pub api_key: Option<String>,
}

impl Default for PrimaryConfig {
    fn default() -> Self {
        Self { url: None, timeout_secs: 30, api_key: None }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct FallbackConfig {
    /// `user@host` of the administrative session. No host, no fallback.
    pub host: Option<String>,
    pub program: String,
    pub options: Vec<String>,
    pub remote_command: String,
    pub timeout_secs: u64,
    pub allowlist: Vec<String>,
    pub forced: Vec<String>,
}

impl Default for FallbackConfig {
    fn default() -> Self {
        Self {
            host: None,
            program: "ssh".into(),
            options: vec!["-o".into(), "BatchMode=yes".into()],
            remote_command: "sudo /usr/local/sbin/iibot dispatch".into(),
            timeout_secs: 30,
            allowlist: DEFAULT_FALLBACK_ALLOWLIST.iter().map(|s| s.to_string()).collect(),
            forced: DEFAULT_FORCED_FALLBACK.iter().map(|s| s.to_string()).collect(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct AuditConfig {
    /// Local hash-chained journal.
    pub journal: PathBuf,
    /// The target host's own audit log, searched after an apply.
    pub remote_log: String,
}

impl Default for AuditConfig {
    fn default() -> Self {
        Self {
            journal: PathBuf::from("artifacts/audit.jsonl"),
            remote_log: "/var/log/iibot/audit.jsonl".into(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct HealthcheckConfig {
    pub url: Option<String>,
    pub timeout_secs: u64,
}

impl Default for HealthcheckConfig {
    fn default() -> Self {
        Self { url: None, timeout_secs: 10 }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ArtifactsConfig {
    pub dir: PathBuf,
    pub max_inline_output: usize,
}

impl Default for ArtifactsConfig {
    fn default() -> Self {
        Self { dir: PathBuf::from("artifacts"), max_inline_output: DEFAULT_MAX_INLINE_OUTPUT }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ManifestConfig {
    /// Replaces the compiled-in catalog.
    pub path: Option<PathBuf>,
}

// ── RuntimeConfig ────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct RuntimeConfig {
    pub primary: PrimaryConfig,
    pub fallback: FallbackConfig,
    pub audit: AuditConfig,
    pub healthcheck: HealthcheckConfig,
    pub artifacts: ArtifactsConfig,
    pub manifest: ManifestConfig,
}

impl RuntimeConfig {
    pub fn from_toml_str(s: &str) -> OpsResult<Self> {
        toml::from_str(s).map_err(|e| OpsError::ConfigError {
            reason: format!("failed to parse config TOML: {e}"),
        })
    }

    pub fn from_file(path: &Path) -> OpsResult<Self> {
        let text = std::fs::read_to_string(path).map_err(|e| OpsError::ConfigError {
            reason: format!("failed to read config file '{}': {e}", path.display()),
        })?;
        Self::from_toml_str(&text)
    }

    /// Load from `explicit`, else `$OPSGATE_CONFIG`, else `./opsgate.toml` if
    /// it exists, else defaults; then overlay `env`.
    pub fn load(explicit: Option<&Path>, env: &Env) -> OpsResult<Self> {
        let path = explicit
            .map(Path::to_path_buf)
            .or_else(|| env.get(CONFIG_ENV).map(PathBuf::from))
            .or_else(|| {
                let local = PathBuf::from(DEFAULT_CONFIG_FILE);
                local.is_file().then_some(local)
            });

        let mut config = match path {
            Some(path) => Self::from_file(&path)?,
            None => Self::default(),
        };
        config.apply_env(env);
        Ok(config)
    }

    /// Overlay the endpoint settings from the environment.
    ///
    /// Primary URL precedence: `AGENT_EXEC_URL_OVERRIDE`, `AGENT_EXEC_URL`,
    /// the file's `[primary] url`, then one derived from `N8N_BASE_URL`.
    pub fn apply_env(&mut self, env: &Env) {
        let derived = env.get(BASE_URL_ENV).map(webhook_url);
        self.primary.url = env
            .get(EXEC_URL_OVERRIDE_ENV)
            .or_else(|| env.get(EXEC_URL_ENV))
            .map(str::to_string)
            .or_else(|| self.primary.url.take())
            .or(derived);
        self.primary.api_key = env.get(API_KEY_ENV).map(str::to_string);
    }

    pub fn primary_timeout(&self) -> Duration {
        Duration::from_secs(self.primary.timeout_secs)
    }

    pub fn fallback_timeout(&self) -> Duration {
        Duration::from_secs(self.fallback.timeout_secs)
    }

    pub fn healthcheck_timeout(&self) -> Duration {
        Duration::from_secs(self.healthcheck.timeout_secs)
    }
}

/// `https://n8n.example.org/api/v1` -> `https://n8n.example.org/webhook/agent-exec`.
pub fn webhook_url(base: &str) -> String {
    let base = base.trim_end_matches('/');
    let base = base.strip_suffix("/api/v1").unwrap_or(base);
    format!("{base}{WEBHOOK_PATH}")
}

#[cfg(test)]
mod tests {
    use super::*;

    // ── Environment ──────────────────────────────────────────────────────────

    #[test]
    fn only_exact_one_enables_a_switch() {
        let env = Env::from_pairs([(DANGEROUS_ENV, "1"), (WRITE_ENV, "true")]);
        assert_eq!(env.safety(), SafetyConfig { dangerous_allowed: true, write_allowed: false });
        assert_eq!(Env::default().safety(), SafetyConfig::locked());
        assert!(Env::from_pairs([(DANGEROUS_ENV, " 1 ")]).flag(DANGEROUS_ENV));
    }

    #[test]
    fn webhook_url_is_derived_from_base() {
        assert_eq!(webhook_url("https://n8n.example.org/api/v1/"), "https://n8n.example.org/webhook/agent-exec");
        assert_eq!(webhook_url("http://10.0.0.5:5678"), "http://10.0.0.5:5678/webhook/agent-exec");
    }

    #[test]
    fn override_wins_over_every_other_source() {
        let mut config = RuntimeConfig::from_toml_str("[primary]\nurl = \"http://file\"\n").unwrap();
        config.apply_env(&Env::from_pairs([
            (BASE_URL_ENV, "http://base/api/v1"),
            (EXEC_URL_ENV, "http://exec"),
            (EXEC_URL_OVERRIDE_ENV, "http://127.0.0.1:9/dead"),
            (API_KEY_ENV, "k"),
        ]));
        assert_eq!(config.primary.url.as_deref(), Some("http://127.0.0.1:9/dead"));
        assert_eq!(config.primary.api_key.as_deref(), Some("k"));
    }

    #[test]
    fn file_url_wins_over_derived_base() {
        let mut config = RuntimeConfig::from_toml_str("[primary]\nurl = \"http://file\"\n").unwrap();
        config.apply_env(&Env::from_pairs([(BASE_URL_ENV, "http://base")]));
        assert_eq!(config.primary.url.as_deref(), Some("http://file"));

        let mut bare = RuntimeConfig::default();
        bare.apply_env(&Env::from_pairs([(BASE_URL_ENV, "http://base")]));
        assert_eq!(bare.primary.url.as_deref(), Some("http://base/webhook/agent-exec"));
    }

    // ── File ─────────────────────────────────────────────────────────────────

    #[test]
    fn defaults_match_documentation() {
        let config = RuntimeConfig::default();
        assert_eq!(config.primary_timeout(), Duration::from_secs(30));
        assert_eq!(config.healthcheck_timeout(), Duration::from_secs(10));
        assert_eq!(config.fallback.program, "ssh");
        assert_eq!(config.fallback.forced, vec!["restart_n8n"]);
        assert!(config.fallback.allowlist.contains(&"site_block".to_string()));
        assert_eq!(config.artifacts.max_inline_output, 800);
        assert!(config.fallback.host.is_none());
    }

    #[test]
    fn partial_file_keeps_other_defaults() {
        let config = RuntimeConfig::from_toml_str(
            r#"
            [fallback]
            host = "ops@edge"
            allowlist = ["healthz"]

            [artifacts]
            dir = "/tmp/opsgate"
            "#,
        )
        .unwrap();

        assert_eq!(config.fallback.host.as_deref(), Some("ops@edge"));
        assert_eq!(config.fallback.allowlist, vec!["healthz"]);
        assert_eq!(config.fallback.remote_command, "sudo /usr/local/sbin/iibot dispatch");
        assert_eq!(config.artifacts.dir, PathBuf::from("/tmp/opsgate"));
        assert_eq!(config.artifacts.max_inline_output, 800);
    }

    #[test]
    fn unknown_keys_and_bad_files_are_config_errors() {
        let err = RuntimeConfig::from_toml_str("[primary]\nurll = \"x\"\n").unwrap_err();
        assert!(matches!(err, OpsError::ConfigError { .. }));

        let err = RuntimeConfig::from_file(Path::new("/nonexistent/opsgate.toml")).unwrap_err();
        assert!(err.to_string().contains("/nonexistent/opsgate.toml"));
    }

    #[test]
    fn load_prefers_explicit_path() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("ops.toml");
        std::fs::write(&path, "[healthcheck]\nurl = \"http://edge/healthz\"\n").unwrap();

        let config = RuntimeConfig::load(Some(&path), &Env::from_pairs([(CONFIG_ENV, "/nonexistent")])).unwrap();

        assert_eq!(config.healthcheck.url.as_deref(), Some("http://edge/healthz"));
    }
}
