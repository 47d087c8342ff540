//! Action manifest schema and loading.
//!
//! A `Manifest` is deserialized from TOML and holds the catalog of known
//! actions. It is loaded once per run and immutable afterwards. Loading
//! rejects catalogs the rest of the pipeline cannot safely rely on.
//!
//! Example:
//! ```toml
//! [[actions]]
//! name = "site_block"
//! danger = "high"
//! modes = ["check", "plan", "apply"]
//! args = "site"
//! confirm = "BLOCK_{name}"
//! ```

use std::collections::BTreeSet;
use std::path::Path;

use serde::{Deserialize, Serialize};
use tracing::debug;

use opsgate_contracts::{
    action::{ActionDescriptor, ArgsShape, DangerLevel, Mode},
    error::{OpsError, OpsResult},
};

/// The catalog compiled into the binary.
pub const DEFAULT_MANIFEST: &str = include_str!("../manifest/default.toml");

/// The top-level structure deserialized from a manifest file.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Manifest {
    pub actions: Vec<ActionDescriptor>,
}

impl Manifest {
    /// Parse and check a manifest document.
    ///
    /// Returns `OpsError::ConfigError` for malformed TOML and for any
    /// descriptor that breaks a catalog rule (see `check`).
    pub fn from_toml_str(s: &str) -> OpsResult<Self> {
        let manifest: Manifest = toml::from_str(s).map_err(|e| OpsError::ConfigError {
            reason: format!("failed to parse action manifest: {e}"),
        })?;
        manifest.check()?;
        debug!(actions = manifest.actions.len(), "action manifest loaded");
        Ok(manifest)
    }

    pub fn from_file(path: &Path) -> OpsResult<Self> {
        let contents = std::fs::read_to_string(path).map_err(|e| OpsError::ConfigError {
            reason: format!("failed to read action manifest '{}': {e}", path.display()),
        })?;
        Self::from_toml_str(&contents)
    }

    /// The embedded default catalog.
    pub fn builtin() -> OpsResult<Self> {
        Self::from_toml_str(DEFAULT_MANIFEST)
    }

    pub fn get(&self, name: &str) -> Option<&ActionDescriptor> {
        self.actions.iter().find(|d| d.name == name)
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.actions.iter().map(|d| d.name.as_str())
    }

    fn check(&self) -> OpsResult<()> {
        let mut seen = BTreeSet::new();
        for d in &self.actions {
            let bad = |why: String| OpsError::ConfigError {
                reason: format!("action '{}': {why}", d.name),
            };

            if d.name.trim().is_empty() {
                return Err(OpsError::ConfigError { reason: "action with an empty name".into() });
            }
            if !seen.insert(d.name.as_str()) {
                return Err(bad("declared more than once".into()));
            }
            if d.modes.is_empty() {
                return Err(bad("declares no modes".into()));
            }
            if !d.idempotent {
                return Err(bad("is not idempotent; every action must be".into()));
            }
            if d.danger == DangerLevel::High && d.supports(Mode::Apply) && d.confirm.is_none() {
                return Err(bad("high danger apply needs a confirm token".into()));
            }
            if let Some(template) = &d.confirm {
                check_placeholders(template, d.args).map_err(bad)?;
            }
            if d.guarded {
                if d.args != ArgsShape::Workflow {
                    return Err(bad("guarded actions must take workflow arguments".into()));
                }
                if !d.supports(Mode::Check) {
                    return Err(bad("guarded actions must support check mode".into()));
                }
            }
        }
        Ok(())
    }
}

/// Every `{field}` in a confirm template must name a required argument.
fn check_placeholders(template: &str, shape: ArgsShape) -> Result<(), String> {
    let mut rest = template;
    while let Some(open) = rest.find('{') {
        let after = &rest[open + 1..];
        let close = after
            .find('}')
            .ok_or_else(|| format!("unterminated placeholder in confirm '{template}'"))?;
        let key = &after[..close];
        if !shape.keys().iter().any(|(k, required)| *k == key && *required) {
            return Err(format!("confirm placeholder '{{{key}}}' is not a required argument"));
        }
        rest = &after[close + 1..];
    }
    Ok(())
}
