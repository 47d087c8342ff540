//! Durable run reports.
//!
//! A report is written exactly once, at the end of a run: serialized to a
//! temporary file in the target directory, then renamed into place, so a
//! reader never observes a partial report.

use std::io::Write;
use std::path::{Path, PathBuf};

use tracing::info;

use opsgate_contracts::{
    error::{OpsError, OpsResult},
    report::RunReport,
};

use crate::index::{append_index, file_stamp, ArtifactKind, IndexEntry};

pub struct ReportStore {
    dir: PathBuf,
}

impl ReportStore {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Persist `report` as `<dir>/<ts>_report.json` and index it.
    pub fn save(&self, report: &RunReport) -> OpsResult<PathBuf> {
        let path = self.dir.join(format!("{}_report.json", file_stamp(report.ts_utc)));
        let fail = |e: &dyn std::fmt::Display| OpsError::ReportWriteFailed {
            reason: format!("{}: {e}", path.display()),
        };

        std::fs::create_dir_all(&self.dir).map_err(|e| fail(&e))?;
        let body = serde_json::to_vec_pretty(report).map_err(|e| fail(&e))?;

        let mut tmp = tempfile::NamedTempFile::new_in(&self.dir).map_err(|e| fail(&e))?;
        tmp.write_all(&body).map_err(|e| fail(&e))?;
        tmp.as_file().sync_all().map_err(|e| fail(&e))?;
        tmp.persist_noclobber(&path).map_err(|e| fail(&e.error))?;

        append_index(
            &self.dir,
            &IndexEntry {
                ts_utc: report.ts_utc,
                kind: ArtifactKind::Report,
                path: path.display().to_string(),
                id: report.run_id.to_string(),
                label: report.status.to_string(),
            },
        )?;

        info!(run_id = %report.run_id, path = %path.display(), "run report written");
        Ok(path)
    }

    pub fn load(path: &Path) -> OpsResult<RunReport> {
        let bytes = std::fs::read(path).map_err(|e| OpsError::ConfigError {
            reason: format!("failed to read report '{}': {e}", path.display()),
        })?;
        serde_json::from_slice(&bytes).map_err(|e| OpsError::ConfigError {
            reason: format!("malformed report '{}': {e}", path.display()),
        })
    }
}
