//! Append-only index of everything a run leaves under the artifacts directory.

use std::fs::{self, OpenOptions};
use std::io::Write;
use std::path::Path;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use opsgate_contracts::error::{OpsError, OpsResult};

pub const INDEX_FILE: &str = "index.jsonl";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ArtifactKind {
    Output,
    Report,
}

/// One line of `index.jsonl`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IndexEntry {
    pub ts_utc: DateTime<Utc>,
    pub kind: ArtifactKind,
    pub path: String,
    /// Request id for outputs, run id for reports.
    pub id: String,
    /// `action/stream` for outputs, the run status for reports.
    pub label: String,
}

/// Filename-safe UTC timestamp, millisecond resolution.
pub fn file_stamp(ts: DateTime<Utc>) -> String {
    ts.format("%Y%m%dT%H%M%S%3fZ").to_string()
}

pub(crate) fn append_index(dir: &Path, entry: &IndexEntry) -> OpsResult<()> {
    let path = dir.join(INDEX_FILE);
    let fail = |e: &dyn std::fmt::Display| OpsError::ReportWriteFailed {
        reason: format!("{}: {e}", path.display()),
    };

    fs::create_dir_all(dir).map_err(|e| fail(&e))?;
    let mut line = serde_json::to_string(entry).map_err(|e| fail(&e))?;
    line.push('\n');

    let mut file = OpenOptions::new().create(true).append(true).open(&path).map_err(|e| fail(&e))?;
    file.write_all(line.as_bytes()).map_err(|e| fail(&e))
}

/// Read the index. A missing file is an empty index.
pub fn read_index(dir: &Path) -> OpsResult<Vec<IndexEntry>> {
    let path = dir.join(INDEX_FILE);
    let contents = match fs::read_to_string(&path) {
        Ok(c) => c,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
        Err(e) => {
            return Err(OpsError::ConfigError { reason: format!("{}: {e}", path.display()) })
        }
    };
    contents
        .lines()
        .filter(|l| !l.trim().is_empty())
        .map(|l| {
            serde_json::from_str(l).map_err(|e| OpsError::ConfigError {
                reason: format!("{}: {e}", path.display()),
            })
        })
        .collect()
}
