//! File-backed `ArtifactSink`: full copies of outputs too long to keep inline.

use std::fs;
use std::path::PathBuf;

use chrono::Utc;
use tracing::debug;

use opsgate_contracts::{
    error::{OpsError, OpsResult},
    execution::RequestId,
};
use opsgate_core::traits::ArtifactSink;

use crate::index::{append_index, file_stamp, ArtifactKind, IndexEntry};

pub struct FileArtifactStore {
    dir: PathBuf,
}

impl FileArtifactStore {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }
}

impl ArtifactSink for FileArtifactStore {
    /// Writes `<dir>/<ts>_<action>_<request_id>.log` for stdout and
    /// `..._stderr.log` for stderr, then indexes it.
    fn spill(&self, request_id: &RequestId, action: &str, stream: &str, content: &str) -> OpsResult<String> {
        let now = Utc::now();
        let suffix = if stream == "stdout" { String::new() } else { format!("_{stream}") };
        let name = format!("{}_{action}_{request_id}{suffix}.log", file_stamp(now));
        let path = self.dir.join(name);

        fs::create_dir_all(&self.dir)
            .and_then(|_| fs::write(&path, content))
            .map_err(|e| OpsError::ReportWriteFailed {
                reason: format!("{}: {e}", path.display()),
            })?;

        let shown = path.display().to_string();
        append_index(
            &self.dir,
            &IndexEntry {
                ts_utc: now,
                kind: ArtifactKind::Output,
                path: shown.clone(),
                id: request_id.to_string(),
                label: format!("{action}/{stream}"),
            },
        )?;

        debug!(request_id = %request_id, path = %shown, bytes = content.len(), "output spilled");
        Ok(shown)
    }
}
