//! JSONL file implementation of `AuditWriter`.
//!
//! Each `AuditEvent` is one line of the journal. The file is opened in
//! append mode for every write and never truncated or rewritten.

use std::collections::HashMap;
use std::fs::{self, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use tracing::{debug, info};

use opsgate_contracts::{
    error::{OpsError, OpsResult},
    execution::AuditRecord,
};
use opsgate_core::traits::AuditWriter;

use crate::{
    chain::verify_runs,
    event::{AuditEvent, ChainHead},
};

pub struct FileAuditWriter {
    path: PathBuf,
    heads: Mutex<HashMap<String, ChainHead>>,
}

impl FileAuditWriter {
    /// Journal at `path`. Parent directories are created on first write.
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into(), heads: Mutex::new(HashMap::new()) }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn append(&self, event: &AuditEvent) -> OpsResult<()> {
        let fail = |e: &dyn std::fmt::Display| OpsError::AuditWriteFailed {
            reason: format!("{}: {e}", self.path.display()),
        };

        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent).map_err(|e| fail(&e))?;
        }
        let mut line = serde_json::to_string(event).map_err(|e| fail(&e))?;
        line.push('\n');

        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)
            .map_err(|e| fail(&e))?;
        file.write_all(line.as_bytes()).map_err(|e| fail(&e))?;
        file.flush().map_err(|e| fail(&e))
    }
}

impl AuditWriter for FileAuditWriter {
    fn write(&self, run_id: &str, record: &AuditRecord) -> OpsResult<()> {
        let mut heads = self.heads.lock().map_err(|e| OpsError::AuditWriteFailed {
            reason: format!("audit state lock poisoned: {e}"),
        })?;

        // Advance the cursor only once the line is on disk.
        let mut head = heads.get(run_id).cloned().unwrap_or_default();
        let event = head.link(run_id, record);
        self.append(&event)?;
        heads.insert(run_id.to_string(), head);

        debug!(
            run_id = %run_id,
            request_id = %record.request_id,
            sequence = event.sequence,
            "audit event appended"
        );
        Ok(())
    }

    fn finalize(&self, run_id: &str) -> OpsResult<()> {
        let mut heads = self.heads.lock().map_err(|e| OpsError::AuditWriteFailed {
            reason: format!("audit state lock poisoned: {e}"),
        })?;
        let head = heads.remove(run_id).unwrap_or_default();

        info!(
            run_id = %run_id,
            event_count = head.sequence,
            terminal_hash = %head.last_hash,
            journal = %self.path.display(),
            "audit chain finalized"
        );
        Ok(())
    }
}

/// Read every event of a journal. A missing file is an empty journal.
pub fn read_journal(path: &Path) -> OpsResult<Vec<AuditEvent>> {
    let contents = match fs::read_to_string(path) {
        Ok(c) => c,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
        Err(e) => {
            return Err(OpsError::ConfigError {
                reason: format!("failed to read audit journal '{}': {e}", path.display()),
            })
        }
    };

    contents
        .lines()
        .enumerate()
        .filter(|(_, line)| !line.trim().is_empty())
        .map(|(n, line)| {
            serde_json::from_str(line).map_err(|e| OpsError::ConfigError {
                reason: format!("audit journal '{}' line {}: {e}", path.display(), n + 1),
            })
        })
        .collect()
}

/// True when every run chained in the journal verifies.
pub fn verify_journal(path: &Path) -> OpsResult<bool> {
    read_journal(path).map(|events| verify_runs(&events))
}
