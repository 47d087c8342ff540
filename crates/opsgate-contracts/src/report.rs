//! Run report types.
//!
//! A `RunReport` is the single durable outcome of one run. It is built once,
//! written once, and the process exit code is read off it.

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::execution::{ExecutionResult, RequestId, RunId};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum RunStatus {
    Ok,
    Fail,
    Blocked,
}

impl RunStatus {
    /// OK maps to 0; FAIL and BLOCKED both map to 1.
    pub fn exit_code(self) -> i32 {
        match self {
            RunStatus::Ok => 0,
            RunStatus::Fail | RunStatus::Blocked => 1,
        }
    }
}

impl fmt::Display for RunStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            RunStatus::Ok => "OK",
            RunStatus::Fail => "FAIL",
            RunStatus::Blocked => "BLOCKED",
        };
        f.write_str(s)
    }
}

/// Findings of the post-apply healthcheck. Diagnostic only.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HealthcheckReport {
    /// The target answered the end-to-end reachability probe.
    pub reachable: bool,
    pub reachability_detail: String,
    /// Most recent request id of this run, looked up in the target's audit log.
    pub request_id: Option<RequestId>,
    pub audit_matched: bool,
    #[serde(default)]
    pub warnings: Vec<String>,
}

impl HealthcheckReport {
    pub fn passed(&self) -> bool {
        self.reachable && self.audit_matched
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunReport {
    pub run_id: RunId,
    /// The operator command (or plan summary) that started the run.
    #[serde(default)]
    pub task: String,
    pub ts_utc: DateTime<Utc>,
    pub status: RunStatus,
    /// Present iff `status != OK`.
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub reason: Option<String>,
    pub results: Vec<ExecutionResult>,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub next_cmd: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub post_apply_healthcheck: Option<HealthcheckReport>,
    /// One-line human summary.
    #[serde(default)]
    pub summary: String,
}

impl RunReport {
    pub fn exit_code(&self) -> i32 {
        self.status.exit_code()
    }

    pub fn is_ok(&self) -> bool {
        self.status == RunStatus::Ok
    }
}
