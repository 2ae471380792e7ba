//! Core types for step reconciliation

use crate::step::StepId;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::process::Output;

/// Outcome of a step's check
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StepStatus {
    /// Desired state already holds
    Satisfied,
    /// Apply is required to converge
    NeedsApply,
    /// State cannot be determined
    Unknown,
}

impl StepStatus {
    /// Whether apply should be attempted for this status
    pub fn is_actionable(&self) -> bool {
        !matches!(self, Self::Satisfied)
    }
}

impl fmt::Display for StepStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Satisfied => write!(f, "satisfied"),
            Self::NeedsApply => write!(f, "needs apply"),
            Self::Unknown => write!(f, "unknown"),
        }
    }
}

/// What happened to a step during apply
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResultStatus {
    /// Already satisfied, nothing done
    Unchanged,
    /// Apply succeeded
    Applied,
    /// Dry run: apply would have run
    WouldApply,
    /// Apply failed
    Failed,
    /// Not attempted (upstream failure, halt, or cancellation)
    Skipped,
    /// Applied, then undone by rollback
    RolledBack,
}

impl ResultStatus {
    pub fn is_failure(&self) -> bool {
        matches!(self, Self::Failed)
    }

    pub fn is_change(&self) -> bool {
        matches!(self, Self::Applied)
    }
}

impl fmt::Display for ResultStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Unchanged => "unchanged",
            Self::Applied => "applied",
            Self::WouldApply => "would apply",
            Self::Failed => "failed",
            Self::Skipped => "skipped",
            Self::RolledBack => "rolled back",
        };
        f.write_str(s)
    }
}

/// Result of one step in an apply run
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StepResult {
    pub step_id: StepId,
    pub status: ResultStatus,
    /// Failure message, skip reason, or rollback failure
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl StepResult {
    pub fn new(step_id: StepId, status: ResultStatus) -> Self {
        Self {
            step_id,
            status,
            error: None,
        }
    }

    pub fn failed(step_id: StepId, error: impl Into<String>) -> Self {
        Self {
            step_id,
            status: ResultStatus::Failed,
            error: Some(error.into()),
        }
    }

    pub fn skipped(step_id: StepId, reason: impl Into<String>) -> Self {
        Self {
            step_id,
            status: ResultStatus::Skipped,
            error: Some(reason.into()),
        }
    }
}

/// What to do with the remaining steps once a step fails
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailurePolicy {
    /// Skip the failed step's transitive dependents, keep applying the rest
    #[default]
    Continue,
    /// Skip every remaining step
    Stop,
    /// Skip every remaining step, then roll back applied steps in reverse
    Rollback,
}

/// Summary of apply results
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ApplySummary {
    pub unchanged: usize,
    pub applied: usize,
    pub would_apply: usize,
    pub failed: usize,
    pub skipped: usize,
    pub rolled_back: usize,
}

impl ApplySummary {
    pub fn from_results(results: &[StepResult]) -> Self {
        let mut summary = Self::default();
        for result in results {
            summary.add_result(result);
        }
        summary
    }

    /// Total number of actual changes made
    pub fn total_changes(&self) -> usize {
        self.applied
    }

    /// Check if execution was fully successful (no failures)
    pub fn is_success(&self) -> bool {
        self.failed == 0
    }

    /// Total number of steps processed
    pub fn total(&self) -> usize {
        self.unchanged
            + self.applied
            + self.would_apply
            + self.failed
            + self.skipped
            + self.rolled_back
    }

    /// Merge another summary into this one
    pub fn merge(&mut self, other: &ApplySummary) {
        self.unchanged += other.unchanged;
        self.applied += other.applied;
        self.would_apply += other.would_apply;
        self.failed += other.failed;
        self.skipped += other.skipped;
        self.rolled_back += other.rolled_back;
    }

    /// Add a result to the summary
    pub fn add_result(&mut self, result: &StepResult) {
        match result.status {
            ResultStatus::Unchanged => self.unchanged += 1,
            ResultStatus::Applied => self.applied += 1,
            ResultStatus::WouldApply => self.would_apply += 1,
            ResultStatus::Failed => self.failed += 1,
            ResultStatus::Skipped => self.skipped += 1,
            ResultStatus::RolledBack => self.rolled_back += 1,
        }
    }
}

/// Output from a dispatched command
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CommandOutput {
    pub stdout: Vec<u8>,
    pub stderr: Vec<u8>,
    pub success: bool,
    /// Exit code, if the process exited normally
    pub code: Option<i32>,
}

impl From<Output> for CommandOutput {
    fn from(output: Output) -> Self {
        Self {
            stdout: output.stdout,
            stderr: output.stderr,
            success: output.status.success(),
            code: output.status.code(),
        }
    }
}

impl CommandOutput {
    /// Get stdout as a string
    pub fn stdout_str(&self) -> String {
        String::from_utf8_lossy(&self.stdout).to_string()
    }

    /// Get stderr as a string
    pub fn stderr_str(&self) -> String {
        String::from_utf8_lossy(&self.stderr).to_string()
    }
}
