//! Fleet run results
//!
//! Everything here is serializable and lists hosts in id order, so the
//! same run always renders the same way.

use super::config::Strategy;
use crate::inventory::HostId;
use chrono::{DateTime, Utc};
use declarative::{ApplySummary, DiffSummary, PlannedStep, StepId, StepResult};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::Duration;

/// Terminal state of one host
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum HostOutcome {
    Succeeded,
    Failed,
    /// Never attempted
    Skipped,
}

impl fmt::Display for HostOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Succeeded => write!(f, "succeeded"),
            Self::Failed => write!(f, "failed"),
            Self::Skipped => write!(f, "skipped"),
        }
    }
}

/// Why a host did not succeed
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum HostError {
    Unreachable { message: String },
    TimedOut { after_ms: u64 },
    Cancelled,
    StepsFailed { failed: Vec<StepId> },
    NotStarted { reason: String },
    Panicked { message: String },
}

impl HostError {
    pub(crate) fn timed_out(after: Duration) -> Self {
        Self::TimedOut {
            after_ms: u64::try_from(after.as_millis()).unwrap_or(u64::MAX),
        }
    }
}

impl fmt::Display for HostError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Unreachable { message } => write!(f, "unreachable: {message}"),
            Self::TimedOut { after_ms } => write!(f, "timed out after {after_ms}ms"),
            Self::Cancelled => write!(f, "cancelled"),
            Self::StepsFailed { failed } => {
                let ids: Vec<&str> = failed.iter().map(StepId::as_str).collect();
                write!(f, "steps failed: {}", ids.join(", "))
            }
            Self::NotStarted { reason } => write!(f, "not started: {reason}"),
            Self::Panicked { message } => write!(f, "worker panicked: {message}"),
        }
    }
}

/// Outcome of applying steps on one host
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HostResult {
    pub host_id: HostId,
    pub status: HostOutcome,
    /// One entry per step reached, in dependency order; partial when the
    /// host was interrupted
    pub step_results: Vec<StepResult>,
    #[serde(with = "crate::serde_ms")]
    pub duration: Duration,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<HostError>,
}

impl HostResult {
    pub fn succeeded(host_id: HostId, step_results: Vec<StepResult>) -> Self {
        Self {
            host_id,
            status: HostOutcome::Succeeded,
            step_results,
            duration: Duration::ZERO,
            error: None,
        }
    }

    pub fn failed(host_id: HostId, step_results: Vec<StepResult>, error: HostError) -> Self {
        Self {
            host_id,
            status: HostOutcome::Failed,
            step_results,
            duration: Duration::ZERO,
            error: Some(error),
        }
    }

    pub fn skipped(host_id: HostId, reason: impl Into<String>) -> Self {
        Self {
            host_id,
            status: HostOutcome::Skipped,
            step_results: Vec::new(),
            duration: Duration::ZERO,
            error: Some(HostError::NotStarted {
                reason: reason.into(),
            }),
        }
    }

    pub fn is_success(&self) -> bool {
        self.status == HostOutcome::Succeeded
    }

    pub fn step_summary(&self) -> ApplySummary {
        ApplySummary::from_results(&self.step_results)
    }
}

/// Counts derived from a [`FleetResult`]
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct FleetSummary {
    pub total_hosts: usize,
    pub successful_hosts: usize,
    pub failed_hosts: usize,
    pub skipped_hosts: usize,
    /// Step counts across every host
    pub steps: ApplySummary,
    #[serde(with = "crate::serde_ms")]
    pub duration: Duration,
}

/// Outcome of a fleet run
///
/// Always returned, even when hosts failed: callers decide what a partial
/// failure means through [`Self::all_successful`] and [`Self::failed_hosts`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FleetResult {
    pub started_at: DateTime<Utc>,
    #[serde(with = "crate::serde_ms")]
    pub duration: Duration,
    pub strategy: Strategy,
    pub dry_run: bool,
    /// Sorted by host id
    pub hosts: Vec<HostResult>,
}

impl FleetResult {
    pub fn summary(&self) -> FleetSummary {
        let mut summary = FleetSummary {
            total_hosts: self.hosts.len(),
            duration: self.duration,
            ..Default::default()
        };
        for host in &self.hosts {
            match host.status {
                HostOutcome::Succeeded => summary.successful_hosts += 1,
                HostOutcome::Failed => summary.failed_hosts += 1,
                HostOutcome::Skipped => summary.skipped_hosts += 1,
            }
            summary.steps.merge(&host.step_summary());
        }
        summary
    }

    /// Whether every host succeeded
    pub fn all_successful(&self) -> bool {
        self.hosts.iter().all(HostResult::is_success)
    }

    pub fn failed_hosts(&self) -> impl Iterator<Item = &HostResult> {
        self.hosts
            .iter()
            .filter(|h| h.status == HostOutcome::Failed)
    }

    pub fn skipped_hosts(&self) -> impl Iterator<Item = &HostResult> {
        self.hosts
            .iter()
            .filter(|h| h.status == HostOutcome::Skipped)
    }

    pub fn host(&self, id: &str) -> Option<&HostResult> {
        self.hosts.iter().find(|h| h.host_id.as_str() == id)
    }
}

/// Plan for one host
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HostPlan {
    pub host_id: HostId,
    /// Every step in dependency order, satisfied ones included
    pub steps: Vec<PlannedStep>,
    #[serde(with = "crate::serde_ms")]
    pub duration: Duration,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<HostError>,
}

impl HostPlan {
    pub fn new(host_id: HostId, steps: Vec<PlannedStep>) -> Self {
        Self {
            host_id,
            steps,
            duration: Duration::ZERO,
            error: None,
        }
    }

    pub fn failed(host_id: HostId, steps: Vec<PlannedStep>, error: HostError) -> Self {
        Self {
            error: Some(error),
            ..Self::new(host_id, steps)
        }
    }

    /// Steps apply would act on
    pub fn pending(&self) -> impl Iterator<Item = &PlannedStep> {
        self.steps.iter().filter(|s| s.status.is_actionable())
    }

    pub fn is_converged(&self) -> bool {
        self.error.is_none() && self.pending().next().is_none()
    }

    pub fn diff_summary(&self) -> DiffSummary {
        DiffSummary::from_diffs(self.steps.iter().filter_map(|s| s.diff.as_ref()))
    }
}

/// Plans across the fleet
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FleetPlan {
    pub started_at: DateTime<Utc>,
    #[serde(with = "crate::serde_ms")]
    pub duration: Duration,
    /// Sorted by host id
    pub hosts: Vec<HostPlan>,
}

impl FleetPlan {
    /// Hosts that could not be planned
    pub fn failed_hosts(&self) -> impl Iterator<Item = &HostPlan> {
        self.hosts.iter().filter(|h| h.error.is_some())
    }

    /// Hosts with at least one step to apply
    pub fn pending_hosts(&self) -> impl Iterator<Item = &HostPlan> {
        self.hosts.iter().filter(|h| h.pending().next().is_some())
    }

    pub fn is_converged(&self) -> bool {
        self.hosts.iter().all(HostPlan::is_converged)
    }

    pub fn diff_summary(&self) -> DiffSummary {
        DiffSummary::from_diffs(
            self.hosts
                .iter()
                .flat_map(|h| h.steps.iter().filter_map(|s| s.diff.as_ref())),
        )
    }

    pub fn host(&self, id: &str) -> Option<&HostPlan> {
        self.hosts.iter().find(|h| h.host_id.as_str() == id)
    }
}
