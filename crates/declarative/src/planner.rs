//! Execution planner - checks every step and records what apply would do

use crate::context::RunContext;
use crate::diff::{Diff, DiffSummary};
use crate::step::{SharedStep, StepId};
use crate::types::StepStatus;
use serde::{Deserialize, Serialize};
use std::fmt;

/// One checked step in a plan
#[derive(Clone)]
pub struct PlanEntry {
    pub step: SharedStep,
    pub status: StepStatus,
    /// Present when the step is not satisfied and planning succeeded
    pub diff: Option<Diff>,
    /// Check or plan failure, kept so the plan still reports full state
    pub error: Option<String>,
}

impl PlanEntry {
    pub fn step_id(&self) -> StepId {
        self.step.id()
    }

    pub fn needs_apply(&self) -> bool {
        self.status.is_actionable()
    }

    /// Serializable view of this entry
    pub fn to_planned(&self) -> PlannedStep {
        PlannedStep {
            step_id: self.step.id(),
            description: self.step.description(),
            status: self.status,
            diff: self.diff.clone(),
            error: self.error.clone(),
        }
    }
}

impl fmt::Debug for PlanEntry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PlanEntry")
            .field("step", &self.step.id())
            .field("status", &self.status)
            .field("diff", &self.diff)
            .field("error", &self.error)
            .finish()
    }
}

/// Serializable summary of a plan entry
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PlannedStep {
    pub step_id: StepId,
    pub description: String,
    pub status: StepStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub diff: Option<Diff>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// Checked steps in dependency order
///
/// Every entry's dependencies appear at an earlier index. Satisfied steps
/// are kept so the plan always reports the full state.
#[derive(Debug, Clone, Default)]
pub struct ExecutionPlan {
    entries: Vec<PlanEntry>,
}

impl ExecutionPlan {
    /// Create a new empty plan
    pub fn new() -> Self {
        Self::default()
    }

    pub fn entries(&self) -> &[PlanEntry] {
        &self.entries
    }

    /// Entries that apply would act on
    pub fn pending(&self) -> impl Iterator<Item = &PlanEntry> {
        self.entries.iter().filter(|e| e.needs_apply())
    }

    /// Whether every step is already satisfied
    pub fn is_converged(&self) -> bool {
        self.pending().next().is_none()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn diff_summary(&self) -> DiffSummary {
        DiffSummary::from_diffs(self.entries.iter().filter_map(|e| e.diff.as_ref()))
    }

    /// Serializable view of the whole plan
    pub fn summary(&self) -> Vec<PlannedStep> {
        self.entries.iter().map(PlanEntry::to_planned).collect()
    }
}

/// Check and plan steps that are already in dependency order
///
/// Never changes anything. If the context is interrupted midway, the
/// remaining steps are recorded as `Unknown` with the interruption reason.
pub fn plan_ordered(ctx: &RunContext, ordered: &[SharedStep]) -> ExecutionPlan {
    let mut entries = Vec::with_capacity(ordered.len());

    for step in ordered {
        if let Some(interruption) = ctx.interruption() {
            entries.push(PlanEntry {
                step: step.clone(),
                status: StepStatus::Unknown,
                diff: None,
                error: Some(interruption.to_string()),
            });
            continue;
        }

        let (status, mut error) = match step.check(ctx) {
            Ok(status) => (status, None),
            Err(e) => {
                log::debug!("Check failed for {}: {e:#}", step.id());
                (StepStatus::Unknown, Some(format!("check failed: {e:#}")))
            }
        };

        let diff = if status.is_actionable() {
            match step.plan(ctx) {
                Ok(diff) => Some(diff),
                Err(e) => {
                    log::debug!("Plan failed for {}: {e:#}", step.id());
                    error.get_or_insert_with(|| format!("plan failed: {e:#}"));
                    None
                }
            }
        } else {
            None
        };

        log::debug!("Planned {}: {}", step.id(), status);
        entries.push(PlanEntry {
            step: step.clone(),
            status,
            diff,
            error,
        });
    }

    ExecutionPlan { entries }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::context::ExplainContext;
    use crate::step::{Explanation, Step};
    use anyhow::Result;
    use std::sync::Arc;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[derive(Debug)]
    struct Probe {
        name: &'static str,
        check: Option<StepStatus>,
        plans: AtomicUsize,
    }

    impl Probe {
        fn new(name: &'static str, check: Option<StepStatus>) -> Arc<Self> {
            Arc::new(Self {
                name,
                check,
                plans: AtomicUsize::new(0),
            })
        }
    }

    impl Step for Probe {
        fn id(&self) -> StepId {
            StepId::new("probe", "ensure", self.name).unwrap()
        }

        fn check(&self, _ctx: &RunContext) -> Result<StepStatus> {
            self.check.ok_or_else(|| anyhow::anyhow!("cannot inspect"))
        }

        fn plan(&self, _ctx: &RunContext) -> Result<Diff> {
            self.plans.fetch_add(1, Ordering::SeqCst);
            Ok(Diff::add("probe", self.name, "present"))
        }

        fn apply(&self, _ctx: &RunContext) -> Result<()> {
            Ok(())
        }

        fn explain(&self, _ctx: &ExplainContext) -> Explanation {
            Explanation::new(self.name)
        }
    }

    #[test]
    fn test_satisfied_steps_are_kept_without_diff() {
        let done = Probe::new("done", Some(StepStatus::Satisfied));
        let steps: Vec<SharedStep> = vec![done.clone()];
        let plan = plan_ordered(&RunContext::new(true, false), &steps);

        assert_eq!(plan.len(), 1);
        assert_eq!(plan.entries()[0].status, StepStatus::Satisfied);
        assert!(plan.entries()[0].diff.is_none());
        assert_eq!(done.plans.load(Ordering::SeqCst), 0);
        assert!(plan.is_converged());
    }

    #[test]
    fn test_pending_steps_get_a_diff() {
        let todo = Probe::new("todo", Some(StepStatus::NeedsApply));
        let steps: Vec<SharedStep> = vec![todo.clone()];
        let plan = plan_ordered(&RunContext::new(true, false), &steps);

        assert_eq!(
            plan.entries()[0].diff,
            Some(Diff::add("probe", "todo", "present"))
        );
        assert_eq!(plan.pending().count(), 1);
        assert_eq!(plan.diff_summary().additions, 1);
    }

    #[test]
    fn test_check_error_becomes_unknown() {
        let broken = Probe::new("broken", None);
        let steps: Vec<SharedStep> = vec![broken];
        let plan = plan_ordered(&RunContext::new(true, false), &steps);

        let entry = &plan.entries()[0];
        assert_eq!(entry.status, StepStatus::Unknown);
        assert!(entry.error.as_deref().unwrap().contains("cannot inspect"));
        // Unknown is actionable, so a diff is still requested
        assert!(entry.diff.is_some());
    }

    #[test]
    fn test_summary_is_serializable() {
        let steps: Vec<SharedStep> = vec![Probe::new("todo", Some(StepStatus::NeedsApply))];
        let plan = plan_ordered(&RunContext::new(true, false), &steps);
        let json = serde_json::to_value(plan.summary()).unwrap();
        assert_eq!(json[0]["step_id"], "probe:ensure:todo");
        assert_eq!(json[0]["status"], "needs_apply");
        assert_eq!(json[0]["diff"]["kind"], "add");
    }
}
