//! Reconciler - Check → Plan → Apply over a step graph

use crate::context::{ExplainContext, RunContext};
use crate::error::Result;
use crate::executor;
use crate::graph::StepGraph;
use crate::planner::{self, ExecutionPlan};
use crate::step::{Explanation, SharedStep, StepId};
use crate::types::{FailurePolicy, StepResult};

/// Drives steps on one machine through check, plan and apply
///
/// Holds no state between calls: graphs and plans are built fresh on every
/// invocation, so planning twice without applying yields identical plans.
#[derive(Debug, Clone, Copy, Default)]
pub struct Reconciler {
    policy: FailurePolicy,
}

impl Reconciler {
    pub fn new(policy: FailurePolicy) -> Self {
        Self { policy }
    }

    pub fn policy(&self) -> FailurePolicy {
        self.policy
    }

    /// Order steps by dependency
    ///
    /// Fails on duplicate identifiers, unknown dependencies, or cycles,
    /// without producing a partial order.
    pub fn order(&self, steps: &[SharedStep]) -> Result<Vec<SharedStep>> {
        StepGraph::from_steps(steps.iter().cloned())?.topo_sort()
    }

    /// Sort steps, then check and plan each one
    pub fn plan(&self, ctx: &RunContext, steps: &[SharedStep]) -> Result<ExecutionPlan> {
        let ordered = self.order(steps)?;
        Ok(planner::plan_ordered(ctx, &ordered))
    }

    /// Check and plan steps that were already ordered with [`Self::order`]
    pub fn plan_ordered(&self, ctx: &RunContext, ordered: &[SharedStep]) -> ExecutionPlan {
        planner::plan_ordered(ctx, ordered)
    }

    /// Apply a plan under this reconciler's failure policy
    pub fn apply(&self, ctx: &RunContext, plan: &ExecutionPlan) -> Vec<StepResult> {
        executor::apply(ctx, plan, self.policy)
    }

    /// Plan and apply in one go
    pub fn converge(&self, ctx: &RunContext, steps: &[SharedStep]) -> Result<Vec<StepResult>> {
        let plan = self.plan(ctx, steps)?;
        Ok(self.apply(ctx, &plan))
    }

    /// Explain every step, in dependency order
    ///
    /// Read-only: never calls check, plan or apply.
    pub fn explain(
        &self,
        ctx: &ExplainContext,
        steps: &[SharedStep],
    ) -> Result<Vec<(StepId, Explanation)>> {
        Ok(self
            .order(steps)?
            .iter()
            .map(|step| (step.id(), step.explain(ctx)))
            .collect())
    }
}
