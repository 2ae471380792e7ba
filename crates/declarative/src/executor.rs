//! Apply engine - converges a plan, one step at a time, in plan order
//!
//! Steps on one machine run strictly sequentially: a later step's check
//! may rely on an earlier step's side effects.

use crate::context::RunContext;
use crate::planner::ExecutionPlan;
use crate::step::StepId;
use crate::types::{FailurePolicy, ResultStatus, StepResult, StepStatus};
use std::collections::HashMap;

/// Apply every actionable entry of a plan
///
/// Returns exactly one result per plan entry, in plan order. A step whose
/// dependency failed or was skipped is itself skipped. What happens to
/// the rest of the plan after a failure is decided by `policy`.
///
/// Cancellation or deadline expiry stops the run between steps; the
/// remaining steps are skipped and already-applied steps are left alone.
pub fn apply(ctx: &RunContext, plan: &ExecutionPlan, policy: FailurePolicy) -> Vec<StepResult> {
    let mut results: Vec<StepResult> = Vec::with_capacity(plan.len());
    // step -> the failed step that blocks it
    let mut blocked: HashMap<StepId, StepId> = HashMap::new();
    let mut halted: Option<String> = None;
    let mut applied: Vec<usize> = Vec::new();
    let mut any_failed = false;

    for entry in plan.entries() {
        let id = entry.step_id();

        if let Some(reason) = &halted {
            results.push(StepResult::skipped(id, reason.clone()));
            continue;
        }

        if let Some(interruption) = ctx.interruption() {
            log::warn!("Stopping before {id}: {interruption}");
            let reason = interruption.to_string();
            results.push(StepResult::skipped(id, reason.clone()));
            halted = Some(reason);
            continue;
        }

        let upstream = entry
            .step
            .depends_on()
            .iter()
            .find_map(|dep| blocked.get(dep).cloned());
        if let Some(root) = upstream {
            log::debug!("Skipping {id}: dependency {root} failed");
            results.push(StepResult::skipped(
                id.clone(),
                format!("dependency {root} failed"),
            ));
            blocked.insert(id, root);
            continue;
        }

        if entry.status == StepStatus::Satisfied {
            results.push(StepResult::new(id, ResultStatus::Unchanged));
            continue;
        }

        if ctx.dry_run {
            results.push(StepResult::new(id, ResultStatus::WouldApply));
            continue;
        }

        match entry.step.apply(ctx) {
            Ok(()) => {
                log::debug!("Applied {id}");
                applied.push(results.len());
                results.push(StepResult::new(id, ResultStatus::Applied));
            }
            Err(e) => {
                log::warn!("Step {id} failed: {e:#}");
                any_failed = true;
                results.push(StepResult::failed(id.clone(), format!("{e:#}")));
                match policy {
                    FailurePolicy::Continue => {}
                    FailurePolicy::Stop | FailurePolicy::Rollback => {
                        halted = Some(format!("halted after {id} failed"));
                    }
                }
                blocked.insert(id.clone(), id);
            }
        }
    }

    if policy == FailurePolicy::Rollback && any_failed {
        rollback(ctx, plan, &applied, &mut results);
    }

    results
}

/// Undo applied steps in reverse order, best effort
fn rollback(ctx: &RunContext, plan: &ExecutionPlan, applied: &[usize], results: &mut [StepResult]) {
    for &index in applied.iter().rev() {
        let step = &plan.entries()[index].step;
        match step.rollback(ctx) {
            Ok(()) => {
                log::info!("Rolled back {}", step.id());
                results[index].status = ResultStatus::RolledBack;
            }
            Err(e) => {
                log::warn!("Rollback of {} failed: {e:#}", step.id());
                results[index].error = Some(format!("rollback failed: {e:#}"));
            }
        }
    }
}
