//! # Declarative
//!
//! Step-graph reconciliation for declarative machine state.
//!
//! This crate orders units of desired-state work by their dependencies,
//! checks which ones already hold, describes what would change, and
//! converges the rest, one step at a time.
//!
//! ## Core Concepts
//!
//! - **Step**: One unit of desired-state work (a package, a file, a setting)
//! - **StepGraph**: Steps keyed by [`StepId`] with dependency edges; yields a
//!   deterministic topological order or a structural error
//! - **ExecutionPlan**: Every step in dependency order with its status and diff
//! - **Reconciler**: Check → Plan → Apply under a [`FailurePolicy`]
//!
//! ## Example
//!
//! ```ignore
//! use declarative::{Reconciler, RunContext, SharedStep, FailurePolicy};
//!
//! let steps: Vec<SharedStep> = load_steps()?;
//! let reconciler = Reconciler::new(FailurePolicy::Continue);
//! let ctx = RunContext::new(false, false);
//!
//! let plan = reconciler.plan(&ctx, &steps)?;
//! for entry in plan.pending() {
//!     println!("{} -> {:?}", entry.step_id(), entry.diff);
//! }
//!
//! let results = reconciler.apply(&ctx, &plan);
//! ```
//!
//! ## Provider Traits
//!
//! The crate uses traits for dependency injection:
//!
//! - [`RemoteExecutor`]: Dispatches commands on the machine being converged
//! - [`CancelSignal`]: Reports external cancellation
//!
//! This allows the crate to be used without hard dependencies on a
//! specific transport or async runtime.

pub mod context;
pub mod diff;
pub mod error;
pub mod executor;
pub mod graph;
pub mod planner;
pub mod reconciler;
pub mod step;
pub mod types;

// Re-export main types at crate root
pub use context::{CancelSignal, ExplainContext, Interruption, NeverCancel, RemoteExecutor, RunContext};
pub use diff::{Diff, DiffKind, DiffSummary, group_by_layer};
pub use error::GraphError;
pub use graph::StepGraph;
pub use planner::{ExecutionPlan, PlanEntry, PlannedStep, plan_ordered};
pub use reconciler::Reconciler;
pub use step::{Explanation, SharedStep, Step, StepId};
pub use types::{ApplySummary, CommandOutput, FailurePolicy, ResultStatus, StepResult, StepStatus};
