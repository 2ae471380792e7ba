//! Progress reporting hooks for fleet runs

use super::result::{HostPlan, HostResult};
use crate::inventory::HostId;

/// Observer for fleet run progress
///
/// Called from worker tasks and the result aggregator, so implementations
/// must be thread-safe. Completion callbacks arrive one at a time.
pub trait FleetProgress: Send + Sync {
    /// A batch is about to start (rolling batches, canary phases)
    fn on_batch_start(&self, _index: usize, _total: usize, _hosts: &[HostId]) {}

    /// A host was dispatched
    fn on_host_start(&self, _host: &HostId) {}

    /// A host reached a terminal state, skipped hosts included
    fn on_host_complete(&self, _result: &HostResult) {}

    /// A host finished planning
    fn on_host_planned(&self, _plan: &HostPlan) {}
}

/// No-op progress
pub struct NoProgress;

impl FleetProgress for NoProgress {}
