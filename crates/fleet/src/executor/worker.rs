//! Per-host units of work
//!
//! A unit is everything done for one host: connect, then plan or
//! reconcile. Units are synchronous and run on the blocking pool, bounded
//! by the host's [`Session`].

use super::progress::FleetProgress;
use super::result::{HostError, HostPlan, HostResult};
use crate::inventory::{Host, HostId};
use crate::transport::{HostSession, Session, Transport, TransportError};
use declarative::{Interruption, Reconciler, ResultStatus, RunContext, SharedStep, StepId, StepStatus};
use std::any::Any;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::OwnedSemaphorePermit;
use tokio_util::sync::CancellationToken;

/// How long a unit may overrun its deadline before it is abandoned
///
/// Transports kill outstanding commands at the deadline and the reconciler
/// stops between steps, so a unit normally returns well within this.
pub(crate) const CANCEL_GRACE: Duration = Duration::from_secs(2);

/// A per-host unit shared by every worker of a run
pub(crate) type Job<T> = Arc<dyn Fn(&Host, &Session) -> T + Send + Sync>;

/// What a unit reports back to the pool
pub(crate) trait HostOutput: Send + 'static {
    fn host_id(&self) -> &HostId;

    /// Host never dispatched
    fn not_started(host_id: HostId, reason: &str) -> Self;

    /// Unit abandoned or crashed before returning
    fn aborted(host_id: HostId, error: HostError) -> Self;

    fn is_failure(&self) -> bool;

    fn set_duration(&mut self, duration: Duration);

    fn report(&self, progress: &dyn FleetProgress);
}

impl HostOutput for HostResult {
    fn host_id(&self) -> &HostId {
        &self.host_id
    }

    fn not_started(host_id: HostId, reason: &str) -> Self {
        Self::skipped(host_id, reason)
    }

    fn aborted(host_id: HostId, error: HostError) -> Self {
        Self::failed(host_id, Vec::new(), error)
    }

    fn is_failure(&self) -> bool {
        !self.is_success()
    }

    fn set_duration(&mut self, duration: Duration) {
        self.duration = duration;
    }

    fn report(&self, progress: &dyn FleetProgress) {
        progress.on_host_complete(self);
    }
}

impl HostOutput for HostPlan {
    fn host_id(&self) -> &HostId {
        &self.host_id
    }

    fn not_started(host_id: HostId, reason: &str) -> Self {
        Self::failed(
            host_id,
            Vec::new(),
            HostError::NotStarted {
                reason: reason.to_string(),
            },
        )
    }

    fn aborted(host_id: HostId, error: HostError) -> Self {
        Self::failed(host_id, Vec::new(), error)
    }

    fn is_failure(&self) -> bool {
        self.error.is_some()
    }

    fn set_duration(&mut self, duration: Duration) {
        self.duration = duration;
    }

    fn report(&self, progress: &dyn FleetProgress) {
        progress.on_host_planned(self);
    }
}

/// Run a unit on the blocking pool under a fresh session
///
/// The unit sees the deadline and `cancel` through its session. If it
/// has not returned `CANCEL_GRACE` after the deadline, the session is
/// cancelled and the unit abandoned as timed out.
///
/// The pool permit moves onto the blocking thread with the unit. It comes
/// back with the output, so the caller decides when to release it; an
/// abandoned unit keeps its slot until its thread really finishes.
pub(crate) async fn run_bounded<T: HostOutput>(
    job: Job<T>,
    host: Host,
    timeout: Duration,
    cancel: CancellationToken,
    permit: OwnedSemaphorePermit,
) -> (T, Option<OwnedSemaphorePermit>) {
    let started = Instant::now();
    let host_id = host.id.clone();
    let session = Session::new(started + timeout, cancel.clone());
    let mut handle = tokio::task::spawn_blocking(move || (job(&host, &session), permit));

    let bounded = tokio::time::timeout(timeout + CANCEL_GRACE, &mut handle).await;
    let (mut output, permit) = match bounded {
        Ok(Ok((output, permit))) => (output, Some(permit)),
        Ok(Err(join)) => {
            let message = if join.is_panic() {
                panic_message(join.into_panic())
            } else {
                join.to_string()
            };
            log::warn!("{host_id}: worker crashed: {message}");
            (T::aborted(host_id, HostError::Panicked { message }), None)
        }
        Err(_) => {
            cancel.cancel();
            log::warn!(
                "{host_id}: still running {}ms past its deadline, abandoning",
                CANCEL_GRACE.as_millis()
            );
            (T::aborted(host_id, HostError::timed_out(timeout)), None)
        }
    };
    output.set_duration(started.elapsed());
    (output, permit)
}

fn panic_message(payload: Box<dyn Any + Send>) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}

fn connect_error(error: TransportError, timeout: Duration) -> HostError {
    match error {
        TransportError::TimedOut { .. } => HostError::timed_out(timeout),
        TransportError::Cancelled { .. } => HostError::Cancelled,
        TransportError::Unreachable { message, .. } => HostError::Unreachable { message },
        other => HostError::Unreachable {
            message: other.to_string(),
        },
    }
}

fn interruption_error(interruption: Interruption, timeout: Duration) -> HostError {
    match interruption {
        Interruption::Cancelled => HostError::Cancelled,
        Interruption::DeadlineExceeded => HostError::timed_out(timeout),
    }
}

/// Shared inputs of every unit in a run
#[derive(Clone)]
pub(crate) struct Unit {
    pub transport: Arc<dyn Transport>,
    /// Already in dependency order
    pub steps: Arc<[SharedStep]>,
    pub reconciler: Reconciler,
    pub timeout: Duration,
}

impl Unit {
    /// Connect, then check and plan every step
    pub fn plan(&self, host: &Host, session: &Session) -> HostPlan {
        if let Err(e) = self.transport.ping(session, host) {
            log::warn!("{}: {e}", host.id);
            return HostPlan::failed(host.id.clone(), Vec::new(), connect_error(e, self.timeout));
        }

        let remote = HostSession::new(self.transport.as_ref(), host, session);
        let ctx = RunContext::new(true, false)
            .with_host(host.id.as_str())
            .with_deadline(session.deadline())
            .with_remote(&remote)
            .with_cancel(&remote);

        let plan = self.reconciler.plan_ordered(&ctx, &self.steps);
        let steps = plan.summary();

        let interrupted = steps
            .iter()
            .any(|s| s.status == StepStatus::Unknown && s.error.is_some());
        match ctx.interruption() {
            Some(interruption) if interrupted => {
                log::warn!("{}: planning interrupted: {interruption}", host.id);
                HostPlan::failed(host.id.clone(), steps, interruption_error(interruption, self.timeout))
            }
            _ => {
                log::info!(
                    "{}: planned {} steps, {} pending",
                    host.id,
                    plan.len(),
                    plan.pending().count()
                );
                HostPlan::new(host.id.clone(), steps)
            }
        }
    }

    /// Connect, then converge every step
    pub fn execute(&self, host: &Host, session: &Session, dry_run: bool) -> HostResult {
        if let Err(e) = self.transport.ping(session, host) {
            log::warn!("{}: {e}", host.id);
            return HostResult::failed(host.id.clone(), Vec::new(), connect_error(e, self.timeout));
        }

        let remote = HostSession::new(self.transport.as_ref(), host, session);
        let ctx = RunContext::new(dry_run, false)
            .with_host(host.id.as_str())
            .with_deadline(session.deadline())
            .with_remote(&remote)
            .with_cancel(&remote);

        let plan = self.reconciler.plan_ordered(&ctx, &self.steps);
        let results = self.reconciler.apply(&ctx, &plan);

        let incomplete = results
            .iter()
            .any(|r| matches!(r.status, ResultStatus::Failed | ResultStatus::Skipped));
        let failed: Vec<StepId> = results
            .iter()
            .filter(|r| r.status.is_failure())
            .map(|r| r.step_id.clone())
            .collect();

        // Partial results are kept: what was applied stays applied
        if let Some(interruption) = ctx.interruption().filter(|_| incomplete) {
            log::warn!("{}: interrupted: {interruption}", host.id);
            return HostResult::failed(
                host.id.clone(),
                results,
                interruption_error(interruption, self.timeout),
            );
        }
        if !failed.is_empty() {
            log::warn!("{}: {} steps failed", host.id, failed.len());
            return HostResult::failed(host.id.clone(), results, HostError::StepsFailed { failed });
        }

        log::info!("{}: converged ({} steps)", host.id, results.len());
        HostResult::succeeded(host.id.clone(), results)
    }
}
