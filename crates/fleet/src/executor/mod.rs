//! Fleet executor
//!
//! Fans a step set out across hosts. Each host is one unit of work
//! (connect, then plan or converge) run on the blocking pool; at most
//! `max_parallel` units are in flight at a time, enforced by a semaphore
//! permit acquired *before* a unit is spawned. A unit abandoned past its
//! deadline holds its permit until its thread returns, so a step that
//! ignores its deadline delays later hosts rather than overfilling the
//! pool. Finished units are sent
//! over a channel to a single aggregator task, which owns the results.
//!
//! # Strategies
//!
//! | Strategy | Behavior |
//! |----------|----------|
//! | Parallel | All hosts through one pool. With `stop_on_error`, a failure stops new hosts from starting |
//! | Rolling  | Batches of `max_parallel`; a batch finishes before the next starts. With `stop_on_error`, a failed batch ends the run |
//! | Canary   | A canary subset first; any canary failure skips everything else |
//!
//! Hosts that never start are reported as skipped. Cancelling the run's
//! token cancels every in-flight host and skips the rest; nothing already
//! applied is rolled back.

mod config;
mod progress;
mod result;
mod worker;

pub use config::{FleetExecutorConfig, Strategy};
pub use progress::{FleetProgress, NoProgress};
pub use result::{FleetPlan, FleetResult, FleetSummary, HostError, HostOutcome, HostPlan, HostResult};

use crate::error::FleetError;
use crate::inventory::{Host, HostId};
use crate::transport::{Session, Transport};
use chrono::Utc;
use declarative::{Reconciler, SharedStep};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Instant;
use tokio::sync::{Semaphore, mpsc};
use tokio_util::sync::CancellationToken;
use worker::{HostOutput, Job, Unit};

const HALTED: &str = "halted after a host failed";
const CANCELLED: &str = "cancelled";

/// Runs steps across hosts under a rollout strategy
pub struct FleetExecutor {
    config: FleetExecutorConfig,
    transport: Arc<dyn Transport>,
    progress: Arc<dyn FleetProgress>,
}

impl FleetExecutor {
    pub fn new(config: FleetExecutorConfig, transport: Arc<dyn Transport>) -> Result<Self, FleetError> {
        config.validate()?;
        Ok(Self {
            config,
            transport,
            progress: Arc::new(NoProgress),
        })
    }

    pub fn with_progress(mut self, progress: Arc<dyn FleetProgress>) -> Self {
        self.progress = progress;
        self
    }

    pub fn config(&self) -> &FleetExecutorConfig {
        &self.config
    }

    /// Check and plan every step on every host
    ///
    /// Hosts run through one bounded pool regardless of strategy. A host
    /// that cannot be reached or planned carries its error on its
    /// [`HostPlan`]; the other hosts are unaffected.
    pub async fn plan(
        &self,
        hosts: &[Host],
        steps: &[SharedStep],
        cancel: &CancellationToken,
    ) -> Result<FleetPlan, FleetError> {
        let started_at = Utc::now();
        let started = Instant::now();
        let unit = self.unit(steps)?;
        let hosts = sorted(hosts);

        log::info!("Planning {} steps on {} hosts", unit.steps.len(), hosts.len());

        let job: Job<HostPlan> = Arc::new(move |host: &Host, session: &Session| unit.plan(host, session));
        let hosts = self.run_pool(&hosts, job, cancel, false).await;

        Ok(FleetPlan {
            started_at,
            duration: started.elapsed(),
            hosts,
        })
    }

    /// Converge every host under the configured strategy
    ///
    /// Fails only if the steps do not form a valid graph, before any host
    /// is contacted. Host failures are reported on the result.
    pub async fn execute(
        &self,
        hosts: &[Host],
        steps: &[SharedStep],
        cancel: &CancellationToken,
    ) -> Result<FleetResult, FleetError> {
        let started_at = Utc::now();
        let started = Instant::now();
        let unit = self.unit(steps)?;
        let hosts = sorted(hosts);
        let dry_run = self.config.dry_run;

        log::info!(
            "Running {} steps on {} hosts ({}, max {} in flight{})",
            unit.steps.len(),
            hosts.len(),
            self.config.strategy,
            self.config.max_parallel,
            if dry_run { ", dry run" } else { "" }
        );

        let job: Job<HostResult> = Arc::new(move |host: &Host, session: &Session| {
            unit.execute(host, session, dry_run)
        });
        let mut results = match self.config.strategy {
            Strategy::Parallel => {
                self.run_pool(&hosts, job, cancel, self.config.stop_on_error)
                    .await
            }
            Strategy::Rolling => self.rolling(&hosts, job, cancel).await,
            Strategy::Canary => self.canary(&hosts, job, cancel).await,
        };
        results.sort_by(|a, b| a.host_id.cmp(&b.host_id));

        let result = FleetResult {
            started_at,
            duration: started.elapsed(),
            strategy: self.config.strategy,
            dry_run,
            hosts: results,
        };
        let summary = result.summary();
        log::info!(
            "Fleet run finished in {:.1}s: {} succeeded, {} failed, {} skipped",
            summary.duration.as_secs_f64(),
            summary.successful_hosts,
            summary.failed_hosts,
            summary.skipped_hosts
        );
        Ok(result)
    }

    fn unit(&self, steps: &[SharedStep]) -> Result<Unit, FleetError> {
        let reconciler = Reconciler::new(self.config.failure_policy);
        let ordered = reconciler.order(steps)?;
        Ok(Unit {
            transport: Arc::clone(&self.transport),
            steps: ordered.into(),
            reconciler,
            timeout: self.config.timeout,
        })
    }

    /// Run hosts through a pool of `max_parallel` workers
    ///
    /// Returns exactly one output per host, sorted by host id.
    async fn run_pool<T: HostOutput>(
        &self,
        hosts: &[Host],
        job: Job<T>,
        cancel: &CancellationToken,
        stop_on_error: bool,
    ) -> Vec<T> {
        let semaphore = Arc::new(Semaphore::new(self.config.max_parallel));
        let halted = Arc::new(AtomicBool::new(false));
        let (tx, mut rx) = mpsc::unbounded_channel::<T>();

        let progress = Arc::clone(&self.progress);
        let aggregator = tokio::spawn(async move {
            let mut outputs = Vec::new();
            while let Some(output) = rx.recv().await {
                output.report(progress.as_ref());
                outputs.push(output);
            }
            outputs
        });

        let mut workers = Vec::with_capacity(hosts.len());
        for host in hosts {
            let permit = tokio::select! {
                biased;
                () = cancel.cancelled() => None,
                permit = Arc::clone(&semaphore).acquire_owned() => permit.ok(),
            };

            // A worker flags a failure before releasing its permit, so
            // the check below sees it as soon as the permit is ours.
            let skip = if cancel.is_cancelled() {
                Some(CANCELLED)
            } else if halted.load(Ordering::SeqCst) {
                Some(HALTED)
            } else {
                None
            };

            let permit = match (permit, skip) {
                (Some(permit), None) => permit,
                (_, reason) => {
                    let reason = reason.unwrap_or(CANCELLED);
                    log::debug!("{}: not started ({reason})", host.id);
                    let _ = tx.send(T::not_started(host.id.clone(), reason));
                    continue;
                }
            };

            let host = host.clone();
            let host_id = host.id.clone();
            let job = Arc::clone(&job);
            let tx = tx.clone();
            let halted = Arc::clone(&halted);
            let progress = Arc::clone(&self.progress);
            let child = cancel.child_token();
            let timeout = self.config.timeout;

            let handle = tokio::spawn(async move {
                progress.on_host_start(&host.id);
                log::info!("{}: started", host.id);

                let (output, permit) =
                    worker::run_bounded(job, host, timeout, child, permit).await;
                if stop_on_error && output.is_failure() {
                    halted.store(true, Ordering::SeqCst);
                }
                let _ = tx.send(output);
                drop(permit);
            });
            workers.push((host_id, handle));
        }

        for (host_id, handle) in workers {
            if let Err(e) = handle.await {
                log::warn!("{host_id}: worker task failed: {e}");
                let _ = tx.send(T::aborted(
                    host_id,
                    HostError::Panicked {
                        message: e.to_string(),
                    },
                ));
            }
        }
        drop(tx);

        let mut outputs = match aggregator.await {
            Ok(outputs) => outputs,
            Err(e) => {
                log::warn!("Result aggregator failed: {e}");
                Vec::new()
            }
        };
        outputs.sort_by(|a, b| a.host_id().cmp(b.host_id()));
        outputs
    }

    async fn rolling(
        &self,
        hosts: &[Host],
        job: Job<HostResult>,
        cancel: &CancellationToken,
    ) -> Vec<HostResult> {
        let batches: Vec<&[Host]> = hosts.chunks(self.config.max_parallel).collect();
        let mut results = Vec::with_capacity(hosts.len());
        let mut halted = None;

        for (index, batch) in batches.iter().enumerate() {
            if let Some(reason) = halted.or_else(|| cancel.is_cancelled().then_some(CANCELLED)) {
                results.extend(self.skip_all(batch, reason));
                continue;
            }

            let ids = ids(batch);
            log::info!("Batch {}/{}: {}", index + 1, batches.len(), join(&ids));
            self.progress.on_batch_start(index, batches.len(), &ids);

            // Every host in a batch starts; only the next batch is gated
            let outcome = self.run_pool(batch, Arc::clone(&job), cancel, false).await;
            if self.config.stop_on_error && outcome.iter().any(HostOutput::is_failure) {
                log::warn!("Batch {} failed, skipping the remaining batches", index + 1);
                halted = Some("an earlier batch failed");
            }
            results.extend(outcome);
        }
        results
    }

    async fn canary(
        &self,
        hosts: &[Host],
        job: Job<HostResult>,
        cancel: &CancellationToken,
    ) -> Vec<HostResult> {
        if hosts.is_empty() {
            return Vec::new();
        }
        let (canary, rest) = hosts.split_at(self.config.canary_count(hosts.len()));
        let phases = if rest.is_empty() { 1 } else { 2 };

        let canary_ids = ids(canary);
        log::info!("Canary: {}", join(&canary_ids));
        self.progress.on_batch_start(0, phases, &canary_ids);

        let mut results = self.run_pool(canary, Arc::clone(&job), cancel, false).await;
        if rest.is_empty() {
            return results;
        }

        if results.iter().any(HostOutput::is_failure) {
            log::warn!("Canary failed, skipping {} remaining hosts", rest.len());
            let reason = if cancel.is_cancelled() { CANCELLED } else { "canary failed" };
            results.extend(self.skip_all(rest, reason));
            return results;
        }

        let rest_ids = ids(rest);
        log::info!("Canary succeeded, rolling out to {} hosts", rest.len());
        self.progress.on_batch_start(1, phases, &rest_ids);
        results.extend(
            self.run_pool(rest, job, cancel, self.config.stop_on_error)
                .await,
        );
        results
    }

    fn skip_all(&self, hosts: &[Host], reason: &str) -> Vec<HostResult> {
        hosts
            .iter()
            .map(|host| {
                let result = HostResult::skipped(host.id.clone(), reason);
                self.progress.on_host_complete(&result);
                result
            })
            .collect()
    }
}

/// Hosts in id order, each once
fn sorted(hosts: &[Host]) -> Vec<Host> {
    let mut hosts = hosts.to_vec();
    hosts.sort_by(|a, b| a.id.cmp(&b.id));
    hosts.dedup_by(|a, b| a.id == b.id);
    hosts
}

fn ids(hosts: &[Host]) -> Vec<HostId> {
    hosts.iter().map(|h| h.id.clone()).collect()
}

fn join(ids: &[HostId]) -> String {
    ids.iter().map(HostId::as_str).collect::<Vec<_>>().join(", ")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transport::TransportError;
    use declarative::{
        CommandOutput, Diff, ExplainContext, Explanation, ResultStatus, RunContext, Step, StepId,
        StepStatus,
    };
    use std::collections::{BTreeMap, BTreeSet};
    use std::sync::Mutex;
    use std::sync::atomic::AtomicUsize;
    use std::time::Duration;

    /// Scripted transport: per-host connect delays, unreachable hosts, slow
    /// commands, and a high-water mark of hosts connected at once
    #[derive(Default)]
    struct FakeTransport {
        delay: Duration,
        delays: BTreeMap<&'static str, Duration>,
        unreachable: BTreeSet<&'static str>,
        /// Connect delays that ignore the session entirely
        stubborn: BTreeMap<&'static str, Duration>,
        exec_delay: Duration,
        in_flight: AtomicUsize,
        peak: AtomicUsize,
        pinged: Mutex<Vec<(String, Instant)>>,
    }

    impl FakeTransport {
        fn pinged(&self) -> Vec<String> {
            let mut hosts: Vec<String> = self
                .pinged
                .lock()
                .unwrap()
                .iter()
                .map(|(h, _)| h.clone())
                .collect();
            hosts.sort();
            hosts
        }

        fn started_at(&self, host: &str) -> Instant {
            self.pinged
                .lock()
                .unwrap()
                .iter()
                .find(|(h, _)| h == host)
                .map(|(_, at)| *at)
                .unwrap()
        }
    }

    /// Sleep in small slices so the session can interrupt
    fn nap(session: &Session, host: &str, total: Duration) -> Result<(), TransportError> {
        let until = Instant::now() + total;
        while Instant::now() < until {
            session.ensure_live(host)?;
            std::thread::sleep(Duration::from_millis(5));
        }
        Ok(())
    }

    impl Transport for FakeTransport {
        fn ping(&self, session: &Session, host: &Host) -> Result<(), TransportError> {
            let id = host.id.as_str();
            self.pinged
                .lock()
                .unwrap()
                .push((id.to_string(), Instant::now()));
            if self.unreachable.contains(id) {
                return Err(TransportError::Unreachable {
                    host: id.to_string(),
                    message: "connection refused".to_string(),
                });
            }

            let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
            self.peak.fetch_max(now, Ordering::SeqCst);
            let delay = self.delays.get(id).copied().unwrap_or(self.delay);
            if let Some(stuck) = self.stubborn.get(id) {
                std::thread::sleep(*stuck);
            }
            let outcome = nap(session, id, delay);
            self.in_flight.fetch_sub(1, Ordering::SeqCst);
            outcome
        }

        fn exec(
            &self,
            session: &Session,
            host: &Host,
            _command: &str,
        ) -> Result<CommandOutput, TransportError> {
            nap(session, host.id.as_str(), self.exec_delay)?;
            Ok(CommandOutput {
                success: true,
                code: Some(0),
                ..Default::default()
            })
        }
    }

    type Applied = Arc<Mutex<Vec<(String, Instant)>>>;

    /// Always needs apply; fails on one host; dispatches a command when
    /// `remote` is set
    #[derive(Debug, Default)]
    struct Probe {
        name: &'static str,
        deps: Vec<&'static str>,
        fail_on: Option<&'static str>,
        remote: bool,
        applied: Applied,
    }

    impl Step for Probe {
        fn id(&self) -> StepId {
            StepId::new("probe", "run", self.name).unwrap()
        }

        fn depends_on(&self) -> Vec<StepId> {
            self.deps
                .iter()
                .map(|d| StepId::new("probe", "run", d).unwrap())
                .collect()
        }

        fn check(&self, _ctx: &RunContext) -> anyhow::Result<StepStatus> {
            Ok(StepStatus::NeedsApply)
        }

        fn plan(&self, _ctx: &RunContext) -> anyhow::Result<Diff> {
            Ok(Diff::add("probe", self.name, "done"))
        }

        fn apply(&self, ctx: &RunContext) -> anyhow::Result<()> {
            if self.remote {
                ctx.require_remote()?.run(self.name)?;
            }
            let host = ctx.host.unwrap_or_default();
            if self.fail_on == Some(host) {
                anyhow::bail!("{} failed on {host}", self.name);
            }
            self.applied
                .lock()
                .unwrap()
                .push((host.to_string(), Instant::now()));
            Ok(())
        }

        fn explain(&self, _ctx: &ExplainContext) -> Explanation {
            Explanation::new(self.name)
        }
    }

    fn hosts(ids: &[&str]) -> Vec<Host> {
        ids.iter()
            .map(|id| Host::new(HostId::new(id).unwrap()))
            .collect()
    }

    fn probe(applied: &Applied, fail_on: Option<&'static str>) -> SharedStep {
        Arc::new(Probe {
            name: "probe",
            fail_on,
            applied: Arc::clone(applied),
            ..Default::default()
        })
    }

    fn executor(config: FleetExecutorConfig, transport: &Arc<FakeTransport>) -> FleetExecutor {
        let transport: Arc<dyn Transport> = transport.clone();
        FleetExecutor::new(config, transport).unwrap()
    }

    fn statuses(result: &FleetResult) -> Vec<(&str, HostOutcome)> {
        result
            .hosts
            .iter()
            .map(|h| (h.host_id.as_str(), h.status))
            .collect()
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_parallel_respects_max_parallel() {
        let transport = Arc::new(FakeTransport {
            delay: Duration::from_millis(80),
            ..Default::default()
        });
        let applied = Applied::default();
        let config = FleetExecutorConfig {
            max_parallel: 2,
            ..Default::default()
        };

        let result = executor(config, &transport)
            .execute(
                &hosts(&["a", "b", "c", "d", "e", "f"]),
                &[probe(&applied, None)],
                &CancellationToken::new(),
            )
            .await
            .unwrap();

        assert!(result.all_successful());
        assert_eq!(result.hosts.len(), 6);
        let peak = transport.peak.load(Ordering::SeqCst);
        assert!((1..=2).contains(&peak), "peak {peak}");
        assert_eq!(applied.lock().unwrap().len(), 6);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_parallel_stop_on_error() {
        // a fails quickly while b is still running; c, d, e never start
        let transport = Arc::new(FakeTransport {
            delay: Duration::from_millis(300),
            delays: BTreeMap::from([("a", Duration::from_millis(30))]),
            ..Default::default()
        });
        let applied = Applied::default();
        let config = FleetExecutorConfig {
            max_parallel: 2,
            stop_on_error: true,
            ..Default::default()
        };

        let result = executor(config, &transport)
            .execute(
                &hosts(&["a", "b", "c", "d", "e"]),
                &[probe(&applied, Some("a"))],
                &CancellationToken::new(),
            )
            .await
            .unwrap();

        assert_eq!(
            statuses(&result),
            vec![
                ("a", HostOutcome::Failed),
                ("b", HostOutcome::Succeeded),
                ("c", HostOutcome::Skipped),
                ("d", HostOutcome::Skipped),
                ("e", HostOutcome::Skipped),
            ]
        );
        assert!(matches!(
            result.host("a").unwrap().error,
            Some(HostError::StepsFailed { .. })
        ));
        assert_eq!(transport.pinged(), vec!["a", "b"]);

        let summary = result.summary();
        assert_eq!(
            (summary.successful_hosts, summary.failed_hosts, summary.skipped_hosts),
            (1, 1, 3)
        );
        assert!(!result.all_successful());
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_parallel_without_stop_runs_everything() {
        let transport = Arc::new(FakeTransport::default());
        let applied = Applied::default();

        let result = executor(FleetExecutorConfig::default(), &transport)
            .execute(
                &hosts(&["a", "b", "c"]),
                &[probe(&applied, Some("b"))],
                &CancellationToken::new(),
            )
            .await
            .unwrap();

        assert_eq!(
            statuses(&result),
            vec![
                ("a", HostOutcome::Succeeded),
                ("b", HostOutcome::Failed),
                ("c", HostOutcome::Succeeded),
            ]
        );
        let failed: Vec<_> = result.failed_hosts().map(|h| h.host_id.as_str()).collect();
        assert_eq!(failed, vec!["b"]);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_rolling_batches_run_in_order() {
        let transport = Arc::new(FakeTransport {
            delay: Duration::from_millis(40),
            ..Default::default()
        });
        let applied = Applied::default();
        let config = FleetExecutorConfig {
            strategy: Strategy::Rolling,
            max_parallel: 2,
            ..Default::default()
        };

        let result = executor(config, &transport)
            .execute(
                &hosts(&["e", "d", "c", "b", "a"]),
                &[probe(&applied, None)],
                &CancellationToken::new(),
            )
            .await
            .unwrap();
        assert!(result.all_successful());
        assert!(transport.peak.load(Ordering::SeqCst) <= 2);

        let finished: BTreeMap<String, Instant> = applied.lock().unwrap().iter().cloned().collect();
        let batches = [vec!["a", "b"], vec!["c", "d"], vec!["e"]];
        for pair in batches.windows(2) {
            let previous_done = pair[0].iter().map(|h| finished[*h]).max().unwrap();
            for host in &pair[1] {
                assert!(
                    transport.started_at(host) >= previous_done,
                    "{host} started before its previous batch finished"
                );
            }
        }
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_rolling_stop_on_error_skips_later_batches() {
        let transport = Arc::new(FakeTransport::default());
        let applied = Applied::default();
        let config = FleetExecutorConfig {
            strategy: Strategy::Rolling,
            max_parallel: 2,
            stop_on_error: true,
            ..Default::default()
        };

        let result = executor(config, &transport)
            .execute(
                &hosts(&["a", "b", "c", "d", "e"]),
                &[probe(&applied, Some("a"))],
                &CancellationToken::new(),
            )
            .await
            .unwrap();

        // The rest of the failing batch still runs
        assert_eq!(
            statuses(&result),
            vec![
                ("a", HostOutcome::Failed),
                ("b", HostOutcome::Succeeded),
                ("c", HostOutcome::Skipped),
                ("d", HostOutcome::Skipped),
                ("e", HostOutcome::Skipped),
            ]
        );
        assert_eq!(transport.pinged(), vec!["a", "b"]);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_canary_failure_skips_everyone_else() {
        let transport = Arc::new(FakeTransport::default());
        let applied = Applied::default();
        let config = FleetExecutorConfig {
            strategy: Strategy::Canary,
            ..Default::default()
        };

        let result = executor(config, &transport)
            .execute(
                &hosts(&["c", "b", "a", "d"]),
                &[probe(&applied, Some("a"))],
                &CancellationToken::new(),
            )
            .await
            .unwrap();

        assert_eq!(result.host("a").unwrap().status, HostOutcome::Failed);
        for id in ["b", "c", "d"] {
            let host = result.host(id).unwrap();
            assert_eq!(host.status, HostOutcome::Skipped);
            assert_eq!(
                host.error,
                Some(HostError::NotStarted {
                    reason: "canary failed".into()
                })
            );
        }
        // The remaining hosts were never contacted
        assert_eq!(transport.pinged(), vec!["a"]);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_canary_success_rolls_out() {
        let transport = Arc::new(FakeTransport::default());
        let applied = Applied::default();
        let config = FleetExecutorConfig {
            strategy: Strategy::Canary,
            canary_fraction: Some(0.5),
            ..Default::default()
        };

        let result = executor(config, &transport)
            .execute(
                &hosts(&["a", "b", "c", "d"]),
                &[probe(&applied, None)],
                &CancellationToken::new(),
            )
            .await
            .unwrap();
        assert!(result.all_successful());

        let finished: BTreeMap<String, Instant> = applied.lock().unwrap().iter().cloned().collect();
        let canary_done = finished["a"].max(finished["b"]);
        assert!(transport.started_at("c") >= canary_done);
        assert!(transport.started_at("d") >= canary_done);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_timeout_fails_host_and_keeps_partial_results() {
        let transport = Arc::new(FakeTransport {
            exec_delay: Duration::from_secs(30),
            ..Default::default()
        });
        let applied = Applied::default();
        let first: SharedStep = Arc::new(Probe {
            name: "first",
            applied: Arc::clone(&applied),
            ..Default::default()
        });
        let slow: SharedStep = Arc::new(Probe {
            name: "slow",
            deps: vec!["first"],
            remote: true,
            applied: Arc::clone(&applied),
            ..Default::default()
        });
        let config = FleetExecutorConfig {
            timeout: Duration::from_millis(300),
            ..Default::default()
        };

        let started = Instant::now();
        let result = executor(config, &transport)
            .execute(&hosts(&["a"]), &[slow, first], &CancellationToken::new())
            .await
            .unwrap();
        assert!(started.elapsed() < Duration::from_secs(5));

        let host = result.host("a").unwrap();
        assert_eq!(host.status, HostOutcome::Failed);
        assert_eq!(host.error, Some(HostError::TimedOut { after_ms: 300 }));
        let steps: Vec<_> = host.step_results.iter().map(|r| r.status).collect();
        assert_eq!(steps, vec![ResultStatus::Applied, ResultStatus::Failed]);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_abandoned_host_keeps_its_slot() {
        let transport = Arc::new(FakeTransport {
            stubborn: BTreeMap::from([("a", Duration::from_millis(2600))]),
            ..Default::default()
        });
        let applied = Applied::default();
        let config = FleetExecutorConfig {
            max_parallel: 1,
            timeout: Duration::from_millis(100),
            ..Default::default()
        };

        let result = executor(config, &transport)
            .execute(&hosts(&["a", "b"]), &[probe(&applied, None)], &CancellationToken::new())
            .await
            .unwrap();

        assert_eq!(
            result.host("a").unwrap().error,
            Some(HostError::TimedOut { after_ms: 100 })
        );
        assert_eq!(result.host("b").unwrap().status, HostOutcome::Succeeded);
        let gap = transport.started_at("b") - transport.started_at("a");
        assert!(gap >= Duration::from_millis(2500), "b started after {gap:?}");
        assert_eq!(transport.peak.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_cancellation_reaches_in_flight_hosts() {
        let transport = Arc::new(FakeTransport {
            exec_delay: Duration::from_secs(30),
            ..Default::default()
        });
        let step: SharedStep = Arc::new(Probe {
            name: "slow",
            remote: true,
            ..Default::default()
        });
        let config = FleetExecutorConfig {
            max_parallel: 1,
            ..Default::default()
        };
        let cancel = CancellationToken::new();
        let trigger = cancel.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(150)).await;
            trigger.cancel();
        });

        let result = executor(config, &transport)
            .execute(&hosts(&["a", "b", "c"]), &[step], &cancel)
            .await
            .unwrap();

        let a = result.host("a").unwrap();
        assert_eq!(a.status, HostOutcome::Failed);
        assert_eq!(a.error, Some(HostError::Cancelled));
        for id in ["b", "c"] {
            assert_eq!(result.host(id).unwrap().status, HostOutcome::Skipped);
        }
        assert_eq!(transport.pinged(), vec!["a"]);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_plan_captures_unreachable_hosts() {
        let transport = Arc::new(FakeTransport {
            unreachable: BTreeSet::from(["b"]),
            ..Default::default()
        });
        let applied = Applied::default();

        let plan = executor(FleetExecutorConfig::default(), &transport)
            .plan(
                &hosts(&["c", "a", "b"]),
                &[probe(&applied, None)],
                &CancellationToken::new(),
            )
            .await
            .unwrap();

        let order: Vec<_> = plan.hosts.iter().map(|h| h.host_id.as_str()).collect();
        assert_eq!(order, vec!["a", "b", "c"]);
        assert_eq!(
            plan.host("b").unwrap().error,
            Some(HostError::Unreachable {
                message: "connection refused".into()
            })
        );
        assert_eq!(plan.host("a").unwrap().pending().count(), 1);
        assert_eq!(plan.pending_hosts().count(), 2);
        assert_eq!(plan.failed_hosts().count(), 1);
        assert_eq!(plan.diff_summary().additions, 2);
        // Planning never applies
        assert!(applied.lock().unwrap().is_empty());
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_dry_run_applies_nothing() {
        let transport = Arc::new(FakeTransport::default());
        let applied = Applied::default();
        let config = FleetExecutorConfig {
            dry_run: true,
            ..Default::default()
        };

        let result = executor(config, &transport)
            .execute(&hosts(&["a", "b"]), &[probe(&applied, None)], &CancellationToken::new())
            .await
            .unwrap();

        assert!(result.dry_run);
        assert!(result.all_successful());
        assert!(applied.lock().unwrap().is_empty());
        assert_eq!(result.summary().steps.would_apply, 2);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_invalid_graph_contacts_no_host() {
        let transport = Arc::new(FakeTransport::default());
        let a: SharedStep = Arc::new(Probe {
            name: "a",
            deps: vec!["b"],
            ..Default::default()
        });
        let b: SharedStep = Arc::new(Probe {
            name: "b",
            deps: vec!["a"],
            ..Default::default()
        });

        let err = executor(FleetExecutorConfig::default(), &transport)
            .execute(&hosts(&["a"]), &[a, b], &CancellationToken::new())
            .await
            .unwrap_err();
        assert!(matches!(err, FleetError::Graph(_)));
        assert!(transport.pinged().is_empty());
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_result_json_lists_hosts_in_id_order() {
        let transport = Arc::new(FakeTransport::default());
        let applied = Applied::default();

        let result = executor(FleetExecutorConfig::default(), &transport)
            .execute(
                &hosts(&["web-2", "db-1", "web-1"]),
                &[probe(&applied, None)],
                &CancellationToken::new(),
            )
            .await
            .unwrap();

        let json = serde_json::to_value(&result).unwrap();
        let order: Vec<_> = json["hosts"]
            .as_array()
            .unwrap()
            .iter()
            .map(|h| h["host_id"].as_str().unwrap().to_string())
            .collect();
        assert_eq!(order, vec!["db-1", "web-1", "web-2"]);
        assert_eq!(json["strategy"], "parallel");
        assert_eq!(json["hosts"][0]["status"], "succeeded");
    }

    #[test]
    fn test_new_rejects_invalid_config() {
        let transport: Arc<dyn Transport> = Arc::new(FakeTransport::default());
        let config = FleetExecutorConfig {
            max_parallel: 0,
            ..Default::default()
        };
        assert!(matches!(
            FleetExecutor::new(config, transport),
            Err(FleetError::InvalidConfig(_))
        ));
    }
}
