//! Discovery scheduler
//!
//! Drives the probe -> merge loop:
//!
//! 1. Seeds, and every host already known and not unreachable, enter the
//!    frontier as due immediately.
//! 2. Due entries are started as probe cycles, at most `max_concurrency`
//!    at a time. A cycle probes under a deadline, validates the answer and
//!    merges it in one store transaction.
//! 3. Finished cycles feed back into the frontier: successes promote new
//!    hosts and are refreshed later (or retired in a single sweep);
//!    failures back off and, at `max_attempts`, mark the host unreachable.
//!
//! The store is only locked inside the merge, never across a probe.
//!
//! A host absorbed by a collapse while its probe is in flight keeps its
//! entry until that probe ends; only then is the canonical host scheduled,
//! so one device never has two probes running.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use hostmap_core::{HostAddress, HostId, Liveness, NeighborProber, ProbeError};
use hostmap_topology::{MergeEngine, MergeOutcome, TopologyError, TopologyStore};
use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;
use tokio::task::{JoinError, JoinSet};
use tokio::time::Instant;
use tracing::{debug, error, info, instrument, warn};

use crate::config::DiscoveryConfig;
use crate::error::{DiscoveryError, DiscoveryResult};
use crate::frontier::{EntryState, Frontier, FrontierEntry};

/// Counters for one discovery run
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DiscoveryReport {
    pub probes_started: u64,
    pub probes_succeeded: u64,
    pub probes_failed: u64,
    pub probes_timed_out: u64,
    pub hosts_discovered: u64,
    pub hosts_unreachable: u64,
    /// Split-brain collapses
    pub merges: u64,
    /// Hosts dropped from the frontier because they have no probeable address
    pub hosts_skipped: u64,
    /// The run ended on a shutdown signal rather than draining
    pub cancelled: bool,
    pub elapsed_ms: u64,
}

/// What a probe cycle produced
#[derive(Debug)]
enum CycleResult {
    Merged(MergeOutcome),
    Failed(ProbeError),
    Store(TopologyError),
}

/// A finished probe cycle
#[derive(Debug)]
struct ProbeCycle {
    host: HostId,
    result: CycleResult,
}

/// Runs the frontier loop for one discovery run
pub struct DiscoveryScheduler {
    config: DiscoveryConfig,
    prober: Arc<dyn NeighborProber>,
    store: Arc<TopologyStore>,
    merge: MergeEngine,
    frontier: Frontier,
    /// Absorbed hosts still probing, mapped to their canonical host
    redirects: HashMap<HostId, HostId>,
    report: DiscoveryReport,
    single_sweep: bool,
    shutdown_rx: Option<broadcast::Receiver<()>>,
}

impl DiscoveryScheduler {
    /// Create a scheduler
    ///
    /// `single_sweep` ends the run once the frontier drains; otherwise the
    /// run continues until `shutdown_rx` fires or its sender is dropped.
    pub fn new(
        config: DiscoveryConfig,
        prober: Arc<dyn NeighborProber>,
        store: Arc<TopologyStore>,
        single_sweep: bool,
        shutdown_rx: Option<broadcast::Receiver<()>>,
    ) -> Self {
        let merge = MergeEngine::new(store.clone());
        Self {
            config,
            prober,
            store,
            merge,
            frontier: Frontier::new(),
            redirects: HashMap::new(),
            report: DiscoveryReport::default(),
            single_sweep,
            shutdown_rx,
        }
    }

    /// Run to completion
    ///
    /// # Errors
    ///
    /// Only fatal conditions end the run with an error: store corruption
    /// or a probe task that panicked. Probe failures never do.
    pub async fn run(mut self) -> DiscoveryResult<DiscoveryReport> {
        let started = Instant::now();
        self.seed()?;
        info!(
            prober = self.prober.name(),
            frontier = self.frontier.len(),
            max_concurrency = self.config.max_concurrency,
            single_sweep = self.single_sweep,
            "Discovery started"
        );

        let mut tasks: JoinSet<ProbeCycle> = JoinSet::new();

        loop {
            let now = Instant::now();
            while tasks.len() < self.config.max_concurrency {
                let Some(entry) = self.frontier.pop_due(now) else {
                    break;
                };
                self.launch(&mut tasks, entry);
            }

            if self.single_sweep && tasks.is_empty() && self.frontier.is_empty() {
                break;
            }

            let next_due = self.frontier.next_due();
            let has_capacity = tasks.len() < self.config.max_concurrency;

            tokio::select! {
                _ = wait_for_shutdown(&mut self.shutdown_rx) => {
                    info!(in_flight = tasks.len(), "Discovery shutting down");
                    tasks.abort_all();
                    while tasks.join_next().await.is_some() {}
                    self.report.cancelled = true;
                    break;
                }
                Some(joined) = tasks.join_next(), if !tasks.is_empty() => {
                    self.finish(joined)?;
                }
                _ = tokio::time::sleep_until(next_due.unwrap_or_else(Instant::now)),
                    if next_due.is_some() && has_capacity => {}
            }
        }

        self.report.elapsed_ms = started.elapsed().as_millis() as u64;
        info!(
            probes = self.report.probes_started,
            discovered = self.report.hosts_discovered,
            unreachable = self.report.hosts_unreachable,
            cancelled = self.report.cancelled,
            "Discovery finished"
        );
        Ok(self.report)
    }

    /// Upsert the seeds and put every live host into the frontier
    fn seed(&mut self) -> DiscoveryResult<()> {
        let now = Instant::now();
        for address in &self.config.ignored_addresses {
            self.store.ignore_address(*address);
        }
        for address in &self.config.seeds {
            let (id, is_new) = self.store.seed(*address)?;
            if is_new {
                self.report.hosts_discovered += 1;
            }
            self.frontier.schedule(id, now);
        }
        for host in self.store.snapshot().hosts() {
            if host.liveness != Liveness::Unreachable {
                self.frontier.schedule(host.id, now);
            }
        }
        Ok(())
    }

    /// Start a probe cycle for a due entry
    fn launch(&mut self, tasks: &mut JoinSet<ProbeCycle>, entry: FrontierEntry) {
        let host = entry.host;
        if self.awaits_redirect(host) {
            // Rescheduled once the absorbed probe of the same device ends
            debug!(%host, "Same device still probing under an absorbed id");
            self.frontier.remove(host);
            return;
        }
        let address = match self.store.host(host) {
            Some(found) if found.id == host => found.probe_address(),
            Some(found) => {
                // Absorbed since it was scheduled
                self.frontier.remove(host);
                self.frontier.schedule(found.id, Instant::now());
                return;
            }
            None => {
                warn!(%host, "Scheduled host no longer exists");
                self.frontier.remove(host);
                return;
            }
        };
        let Some(address) = address else {
            debug!(%host, "Host has no probeable address");
            self.frontier.remove(host);
            self.report.hosts_skipped += 1;
            return;
        };

        self.report.probes_started += 1;
        let prober = self.prober.clone();
        let merge = self.merge.clone();
        let deadline = self.config.probe_timeout();
        tasks.spawn(async move {
            let result = probe_cycle(prober, merge, host, address, deadline).await;
            ProbeCycle { host, result }
        });
    }

    /// Fold a finished cycle back into the frontier
    fn finish(&mut self, joined: Result<ProbeCycle, JoinError>) -> DiscoveryResult<()> {
        let cycle = match joined {
            Ok(cycle) => cycle,
            Err(e) if e.is_cancelled() => return Ok(()),
            Err(e) => {
                error!(error = %e, "Probe task panicked");
                return Err(DiscoveryError::Join(e.to_string()));
            }
        };

        let host = cycle.host;
        let result = match cycle.result {
            CycleResult::Merged(outcome) => {
                self.on_success(host, outcome);
                Ok(())
            }
            CycleResult::Failed(err) => self.on_failure(host, err),
            CycleResult::Store(err) if err.is_fatal() => {
                error!(%host, error = %err, "Topology store corrupted, halting discovery");
                Err(DiscoveryError::Store(err))
            }
            CycleResult::Store(err) => {
                warn!(%host, error = %err, "Merge rejected, dropping host from frontier");
                self.frontier.remove(host);
                Ok(())
            }
        };

        if let Some(canonical) = self.redirects.remove(&host) {
            self.frontier.remove(host);
            if let Some(canonical) = self.store.resolve(canonical) {
                debug!(absorbed = %host, %canonical, "Probing continues under canonical host");
                self.frontier.schedule(canonical, Instant::now());
            }
        }
        result
    }

    /// Whether an absorbed host's probe of the same device is in flight
    fn awaits_redirect(&self, host: HostId) -> bool {
        self.redirects
            .values()
            .any(|canonical| self.store.resolve(*canonical) == Some(host))
    }

    fn on_success(&mut self, host: HostId, outcome: MergeOutcome) {
        let now = Instant::now();
        self.report.probes_succeeded += 1;
        self.report.hosts_discovered += outcome.discovered.len() as u64;
        self.report.merges += outcome.collapsed.len() as u64;

        for (absorbed, canonical) in &outcome.collapsed {
            match self.frontier.state(*absorbed) {
                Some(EntryState::Probing) => {
                    self.redirects.insert(*absorbed, *canonical);
                }
                Some(EntryState::Pending) => {
                    self.frontier.remove(*absorbed);
                    self.frontier.schedule(*canonical, now);
                }
                None => {}
            }
        }

        for promoted in &outcome.promoted {
            if self.frontier.schedule(*promoted, now) {
                debug!(host = %promoted, "Promoted into frontier");
            }
        }

        match self.config.refresh_interval().filter(|_| !self.single_sweep) {
            Some(interval) => {
                self.frontier.reschedule(host, now + interval, 0);
            }
            None => {
                self.frontier.complete(host);
            }
        }
    }

    fn on_failure(&mut self, host: HostId, err: ProbeError) -> DiscoveryResult<()> {
        self.report.probes_failed += 1;
        if matches!(err, ProbeError::Timeout(_)) {
            self.report.probes_timed_out += 1;
        }

        let Some(previous) = self.frontier.attempts(host) else {
            debug!(%host, "Entry retired while probing, ignoring failure");
            return Ok(());
        };
        let attempts = previous + 1;

        if attempts >= self.config.max_attempts {
            self.frontier.remove(host);
            match self.store.mark_unreachable(host, attempts) {
                Ok(true) => self.report.hosts_unreachable += 1,
                Ok(false) => {}
                Err(e) if e.is_fatal() => return Err(e.into()),
                Err(e) => warn!(%host, error = %e, "Could not mark host unreachable"),
            }
            return Ok(());
        }

        let delay = self.config.backoff.delay(attempts);
        debug!(
            %host,
            attempts,
            kind = err.kind(),
            retry_in_ms = delay.as_millis() as u64,
            "Probe failed, backing off"
        );
        match self.store.mark_stale(host) {
            Ok(_) => {}
            Err(e) if e.is_fatal() => return Err(e.into()),
            Err(e) => warn!(%host, error = %e, "Could not mark host stale"),
        }
        self.frontier.reschedule(host, Instant::now() + delay, attempts);
        Ok(())
    }
}

/// Probe one host and merge what it reports
#[instrument(skip(prober, merge, deadline), fields(prober = prober.name()))]
async fn probe_cycle(
    prober: Arc<dyn NeighborProber>,
    merge: MergeEngine,
    host: HostId,
    address: HostAddress,
    deadline: Duration,
) -> CycleResult {
    debug!("Probing");
    let candidates = match tokio::time::timeout(deadline, prober.probe(&address)).await {
        Ok(Ok(candidates)) => candidates,
        Ok(Err(e)) => {
            debug!(error = %e, "Probe failed");
            return CycleResult::Failed(e);
        }
        Err(_) => {
            debug!(deadline_ms = deadline.as_millis() as u64, "Probe timed out");
            return CycleResult::Failed(ProbeError::Timeout(deadline));
        }
    };

    if let Some(err) = candidates.iter().find_map(|c| c.validate().err()) {
        warn!(error = %err, "Discarding malformed probe result");
        return CycleResult::Failed(err);
    }

    match merge.apply(host, &candidates) {
        Ok(outcome) => {
            debug!(
                neighbors = candidates.len(),
                discovered = outcome.discovered.len(),
                "Probe merged"
            );
            CycleResult::Merged(outcome)
        }
        Err(e) => CycleResult::Store(e),
    }
}

/// Resolve when a shutdown is signalled or the sender is gone
async fn wait_for_shutdown(shutdown_rx: &mut Option<broadcast::Receiver<()>>) {
    match shutdown_rx {
        Some(rx) => {
            let _ = rx.recv().await;
        }
        None => std::future::pending::<()>().await,
    }
}
