//! Discovery engine handle
//!
//! Ties a prober, a topology store and a configuration together and owns
//! the lifecycle of background discovery runs.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use hostmap_core::NeighborProber;
use hostmap_topology::{EventStream, TopologySnapshot, TopologyStore};
use parking_lot::Mutex;
use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use tracing::{info, instrument};

use crate::config::DiscoveryConfig;
use crate::error::{DiscoveryError, DiscoveryResult};
use crate::scheduler::{DiscoveryReport, DiscoveryScheduler};

/// A discovery engine
///
/// # Example
///
/// ```rust,ignore
/// let engine = DiscoveryEngine::new(config, prober)?;
/// let mut events = engine.subscribe();
///
/// engine.start()?;
/// while let Some(event) = events.recv().await {
///     println!("{:?}", event);
/// }
/// let report = engine.stop().await?;
/// ```
pub struct DiscoveryEngine {
    config: DiscoveryConfig,
    prober: Arc<dyn NeighborProber>,
    store: Arc<TopologyStore>,
    /// Shutdown signal sender
    shutdown_tx: broadcast::Sender<()>,
    /// Background run (None until started)
    run_handle: Mutex<Option<JoinHandle<DiscoveryResult<DiscoveryReport>>>>,
    /// Whether a background run has been started
    started: AtomicBool,
}

impl DiscoveryEngine {
    /// Create an engine with a fresh store
    pub fn new<P>(config: DiscoveryConfig, prober: P) -> DiscoveryResult<Self>
    where
        P: NeighborProber + 'static,
    {
        Self::with_store(config, prober, Arc::new(TopologyStore::new()))
    }

    /// Create an engine over an existing store
    pub fn with_store<P>(
        config: DiscoveryConfig,
        prober: P,
        store: Arc<TopologyStore>,
    ) -> DiscoveryResult<Self>
    where
        P: NeighborProber + 'static,
    {
        config.validate()?;
        for address in &config.ignored_addresses {
            store.ignore_address(*address);
        }

        let (shutdown_tx, _) = broadcast::channel(1);
        Ok(Self {
            config,
            prober: Arc::new(prober),
            store,
            shutdown_tx,
            run_handle: Mutex::new(None),
            started: AtomicBool::new(false),
        })
    }

    /// The engine's configuration
    pub fn config(&self) -> &DiscoveryConfig {
        &self.config
    }

    /// The topology store
    pub fn store(&self) -> &Arc<TopologyStore> {
        &self.store
    }

    /// Subscribe to topology events
    pub fn subscribe(&self) -> EventStream {
        self.store.subscribe()
    }

    /// A consistent view of the current topology
    pub fn snapshot(&self) -> TopologySnapshot {
        self.store.snapshot()
    }

    /// Run one sweep to completion, ignoring the configured refresh interval
    #[instrument(skip(self), fields(seeds = self.config.seeds.len()))]
    pub async fn run_sweep(&self) -> DiscoveryResult<DiscoveryReport> {
        self.scheduler(true, None).run().await
    }

    /// Run until `shutdown_rx` fires (or drains, in single-sweep mode)
    pub async fn run_until(
        &self,
        shutdown_rx: broadcast::Receiver<()>,
    ) -> DiscoveryResult<DiscoveryReport> {
        self.scheduler(self.config.is_single_sweep(), Some(shutdown_rx))
            .run()
            .await
    }

    /// Start discovery in the background
    ///
    /// Must be called from within a tokio runtime.
    #[instrument(skip(self))]
    pub fn start(&self) -> DiscoveryResult<()> {
        if self.started.swap(true, Ordering::SeqCst) {
            return Err(DiscoveryError::AlreadyStarted);
        }

        let scheduler = self.scheduler(
            self.config.is_single_sweep(),
            Some(self.shutdown_tx.subscribe()),
        );
        *self.run_handle.lock() = Some(tokio::spawn(scheduler.run()));

        info!("Discovery engine started");
        Ok(())
    }

    /// Stop background discovery and return its report
    ///
    /// In-flight probes are abandoned and their results discarded.
    #[instrument(skip(self))]
    pub async fn stop(&self) -> DiscoveryResult<DiscoveryReport> {
        if !self.started.swap(false, Ordering::SeqCst) {
            return Err(DiscoveryError::NotStarted);
        }

        // Signal shutdown; the run may already have drained on its own
        let _ = self.shutdown_tx.send(());

        let handle = self.run_handle.lock().take();
        let report = match handle {
            Some(handle) => handle
                .await
                .map_err(|e| DiscoveryError::Join(e.to_string()))??,
            None => return Err(DiscoveryError::NotStarted),
        };

        info!(probes = report.probes_started, "Discovery engine stopped");
        Ok(report)
    }

    /// Check if a background run has been started
    pub fn is_started(&self) -> bool {
        self.started.load(Ordering::SeqCst)
    }

    fn scheduler(
        &self,
        single_sweep: bool,
        shutdown_rx: Option<broadcast::Receiver<()>>,
    ) -> DiscoveryScheduler {
        DiscoveryScheduler::new(
            self.config.clone(),
            self.prober.clone(),
            self.store.clone(),
            single_sweep,
            shutdown_rx,
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use hostmap_core::{HostAddress, MockProber, NeighborCandidate};
    use std::time::Duration;

    fn addr(s: &str) -> HostAddress {
        s.parse().unwrap()
    }

    #[test]
    fn test_invalid_config_is_rejected() {
        let config = DiscoveryConfig::default().with_max_concurrency(0);
        let result = DiscoveryEngine::new(config, MockProber::new());
        assert!(matches!(result, Err(DiscoveryError::Config(_))));
    }

    #[tokio::test]
    async fn test_run_sweep_discovers_neighbors() {
        let prober = MockProber::new();
        prober.respond(addr("10.0.0.1"), vec![NeighborCandidate::new(addr("10.0.0.2"))]);

        let engine = DiscoveryEngine::new(
            DiscoveryConfig::with_seeds([addr("10.0.0.1")]),
            prober,
        )
        .unwrap();
        let report = engine.run_sweep().await.unwrap();

        assert_eq!(report.probes_started, 2);
        assert_eq!(report.hosts_discovered, 2);
        assert!(!report.cancelled);
        assert_eq!(engine.snapshot().host_count(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_start_stop_lifecycle() {
        let engine = DiscoveryEngine::new(
            DiscoveryConfig::with_seeds([addr("10.0.0.1")])
                .with_refresh_interval(Some(Duration::from_secs(30))),
            MockProber::new(),
        )
        .unwrap();

        assert!(!engine.is_started());
        assert!(matches!(engine.stop().await, Err(DiscoveryError::NotStarted)));

        engine.start().unwrap();
        assert!(engine.is_started());
        assert!(matches!(engine.start(), Err(DiscoveryError::AlreadyStarted)));

        tokio::time::sleep(Duration::from_secs(95)).await;
        let report = engine.stop().await.unwrap();
        assert!(!engine.is_started());
        assert!(report.cancelled);
        // Initial probe plus three refreshes
        assert_eq!(report.probes_started, 4);

        // Can be started again
        engine.start().unwrap();
        engine.stop().await.unwrap();
    }
}
