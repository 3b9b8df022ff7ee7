//! Configuration for discovery runs

use std::time::Duration;

use hostmap_core::HostAddress;
use serde::{Deserialize, Serialize};

use crate::backoff::BackoffPolicy;
use crate::error::ConfigError;

/// Seeds and tunables for a discovery run
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DiscoveryConfig {
    /// Addresses probed first
    pub seeds: Vec<HostAddress>,
    /// Maximum number of probes in flight at once
    pub max_concurrency: usize,
    /// Deadline for a single probe in milliseconds
    pub probe_timeout_ms: u64,
    /// Delay schedule between failed attempts
    pub backoff: BackoffPolicy,
    /// Failed attempts after which a host is marked unreachable
    pub max_attempts: u32,
    /// Re-probe interval for hosts that answered; `None` runs a single sweep
    pub refresh_interval_ms: Option<u64>,
    /// Infrastructure addresses that are never treated as hosts
    pub ignored_addresses: Vec<HostAddress>,
}

impl Default for DiscoveryConfig {
    fn default() -> Self {
        Self {
            seeds: Vec::new(),
            max_concurrency: 16,
            probe_timeout_ms: 5_000,
            backoff: BackoffPolicy::default(),
            max_attempts: 3,
            refresh_interval_ms: Some(300_000),
            ignored_addresses: Vec::new(),
        }
    }
}

impl DiscoveryConfig {
    /// Create a configuration seeded with `seeds`
    pub fn with_seeds(seeds: impl IntoIterator<Item = HostAddress>) -> Self {
        Self {
            seeds: seeds.into_iter().collect(),
            ..Default::default()
        }
    }

    /// Add a seed
    pub fn with_seed(mut self, seed: HostAddress) -> Self {
        self.seeds.push(seed);
        self
    }

    /// Set the concurrency bound
    pub fn with_max_concurrency(mut self, max_concurrency: usize) -> Self {
        self.max_concurrency = max_concurrency;
        self
    }

    /// Set the per-probe deadline
    pub fn with_probe_timeout(mut self, timeout: Duration) -> Self {
        self.probe_timeout_ms = timeout.as_millis() as u64;
        self
    }

    /// Set the retry backoff
    pub fn with_backoff(mut self, backoff: BackoffPolicy) -> Self {
        self.backoff = backoff;
        self
    }

    /// Set the attempt bound
    pub fn with_max_attempts(mut self, max_attempts: u32) -> Self {
        self.max_attempts = max_attempts;
        self
    }

    /// Set the refresh interval (`None` for a single sweep)
    pub fn with_refresh_interval(mut self, interval: Option<Duration>) -> Self {
        self.refresh_interval_ms = interval.map(|i| i.as_millis() as u64);
        self
    }

    /// Disable steady-state refresh
    pub fn single_sweep(self) -> Self {
        self.with_refresh_interval(None)
    }

    /// Ignore an infrastructure address
    pub fn with_ignored_address(mut self, address: HostAddress) -> Self {
        self.ignored_addresses.push(address);
        self
    }

    /// Per-probe deadline
    pub fn probe_timeout(&self) -> Duration {
        Duration::from_millis(self.probe_timeout_ms)
    }

    /// Re-probe interval, if refreshing
    pub fn refresh_interval(&self) -> Option<Duration> {
        self.refresh_interval_ms.map(Duration::from_millis)
    }

    /// Whether runs end once the frontier drains
    pub fn is_single_sweep(&self) -> bool {
        self.refresh_interval_ms.is_none()
    }

    /// Check the configuration
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.max_concurrency == 0 {
            return Err(ConfigError::ZeroConcurrency);
        }
        if self.max_attempts == 0 {
            return Err(ConfigError::ZeroAttempts);
        }
        if self.probe_timeout_ms == 0 {
            return Err(ConfigError::ZeroTimeout);
        }
        if self.refresh_interval_ms == Some(0) {
            return Err(ConfigError::ZeroRefreshInterval);
        }
        let multiplier = self.backoff.multiplier;
        if !multiplier.is_finite() || multiplier < 1.0 {
            return Err(ConfigError::InvalidMultiplier(multiplier));
        }
        if let Some(seed) = self
            .seeds
            .iter()
            .find(|seed| self.ignored_addresses.contains(seed))
        {
            return Err(ConfigError::IgnoredSeed(*seed));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn addr(s: &str) -> HostAddress {
        s.parse().unwrap()
    }

    #[test]
    fn test_defaults() {
        let config = DiscoveryConfig::default();
        assert_eq!(config.max_concurrency, 16);
        assert_eq!(config.probe_timeout(), Duration::from_secs(5));
        assert_eq!(config.max_attempts, 3);
        assert_eq!(config.refresh_interval(), Some(Duration::from_secs(300)));
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_builders() {
        let config = DiscoveryConfig::with_seeds([addr("10.0.0.1")])
            .with_seed(addr("10.0.0.2"))
            .with_max_concurrency(4)
            .with_probe_timeout(Duration::from_millis(300))
            .with_max_attempts(5)
            .single_sweep();

        assert_eq!(config.seeds.len(), 2);
        assert_eq!(config.max_concurrency, 4);
        assert_eq!(config.probe_timeout_ms, 300);
        assert!(config.is_single_sweep());
    }

    #[test]
    fn test_validation() {
        let base = DiscoveryConfig::default();
        assert_eq!(
            base.clone().with_max_concurrency(0).validate(),
            Err(ConfigError::ZeroConcurrency)
        );
        assert_eq!(
            base.clone().with_max_attempts(0).validate(),
            Err(ConfigError::ZeroAttempts)
        );
        assert_eq!(
            base.clone()
                .with_probe_timeout(Duration::ZERO)
                .validate(),
            Err(ConfigError::ZeroTimeout)
        );
        assert_eq!(
            base.clone()
                .with_refresh_interval(Some(Duration::ZERO))
                .validate(),
            Err(ConfigError::ZeroRefreshInterval)
        );

        let mut shrinking = base.clone();
        shrinking.backoff.multiplier = 0.5;
        assert_eq!(
            shrinking.validate(),
            Err(ConfigError::InvalidMultiplier(0.5))
        );

        let conflicting = base
            .with_seed(addr("10.0.0.1"))
            .with_ignored_address(addr("10.0.0.1"));
        assert!(matches!(
            conflicting.validate(),
            Err(ConfigError::IgnoredSeed(_))
        ));
    }

    #[test]
    fn test_deserialize_partial() {
        let json = r#"{
            "seeds": ["10.0.0.1", "02:00:00:00:00:01"],
            "max_concurrency": 8,
            "backoff": { "initial_ms": 500 }
        }"#;
        let config: DiscoveryConfig = serde_json::from_str(json).unwrap();
        assert_eq!(config.seeds[1], addr("02:00:00:00:00:01"));
        assert_eq!(config.max_concurrency, 8);
        assert_eq!(config.backoff.initial_ms, 500);
        assert_eq!(config.backoff.multiplier, 2.0);
        assert_eq!(config.max_attempts, 3);
    }
}
