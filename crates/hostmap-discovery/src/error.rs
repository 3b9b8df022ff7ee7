//! Error types for the discovery scheduler

use hostmap_core::HostAddress;
use hostmap_topology::TopologyError;
use thiserror::Error;

/// Invalid discovery configuration
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ConfigError {
    #[error("max_concurrency must be at least 1")]
    ZeroConcurrency,

    #[error("max_attempts must be at least 1")]
    ZeroAttempts,

    #[error("probe_timeout_ms must be greater than zero")]
    ZeroTimeout,

    #[error("refresh_interval_ms must be greater than zero (omit it for a single sweep)")]
    ZeroRefreshInterval,

    #[error("Backoff multiplier must be a finite number >= 1.0, got {0}")]
    InvalidMultiplier(f64),

    #[error("Seed {0} is also listed as an ignored address")]
    IgnoredSeed(HostAddress),
}

/// Errors that stop a discovery run
///
/// Probe failures never appear here: they only drive retry state.
#[derive(Debug, Error)]
pub enum DiscoveryError {
    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    /// Fatal topology store error
    #[error("Topology store error: {0}")]
    Store(#[from] TopologyError),

    /// Engine already started
    #[error("Discovery already started")]
    AlreadyStarted,

    /// Engine not started
    #[error("Discovery not started")]
    NotStarted,

    /// The background run panicked or was aborted
    #[error("Discovery task failed: {0}")]
    Join(String),
}

/// Result type for discovery operations
pub type DiscoveryResult<T> = Result<T, DiscoveryError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_config_error_converts() {
        let err: DiscoveryError = ConfigError::ZeroConcurrency.into();
        assert!(matches!(err, DiscoveryError::Config(_)));
        assert!(err.to_string().contains("max_concurrency"));
    }

    #[test]
    fn test_store_error_converts() {
        let err: DiscoveryError = TopologyError::StoreCorruption("dangling edge".into()).into();
        assert!(err.to_string().contains("dangling edge"));
    }
}
