//! Error types for hostmap

use std::time::Duration;

use thiserror::Error;

/// Errors raised while parsing addresses
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum AddressError {
    #[error("Invalid MAC address: {0}")]
    InvalidMac(String),

    #[error("Unrecognized address: {0}")]
    Unrecognized(String),
}

/// Errors returned by a neighbor probe
///
/// All probe errors are local to one frontier entry: they feed the retry
/// and backoff path and never abort a discovery run.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ProbeError {
    /// The probe did not answer before its deadline
    #[error("Probe timed out after {0:?}")]
    Timeout(Duration),

    /// The device refused the connection or could not be reached
    #[error("Host unreachable: {0}")]
    Unreachable(String),

    /// The prober returned data that failed validation
    #[error("Malformed probe result: {0}")]
    Malformed(String),
}

impl ProbeError {
    /// Whether a later attempt could succeed
    ///
    /// Every probe error counts as one failed attempt; this only tells
    /// callers whether the failure looked transient.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Timeout(_) | Self::Unreachable(_))
    }

    /// Short label for logs and counters
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Timeout(_) => "timeout",
            Self::Unreachable(_) => "unreachable",
            Self::Malformed(_) => "malformed",
        }
    }
}

/// Result type alias for probe operations
pub type ProbeResult<T> = Result<T, ProbeError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_probe_error_display() {
        let err = ProbeError::Timeout(Duration::from_millis(250));
        assert!(format!("{}", err).contains("250ms"));

        let err = ProbeError::Unreachable("connection refused".to_string());
        assert!(format!("{}", err).contains("connection refused"));

        let err = ProbeError::Malformed("empty candidate".to_string());
        assert!(format!("{}", err).contains("Malformed"));
    }

    #[test]
    fn test_probe_error_retryable() {
        assert!(ProbeError::Timeout(Duration::from_secs(1)).is_retryable());
        assert!(ProbeError::Unreachable("x".into()).is_retryable());
        assert!(!ProbeError::Malformed("x".into()).is_retryable());
    }

    #[test]
    fn test_address_error_display() {
        let err = AddressError::InvalidMac("aa:bb".to_string());
        assert!(format!("{}", err).contains("aa:bb"));
    }
}
