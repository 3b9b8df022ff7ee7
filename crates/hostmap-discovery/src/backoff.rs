//! Retry backoff

use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Exponential retry backoff
///
/// The delay before retry `n` (1-based) is `initial * multiplier^(n-1)`,
/// capped at `max`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BackoffPolicy {
    /// Delay after the first failure in milliseconds
    pub initial_ms: u64,
    /// Growth factor per further failure
    pub multiplier: f64,
    /// Upper bound on any delay in milliseconds
    pub max_ms: u64,
}

impl Default for BackoffPolicy {
    fn default() -> Self {
        Self {
            initial_ms: 1_000,
            multiplier: 2.0,
            max_ms: 60_000,
        }
    }
}

impl BackoffPolicy {
    /// Create a policy
    pub fn new(initial: Duration, multiplier: f64, max: Duration) -> Self {
        Self {
            initial_ms: initial.as_millis() as u64,
            multiplier,
            max_ms: max.as_millis() as u64,
        }
    }

    /// The same delay after every failure
    pub fn fixed(delay: Duration) -> Self {
        Self::new(delay, 1.0, delay)
    }

    /// Delay after the first failure
    pub fn initial(&self) -> Duration {
        Duration::from_millis(self.initial_ms)
    }

    /// Upper bound on any delay
    pub fn max(&self) -> Duration {
        Duration::from_millis(self.max_ms)
    }

    /// Delay before retrying after `attempt` failures
    pub fn delay(&self, attempt: u32) -> Duration {
        if attempt == 0 {
            return Duration::ZERO;
        }
        let exponent = (attempt - 1).min(i32::MAX as u32) as i32;
        let ms = self.initial_ms as f64 * self.multiplier.powi(exponent);
        // powi overflows to infinity, which the cap absorbs
        Duration::from_millis(ms.min(self.max_ms as f64) as u64)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_schedule() {
        let policy = BackoffPolicy::default();
        assert_eq!(policy.delay(0), Duration::ZERO);
        assert_eq!(policy.delay(1), Duration::from_secs(1));
        assert_eq!(policy.delay(2), Duration::from_secs(2));
        assert_eq!(policy.delay(3), Duration::from_secs(4));
        assert_eq!(policy.delay(7), Duration::from_secs(60));
        assert_eq!(policy.delay(u32::MAX), Duration::from_secs(60));
    }

    #[test]
    fn test_fixed() {
        let policy = BackoffPolicy::fixed(Duration::from_millis(250));
        assert_eq!(policy.delay(1), Duration::from_millis(250));
        assert_eq!(policy.delay(10), Duration::from_millis(250));
    }

    #[test]
    fn test_initial_above_max_is_capped() {
        let policy = BackoffPolicy::new(Duration::from_secs(10), 3.0, Duration::from_secs(5));
        assert_eq!(policy.delay(1), Duration::from_secs(5));
    }
}
