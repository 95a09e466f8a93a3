//! Retry policy for transient remote-call failures.
//!
//! Implements exponential backoff with configurable parameters. This covers
//! in-flight retries only; cross-restart failure budgeting is handled by the
//! engine's failure tracker.

use std::time::Duration;

/// Retry policy implementing exponential backoff.
#[derive(Debug, Clone)]
pub struct RequestRetryPolicy {
    /// Total number of attempts per call, including the first one.
    pub max_attempts: u32,
    /// Initial backoff duration in milliseconds.
    pub initial_backoff_ms: u64,
    /// Maximum backoff duration in milliseconds (cap for exponential growth).
    pub max_backoff_ms: u64,
    /// Multiplier applied to backoff after each attempt.
    pub backoff_multiplier: f64,
}

impl RequestRetryPolicy {
    /// Backoff duration before the retry following attempt number `attempt`
    /// (zero-based).
    ///
    /// Uses `initial_backoff * multiplier^attempt`, capped at
    /// `max_backoff_ms`.
    pub fn backoff(&self, attempt: u32) -> Duration {
        let ms = self.initial_backoff_ms as f64 * self.backoff_multiplier.powi(attempt as i32);
        Duration::from_millis(ms.min(self.max_backoff_ms as f64) as u64)
    }
}

impl Default for RequestRetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 4,
            initial_backoff_ms: 1000,
            max_backoff_ms: 30_000,
            backoff_multiplier: 2.0,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default() {
        let policy = RequestRetryPolicy::default();

        assert_eq!(policy.max_attempts, 4);
        assert_eq!(policy.initial_backoff_ms, 1000);
        assert_eq!(policy.max_backoff_ms, 30_000);
        assert_eq!(policy.backoff_multiplier, 2.0);
    }

    #[test]
    fn test_backoff_calculation() {
        let policy = RequestRetryPolicy {
            max_attempts: 5,
            initial_backoff_ms: 100,
            max_backoff_ms: 60_000,
            backoff_multiplier: 2.0,
        };

        // attempt=0: 100 * 2^0 = 100
        assert_eq!(policy.backoff(0), Duration::from_millis(100));

        // attempt=1: 100 * 2^1 = 200
        assert_eq!(policy.backoff(1), Duration::from_millis(200));

        // attempt=3: 100 * 2^3 = 800
        assert_eq!(policy.backoff(3), Duration::from_millis(800));
    }

    #[test]
    fn test_backoff_capping() {
        let policy = RequestRetryPolicy {
            max_attempts: 10,
            initial_backoff_ms: 100,
            max_backoff_ms: 500,
            backoff_multiplier: 2.0,
        };

        // attempt=2: 100 * 2^2 = 400 (under cap)
        assert_eq!(policy.backoff(2), Duration::from_millis(400));

        // attempt=3: 100 * 2^3 = 800 -> capped at 500
        assert_eq!(policy.backoff(3), Duration::from_millis(500));

        // attempt=6: well past the cap
        assert_eq!(policy.backoff(6), Duration::from_millis(500));
    }

    #[test]
    fn test_multiplier_of_one() {
        let policy = RequestRetryPolicy {
            max_attempts: 5,
            initial_backoff_ms: 250,
            max_backoff_ms: 10_000,
            backoff_multiplier: 1.0,
        };

        // 250 * 1^n = 250 for all n
        assert_eq!(policy.backoff(0), Duration::from_millis(250));
        assert_eq!(policy.backoff(5), Duration::from_millis(250));
    }
}
