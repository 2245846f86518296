//! Exponential backoff shared by the operation wrapper and the reconnect
//! retry controller.

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::defaults;

/// Exponential backoff policy: `min(base_delay × factor^attempt, max_delay)`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct BackoffPolicy {
    /// Delay before the first retry.
    pub base_delay: Duration,
    /// Multiplier applied per attempt.
    pub factor: u32,
    /// Upper bound for any single delay.
    pub max_delay: Duration,
}

impl Default for BackoffPolicy {
    fn default() -> Self {
        Self {
            base_delay: Duration::from_millis(defaults::RETRY_BASE_DELAY_MS),
            factor: defaults::RETRY_BACKOFF_FACTOR,
            max_delay: Duration::from_millis(defaults::RETRY_MAX_DELAY_MS),
        }
    }
}

impl BackoffPolicy {
    /// Doubling policy with the given base delay and the default cap.
    pub fn exponential(base_delay: Duration) -> Self {
        Self {
            base_delay,
            ..Self::default()
        }
    }

    /// Set the multiplier.
    pub fn with_factor(mut self, factor: u32) -> Self {
        self.factor = factor;
        self
    }

    /// Set the cap.
    pub fn with_max_delay(mut self, max_delay: Duration) -> Self {
        self.max_delay = max_delay;
        self
    }

    /// Delay before retrying after the zero-based `attempt` failed.
    ///
    /// Saturates instead of overflowing for large attempt numbers.
    pub fn delay_for(&self, attempt: u32) -> Duration {
        let multiplier = self.factor.checked_pow(attempt).unwrap_or(u32::MAX);
        self.base_delay
            .checked_mul(multiplier)
            .unwrap_or(Duration::MAX)
            .min(self.max_delay)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ms(v: u64) -> Duration {
        Duration::from_millis(v)
    }

    #[test]
    fn test_default_sequence_doubles_then_caps() {
        let policy = BackoffPolicy::default();
        let delays: Vec<_> = (0..6).map(|n| policy.delay_for(n)).collect();
        assert_eq!(
            delays,
            vec![ms(1000), ms(2000), ms(4000), ms(8000), ms(10_000), ms(10_000)]
        );
    }

    #[test]
    fn test_delay_matches_formula() {
        let policy = BackoffPolicy::exponential(ms(250))
            .with_factor(3)
            .with_max_delay(ms(60_000));
        for n in 0..8u32 {
            let expected = (250u64 * 3u64.pow(n)).min(60_000);
            assert_eq!(policy.delay_for(n), ms(expected), "attempt {n}");
        }
    }

    #[test]
    fn test_factor_one_is_constant() {
        let policy = BackoffPolicy::exponential(ms(500)).with_factor(1);
        assert_eq!(policy.delay_for(0), ms(500));
        assert_eq!(policy.delay_for(9), ms(500));
    }

    #[test]
    fn test_huge_attempt_saturates_to_cap() {
        let policy = BackoffPolicy::default();
        assert_eq!(policy.delay_for(u32::MAX), ms(10_000));
    }
}
