//! Retry backoff for failed work items.

use std::time::Duration;

use serde::{Deserialize, Serialize};

/// How the delay grows with each failed attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BackoffStrategy {
    Fixed,
    /// Doubles after every failure.
    #[default]
    Exponential,
    Linear,
}

/// Delay applied to a work item after a failed, retryable attempt.
///
/// The delay becomes the item's `available_at`; the repository's due-time
/// filter keeps it out of worker runs until then.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BackoffPolicy {
    pub strategy: BackoffStrategy,
    pub base_delay: Duration,
    pub max_delay: Duration,
    /// Fraction of the delay (0.0-1.0) spread around the nominal value.
    pub jitter: f64,
}

impl Default for BackoffPolicy {
    fn default() -> Self {
        Self::exponential(Duration::from_millis(500), Duration::from_secs(60))
    }
}

impl BackoffPolicy {
    pub fn new(strategy: BackoffStrategy, base_delay: Duration) -> Self {
        Self {
            strategy,
            base_delay,
            max_delay: Duration::from_secs(60),
            jitter: 0.0,
        }
    }

    pub fn fixed(delay: Duration) -> Self {
        Self::new(BackoffStrategy::Fixed, delay).with_max_delay(delay)
    }

    pub fn linear(base_delay: Duration, max_delay: Duration) -> Self {
        Self::new(BackoffStrategy::Linear, base_delay).with_max_delay(max_delay)
    }

    pub fn exponential(base_delay: Duration, max_delay: Duration) -> Self {
        Self::new(BackoffStrategy::Exponential, base_delay)
            .with_max_delay(max_delay)
            .with_jitter(0.1)
    }

    pub fn with_max_delay(mut self, max_delay: Duration) -> Self {
        self.max_delay = max_delay;
        self
    }

    pub fn with_jitter(mut self, jitter: f64) -> Self {
        self.jitter = jitter;
        self
    }

    /// Delay after the `attempts`-th failure. Zero before any failure.
    pub fn delay_for_attempt(&self, attempts: u32) -> Duration {
        let Some(step) = attempts.checked_sub(1) else {
            return Duration::ZERO;
        };

        let nominal = match self.strategy {
            BackoffStrategy::Fixed => self.base_delay,
            BackoffStrategy::Linear => self.base_delay.saturating_mul(attempts),
            BackoffStrategy::Exponential => self.base_delay.saturating_mul(2u32.saturating_pow(step)),
        }
        .min(self.max_delay);

        let jitter = self.jitter.clamp(0.0, 1.0);
        if jitter == 0.0 {
            return nominal;
        }
        // deterministic per attempt, in [-1.0, 1.0]
        let spread = f64::from(attempts.wrapping_mul(37) % 101) / 50.0 - 1.0;
        nominal.mul_f64(1.0 + jitter * spread)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn exponential_backoff_doubles_until_cap() {
        let policy = BackoffPolicy::exponential(Duration::from_millis(100), Duration::from_millis(500))
            .with_jitter(0.0);

        assert_eq!(policy.delay_for_attempt(0), Duration::ZERO);
        assert_eq!(policy.delay_for_attempt(1), Duration::from_millis(100));
        assert_eq!(policy.delay_for_attempt(2), Duration::from_millis(200));
        assert_eq!(policy.delay_for_attempt(3), Duration::from_millis(400));
        assert_eq!(policy.delay_for_attempt(4), Duration::from_millis(500));
        assert_eq!(policy.delay_for_attempt(u32::MAX), Duration::from_millis(500));
    }

    #[test]
    fn fixed_backoff_is_constant() {
        let policy = BackoffPolicy::fixed(Duration::from_millis(250));
        assert_eq!(policy.delay_for_attempt(1), Duration::from_millis(250));
        assert_eq!(policy.delay_for_attempt(7), Duration::from_millis(250));
    }

    #[test]
    fn linear_backoff_grows_by_base() {
        let policy = BackoffPolicy::linear(Duration::from_millis(100), Duration::from_secs(10));
        assert_eq!(policy.delay_for_attempt(1), Duration::from_millis(100));
        assert_eq!(policy.delay_for_attempt(3), Duration::from_millis(300));
    }

    #[test]
    fn jitter_stays_within_range() {
        let policy = BackoffPolicy::exponential(Duration::from_secs(1), Duration::from_secs(60));
        for attempts in 1..6u32 {
            let nominal = 1000.0 * f64::from(1u32 << (attempts - 1));
            let actual = policy.delay_for_attempt(attempts).as_secs_f64() * 1000.0;
            assert!((actual - nominal).abs() <= nominal * 0.1 + 1.0);
        }
    }
}
