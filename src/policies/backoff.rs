//! # Backoff between retry attempts.
//!
//! [`BackoffPolicy`] maps a 0-based retry number to a delay:
//! `first × factor^retry`, clamped to `max`, then jittered.
//!
//! Two shapes are used by the host:
//! - [`BackoffPolicy::fixed`] - constant spacing (receive-transport retries);
//! - [`BackoffPolicy::exponential`] - doubling between host `retry_min_backoff`
//!   and `retry_max_backoff` (connection builds, endpoint restarts).
//!
//! The base delay depends only on the retry number, so jitter output never
//! feeds into later delays.
//!
//! # Example
//! ```rust
//! use std::time::Duration;
//! use brokervisor::BackoffPolicy;
//!
//! let backoff = BackoffPolicy::exponential(Duration::from_millis(100), Duration::from_secs(30));
//!
//! assert_eq!(backoff.next(0), Duration::from_millis(100));
//! assert_eq!(backoff.next(1), Duration::from_millis(200));
//! assert_eq!(backoff.next(20), Duration::from_secs(30));
//! ```

use std::time::Duration;

use crate::policies::jitter::JitterPolicy;

/// Retry backoff policy.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct BackoffPolicy {
    /// Delay before the first retry.
    pub first: Duration,
    /// Upper bound for any delay.
    pub max: Duration,
    /// Multiplicative growth factor (`>= 1.0` recommended).
    pub factor: f64,
    /// Randomization applied to each delay.
    pub jitter: JitterPolicy,
}

impl Default for BackoffPolicy {
    /// Doubling from 100ms up to 30s without jitter, matching the default
    /// host retry bounds.
    fn default() -> Self {
        Self::exponential(Duration::from_millis(100), Duration::from_secs(30))
    }
}

impl BackoffPolicy {
    /// Constant delay between attempts.
    pub fn fixed(delay: Duration) -> Self {
        Self {
            first: delay,
            max: delay,
            factor: 1.0,
            jitter: JitterPolicy::None,
        }
    }

    /// Doubling delay bounded by `[min, max]`.
    pub fn exponential(min: Duration, max: Duration) -> Self {
        Self {
            first: min,
            max,
            factor: 2.0,
            jitter: JitterPolicy::None,
        }
    }

    /// Returns the policy with a different jitter strategy.
    pub fn with_jitter(mut self, jitter: JitterPolicy) -> Self {
        self.jitter = jitter;
        self
    }

    /// Computes the delay for the given retry number (0-indexed).
    ///
    /// Non-finite or out-of-range intermediate values clamp to [`BackoffPolicy::max`].
    pub fn next(&self, retry: u32) -> Duration {
        let max_secs = self.max.as_secs_f64();
        let exp = retry.min(i32::MAX as u32) as i32;
        let unclamped_secs = self.first.as_secs_f64() * self.factor.powi(exp);

        let base =
            if !unclamped_secs.is_finite() || unclamped_secs < 0.0 || unclamped_secs > max_secs {
                self.max
            } else {
                Duration::from_secs_f64(unclamped_secs)
            };

        match self.jitter {
            JitterPolicy::Decorrelated => {
                self.jitter
                    .apply_decorrelated(self.first.min(self.max), base, self.max)
            }
            _ => self.jitter.apply(base),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fixed_policy_is_constant() {
        let policy = BackoffPolicy::fixed(Duration::from_secs(10));
        for retry in 0..5 {
            assert_eq!(policy.next(retry), Duration::from_secs(10));
        }
    }

    #[test]
    fn exponential_doubles_until_max() {
        let policy = BackoffPolicy::exponential(Duration::from_millis(100), Duration::from_secs(1));

        assert_eq!(policy.next(0), Duration::from_millis(100));
        assert_eq!(policy.next(1), Duration::from_millis(200));
        assert_eq!(policy.next(2), Duration::from_millis(400));
        assert_eq!(policy.next(3), Duration::from_millis(800));
        assert_eq!(policy.next(4), Duration::from_secs(1));
    }

    #[test]
    fn min_above_max_clamps() {
        let policy = BackoffPolicy::exponential(Duration::from_secs(10), Duration::from_secs(5));
        assert_eq!(policy.next(0), Duration::from_secs(5));
    }

    #[test]
    fn huge_retry_number_clamps_to_max() {
        let policy = BackoffPolicy::exponential(Duration::from_millis(100), Duration::from_secs(30));
        assert_eq!(policy.next(u32::MAX), Duration::from_secs(30));
    }

    #[test]
    fn equal_jitter_stays_within_half_and_base() {
        let policy = BackoffPolicy::exponential(Duration::from_millis(100), Duration::from_secs(30))
            .with_jitter(JitterPolicy::Equal);

        for retry in 0..15 {
            let base_ms = (100.0 * 2.0f64.powi(retry as i32)).min(30_000.0);
            let delay = policy.next(retry);
            assert!(delay >= Duration::from_millis((base_ms / 2.0) as u64));
            assert!(delay <= Duration::from_millis(base_ms as u64));
        }
    }

    #[test]
    fn full_jitter_never_exceeds_base() {
        let policy = BackoffPolicy::fixed(Duration::from_secs(1)).with_jitter(JitterPolicy::Full);
        for retry in 0..50 {
            assert!(policy.next(retry) <= Duration::from_secs(1));
        }
    }

    #[test]
    fn decorrelated_jitter_keeps_floor() {
        let policy = BackoffPolicy::exponential(Duration::from_millis(100), Duration::from_secs(30))
            .with_jitter(JitterPolicy::Decorrelated);

        for _ in 0..100 {
            let delay = policy.next(8);
            assert!(delay >= Duration::from_millis(100));
            assert!(delay <= Duration::from_secs(30));
        }
    }
}
