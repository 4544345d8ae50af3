//! # Jitter for retry delays.
//!
//! Endpoints sharing one connection all restart when that connection is
//! recycled. [`JitterPolicy`] spreads their reconnect attempts so they do not
//! hit the broker in lockstep.
//!
//! - [`JitterPolicy::None`] - exact delay.
//! - [`JitterPolicy::Full`] - uniform in `[0, delay]`.
//! - [`JitterPolicy::Equal`] - `delay/2 + uniform[0, delay/2]`.
//! - [`JitterPolicy::Decorrelated`] - uniform in `[base, prev × 3]`, capped.

use rand::Rng;
use std::time::Duration;

/// Randomization strategy for retry delays.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum JitterPolicy {
    /// No randomization.
    #[default]
    None,
    /// Random delay in `[0, delay]`.
    Full,
    /// Random delay in `[delay/2, delay]`.
    Equal,
    /// Random delay in `[base, prev × 3]`, capped at `max`.
    ///
    /// Needs extra context; see [`apply_decorrelated`](Self::apply_decorrelated).
    Decorrelated,
}

impl JitterPolicy {
    /// Applies jitter to `delay`.
    ///
    /// `Decorrelated` returns the input unchanged here.
    pub fn apply(&self, delay: Duration) -> Duration {
        match self {
            JitterPolicy::None | JitterPolicy::Decorrelated => delay,
            JitterPolicy::Full => full(delay),
            JitterPolicy::Equal => equal(delay),
        }
    }

    /// Applies decorrelated jitter given the floor, previous delay and cap.
    ///
    /// Other variants fall back to `apply(prev)`.
    pub fn apply_decorrelated(&self, base: Duration, prev: Duration, max: Duration) -> Duration {
        if !matches!(self, JitterPolicy::Decorrelated) {
            return self.apply(prev);
        }

        let base_ms = base.as_millis() as u64;
        let upper = prev
            .as_millis()
            .saturating_mul(3)
            .min(max.as_millis())
            .max(u128::from(base_ms)) as u64;

        if base_ms >= upper {
            return base;
        }
        Duration::from_millis(rand::rng().random_range(base_ms..=upper))
    }
}

fn full(delay: Duration) -> Duration {
    let ms = delay.as_millis() as u64;
    if ms == 0 {
        return Duration::ZERO;
    }
    Duration::from_millis(rand::rng().random_range(0..=ms))
}

fn equal(delay: Duration) -> Duration {
    let ms = delay.as_millis() as u64;
    let half = ms / 2;
    if half == 0 {
        return Duration::from_millis(ms);
    }
    Duration::from_millis(half + rand::rng().random_range(0..=half))
}
