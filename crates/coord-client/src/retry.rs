//! Connection retry policy.

use std::time::Duration;

use rand::Rng;

/// Largest shift applied to the backoff window.
const MAX_RETRY_SHIFT: u32 = 29;

/// Exponential backoff with jitter.
///
/// Before retry `n` (0-based) the client sleeps `initial_delay` times a
/// random factor drawn from `[1, 2^(n+1))`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub initial_delay: Duration,
    pub max_retries: u32,
}

impl RetryPolicy {
    pub fn new(initial_delay: Duration, max_retries: u32) -> Self {
        Self {
            initial_delay,
            max_retries,
        }
    }

    /// Fail on the first error.
    pub fn never() -> Self {
        Self::new(Duration::ZERO, 0)
    }

    /// Total connection attempts, including the first.
    pub fn max_attempts(&self) -> u32 {
        self.max_retries.saturating_add(1)
    }

    pub fn delay_for(&self, retry: u32) -> Duration {
        let window = 1u32 << (retry.min(MAX_RETRY_SHIFT) + 1);
        let factor = rand::rng().random_range(0..window).max(1);
        self.initial_delay.saturating_mul(factor)
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::new(Duration::from_millis(1000), 3)
    }
}

