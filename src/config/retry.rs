//! Retry policy and exponential backoff schedule.

use std::time::Duration;

/// Default number of retries after the initial attempt.
pub const DEFAULT_MAX_RETRIES: i32 = 5;

/// Default base interval between retries in milliseconds.
pub const DEFAULT_RETRY_INTERVAL_MS: i64 = 1000;

/// Upper bound for a single backoff interval in milliseconds.
pub const MAX_BACKOFF_MS: i64 = 16_000;

/// How often and how patiently a load is retried.
///
/// Retry `n` (1-based) waits `min(base * 2^(n-1), 16s)`. With the defaults
/// (5 retries, 1000 ms) the waits are 1s, 2s, 4s, 8s, 16s.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    max_retries: i32,
    base_interval_ms: i64,
}

impl RetryPolicy {
    pub fn new(max_retries: i32, base_interval_ms: i64) -> Self {
        Self {
            max_retries,
            base_interval_ms,
        }
    }

    /// A policy that sends exactly once.
    pub fn disabled() -> Self {
        Self::new(0, 0)
    }

    pub fn max_retries(&self) -> i32 {
        self.max_retries
    }

    pub fn base_interval_ms(&self) -> i64 {
        self.base_interval_ms
    }

    pub fn is_enabled(&self) -> bool {
        self.max_retries > 0
    }

    /// Problems that make this policy unusable.
    pub(crate) fn violations(&self) -> Vec<String> {
        let mut violations = Vec::new();
        if self.max_retries < 0 {
            violations.push("max retries cannot be negative".to_string());
        }
        if self.base_interval_ms < 0 {
            violations.push("retry interval cannot be negative".to_string());
        }
        violations
    }

    /// Delay before retry number `retry` (1-based). Zero for the initial attempt.
    pub fn backoff(&self, retry: u32) -> Duration {
        if retry == 0 {
            return Duration::ZERO;
        }

        let base = self.base_interval_ms.max(0);
        // Past 2^15 every non-zero base is already over the cap.
        let shift = (retry - 1).min(15);
        let interval_ms = base.saturating_mul(1_i64 << shift).min(MAX_BACKOFF_MS);

        Duration::from_millis(interval_ms as u64)
    }

    /// Every retry delay this policy can produce, in order.
    pub fn schedule(&self) -> Vec<Duration> {
        let retries = self.max_retries.max(0) as u32;
        (1..=retries).map(|retry| self.backoff(retry)).collect()
    }

    /// Worst-case time spent sleeping between attempts.
    pub fn total_backoff(&self) -> Duration {
        self.schedule().iter().sum()
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::new(DEFAULT_MAX_RETRIES, DEFAULT_RETRY_INTERVAL_MS)
    }
}
