//! Sync worker configuration.

use std::time::Duration;

/// Backoff for retrying a failed sync pass.
#[derive(Debug, Clone)]
pub struct RetryConfig {
    /// Maximum number of retries (None = infinite).
    pub max_retries: Option<u32>,
    /// Initial delay before first retry.
    pub initial_delay: Duration,
    /// Maximum delay between retries.
    pub max_delay: Duration,
    /// Backoff multiplier for each retry.
    pub backoff_multiplier: f64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_retries: Some(5),
            initial_delay: Duration::from_secs(1),
            max_delay: Duration::from_secs(300),
            backoff_multiplier: 2.0,
        }
    }
}

impl RetryConfig {
    /// Calculate delay for a given attempt number.
    pub fn delay_for_attempt(&self, attempt: u32) -> Duration {
        let delay_ms = self.initial_delay.as_millis() as f64
            * self.backoff_multiplier.powi(attempt as i32);
        let delay = Duration::from_millis(delay_ms as u64);
        delay.min(self.max_delay)
    }

    /// Check if we should retry after the given number of attempts.
    pub fn should_retry(&self, attempts: u32) -> bool {
        self.max_retries.map_or(true, |max| attempts < max)
    }
}

/// Configuration for the sync worker.
#[derive(Debug, Clone)]
pub struct SyncConfig {
    /// Periodic pass interval.
    pub interval: Duration,
    /// Move `failed` records back to `pending` at the start of every pass.
    pub requeue_failed: bool,
    /// Backoff for a pass that could not run.
    pub retry: RetryConfig,
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            interval: Duration::from_secs(15 * 60),
            requeue_failed: false,
            retry: RetryConfig::default(),
        }
    }
}

impl SyncConfig {
    /// Load from the environment.
    ///
    /// - `GUARDIAN_SYNC_INTERVAL_SECS` (default 900)
    /// - `GUARDIAN_SYNC_REQUEUE_FAILED` (default false)
    pub fn from_env() -> Self {
        let defaults = Self::default();

        let interval = std::env::var("GUARDIAN_SYNC_INTERVAL_SECS")
            .ok()
            .and_then(|s| s.parse::<u64>().ok())
            .filter(|secs| *secs > 0)
            .map(Duration::from_secs)
            .unwrap_or(defaults.interval);

        let requeue_failed = std::env::var("GUARDIAN_SYNC_REQUEUE_FAILED")
            .map(|v| matches!(v.trim().to_ascii_lowercase().as_str(), "1" | "true" | "yes"))
            .unwrap_or(defaults.requeue_failed);

        Self {
            interval,
            requeue_failed,
            retry: defaults.retry,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_backoff_is_capped() {
        let retry = RetryConfig::default();
        assert_eq!(retry.delay_for_attempt(0), Duration::from_secs(1));
        assert_eq!(retry.delay_for_attempt(3), Duration::from_secs(8));
        assert_eq!(retry.delay_for_attempt(20), Duration::from_secs(300));
    }

    #[test]
    fn test_should_retry_respects_limit() {
        let retry = RetryConfig::default();
        assert!(retry.should_retry(4));
        assert!(!retry.should_retry(5));

        let unlimited = RetryConfig {
            max_retries: None,
            ..RetryConfig::default()
        };
        assert!(unlimited.should_retry(1_000));
    }
}
