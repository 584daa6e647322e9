// ABOUTME: Bounded exponential backoff settings for transient collaborator errors.
// ABOUTME: Only errors classified as transient are ever retried.

use serde::{Deserialize, Serialize};
use std::time::Duration;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RetryConfig {
    /// Total attempts including the first one.
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,

    #[serde(default = "default_initial_backoff", with = "humantime_serde")]
    pub initial_backoff: Duration,

    #[serde(default = "default_max_backoff", with = "humantime_serde")]
    pub max_backoff: Duration,
}

fn default_max_attempts() -> u32 {
    5
}

fn default_initial_backoff() -> Duration {
    Duration::from_secs(1)
}

fn default_max_backoff() -> Duration {
    Duration::from_secs(30)
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: default_max_attempts(),
            initial_backoff: default_initial_backoff(),
            max_backoff: default_max_backoff(),
        }
    }
}

impl RetryConfig {
    /// Delay before retry number `retry` (1-based), doubling up to the cap.
    pub fn backoff(&self, retry: u32) -> Duration {
        let factor = 2u32.saturating_pow(retry.saturating_sub(1));
        self.initial_backoff
            .saturating_mul(factor)
            .min(self.max_backoff)
    }

    /// Total time spent waiting between attempts when every attempt fails.
    pub fn total_backoff(&self) -> Duration {
        (1..self.max_attempts).map(|retry| self.backoff(retry)).sum()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn backoff_doubles_then_caps() {
        let retry = RetryConfig::default();
        assert_eq!(retry.backoff(1), Duration::from_secs(1));
        assert_eq!(retry.backoff(2), Duration::from_secs(2));
        assert_eq!(retry.backoff(5), Duration::from_secs(16));
        assert_eq!(retry.backoff(6), Duration::from_secs(30));
        assert_eq!(retry.backoff(40), Duration::from_secs(30));
    }

    #[test]
    fn total_backoff_sums_every_wait() {
        assert_eq!(RetryConfig::default().total_backoff(), Duration::from_secs(15));

        let single = RetryConfig {
            max_attempts: 1,
            ..RetryConfig::default()
        };
        assert_eq!(single.total_backoff(), Duration::ZERO);
    }
}
