//! Reconnect schedule: attempt n waits `base × 2^(n−1)`, up to `max_attempts`.

use crate::config::TransportConfig;
use std::time::Duration;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReconnectPolicy {
    pub base_delay: Duration,
    pub max_attempts: u32,
}

impl Default for ReconnectPolicy {
    fn default() -> Self {
        Self::from_config(&TransportConfig::default())
    }
}

impl ReconnectPolicy {
    pub fn new(base_delay: Duration, max_attempts: u32) -> Self {
        Self {
            base_delay,
            max_attempts,
        }
    }

    pub fn from_config(config: &TransportConfig) -> Self {
        Self::new(config.reconnect_base_delay(), config.max_reconnect_attempts)
    }

    /// Delay before the 1-based `attempt`, or `None` once attempts are exhausted.
    pub fn delay(&self, attempt: u32) -> Option<Duration> {
        if attempt == 0 || attempt > self.max_attempts {
            return None;
        }
        let factor = 1u32.checked_shl(attempt - 1).unwrap_or(u32::MAX);
        Some(self.base_delay.saturating_mul(factor))
    }

    /// Every delay the policy will ever produce, in order.
    pub fn schedule(&self) -> impl Iterator<Item = Duration> + '_ {
        (1..).map_while(move |attempt| self.delay(attempt))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn five_failures_double_then_stop() {
        let d = Duration::from_millis(1000);
        let policy = ReconnectPolicy::new(d, 5);
        let delays: Vec<Duration> = policy.schedule().collect();
        assert_eq!(delays, vec![d, d * 2, d * 4, d * 8, d * 16]);
        assert_eq!(policy.delay(6), None);
    }

    #[test]
    fn zero_attempts_never_retries() {
        let policy = ReconnectPolicy::new(Duration::from_secs(1), 0);
        assert_eq!(policy.schedule().count(), 0);
        assert_eq!(policy.delay(0), None);
    }

    #[test]
    fn large_attempt_counts_saturate() {
        let policy = ReconnectPolicy::new(Duration::from_secs(1), 64);
        assert!(policy.delay(40).is_some());
    }
}
