// Connect retry logic: capped exponential backoff
use crate::application::worker::constants::{
    DEFAULT_BACKOFF_BASE, DEFAULT_BACKOFF_CAP, DEFAULT_BACKOFF_JITTER,
};
use crate::error::{AppError, Result};
use rand::Rng;
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Retry decision result
#[derive(Debug, PartialEq, Eq)]
pub enum RetryDecision {
    /// Try again after the given delay
    Retry(Duration),
    /// Attempt budget spent, stop trying
    GiveUp,
}

/// Backoff policy for (re)connecting to the queue backend
///
/// Determines the pause between connect attempts based on:
/// - Number of consecutive failures so far
/// - Base delay, doubled per failure
/// - Cap that no delay may exceed (jitter included)
/// - Optional attempt budget (`None` keeps trying forever)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BackoffPolicy {
    pub base: Duration,
    pub cap: Duration,
    pub max_attempts: Option<u32>,
    /// Relative jitter in `[0, 1)`; `0.1` spreads each delay over ±10%
    pub jitter: f64,
}

impl Default for BackoffPolicy {
    fn default() -> Self {
        Self {
            base: DEFAULT_BACKOFF_BASE,
            cap: DEFAULT_BACKOFF_CAP,
            max_attempts: None,
            jitter: DEFAULT_BACKOFF_JITTER,
        }
    }
}

impl BackoffPolicy {
    /// Create a jitter-free policy that retries forever
    ///
    /// # Example
    /// ```
    /// use retask_core::application::retry::BackoffPolicy;
    /// use std::time::Duration;
    ///
    /// let policy = BackoffPolicy::new(Duration::from_secs(1), Duration::from_secs(4))
    ///     .with_max_attempts(5);
    /// assert_eq!(policy.base_delay(3), Duration::from_secs(4));
    /// ```
    pub fn new(base: Duration, cap: Duration) -> Self {
        Self {
            base,
            cap,
            max_attempts: None,
            jitter: 0.0,
        }
    }

    pub fn with_max_attempts(mut self, max_attempts: u32) -> Self {
        self.max_attempts = Some(max_attempts);
        self
    }

    pub fn with_jitter(mut self, jitter: f64) -> Self {
        self.jitter = jitter;
        self
    }

    pub fn validate(&self) -> Result<()> {
        if self.base.is_zero() {
            return Err(AppError::Config("backoff base must be > 0".to_string()));
        }
        if self.base > self.cap {
            return Err(AppError::Config(format!(
                "backoff base ({:?}) exceeds cap ({:?})",
                self.base, self.cap
            )));
        }
        if self.max_attempts == Some(0) {
            return Err(AppError::Config(
                "backoff max_attempts must be >= 1 (omit it to retry forever)".to_string(),
            ));
        }
        if !(0.0..1.0).contains(&self.jitter) {
            return Err(AppError::Config(format!(
                "backoff jitter must be in [0, 1), got {}",
                self.jitter
            )));
        }
        Ok(())
    }

    /// Delay after `failures` consecutive failures, before jitter
    ///
    /// delay = min(base * 2^(failures - 1), cap)
    pub fn base_delay(&self, failures: u32) -> Duration {
        let exponent = failures.saturating_sub(1).min(31);
        self.base.saturating_mul(1u32 << exponent).min(self.cap)
    }

    /// Decide what to do after `failures` consecutive failed attempts
    pub fn should_retry(&self, failures: u32) -> RetryDecision {
        if let Some(max_attempts) = self.max_attempts {
            if failures >= max_attempts {
                return RetryDecision::GiveUp;
            }
        }

        RetryDecision::Retry(self.jittered(self.base_delay(failures)))
    }

    fn jittered(&self, delay: Duration) -> Duration {
        if self.jitter <= 0.0 {
            return delay;
        }
        let factor = rand::thread_rng().gen_range((1.0 - self.jitter)..=(1.0 + self.jitter));
        delay.mul_f64(factor).min(self.cap)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn secs(n: u64) -> Duration {
        Duration::from_secs(n)
    }

    #[test]
    fn test_delays_double_until_cap() {
        let policy = BackoffPolicy::new(secs(1), secs(4));
        let delays: Vec<_> = (1..=5).map(|n| policy.base_delay(n)).collect();
        assert_eq!(delays, vec![secs(1), secs(2), secs(4), secs(4), secs(4)]);
    }

    #[test]
    fn test_huge_failure_count_saturates() {
        let policy = BackoffPolicy::new(Duration::from_millis(500), secs(30));
        assert_eq!(policy.base_delay(u32::MAX), secs(30));
    }

    #[test]
    fn test_gives_up_at_max_attempts() {
        let policy = BackoffPolicy::new(secs(1), secs(4)).with_max_attempts(5);
        assert_eq!(policy.should_retry(2), RetryDecision::Retry(secs(2)));
        assert_eq!(policy.should_retry(4), RetryDecision::Retry(secs(4)));
        assert_eq!(policy.should_retry(5), RetryDecision::GiveUp);
    }

    #[test]
    fn test_unbounded_never_gives_up() {
        let policy = BackoffPolicy::new(secs(1), secs(4));
        assert_eq!(policy.should_retry(10_000), RetryDecision::Retry(secs(4)));
    }

    #[test]
    fn test_jitter_never_exceeds_cap() {
        let policy = BackoffPolicy::new(secs(1), secs(4)).with_jitter(0.5);
        for failures in 1..50 {
            match policy.should_retry(failures) {
                RetryDecision::Retry(delay) => {
                    assert!(delay <= secs(4), "delay {:?} above cap", delay);
                    assert!(delay >= policy.base_delay(failures).mul_f64(0.5));
                }
                RetryDecision::GiveUp => panic!("unbounded policy gave up"),
            }
        }
    }

    #[test]
    fn test_validate() {
        assert!(BackoffPolicy::default().validate().is_ok());
        assert!(BackoffPolicy::new(secs(5), secs(1)).validate().is_err());
        assert!(BackoffPolicy::new(Duration::ZERO, secs(1)).validate().is_err());
        assert!(BackoffPolicy::new(secs(1), secs(1))
            .with_max_attempts(0)
            .validate()
            .is_err());
        assert!(BackoffPolicy::new(secs(1), secs(2))
            .with_jitter(1.0)
            .validate()
            .is_err());
    }
}
