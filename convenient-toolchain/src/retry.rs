//! Retry policy for tool invocations
//!
//! External tool flakiness is not distinguished from real failure by default:
//! the default policy never retries. Timeouts are the only failure kind that
//! can be opted into retrying; a non-zero exit is always final.

use crate::error::ToolError;
use std::time::Duration;

/// Which tool failures get another attempt, and how long to wait between them.
#[derive(Debug, Clone, PartialEq)]
pub struct RetryPolicy {
    /// Maximum number of attempts, including the first
    pub max_attempts: usize,

    /// Initial backoff duration
    pub initial_backoff: Duration,

    /// Maximum backoff duration
    pub max_backoff: Duration,

    /// Backoff multiplier
    pub backoff_multiplier: f64,

    /// Retry when the tool exceeded its timeout
    pub retry_on_timeout: bool,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::no_retry()
    }
}

impl RetryPolicy {
    /// No retries (fail fast)
    pub fn no_retry() -> Self {
        Self {
            max_attempts: 1,
            initial_backoff: Duration::from_secs(1),
            max_backoff: Duration::from_secs(30),
            backoff_multiplier: 2.0,
            retry_on_timeout: false,
        }
    }

    /// Retry timed-out invocations up to `max_attempts` times in total
    pub fn timeouts(max_attempts: usize) -> Self {
        Self {
            max_attempts: max_attempts.max(1),
            retry_on_timeout: true,
            ..Self::no_retry()
        }
    }

    /// Check if an error should be retried
    pub fn should_retry(&self, error: &ToolError) -> bool {
        match error {
            ToolError::Timeout { .. } => self.retry_on_timeout,
            ToolError::Spawn { .. } | ToolError::Io(_) => false,
        }
    }

    /// Backoff before attempt number `attempt` (0-indexed)
    pub fn backoff_duration(&self, attempt: usize) -> Duration {
        if attempt == 0 {
            return Duration::ZERO;
        }

        let exponent = i32::try_from(attempt - 1).unwrap_or(i32::MAX);
        let secs = self.initial_backoff.as_secs_f64() * self.backoff_multiplier.powi(exponent);

        Duration::from_secs_f64(secs.min(self.max_backoff.as_secs_f64()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    fn timeout() -> ToolError {
        ToolError::Timeout {
            program: PathBuf::from("ld"),
            secs: 5,
        }
    }

    #[test]
    fn test_default_never_retries() {
        let policy = RetryPolicy::default();
        assert_eq!(policy.max_attempts, 1);
        assert!(!policy.should_retry(&timeout()));
    }

    #[test]
    fn test_timeout_policy() {
        let policy = RetryPolicy::timeouts(3);
        assert!(policy.should_retry(&timeout()));

        let spawn = ToolError::Spawn {
            program: PathBuf::from("ld"),
            source: std::io::Error::from(std::io::ErrorKind::NotFound),
        };
        assert!(!policy.should_retry(&spawn));
    }

    #[test]
    fn test_backoff_is_capped() {
        let policy = RetryPolicy::timeouts(10);
        assert_eq!(policy.backoff_duration(0), Duration::ZERO);
        assert_eq!(policy.backoff_duration(1), Duration::from_secs(1));
        assert_eq!(policy.backoff_duration(2), Duration::from_secs(2));
        assert_eq!(policy.backoff_duration(9), Duration::from_secs(30));
    }
}
