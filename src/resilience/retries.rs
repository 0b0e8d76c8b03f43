//! Retry logic.
//!
//! # Responsibilities
//! - Determine if a request is retryable (GET/HEAD only)
//! - Decide, for every failure kind, whether another attempt is allowed
//! - Compute the wait between attempts
//!
//! # Design Decisions
//! - Never retry POST/PUT/PATCH/DELETE, even on 5xx
//! - One eligibility function for status and transport failures alike
//! - Bulkhead rejection aborts the whole sequence

use reqwest::Method;
use std::time::Duration;

use crate::config::RetryConfig;
use crate::resilience::backoff::calculate_backoff;
use crate::upstream::ClientError;

/// Retry policy for upstream calls.
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    /// Extra attempts granted to idempotent methods.
    pub max_retries: u32,
    /// Base backoff delay.
    pub base_delay: Duration,
    /// Upper bound of the random jitter added to each delay.
    pub jitter: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::from(&RetryConfig::default())
    }
}

impl From<&RetryConfig> for RetryPolicy {
    fn from(config: &RetryConfig) -> Self {
        let base_delay = Duration::from_millis(config.base_delay_ms);
        Self {
            max_retries: config.max_retries,
            base_delay,
            jitter: config.jitter_ms.map_or(base_delay, Duration::from_millis),
        }
    }
}

impl RetryPolicy {
    /// Only GET and HEAD are treated as safe to repeat.
    pub fn is_idempotent(method: &Method) -> bool {
        *method == Method::GET || *method == Method::HEAD
    }

    /// Total attempts allowed for `method`.
    pub fn max_attempts(&self, method: &Method) -> u32 {
        if Self::is_idempotent(method) {
            self.max_retries.saturating_add(1)
        } else {
            1
        }
    }

    /// Whether `error` may be followed by another attempt for `method`.
    ///
    /// Attempt budget is checked separately by the caller.
    pub fn should_retry(&self, method: &Method, error: &ClientError) -> bool {
        error.is_retryable() && Self::is_idempotent(method)
    }

    /// Wait before the attempt following `attempt_index` (0-based).
    pub fn backoff(&self, attempt_index: u32) -> Duration {
        calculate_backoff(attempt_index, self.base_delay, self.jitter)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use reqwest::StatusCode;

    fn upstream(status: u16) -> ClientError {
        ClientError::upstream_status(StatusCode::from_u16(status).unwrap())
    }

    #[test]
    fn attempt_budget_depends_on_method() {
        let policy = RetryPolicy::default();
        assert_eq!(policy.max_attempts(&Method::GET), 3);
        assert_eq!(policy.max_attempts(&Method::HEAD), 3);
        assert_eq!(policy.max_attempts(&Method::POST), 1);
        assert_eq!(policy.max_attempts(&Method::PUT), 1);
        assert_eq!(policy.max_attempts(&Method::DELETE), 1);
    }

    #[test]
    fn eligibility_matrix() {
        let policy = RetryPolicy::default();
        let timeout = ClientError::Timeout(Duration::from_millis(10));
        let transport = ClientError::Transport("connection refused".into());

        assert!(policy.should_retry(&Method::GET, &upstream(500)));
        assert!(policy.should_retry(&Method::GET, &upstream(503)));
        assert!(policy.should_retry(&Method::GET, &timeout));
        assert!(policy.should_retry(&Method::GET, &transport));
        assert!(!policy.should_retry(&Method::GET, &upstream(404)));
        assert!(!policy.should_retry(&Method::GET, &ClientError::BulkheadRejected));

        assert!(!policy.should_retry(&Method::POST, &upstream(500)));
        assert!(!policy.should_retry(&Method::POST, &timeout));
        assert!(!policy.should_retry(&Method::PATCH, &transport));
    }

    #[test]
    fn jitter_defaults_to_base_delay() {
        let policy = RetryPolicy::from(&RetryConfig {
            max_retries: 1,
            base_delay_ms: 40,
            jitter_ms: None,
        });
        assert_eq!(policy.jitter, Duration::from_millis(40));

        let d = policy.backoff(1);
        assert!(d >= Duration::from_millis(80) && d <= Duration::from_millis(120));
    }
}
