//! Retry classification and backoff timing
//!
//! Decides which failures are worth another attempt at the same page and how
//! long to wait before it.

use super::super::error::ApiFailure;
use rand::Rng;
use std::time::Duration;

/// How the delay grows with each attempt
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Backoff {
    /// Same delay every attempt
    Fixed,
    /// `base * attempt`
    Linear,
}

/// Configuration for retry behavior
#[derive(Debug, Clone)]
pub struct RetryConfig {
    pub max_attempts: u32,
    pub base_delay: Duration,
    /// Base delay used instead of `base_delay` after a 429
    pub rate_limit_delay: Duration,
    pub max_delay: Duration,
    pub backoff: Backoff,
    pub jitter: bool,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            base_delay: Duration::from_secs(1),
            rate_limit_delay: Duration::from_secs(2),
            max_delay: Duration::from_secs(10),
            backoff: Backoff::Linear,
            jitter: false,
        }
    }
}

impl RetryConfig {
    /// No waiting between attempts (for tests)
    pub fn immediate() -> Self {
        Self {
            base_delay: Duration::ZERO,
            rate_limit_delay: Duration::ZERO,
            max_delay: Duration::ZERO,
            ..Self::default()
        }
    }

    /// Delay before retrying after `attempt` failed attempts of the same page
    pub fn delay_for(&self, error: &RetryableError, attempt: u32) -> Duration {
        let base = match error {
            RetryableError::RateLimited => self.rate_limit_delay,
            _ => self.base_delay,
        };

        let multiplier = match self.backoff {
            Backoff::Fixed => 1,
            Backoff::Linear => attempt.max(1),
        };

        let mut delay = base.saturating_mul(multiplier).min(self.max_delay);

        if self.jitter && !delay.is_zero() {
            let jitter_factor = rand::rng().random_range(0.5..=1.5);
            delay = Duration::from_millis((delay.as_millis() as f64 * jitter_factor) as u64);
        }

        delay
    }
}

/// Types of errors and their retry behavior
#[derive(Debug, Clone, PartialEq)]
pub enum RetryableError {
    /// Connection refused, DNS, reset
    Network,
    /// HTTP 5xx server errors
    ServerError(u16),
    /// HTTP 429 Too Many Requests
    RateLimited,
    /// HTTP 408 or a client-side timeout
    Timeout,
    /// Non-retryable client errors (4xx except 401, 408, 429)
    ClientError(u16),
    /// HTTP 401, recovered by refreshing the token rather than by waiting
    AuthError,
    /// Unparseable responses and anything else
    Unknown,
}

impl RetryableError {
    /// Determine if this error type should be retried after a delay
    pub fn should_retry(&self) -> bool {
        match self {
            RetryableError::Network => true,
            RetryableError::ServerError(_) => true,
            RetryableError::RateLimited => true,
            RetryableError::Timeout => true,
            RetryableError::ClientError(_) => false,
            RetryableError::AuthError => false,
            RetryableError::Unknown => false,
        }
    }

    /// Whether the same request may be attempted again at all
    pub fn is_recoverable(&self) -> bool {
        self.should_retry() || *self == RetryableError::AuthError
    }

    /// Classify an HTTP status code into retry behavior
    pub fn from_status_code(status: u16) -> Self {
        match status {
            401 => RetryableError::AuthError,
            408 => RetryableError::Timeout,
            429 => RetryableError::RateLimited,
            400..=499 => RetryableError::ClientError(status),
            500..=599 => RetryableError::ServerError(status),
            _ => RetryableError::Unknown,
        }
    }

    pub fn from_failure(failure: &ApiFailure) -> Self {
        match failure {
            ApiFailure::AuthRequired(_) => RetryableError::AuthError,
            ApiFailure::Status { status, .. } => Self::from_status_code(*status),
            ApiFailure::Timeout => RetryableError::Timeout,
            ApiFailure::Network(_) => RetryableError::Network,
            ApiFailure::InvalidResponse(_) => RetryableError::Unknown,
        }
    }
}
