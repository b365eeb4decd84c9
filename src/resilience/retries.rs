//! Retry policy.
//!
//! # Responsibilities
//! - Compute the backoff delay for a zero-indexed retry attempt
//! - Classify a mapped outcome as retryable or terminal
//!
//! # Design Decisions
//! - Pure and stateless: one policy is shared by every request of a pipeline
//! - Authorization, not-found, malformed and cancelled outcomes are never retried
//! - Status codes are retried only when listed in the configured set

use std::collections::BTreeSet;
use std::time::Duration;

use crate::config::{OutcomeCondition, RetryConfig, RetryableOutcome};
use crate::error::NetworkError;
use crate::resilience::backoff::{apply_jitter, compute_delay};

/// Immutable retry policy built from [`RetryConfig`].
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    max_retries: u32,
    initial_delay: Duration,
    max_delay: Duration,
    retryable: BTreeSet<RetryableOutcome>,
    jitter_ratio: f64,
}

impl RetryPolicy {
    pub fn new(max_retries: u32, initial_delay: Duration, max_delay: Duration) -> Self {
        Self {
            max_retries,
            initial_delay,
            max_delay,
            retryable: crate::config::schema::default_retryable_outcomes()
                .into_iter()
                .collect(),
            jitter_ratio: 0.0,
        }
    }

    pub fn from_config(config: &RetryConfig) -> Self {
        Self {
            max_retries: config.max_retries,
            initial_delay: config.initial_delay(),
            max_delay: config.max_delay(),
            retryable: config.retryable_outcomes.iter().copied().collect(),
            jitter_ratio: config.jitter_ratio,
        }
    }

    /// Replace the retryable outcome set.
    pub fn with_retryable(mut self, outcomes: impl IntoIterator<Item = RetryableOutcome>) -> Self {
        self.retryable = outcomes.into_iter().collect();
        self
    }

    pub fn with_jitter(mut self, ratio: f64) -> Self {
        self.jitter_ratio = ratio;
        self
    }

    pub fn max_retries(&self) -> u32 {
        self.max_retries
    }

    /// `min(initial * 2^attempt, max)`, without jitter.
    pub fn compute_delay(&self, attempt: u32) -> Duration {
        compute_delay(attempt, self.initial_delay, self.max_delay)
    }

    /// The delay actually slept before the next attempt (jitter applied).
    pub fn backoff(&self, attempt: u32) -> Duration {
        apply_jitter(self.compute_delay(attempt), self.jitter_ratio)
    }

    /// Whether a mapped outcome may be retried.
    pub fn is_retryable(&self, error: &NetworkError) -> bool {
        match error {
            NetworkError::Timeout => {
                self.allows(RetryableOutcome::Condition(OutcomeCondition::Timeout))
                    || self.allows(RetryableOutcome::Status(408))
            }
            NetworkError::ConnectionLost => {
                self.allows(RetryableOutcome::Condition(OutcomeCondition::ConnectionLost))
            }
            NetworkError::RateLimited => self.allows(RetryableOutcome::Status(429)),
            NetworkError::ServerError(code) | NetworkError::UnexpectedStatus(code) => {
                self.allows(RetryableOutcome::Status(*code))
            }
            NetworkError::Offline
            | NetworkError::Unauthorized
            | NetworkError::Forbidden
            | NetworkError::NotFound
            | NetworkError::MalformedResponse(_)
            | NetworkError::Cancelled
            | NetworkError::Unknown(_) => false,
        }
    }

    fn allows(&self, outcome: RetryableOutcome) -> bool {
        self.retryable.contains(&outcome)
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::from_config(&RetryConfig::default())
    }
}
