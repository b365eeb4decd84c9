//! Retry stage.
//!
//! # Responsibilities
//! - Decide, once the inner chain has answered, whether the attempt is worth
//!   repeating and after what backoff
//! - Hand that decision to the pipeline through the request's retry signal
//!
//! # Design Decisions
//! - The pipeline owns the attempt loop and re-enters from the outermost
//!   stage, so stages outside this one also see every attempt
//! - Sits outside error mapping, so it decides on mapped errors and non-2xx
//!   responses alike
//! - Returns each attempt's outcome untouched; mapping it is not its job
//! - A request carries at most `1 + max_retries` transport attempts

use futures_util::future::BoxFuture;

use crate::error::NetworkError;
use crate::observability::metrics;
use crate::pipeline::stage::{Next, Outcome, PipelineRequest, Stage};
use crate::pipeline::stages::error_mapping::classify;
use crate::resilience::RetryPolicy;

pub struct RetryStage {
    policy: RetryPolicy,
}

impl RetryStage {
    pub fn new(policy: RetryPolicy) -> Self {
        Self { policy }
    }

    pub fn policy(&self) -> &RetryPolicy {
        &self.policy
    }
}

impl Stage for RetryStage {
    fn name(&self) -> &'static str {
        "retry"
    }

    fn process<'a>(&'a self, request: PipelineRequest, next: Next<'a>) -> BoxFuture<'a, Outcome> {
        Box::pin(async move {
            let id = request.id();
            let attempt = request.attempt;
            let cancel = request.cancel.clone();
            let retry = request.retry.clone();

            let outcome = next.run(request).await;

            let Some(error) = classify(&outcome) else {
                return outcome;
            };
            if error == NetworkError::Cancelled || cancel.is_cancelled() {
                return outcome;
            }
            if !self.policy.is_retryable(&error) {
                tracing::debug!(request_id = %id, error = %error, "Outcome not retryable");
                return outcome;
            }
            if attempt >= self.policy.max_retries() {
                tracing::warn!(
                    request_id = %id,
                    attempts = attempt + 1,
                    error = %error,
                    "Retry budget exhausted"
                );
                return outcome;
            }

            let delay = self.policy.backoff(attempt);
            tracing::info!(
                request_id = %id,
                attempt = attempt + 1,
                delay_ms = delay.as_millis() as u64,
                error = %error,
                "Retrying request"
            );
            metrics::record_retry();
            retry.request(delay);
            outcome
        })
    }
}
