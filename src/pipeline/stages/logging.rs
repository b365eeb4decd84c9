//! Request logging stage.
//!
//! Emits one start event and one finish event per attempt that reaches it.
//! Every attempt re-enters the chain from the top, so a request retried twice
//! logs three start/finish pairs wherever this stage sits.

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Instant;

use futures_util::future::BoxFuture;

use crate::observability::metrics;
use crate::pipeline::stage::{Next, Outcome, PipelineRequest, Stage};
use crate::pipeline::stages::error_mapping::classify;

#[derive(Default)]
pub struct LoggingStage {
    started: AtomicU64,
    finished: AtomicU64,
}

impl LoggingStage {
    pub fn new() -> Self {
        Self::default()
    }

    /// Attempts that entered this stage.
    pub fn started(&self) -> u64 {
        self.started.load(Ordering::Relaxed)
    }

    /// Attempts that came back through this stage.
    pub fn finished(&self) -> u64 {
        self.finished.load(Ordering::Relaxed)
    }
}

impl Stage for LoggingStage {
    fn name(&self) -> &'static str {
        "logging"
    }

    fn process<'a>(&'a self, request: PipelineRequest, next: Next<'a>) -> BoxFuture<'a, Outcome> {
        Box::pin(async move {
            let id = request.id();
            let attempt = request.attempt;
            let method = request.descriptor.method;
            let path = request.descriptor.path.clone();

            self.started.fetch_add(1, Ordering::Relaxed);
            metrics::record_attempt();
            tracing::info!(
                request_id = %id,
                attempt,
                method = %method,
                path = %path,
                "Request started"
            );

            let started = Instant::now();
            let outcome = next.run(request).await;
            let elapsed_ms = started.elapsed().as_millis() as u64;
            self.finished.fetch_add(1, Ordering::Relaxed);

            match classify(&outcome) {
                None => {
                    let status = outcome.as_ref().map(|r| r.status).unwrap_or_default();
                    tracing::info!(
                        request_id = %id,
                        attempt,
                        status,
                        elapsed_ms,
                        "Request finished"
                    );
                }
                Some(error) => {
                    tracing::warn!(
                        request_id = %id,
                        attempt,
                        error = %error,
                        elapsed_ms,
                        "Request failed"
                    );
                }
            }
            outcome
        })
    }
}
