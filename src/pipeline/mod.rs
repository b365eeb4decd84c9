//! Request pipeline subsystem.
//!
//! # Data Flow
//! ```text
//! RequestPipeline::execute(request)
//!   loop per attempt:
//!     → ConnectivityGate   (offline: fail fast or wait)
//!     → RetryStage         (on the way out: signal a retry after backoff)
//!     → AuthStage          (attach credential, 401 → Unauthorized)
//!     → LoggingStage       (start/finish per attempt)
//!     → ErrorMappingStage  (raw → NetworkError)
//!     → Transport::execute
//!   retry signalled: sleep the backoff, attempt += 1, re-enter at the top
//! ```
//!
//! # Design Decisions
//! - Order is fixed at build time; stages never reorder or skip one another
//! - Each stage sees only its successors through `Next`
//! - Every attempt runs the whole chain, so every stage sees every attempt
//! - `execute` maps anything still raw, so callers always get `NetworkError`

pub mod stage;
pub mod stages;

use std::sync::Arc;

use crate::config::NetawareConfig;
use crate::connectivity::ConnectivityMonitor;
use crate::error::NetworkError;
use crate::resilience::RetryPolicy;
use crate::transport::{ResponseDescriptor, Transport};

use stages::error_mapping::{classify, into_result};

pub use stage::{Next, Outcome, PipelineRequest, RetrySignal, Stage, StageError};
pub use stages::{
    AuthStage, ConnectivityGate, CredentialProvider, ErrorMappingStage, LoggingStage,
    NoCredentials, OfflinePolicy, RetryStage,
};

/// An ordered, immutable chain of stages in front of a transport.
pub struct RequestPipeline {
    stages: Vec<Arc<dyn Stage>>,
    transport: Arc<dyn Transport>,
}

impl RequestPipeline {
    pub fn builder(transport: impl Transport + 'static) -> PipelineBuilder {
        PipelineBuilder {
            stages: Vec::new(),
            transport: Arc::new(transport),
        }
    }

    /// The five built-in stages in their standard order.
    pub fn standard(
        config: &NetawareConfig,
        monitor: Arc<ConnectivityMonitor>,
        credentials: Arc<dyn CredentialProvider>,
        transport: Arc<dyn Transport>,
    ) -> Self {
        Self::builder(transport)
            .stage(ConnectivityGate::new(
                monitor,
                OfflinePolicy::from_config(&config.connectivity),
            ))
            .stage(RetryStage::new(RetryPolicy::from_config(&config.retry)))
            .stage(AuthStage::new(credentials))
            .stage(LoggingStage::new())
            .stage(ErrorMappingStage)
            .build()
    }

    /// Stage names, outermost first.
    pub fn stage_names(&self) -> Vec<&'static str> {
        self.stages.iter().map(|stage| stage.name()).collect()
    }

    /// Run one request through every stage and the transport, once per
    /// attempt, until no stage asks for another.
    pub async fn execute(&self, mut request: PipelineRequest) -> Result<ResponseDescriptor, NetworkError> {
        loop {
            let outcome = Next::new(&self.stages, self.transport.as_ref())
                .run(request.clone())
                .await;

            let delay = match request.retry.take() {
                Some(delay) if classify(&outcome).is_some() && !request.is_cancelled() => delay,
                _ => return into_result(outcome),
            };

            tokio::select! {
                biased;
                _ = request.cancel.cancelled() => return Err(NetworkError::Cancelled),
                _ = tokio::time::sleep(delay) => {}
            }
            request.attempt += 1;
        }
    }
}

impl std::fmt::Debug for RequestPipeline {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RequestPipeline")
            .field("stages", &self.stage_names())
            .finish()
    }
}

pub struct PipelineBuilder {
    stages: Vec<Arc<dyn Stage>>,
    transport: Arc<dyn Transport>,
}

impl PipelineBuilder {
    /// Append a stage inside the ones already added.
    pub fn stage(mut self, stage: impl Stage + 'static) -> Self {
        self.stages.push(Arc::new(stage));
        self
    }

    pub fn build(self) -> RequestPipeline {
        RequestPipeline {
            stages: self.stages,
            transport: self.transport,
        }
    }
}
