//! Stage contract and the `Next` continuation.

use std::sync::{Arc, Mutex};
use std::time::Duration;

use futures_util::future::BoxFuture;
use thiserror::Error;
use tokio::sync::Notify;
use tokio_util::sync::CancellationToken;

use crate::error::NetworkError;
use crate::transport::{RequestDescriptor, RequestId, ResponseDescriptor, Transport, TransportError};

/// Failure as seen inside the chain.
///
/// Stages inside the error mapping stage see `Transport` (raw); stages outside
/// it see `Network` (mapped).
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum StageError {
    #[error(transparent)]
    Transport(#[from] TransportError),

    #[error(transparent)]
    Network(#[from] NetworkError),
}

/// Result of running the remainder of the chain.
pub type Outcome = Result<ResponseDescriptor, StageError>;

/// A stage's request for another attempt, honoured by the pipeline once the
/// current attempt has unwound through every stage.
///
/// Shared by every clone of a [`PipelineRequest`]; the last request made
/// during an attempt wins.
#[derive(Debug, Clone, Default)]
pub struct RetrySignal(Arc<Mutex<Option<Duration>>>);

impl RetrySignal {
    /// Ask for another attempt after `delay`.
    pub fn request(&self, delay: Duration) {
        *self.0.lock().expect("retry signal mutex poisoned") = Some(delay);
    }

    pub(crate) fn take(&self) -> Option<Duration> {
        self.0.lock().expect("retry signal mutex poisoned").take()
    }
}

/// One attempt's view of a request.
#[derive(Debug, Clone)]
pub struct PipelineRequest {
    pub descriptor: RequestDescriptor,
    /// Zero for the initial attempt, incremented by the pipeline on each retry.
    pub attempt: u32,
    pub cancel: CancellationToken,
    pub retry: RetrySignal,
    dispatched: Option<Arc<Notify>>,
}

impl PipelineRequest {
    pub fn new(descriptor: RequestDescriptor) -> Self {
        Self::with_cancel(descriptor, CancellationToken::new())
    }

    pub fn with_cancel(descriptor: RequestDescriptor, cancel: CancellationToken) -> Self {
        Self {
            descriptor,
            attempt: 0,
            cancel,
            retry: RetrySignal::default(),
            dispatched: None,
        }
    }

    /// Notify `dispatched` each time an attempt is handed to the transport.
    pub fn notify_on_dispatch(mut self, dispatched: Arc<Notify>) -> Self {
        self.dispatched = Some(dispatched);
        self
    }

    pub fn id(&self) -> RequestId {
        self.descriptor.id
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancel.is_cancelled()
    }
}

/// A unit of request processing.
///
/// A stage may modify the request, return early without calling `next`, or
/// ask for another attempt through [`PipelineRequest::retry`]. Each attempt
/// runs the whole chain again from the outermost stage.
pub trait Stage: Send + Sync {
    /// Name used in logs and for inspecting a built pipeline.
    fn name(&self) -> &'static str;

    fn process<'a>(&'a self, request: PipelineRequest, next: Next<'a>) -> BoxFuture<'a, Outcome>;
}

impl<S: Stage + ?Sized> Stage for Arc<S> {
    fn name(&self) -> &'static str {
        (**self).name()
    }

    fn process<'a>(&'a self, request: PipelineRequest, next: Next<'a>) -> BoxFuture<'a, Outcome> {
        (**self).process(request, next)
    }
}

/// The remainder of the chain: the stages after the current one, then the
/// transport.
#[derive(Clone, Copy)]
pub struct Next<'a> {
    stages: &'a [Arc<dyn Stage>],
    transport: &'a dyn Transport,
}

impl<'a> Next<'a> {
    pub(crate) fn new(stages: &'a [Arc<dyn Stage>], transport: &'a dyn Transport) -> Self {
        Self { stages, transport }
    }

    /// Run the remainder of the chain for one attempt.
    pub fn run(self, request: PipelineRequest) -> BoxFuture<'a, Outcome> {
        match self.stages.split_first() {
            Some((stage, rest)) => stage.process(request, Next::new(rest, self.transport)),
            None => Box::pin(dispatch(self.transport, request)),
        }
    }

    /// Stages left before the transport.
    pub fn remaining(&self) -> usize {
        self.stages.len()
    }
}

/// Innermost step: the transport call, bounded by the descriptor's timeout and
/// abandoned if the request is cancelled.
async fn dispatch(transport: &dyn Transport, request: PipelineRequest) -> Outcome {
    if request.is_cancelled() {
        return Err(NetworkError::Cancelled.into());
    }

    let call = async {
        let execution = transport.execute(&request.descriptor);
        if let Some(dispatched) = &request.dispatched {
            dispatched.notify_one();
        }
        match request.descriptor.timeout {
            Some(limit) => tokio::time::timeout(limit, execution)
                .await
                .unwrap_or(Err(TransportError::Timeout)),
            None => execution.await,
        }
    };

    tokio::select! {
        biased;
        _ = request.cancel.cancelled() => Err(NetworkError::Cancelled.into()),
        result = call => result.map_err(StageError::from),
    }
}
