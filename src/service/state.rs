//! Caller-facing request states and the sink they are reported to.

use tokio::sync::mpsc;

use crate::error::{ErrorKind, NetworkError};
use crate::transport::{RequestId, ResponseDescriptor};

/// Lifecycle state of one request, shaped for driving a UI state machine.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RequestState {
    Loading,
    Success(ResponseDescriptor),
    Failed { kind: ErrorKind, message: String },
}

impl RequestState {
    pub fn failed(error: &NetworkError) -> Self {
        RequestState::Failed {
            kind: error.kind(),
            message: error.to_string(),
        }
    }

    pub fn from_result(result: Result<ResponseDescriptor, NetworkError>) -> Self {
        match result {
            Ok(response) => RequestState::Success(response),
            Err(error) => RequestState::failed(&error),
        }
    }

    pub fn is_failed(&self) -> bool {
        matches!(self, RequestState::Failed { .. })
    }

    pub fn is_terminal(&self) -> bool {
        !matches!(self, RequestState::Loading)
    }

    /// The failure kind, if this is a failure.
    pub fn error_kind(&self) -> Option<ErrorKind> {
        match self {
            RequestState::Failed { kind, .. } => Some(*kind),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RequestEvent {
    pub id: RequestId,
    pub state: RequestState,
}

/// Receiver of request state changes.
///
/// A request reports `Loading` then one terminal state. A request that was
/// offline reports `Failed(Offline)` at once, and its queued retry reports
/// the final state later.
pub trait StateSink: Send + Sync {
    fn report(&self, event: RequestEvent);
}

impl<F> StateSink for F
where
    F: Fn(RequestEvent) + Send + Sync,
{
    fn report(&self, event: RequestEvent) {
        self(event)
    }
}

impl StateSink for mpsc::UnboundedSender<RequestEvent> {
    fn report(&self, event: RequestEvent) {
        // A dropped receiver means nobody is watching any more.
        let _ = self.send(event);
    }
}

/// Sink for callers that only want the returned state.
#[derive(Debug, Clone, Copy, Default)]
pub struct DiscardSink;

impl StateSink for DiscardSink {
    fn report(&self, _event: RequestEvent) {}
}
