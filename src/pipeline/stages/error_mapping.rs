//! Error mapping stage.
//!
//! Innermost standard stage. Translates raw transport failures and non-2xx
//! responses into [`NetworkError`] so every stage outside it sees the caller
//! taxonomy.
//!
//! # Mapping
//! ```text
//! 401 → Unauthorized          transport timeout     → Timeout
//! 403 → Forbidden             connection dropped    → ConnectionLost
//! 404 → NotFound              undecodable response  → MalformedResponse
//! 408 → Timeout               anything else         → Unknown
//! 429 → RateLimited
//! 5xx → ServerError(status)
//! other non-2xx → UnexpectedStatus(status)
//! ```

use futures_util::future::BoxFuture;

use crate::error::NetworkError;
use crate::pipeline::stage::{Next, Outcome, PipelineRequest, Stage, StageError};
use crate::transport::{ResponseDescriptor, TransportError};

pub struct ErrorMappingStage;

impl Stage for ErrorMappingStage {
    fn name(&self) -> &'static str {
        "error_mapping"
    }

    fn process<'a>(&'a self, request: PipelineRequest, next: Next<'a>) -> BoxFuture<'a, Outcome> {
        Box::pin(async move {
            let outcome = next.run(request).await;
            into_result(outcome).map_err(StageError::Network)
        })
    }
}

/// Map a non-2xx status.
pub fn map_status(status: u16) -> NetworkError {
    match status {
        401 => NetworkError::Unauthorized,
        403 => NetworkError::Forbidden,
        404 => NetworkError::NotFound,
        408 => NetworkError::Timeout,
        429 => NetworkError::RateLimited,
        500..=599 => NetworkError::ServerError(status),
        _ => NetworkError::UnexpectedStatus(status),
    }
}

pub fn map_transport(error: TransportError) -> NetworkError {
    match error {
        TransportError::ConnectionLost(_) => NetworkError::ConnectionLost,
        TransportError::Timeout => NetworkError::Timeout,
        TransportError::Status { status, .. } => map_status(status),
        TransportError::Decode(detail) => NetworkError::MalformedResponse(detail),
        TransportError::Other(detail) => NetworkError::Unknown(detail),
    }
}

pub fn map_error(error: StageError) -> NetworkError {
    match error {
        StageError::Network(mapped) => mapped,
        StageError::Transport(raw) => map_transport(raw),
    }
}

/// The failure an outcome represents, if any. Non-2xx responses count.
pub fn classify(outcome: &Outcome) -> Option<NetworkError> {
    match outcome {
        Ok(response) if response.is_success() => None,
        Ok(response) => Some(map_status(response.status)),
        Err(error) => Some(map_error(error.clone())),
    }
}

/// Collapse an outcome into the caller-facing result.
pub fn into_result(outcome: Outcome) -> Result<ResponseDescriptor, NetworkError> {
    match outcome {
        Ok(response) if response.is_success() => Ok(response),
        Ok(response) => Err(map_status(response.status)),
        Err(error) => Err(map_error(error)),
    }
}
