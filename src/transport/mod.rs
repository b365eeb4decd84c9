//! Transport collaborator.
//!
//! # Data Flow
//! ```text
//! innermost pipeline continuation
//!     → Transport::execute(&RequestDescriptor)
//!     → Ok(ResponseDescriptor)      (any status, including 4xx/5xx)
//!     → Err(TransportError)         (raw failure, mapped later)
//! ```
//!
//! # Design Decisions
//! - Wire format belongs to the transport; the pipeline never inspects bodies
//! - Raw errors stay raw until the error mapping stage
//! - `HttpTransport` is the reqwest-backed default; tests inject their own

pub mod descriptor;
pub mod http;

use futures_util::future::BoxFuture;
use thiserror::Error;

pub use descriptor::{Method, RequestDescriptor, RequestId, ResponseDescriptor};
pub use http::HttpTransport;

/// Raw transport failure, before translation into the caller taxonomy.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TransportError {
    #[error("connection lost: {0}")]
    ConnectionLost(String),

    #[error("transport timeout")]
    Timeout,

    /// Transports that report HTTP failures as errors rather than responses.
    #[error("status {status}: {body}")]
    Status { status: u16, body: String },

    #[error("decode error: {0}")]
    Decode(String),

    #[error("transport error: {0}")]
    Other(String),
}

/// Executes one request attempt.
pub trait Transport: Send + Sync {
    fn execute<'a>(
        &'a self,
        request: &'a RequestDescriptor,
    ) -> BoxFuture<'a, Result<ResponseDescriptor, TransportError>>;
}

impl<T: Transport + ?Sized> Transport for std::sync::Arc<T> {
    fn execute<'a>(
        &'a self,
        request: &'a RequestDescriptor,
    ) -> BoxFuture<'a, Result<ResponseDescriptor, TransportError>> {
        (**self).execute(request)
    }
}
