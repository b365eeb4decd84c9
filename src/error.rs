//! Caller-visible error taxonomy.
//!
//! Every failure that leaves the pipeline is one of these values. Raw transport
//! failures are translated by the error mapping stage; nothing upstream of it
//! ever sees a [`TransportError`](crate::transport::TransportError).

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Terminal or intermediate failure of a request.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum NetworkError {
    /// No connectivity at attempt time.
    #[error("no network connection")]
    Offline,

    /// The request or the transport timed out.
    #[error("request timed out")]
    Timeout,

    /// Connectivity dropped while the request was in flight.
    #[error("connection lost while the request was in flight")]
    ConnectionLost,

    /// The credential was missing or rejected.
    #[error("unauthorized")]
    Unauthorized,

    #[error("forbidden")]
    Forbidden,

    #[error("resource not found")]
    NotFound,

    #[error("rate limited by server")]
    RateLimited,

    /// Server-side failure, carries the HTTP status.
    #[error("server error (status {0})")]
    ServerError(u16),

    /// A status outside the named cases above.
    #[error("unexpected response status {0}")]
    UnexpectedStatus(u16),

    /// The response could not be decoded.
    #[error("malformed response: {0}")]
    MalformedResponse(String),

    /// Cancelled by the caller.
    #[error("request cancelled")]
    Cancelled,

    #[error("unknown error: {0}")]
    Unknown(String),
}

impl NetworkError {
    /// Fieldless classification, used for UI sinks and metric labels.
    pub fn kind(&self) -> ErrorKind {
        match self {
            NetworkError::Offline => ErrorKind::Offline,
            NetworkError::Timeout => ErrorKind::Timeout,
            NetworkError::ConnectionLost => ErrorKind::ConnectionLost,
            NetworkError::Unauthorized => ErrorKind::Unauthorized,
            NetworkError::Forbidden => ErrorKind::Forbidden,
            NetworkError::NotFound => ErrorKind::NotFound,
            NetworkError::RateLimited => ErrorKind::RateLimited,
            NetworkError::ServerError(_) => ErrorKind::ServerError,
            NetworkError::UnexpectedStatus(_) => ErrorKind::UnexpectedStatus,
            NetworkError::MalformedResponse(_) => ErrorKind::MalformedResponse,
            NetworkError::Cancelled => ErrorKind::Cancelled,
            NetworkError::Unknown(_) => ErrorKind::Unknown,
        }
    }

    /// HTTP status associated with this error, if any.
    pub fn status_code(&self) -> Option<u16> {
        match self {
            NetworkError::Unauthorized => Some(401),
            NetworkError::Forbidden => Some(403),
            NetworkError::NotFound => Some(404),
            NetworkError::RateLimited => Some(429),
            NetworkError::ServerError(code) | NetworkError::UnexpectedStatus(code) => Some(*code),
            _ => None,
        }
    }
}

/// Fieldless mirror of [`NetworkError`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    Offline,
    Timeout,
    ConnectionLost,
    Unauthorized,
    Forbidden,
    NotFound,
    RateLimited,
    ServerError,
    UnexpectedStatus,
    MalformedResponse,
    Cancelled,
    Unknown,
}

impl ErrorKind {
    /// Stable label for logs and metrics.
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorKind::Offline => "offline",
            ErrorKind::Timeout => "timeout",
            ErrorKind::ConnectionLost => "connection_lost",
            ErrorKind::Unauthorized => "unauthorized",
            ErrorKind::Forbidden => "forbidden",
            ErrorKind::NotFound => "not_found",
            ErrorKind::RateLimited => "rate_limited",
            ErrorKind::ServerError => "server_error",
            ErrorKind::UnexpectedStatus => "unexpected_status",
            ErrorKind::MalformedResponse => "malformed_response",
            ErrorKind::Cancelled => "cancelled",
            ErrorKind::Unknown => "unknown",
        }
    }
}

impl std::fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}
