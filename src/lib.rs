//! Connectivity-aware request pipeline library.
//!
//! Requests issued while the host is offline fail at once and are queued;
//! the queue drains in priority order when connectivity returns. Online
//! requests run through a fixed chain of stages: connectivity gate, retry
//! with backoff, authentication, logging and error mapping.

pub mod config;
pub mod connectivity;
pub mod error;
pub mod lifecycle;
pub mod observability;
pub mod pipeline;
pub mod queue;
pub mod resilience;
pub mod service;
pub mod transport;

pub use config::schema::NetawareConfig;
pub use connectivity::{ConnectivityMonitor, ConnectivityStatus, InterfaceKind};
pub use error::{ErrorKind, NetworkError};
pub use lifecycle::Shutdown;
pub use pipeline::{RequestPipeline, Stage};
pub use queue::{PendingRequestQueue, Priority};
pub use resilience::RetryPolicy;
pub use service::{NetworkAwareService, RequestEvent, RequestState, RetryScope, StateSink};
pub use transport::{HttpTransport, RequestDescriptor, RequestId, ResponseDescriptor, Transport};
