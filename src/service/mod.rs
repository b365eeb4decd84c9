//! Caller-facing service subsystem.
//!
//! # Data Flow
//! ```text
//! caller → NetworkAwareService::request(descriptor, sink)
//!     offline → sink: Failed(Offline) → PendingRequestQueue::enqueue
//!                   ... reconnect → drain → sink: Success / Failed
//!     online  → sink: Loading → RequestPipeline::execute → sink: Success / Failed
//! ```
//!
//! # Design Decisions
//! - States carry no UI types; a sink is anything that accepts a `RequestEvent`
//! - Every call also returns the state it reported last

pub mod facade;
pub mod state;

pub use facade::{NetworkAwareService, RetryScope};
pub use state::{DiscardSink, RequestEvent, RequestState, StateSink};
