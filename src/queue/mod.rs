//! Pending request subsystem.
//!
//! # Data Flow
//! ```text
//! NetworkAwareService::request while offline
//!     → PendingRequestQueue::enqueue (priority, FIFO within band)
//!     → back online already: request_drain wakes the worker
//!
//! ConnectivityMonitor transition (Disconnected → Connected)
//!     → QueueDrainer::drain_once
//!     → take_all (atomic snapshot + clear)
//!     → RequestPipeline::execute per entry, each started once the previous
//!       one reached the transport, plus the stagger
//!     → success / cancelled / exhausted: completion fires
//!     → otherwise: retry_count + 1, requeue for the next reconnect
//! ```
//!
//! # Design Decisions
//! - Memory-resident; nothing survives the process
//! - Only pre-flight offline detections are queued, never online failures

pub mod drain;
pub mod pending;

pub use drain::QueueDrainer;
pub use pending::{
    Completion, PendingRequest, PendingRequestQueue, PendingSummary, Priority, QueueError,
};
