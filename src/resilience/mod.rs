//! Resilience subsystem.
//!
//! # Data Flow
//! ```text
//! Attempt fails inside the pipeline:
//!     → retries.rs (classify mapped outcome, check retry budget)
//!     → backoff.rs (exponential delay, capped, optional jitter)
//!     → cancellation.rs (sleep is abandoned if the request is cancelled)
//! ```
//!
//! # Design Decisions
//! - Policy is pure and shared; per-request state lives in the retry stage
//! - Every suspension point is cancellable through the request's token
//! - Retries are bounded: at most `max_retries + 1` attempts per request

pub mod backoff;
pub mod cancellation;
pub mod retries;

pub use cancellation::CancellationRegistry;
pub use retries::RetryPolicy;
