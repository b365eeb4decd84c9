//! Lifecycle management subsystem.
//!
//! # Data Flow
//! ```text
//! NetworkAwareService::start:
//!     spawn connectivity writer / TCP probe → spawn drain worker
//!
//! NetworkAwareService::shutdown (shutdown.rs):
//!     trigger broadcast → background loops exit
//!     → in-flight requests cancelled → queued requests finalized as Cancelled
//! ```
//!
//! # Design Decisions
//! - Explicit init and shutdown on an injected service instance
//! - Shutdown is idempotent

pub mod shutdown;

pub use shutdown::Shutdown;
