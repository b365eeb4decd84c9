//! Observability subsystem.
//!
//! # Data Flow
//! ```text
//! Monitor, pipeline stages, queue and drain worker produce:
//!     → tracing events (structured fields: request_id, attempt, delay, status)
//!     → metrics.rs (counters, gauges, histograms)
//!
//! Consumers:
//!     → logging.rs subscriber (stdout, pretty or JSON)
//!     → whatever metrics recorder the host installs
//! ```
//!
//! # Design Decisions
//! - Request ID is on every event touching a request
//! - Metrics are cheap (no-op without a recorder)

pub mod logging;
pub mod metrics;
