//! Connectivity subsystem.
//!
//! # Data Flow
//! ```text
//! OS path callback / probe.rs
//!     → mpsc channel of observations
//!     → monitor.rs writer task (single writer)
//!     → ArcSwap snapshot (read by gate & façade, lock-free)
//!     → transitions: callbacks + broadcast (drain worker listens)
//! ```
//!
//! # Design Decisions
//! - Optimistic start: reported connected until the first observation
//! - Only Disconnected → Connected triggers a queue drain
//! - The monitor is an injected, process-scoped instance, not a global

pub mod monitor;
pub mod probe;
pub mod status;

pub use monitor::{ConnectivityMonitor, SubscriptionHandle};
pub use probe::TcpProbe;
pub use status::{ConnectivityStatus, InterfaceKind, LinkState, Transition};
