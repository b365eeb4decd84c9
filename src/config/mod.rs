//! Configuration management subsystem.
//!
//! # Data Flow
//! ```text
//! config file (TOML)
//!     → loader.rs (parse & deserialize)
//!     → validation.rs (semantic checks)
//!     → NetawareConfig (validated, immutable)
//!     → NetworkAwareService::new builds pipeline, queue and drainer from it
//! ```
//!
//! # Design Decisions
//! - Config is immutable once a service is built from it
//! - All fields have defaults to allow minimal configs
//! - Validation separates syntactic (serde) from semantic checks

pub mod loader;
pub mod schema;
pub mod validation;

pub use loader::{load_config, parse_config, ConfigError};
pub use schema::{
    ConnectivityConfig, NetawareConfig, ObservabilityConfig, OfflinePolicyKind, OutcomeCondition,
    ProbeConfig, QueueConfig, RetryConfig, RetryableOutcome,
};
pub use validation::{validate_config, ValidationError};
