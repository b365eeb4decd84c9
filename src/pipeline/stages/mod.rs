//! Built-in stages, in standard order.

pub mod auth;
pub mod connectivity_gate;
pub mod error_mapping;
pub mod logging;
pub mod retry;

pub use auth::{AuthStage, CredentialProvider, NoCredentials};
pub use connectivity_gate::{ConnectivityGate, OfflinePolicy};
pub use error_mapping::ErrorMappingStage;
pub use logging::LoggingStage;
pub use retry::RetryStage;
