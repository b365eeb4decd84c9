//! Configuration schema definitions.
//!
//! All types derive Serde traits for deserialization from TOML. Every section
//! carries `#[serde(default)]` so a minimal (or empty) file is valid.

use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Root configuration.
#[derive(Debug, Clone, Deserialize, Serialize, Default)]
#[serde(default)]
pub struct NetawareConfig {
    /// Retry and backoff settings for the pipeline.
    pub retry: RetryConfig,

    /// Connectivity gating and probing.
    pub connectivity: ConnectivityConfig,

    /// Pending request queue settings.
    pub queue: QueueConfig,

    /// Logging settings.
    pub observability: ObservabilityConfig,
}

/// Outcome classes eligible for transparent retry.
///
/// Written in TOML as a mixed array, e.g. `[503, "timeout", "connection-lost"]`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Deserialize, Serialize)]
#[serde(untagged)]
pub enum RetryableOutcome {
    /// An HTTP status code.
    Status(u16),
    /// A transport-level condition.
    Condition(OutcomeCondition),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Deserialize, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum OutcomeCondition {
    Timeout,
    ConnectionLost,
}

/// Retry configuration. Immutable per pipeline.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct RetryConfig {
    /// Maximum number of retries after the initial attempt.
    pub max_retries: u32,

    /// Delay before the first retry in milliseconds.
    pub initial_delay_ms: u64,

    /// Upper bound on any single backoff delay in milliseconds.
    pub max_delay_ms: u64,

    /// Outcomes that are retried transparently.
    pub retryable_outcomes: Vec<RetryableOutcome>,

    /// Fraction of the delay added as random jitter (0.0 disables jitter).
    pub jitter_ratio: f64,
}

impl RetryConfig {
    pub fn initial_delay(&self) -> Duration {
        Duration::from_millis(self.initial_delay_ms)
    }

    pub fn max_delay(&self) -> Duration {
        Duration::from_millis(self.max_delay_ms)
    }
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_retries: 3,
            initial_delay_ms: 1_000,
            max_delay_ms: 30_000,
            retryable_outcomes: default_retryable_outcomes(),
            jitter_ratio: 0.0,
        }
    }
}

/// The default retryable set: 408, 429, 500, 502, 503, 504, timeout and
/// connection-lost.
pub fn default_retryable_outcomes() -> Vec<RetryableOutcome> {
    let mut outcomes: Vec<RetryableOutcome> = [408, 429, 500, 502, 503, 504]
        .into_iter()
        .map(RetryableOutcome::Status)
        .collect();
    outcomes.push(RetryableOutcome::Condition(OutcomeCondition::Timeout));
    outcomes.push(RetryableOutcome::Condition(OutcomeCondition::ConnectionLost));
    outcomes
}

/// What the connectivity gate does when the host is offline.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum OfflinePolicyKind {
    /// Fail immediately with `Offline`.
    #[default]
    FailFast,
    /// Suspend until connected or `wait_timeout_ms` elapses.
    Wait,
}

/// Connectivity configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ConnectivityConfig {
    pub offline_policy: OfflinePolicyKind,

    /// Bound on the gate's wait for a connection, in milliseconds.
    pub wait_timeout_ms: u64,

    /// Optional active TCP probe, for hosts without an OS path API.
    pub probe: Option<ProbeConfig>,
}

impl ConnectivityConfig {
    pub fn wait_timeout(&self) -> Duration {
        Duration::from_millis(self.wait_timeout_ms)
    }
}

impl Default for ConnectivityConfig {
    fn default() -> Self {
        Self {
            offline_policy: OfflinePolicyKind::FailFast,
            wait_timeout_ms: 30_000,
            probe: None,
        }
    }
}

/// Active TCP probe settings.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ProbeConfig {
    /// Address to connect to (e.g., "1.1.1.1:443").
    pub address: String,

    /// Probe interval in milliseconds.
    #[serde(default = "default_probe_interval_ms")]
    pub interval_ms: u64,

    /// Connect timeout in milliseconds.
    #[serde(default = "default_probe_timeout_ms")]
    pub timeout_ms: u64,
}

fn default_probe_interval_ms() -> u64 {
    5_000
}

fn default_probe_timeout_ms() -> u64 {
    2_000
}

/// Pending request queue configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct QueueConfig {
    /// Delay between consecutive drained items in milliseconds.
    pub drain_stagger_ms: u64,

    /// Drain retries granted to a request deferred while offline.
    pub default_max_retries: u32,

    /// Optional upper bound on queued requests.
    pub capacity: Option<usize>,
}

impl QueueConfig {
    pub fn drain_stagger(&self) -> Duration {
        Duration::from_millis(self.drain_stagger_ms)
    }
}

impl Default for QueueConfig {
    fn default() -> Self {
        Self {
            drain_stagger_ms: 500,
            default_max_retries: 3,
            capacity: None,
        }
    }
}

/// Observability configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ObservabilityConfig {
    /// Log level (trace, debug, info, warn, error). `RUST_LOG` takes precedence.
    pub log_level: String,

    /// Emit JSON lines instead of human-readable output.
    pub json: bool,
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
            json: false,
        }
    }
}
