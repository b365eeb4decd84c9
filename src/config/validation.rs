//! Configuration validation.
//!
//! Serde handles syntax; this module checks value ranges. All problems are
//! collected and returned together rather than stopping at the first.

use thiserror::Error;

use crate::config::schema::{NetawareConfig, OfflinePolicyKind, RetryableOutcome};

/// A single semantic problem in a configuration.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValidationError {
    #[error("retry.initial_delay_ms must be greater than 0")]
    ZeroInitialDelay,

    #[error("retry.max_delay_ms ({max}) must be >= retry.initial_delay_ms ({initial})")]
    MaxDelayBelowInitial { initial: u64, max: u64 },

    #[error("retry.jitter_ratio must be within [0, 1], got {0}")]
    JitterOutOfRange(String),

    #[error("retry.retryable_outcomes contains invalid status code {0}")]
    InvalidStatusCode(u16),

    #[error("connectivity.wait_timeout_ms must be greater than 0 with the wait policy")]
    ZeroWaitTimeout,

    #[error("connectivity.probe.address '{0}' is not a valid host:port")]
    InvalidProbeAddress(String),

    #[error("connectivity.probe.{0} must be greater than 0")]
    ZeroProbeDuration(&'static str),

    #[error("queue.capacity must be greater than 0 when set")]
    ZeroCapacity,
}

/// Validate a parsed configuration.
pub fn validate_config(config: &NetawareConfig) -> Result<(), Vec<ValidationError>> {
    let mut errors = Vec::new();

    let retry = &config.retry;
    if retry.initial_delay_ms == 0 {
        errors.push(ValidationError::ZeroInitialDelay);
    }
    if retry.max_delay_ms < retry.initial_delay_ms {
        errors.push(ValidationError::MaxDelayBelowInitial {
            initial: retry.initial_delay_ms,
            max: retry.max_delay_ms,
        });
    }
    if !(0.0..=1.0).contains(&retry.jitter_ratio) {
        errors.push(ValidationError::JitterOutOfRange(retry.jitter_ratio.to_string()));
    }
    for outcome in &retry.retryable_outcomes {
        if let RetryableOutcome::Status(code) = outcome {
            if !(100..=599).contains(code) {
                errors.push(ValidationError::InvalidStatusCode(*code));
            }
        }
    }

    let connectivity = &config.connectivity;
    if connectivity.offline_policy == OfflinePolicyKind::Wait && connectivity.wait_timeout_ms == 0 {
        errors.push(ValidationError::ZeroWaitTimeout);
    }
    if let Some(probe) = &connectivity.probe {
        if !is_host_port(&probe.address) {
            errors.push(ValidationError::InvalidProbeAddress(probe.address.clone()));
        }
        if probe.interval_ms == 0 {
            errors.push(ValidationError::ZeroProbeDuration("interval_ms"));
        }
        if probe.timeout_ms == 0 {
            errors.push(ValidationError::ZeroProbeDuration("timeout_ms"));
        }
    }

    if config.queue.capacity == Some(0) {
        errors.push(ValidationError::ZeroCapacity);
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}

// Syntactic check only; no DNS lookup happens for hostnames.
fn is_host_port(address: &str) -> bool {
    if address.parse::<std::net::SocketAddr>().is_ok() {
        return true;
    }
    match address.rsplit_once(':') {
        Some((host, port)) => !host.is_empty() && port.parse::<u16>().is_ok(),
        None => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::schema::ProbeConfig;

    #[test]
    fn test_default_config_is_valid() {
        assert!(validate_config(&NetawareConfig::default()).is_ok());
    }

    #[test]
    fn test_collects_all_errors() {
        let mut config = NetawareConfig::default();
        config.retry.initial_delay_ms = 0;
        config.retry.jitter_ratio = 1.5;
        config.retry.retryable_outcomes.push(RetryableOutcome::Status(700));
        config.queue.capacity = Some(0);

        let errors = validate_config(&config).unwrap_err();
        assert_eq!(errors.len(), 4);
        assert!(errors.contains(&ValidationError::ZeroInitialDelay));
        assert!(errors.contains(&ValidationError::InvalidStatusCode(700)));
        assert!(errors.contains(&ValidationError::ZeroCapacity));
    }

    #[test]
    fn test_max_delay_below_initial() {
        let mut config = NetawareConfig::default();
        config.retry.initial_delay_ms = 500;
        config.retry.max_delay_ms = 100;
        let errors = validate_config(&config).unwrap_err();
        assert_eq!(
            errors,
            vec![ValidationError::MaxDelayBelowInitial { initial: 500, max: 100 }]
        );
    }

    #[test]
    fn test_wait_policy_needs_timeout() {
        let mut config = NetawareConfig::default();
        config.connectivity.offline_policy = OfflinePolicyKind::Wait;
        config.connectivity.wait_timeout_ms = 0;
        assert_eq!(
            validate_config(&config).unwrap_err(),
            vec![ValidationError::ZeroWaitTimeout]
        );
    }

    #[test]
    fn test_probe_address() {
        let mut config = NetawareConfig::default();
        config.connectivity.probe = Some(ProbeConfig {
            address: "example.com:443".into(),
            interval_ms: 1000,
            timeout_ms: 500,
        });
        assert!(validate_config(&config).is_ok());

        config.connectivity.probe = Some(ProbeConfig {
            address: "no-port".into(),
            interval_ms: 1000,
            timeout_ms: 0,
        });
        let errors = validate_config(&config).unwrap_err();
        assert!(errors.contains(&ValidationError::InvalidProbeAddress("no-port".into())));
        assert!(errors.contains(&ValidationError::ZeroProbeDuration("timeout_ms")));
    }
}
