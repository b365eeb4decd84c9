//! Metrics recording.
//!
//! # Metrics
//! - `netaware_requests_total` (counter): finished requests by outcome
//! - `netaware_request_duration_seconds` (histogram): caller-visible latency
//! - `netaware_attempts_total` (counter): transport attempts, retries included
//! - `netaware_retries_total` (counter): backoff sleeps taken
//! - `netaware_pending_requests` (gauge): current queue depth
//! - `netaware_drains_total` (counter): drain cycles
//! - `netaware_drained_requests_total` (counter): requests taken by drain cycles
//! - `netaware_connectivity_transitions_total` (counter): transitions by target state
//!
//! # Design Decisions
//! - Facade only: the host installs a recorder (Prometheus, statsd, ...)
//! - Without a recorder every call is a cheap no-op

use std::time::Instant;

use metrics::{counter, gauge, histogram};

/// Record a finished request.
pub fn record_request(outcome: &'static str, started: Instant) {
    counter!("netaware_requests_total", "outcome" => outcome).increment(1);
    histogram!("netaware_request_duration_seconds", "outcome" => outcome)
        .record(started.elapsed().as_secs_f64());
}

pub fn record_attempt() {
    counter!("netaware_attempts_total").increment(1);
}

pub fn record_retry() {
    counter!("netaware_retries_total").increment(1);
}

pub fn record_pending(depth: usize) {
    gauge!("netaware_pending_requests").set(depth as f64);
}

pub fn record_drain(items: usize) {
    counter!("netaware_drains_total").increment(1);
    counter!("netaware_drained_requests_total").increment(items as u64);
}

pub fn record_transition(to: &'static str) {
    counter!("netaware_connectivity_transitions_total", "to" => to).increment(1);
}
