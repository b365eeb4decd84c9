//! Active TCP reachability probe.
//!
//! # Responsibilities
//! - Periodically attempt a TCP connect to a known address
//! - Report reachability changes as path observations
//!
//! For hosts without an OS path-change API. Interface kind is unknown to a
//! socket-level probe, so observations always carry `InterfaceKind::Unknown`.

use std::time::Duration;

use tokio::net::TcpStream;
use tokio::sync::{broadcast, mpsc};
use tokio::time;

use crate::config::ProbeConfig;
use crate::connectivity::status::{ConnectivityStatus, InterfaceKind};

pub struct TcpProbe {
    address: String,
    interval: Duration,
    timeout: Duration,
}

impl TcpProbe {
    pub fn new(address: impl Into<String>, interval: Duration, timeout: Duration) -> Self {
        Self {
            address: address.into(),
            interval,
            timeout,
        }
    }

    pub fn from_config(config: &ProbeConfig) -> Self {
        Self::new(
            config.address.clone(),
            Duration::from_millis(config.interval_ms),
            Duration::from_millis(config.timeout_ms),
        )
    }

    /// One probe. True if the connect completed within the timeout.
    pub async fn check(&self) -> bool {
        match time::timeout(self.timeout, TcpStream::connect(&self.address)).await {
            Ok(Ok(_stream)) => true,
            Ok(Err(e)) => {
                tracing::debug!(address = %self.address, error = %e, "Probe failed: connection error");
                false
            }
            Err(_) => {
                tracing::debug!(address = %self.address, "Probe failed: timeout");
                false
            }
        }
    }

    /// Probe until shutdown, sending an observation whenever reachability flips.
    pub async fn run(
        self,
        observations: mpsc::Sender<ConnectivityStatus>,
        mut shutdown: broadcast::Receiver<()>,
    ) {
        tracing::info!(
            address = %self.address,
            interval_ms = self.interval.as_millis() as u64,
            "Connectivity probe starting"
        );

        let mut ticker = time::interval(self.interval);
        let mut last: Option<bool> = None;

        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    let reachable = self.check().await;
                    if last == Some(reachable) {
                        continue;
                    }
                    last = Some(reachable);

                    let status = if reachable {
                        ConnectivityStatus::connected(InterfaceKind::Unknown)
                    } else {
                        ConnectivityStatus::disconnected()
                    };
                    if observations.send(status).await.is_err() {
                        tracing::debug!("Connectivity monitor gone, probe exiting");
                        break;
                    }
                }
                _ = shutdown.recv() => {
                    tracing::info!("Connectivity probe received shutdown signal, exiting loop");
                    break;
                }
            }
        }
    }
}
