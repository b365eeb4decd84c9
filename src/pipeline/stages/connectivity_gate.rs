//! Connectivity gate.
//!
//! Outermost standard stage. Checks the monitor before every attempt, so a
//! link that drops between retries stops the request with `Offline`.

use std::sync::Arc;
use std::time::Duration;

use futures_util::future::BoxFuture;

use crate::config::{ConnectivityConfig, OfflinePolicyKind};
use crate::connectivity::ConnectivityMonitor;
use crate::error::NetworkError;
use crate::pipeline::stage::{Next, Outcome, PipelineRequest, Stage};

/// What to do when the host is offline.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OfflinePolicy {
    /// Fail with `Offline` immediately.
    FailFast,
    /// Suspend until connected, failing with `Offline` after the timeout.
    Wait(Duration),
}

impl OfflinePolicy {
    pub fn from_config(config: &ConnectivityConfig) -> Self {
        match config.offline_policy {
            OfflinePolicyKind::FailFast => OfflinePolicy::FailFast,
            OfflinePolicyKind::Wait => OfflinePolicy::Wait(config.wait_timeout()),
        }
    }
}

pub struct ConnectivityGate {
    monitor: Arc<ConnectivityMonitor>,
    policy: OfflinePolicy,
}

impl ConnectivityGate {
    pub fn new(monitor: Arc<ConnectivityMonitor>, policy: OfflinePolicy) -> Self {
        Self { monitor, policy }
    }
}

impl Stage for ConnectivityGate {
    fn name(&self) -> &'static str {
        "connectivity_gate"
    }

    fn process<'a>(&'a self, request: PipelineRequest, next: Next<'a>) -> BoxFuture<'a, Outcome> {
        Box::pin(async move {
            if self.monitor.is_connected() {
                return next.run(request).await;
            }

            match self.policy {
                OfflinePolicy::FailFast => {
                    tracing::debug!(request_id = %request.id(), "Offline, failing fast");
                    Err(NetworkError::Offline.into())
                }
                OfflinePolicy::Wait(limit) => {
                    tracing::debug!(
                        request_id = %request.id(),
                        timeout_ms = limit.as_millis() as u64,
                        "Offline, waiting for connection"
                    );
                    let waited = tokio::select! {
                        biased;
                        _ = request.cancel.cancelled() => return Err(NetworkError::Cancelled.into()),
                        waited = self.monitor.wait_for_connection(limit) => waited,
                    };
                    match waited {
                        Ok(()) => next.run(request).await,
                        Err(_) => {
                            tracing::warn!(request_id = %request.id(), "No connection within wait timeout");
                            Err(NetworkError::Offline.into())
                        }
                    }
                }
            }
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::connectivity::{ConnectivityStatus, InterfaceKind};
    use crate::pipeline::stage::StageError;
    use crate::pipeline::RequestPipeline;
    use crate::transport::{RequestDescriptor, ResponseDescriptor, Transport, TransportError};
    use std::sync::atomic::{AtomicU32, Ordering};

    struct Counting(AtomicU32);

    impl Transport for Counting {
        fn execute<'a>(
            &'a self,
            _request: &'a RequestDescriptor,
        ) -> BoxFuture<'a, Result<ResponseDescriptor, TransportError>> {
            self.0.fetch_add(1, Ordering::SeqCst);
            Box::pin(async { Ok(ResponseDescriptor::new(200, "ok")) })
        }
    }

    fn pipeline(monitor: Arc<ConnectivityMonitor>, policy: OfflinePolicy) -> (RequestPipeline, Arc<Counting>) {
        let transport = Arc::new(Counting(AtomicU32::new(0)));
        let pipeline = RequestPipeline::builder(transport.clone())
            .stage(ConnectivityGate::new(monitor, policy))
            .build();
        (pipeline, transport)
    }

    #[tokio::test]
    async fn test_passes_through_when_connected() {
        let monitor = Arc::new(ConnectivityMonitor::new());
        let (pipeline, transport) = pipeline(monitor, OfflinePolicy::FailFast);
        let result = pipeline.execute(PipelineRequest::new(RequestDescriptor::get("/"))).await;
        assert!(result.is_ok());
        assert_eq!(transport.0.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_fail_fast_never_touches_transport() {
        let monitor = Arc::new(ConnectivityMonitor::new());
        monitor.apply(ConnectivityStatus::disconnected());
        let (pipeline, transport) = pipeline(monitor, OfflinePolicy::FailFast);

        let result = pipeline.execute(PipelineRequest::new(RequestDescriptor::get("/"))).await;
        assert_eq!(result, Err(NetworkError::Offline));
        assert_eq!(transport.0.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_wait_policy_resumes_on_reconnect() {
        let monitor = Arc::new(ConnectivityMonitor::new());
        monitor.apply(ConnectivityStatus::disconnected());
        let (pipeline, transport) =
            pipeline(monitor.clone(), OfflinePolicy::Wait(Duration::from_secs(5)));

        let reconnect = {
            let monitor = monitor.clone();
            tokio::spawn(async move {
                tokio::time::sleep(Duration::from_millis(30)).await;
                monitor.apply(ConnectivityStatus::connected(InterfaceKind::Wired));
            })
        };

        let result = pipeline.execute(PipelineRequest::new(RequestDescriptor::get("/"))).await;
        reconnect.await.unwrap();
        assert!(result.is_ok());
        assert_eq!(transport.0.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_wait_policy_gives_up() {
        let monitor = Arc::new(ConnectivityMonitor::new());
        monitor.apply(ConnectivityStatus::disconnected());
        let gate = ConnectivityGate::new(monitor, OfflinePolicy::Wait(Duration::from_millis(20)));
        let transport = Counting(AtomicU32::new(0));
        let stages: Vec<Arc<dyn Stage>> = Vec::new();

        let outcome = gate
            .process(
                PipelineRequest::new(RequestDescriptor::get("/")),
                Next::new(&stages, &transport),
            )
            .await;
        assert_eq!(outcome, Err(StageError::Network(NetworkError::Offline)));
    }

    #[tokio::test]
    async fn test_wait_is_cancellable() {
        let monitor = Arc::new(ConnectivityMonitor::new());
        monitor.apply(ConnectivityStatus::disconnected());
        let (pipeline, _) = pipeline(monitor, OfflinePolicy::Wait(Duration::from_secs(30)));

        let request = PipelineRequest::new(RequestDescriptor::get("/"));
        let token = request.cancel.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(20)).await;
            token.cancel();
        });

        let started = std::time::Instant::now();
        assert_eq!(pipeline.execute(request).await, Err(NetworkError::Cancelled));
        assert!(started.elapsed() < Duration::from_secs(5));
    }
}
