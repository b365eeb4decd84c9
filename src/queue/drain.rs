//! Drain worker.
//!
//! # Responsibilities
//! - Listen for connectivity transitions
//! - On each reconnect, take the whole queue and run it through the pipeline
//! - Re-enqueue failed entries with budget left, finalize the rest
//!
//! # Design Decisions
//! - One drain per reconnect: the snapshot is taken atomically, so an entry
//!   that fails and comes back waits for the next reconnect
//! - Entry N+1 starts only once entry N has reached the transport (or
//!   finished without reaching it), then after the stagger; attempts then run
//!   concurrently
//! - A lagged transition stream, or an explicit drain request, falls back to
//!   the monitor's current state

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::broadcast::{self, error::RecvError};
use tokio::sync::Notify;
use tokio::task::JoinSet;

use crate::connectivity::{ConnectivityMonitor, Transition};
use crate::error::NetworkError;
use crate::observability::metrics;
use crate::pipeline::{PipelineRequest, RequestPipeline};
use crate::queue::pending::{PendingRequest, PendingRequestQueue, QueueError};

#[derive(Clone)]
pub struct QueueDrainer {
    queue: Arc<PendingRequestQueue>,
    pipeline: Arc<RequestPipeline>,
    monitor: Arc<ConnectivityMonitor>,
    stagger: Duration,
}

impl QueueDrainer {
    pub fn new(
        queue: Arc<PendingRequestQueue>,
        pipeline: Arc<RequestPipeline>,
        monitor: Arc<ConnectivityMonitor>,
        stagger: Duration,
    ) -> Self {
        Self {
            queue,
            pipeline,
            monitor,
            stagger,
        }
    }

    /// Drain on every reconnect until shutdown.
    pub async fn run(
        self,
        mut transitions: broadcast::Receiver<Transition>,
        mut shutdown: broadcast::Receiver<()>,
    ) {
        tracing::info!(stagger_ms = self.stagger.as_millis() as u64, "Drain worker starting");

        loop {
            tokio::select! {
                _ = shutdown.recv() => {
                    tracing::info!("Drain worker received shutdown signal, exiting loop");
                    break;
                }
                received = transitions.recv() => match received {
                    Ok(transition) if transition.is_reconnect() => {
                        self.drain_once().await;
                    }
                    Ok(_) => {}
                    Err(RecvError::Lagged(skipped)) => {
                        tracing::warn!(skipped, "Drain worker lagged behind connectivity transitions");
                        if self.monitor.is_connected() && !self.queue.is_empty() {
                            self.drain_once().await;
                        }
                    }
                    Err(RecvError::Closed) => break,
                },
                _ = self.queue.drain_requested() => {
                    if self.monitor.is_connected() && !self.queue.is_empty() {
                        tracing::debug!("Drain requested while connected");
                        self.drain_once().await;
                    }
                }
            }
        }
    }

    /// Run one drain cycle. Returns how many entries were taken.
    pub async fn drain_once(&self) -> usize {
        let items = self.queue.take_all();
        let count = items.len();
        if count == 0 {
            return 0;
        }

        tracing::info!(count, "Draining pending requests");
        metrics::record_drain(count);

        let mut tasks = JoinSet::new();
        let mut items = items.into_iter();
        let mut started = 0usize;

        while let Some(item) = items.next() {
            if started > 0 && !self.stagger.is_zero() {
                tokio::select! {
                    biased;
                    _ = self.queue.closed() => {}
                    _ = tokio::time::sleep(self.stagger) => {}
                }
            }
            if self.queue.is_closed() {
                self.abandon(item);
                items.by_ref().for_each(|item| self.abandon(item));
                break;
            }

            let dispatched = Arc::new(Notify::new());
            let drainer = self.clone();
            let release = ReleaseOnDrop(dispatched.clone());
            tasks.spawn(async move {
                let release = release;
                drainer.run_item(item, release.0.clone()).await;
            });
            started += 1;

            tokio::select! {
                biased;
                _ = self.queue.closed() => {}
                _ = dispatched.notified() => {}
            }
        }

        while let Some(joined) = tasks.join_next().await {
            if let Err(e) = joined {
                tracing::error!(error = %e, "Drain task failed");
            }
        }

        tracing::info!(count, remaining = self.queue.len(), "Drain cycle finished");
        count
    }

    async fn run_item(&self, mut item: PendingRequest, dispatched: Arc<Notify>) {
        let id = item.id;
        let request = PipelineRequest::with_cancel(item.descriptor.clone(), item.cancel_token().clone())
            .notify_on_dispatch(dispatched);

        match self.pipeline.execute(request).await {
            Ok(response) => {
                tracing::info!(request_id = %id, status = response.status, "Pending request succeeded");
                self.queue.finish(id);
                item.complete(Ok(response));
            }
            Err(NetworkError::Cancelled) => {
                self.queue.finish(id);
                item.complete(Err(NetworkError::Cancelled));
            }
            Err(error) if item.is_exhausted() => {
                tracing::warn!(
                    request_id = %id,
                    retry_count = item.retry_count,
                    error = %error,
                    "Pending request exhausted its retries"
                );
                self.queue.finish(id);
                item.complete(Err(error));
            }
            Err(error) => {
                item.retry_count += 1;
                tracing::info!(
                    request_id = %id,
                    retry_count = item.retry_count,
                    error = %error,
                    "Pending request failed, re-enqueued"
                );
                if let Err((reason, item)) = self.queue.requeue(item) {
                    tracing::debug!(request_id = %id, reason = %reason, "Re-enqueue rejected");
                    let result = match reason {
                        QueueError::Cancelled(_) | QueueError::Closed => NetworkError::Cancelled,
                        QueueError::Full | QueueError::Duplicate(_) => error,
                    };
                    item.complete(Err(result));
                }
            }
        }
    }

    fn abandon(&self, item: PendingRequest) {
        self.queue.finish(item.id);
        item.complete(Err(NetworkError::Cancelled));
    }
}

/// Wakes the drain loop when an entry's task ends, whether or not the entry
/// reached the transport.
struct ReleaseOnDrop(Arc<Notify>);

impl Drop for ReleaseOnDrop {
    fn drop(&mut self) {
        self.0.notify_one();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::connectivity::{ConnectivityStatus, InterfaceKind};
    use crate::pipeline::{ConnectivityGate, ErrorMappingStage, OfflinePolicy};
    use crate::queue::pending::{Completion, Priority};
    use crate::transport::{RequestDescriptor, ResponseDescriptor, Transport, TransportError};
    use futures_util::future::BoxFuture;
    use std::sync::Mutex;

    /// Answers every request with `status`, recording paths in call order.
    struct Recorder {
        status: Mutex<u16>,
        paths: Mutex<Vec<String>>,
    }

    impl Recorder {
        fn new(status: u16) -> Arc<Self> {
            Arc::new(Self {
                status: Mutex::new(status),
                paths: Mutex::new(Vec::new()),
            })
        }

        fn paths(&self) -> Vec<String> {
            self.paths.lock().unwrap().clone()
        }
    }

    impl Transport for Recorder {
        fn execute<'a>(
            &'a self,
            request: &'a RequestDescriptor,
        ) -> BoxFuture<'a, Result<ResponseDescriptor, TransportError>> {
            self.paths.lock().unwrap().push(request.path.clone());
            let status = *self.status.lock().unwrap();
            Box::pin(async move { Ok(ResponseDescriptor::new(status, "")) })
        }
    }

    type Results = Arc<Mutex<Vec<(String, Result<ResponseDescriptor, NetworkError>)>>>;

    fn recording(results: &Results, path: &str) -> Completion {
        let results = results.clone();
        let path = path.to_string();
        Completion::new(move |outcome| results.lock().unwrap().push((path, outcome)))
    }

    fn drainer(transport: Arc<Recorder>) -> (QueueDrainer, Arc<PendingRequestQueue>) {
        staggered(transport, Duration::from_millis(10))
    }

    fn staggered(transport: Arc<Recorder>, stagger: Duration) -> (QueueDrainer, Arc<PendingRequestQueue>) {
        let queue = Arc::new(PendingRequestQueue::new());
        let pipeline = Arc::new(RequestPipeline::builder(transport).stage(ErrorMappingStage).build());
        let drainer = QueueDrainer::new(queue.clone(), pipeline, Arc::new(ConnectivityMonitor::new()), stagger);
        (drainer, queue)
    }

    #[tokio::test]
    async fn test_drains_in_priority_order() {
        let transport = Recorder::new(200);
        let (drainer, queue) = drainer(transport.clone());
        let results: Results = Arc::default();

        for (path, priority) in [
            ("n1", Priority::Normal),
            ("c1", Priority::Critical),
            ("c2", Priority::Critical),
            ("l1", Priority::Low),
            ("n2", Priority::Normal),
        ] {
            queue
                .enqueue(RequestDescriptor::get(path), priority, 3, recording(&results, path))
                .unwrap();
        }

        assert_eq!(drainer.drain_once().await, 5);
        assert_eq!(transport.paths(), vec!["c1", "c2", "n1", "n2", "l1"]);
        assert!(queue.is_empty());

        let results = results.lock().unwrap();
        assert_eq!(results.len(), 5);
        assert!(results.iter().all(|(_, outcome)| outcome.is_ok()));
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_zero_stagger_keeps_priority_order_across_threads() {
        for _ in 0..10 {
            let transport = Recorder::new(200);
            let (drainer, queue) = staggered(transport.clone(), Duration::ZERO);

            let mut expected_critical = Vec::new();
            let mut expected_low = Vec::new();
            for i in 0..20 {
                let low = format!("l{i}");
                let critical = format!("c{i}");
                queue
                    .enqueue(RequestDescriptor::get(low.clone()), Priority::Low, 0, Completion::noop())
                    .unwrap();
                queue
                    .enqueue(RequestDescriptor::get(critical.clone()), Priority::Critical, 0, Completion::noop())
                    .unwrap();
                expected_low.push(low);
                expected_critical.push(critical);
            }

            assert_eq!(drainer.drain_once().await, 40);
            let expected: Vec<String> = expected_critical.into_iter().chain(expected_low).collect();
            assert_eq!(transport.paths(), expected);
        }
    }

    #[tokio::test]
    async fn test_item_that_never_reaches_transport_releases_the_next() {
        let transport = Recorder::new(200);
        let queue = Arc::new(PendingRequestQueue::new());
        let monitor = Arc::new(ConnectivityMonitor::new());
        monitor.apply(ConnectivityStatus::disconnected());
        let pipeline = Arc::new(
            RequestPipeline::builder(transport.clone())
                .stage(ConnectivityGate::new(monitor.clone(), OfflinePolicy::FailFast))
                .stage(ErrorMappingStage)
                .build(),
        );
        let drainer = QueueDrainer::new(queue.clone(), pipeline, monitor, Duration::ZERO);
        for path in ["a", "b"] {
            queue
                .enqueue(RequestDescriptor::get(path), Priority::Normal, 0, Completion::noop())
                .unwrap();
        }

        let drained = tokio::time::timeout(Duration::from_secs(2), drainer.drain_once()).await;
        assert_eq!(drained, Ok(2));
        assert!(transport.paths().is_empty());
    }

    #[tokio::test]
    async fn test_drain_request_while_connected() {
        let transport = Recorder::new(200);
        let queue = Arc::new(PendingRequestQueue::new());
        let monitor = Arc::new(ConnectivityMonitor::new());
        let pipeline = Arc::new(RequestPipeline::builder(transport.clone()).stage(ErrorMappingStage).build());
        let drainer = QueueDrainer::new(queue.clone(), pipeline, monitor.clone(), Duration::ZERO);
        let (shutdown_tx, shutdown_rx) = broadcast::channel(1);
        let worker = tokio::spawn(drainer.run(monitor.transitions(), shutdown_rx));

        // The reconnect drains an empty queue; the entry arrives just after.
        monitor.apply(ConnectivityStatus::disconnected());
        monitor.apply(ConnectivityStatus::connected(InterfaceKind::Wifi));
        tokio::time::sleep(Duration::from_millis(50)).await;
        queue
            .enqueue(RequestDescriptor::get("late"), Priority::Normal, 0, Completion::noop())
            .unwrap();
        tokio::time::sleep(Duration::from_millis(50)).await;
        assert_eq!(queue.len(), 1);

        queue.request_drain();
        for _ in 0..100 {
            if !transport.paths().is_empty() {
                break;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        assert_eq!(transport.paths(), vec!["late"]);
        assert!(queue.is_empty());

        shutdown_tx.send(()).unwrap();
        worker.await.unwrap();
    }

    #[tokio::test]
    async fn test_failure_requeues_then_finalizes() {
        let transport = Recorder::new(500);
        let (drainer, queue) = drainer(transport.clone());
        let results: Results = Arc::default();
        let id = queue
            .enqueue(RequestDescriptor::get("flaky"), Priority::Normal, 2, recording(&results, "flaky"))
            .unwrap();

        drainer.drain_once().await;
        assert_eq!(queue.snapshot()[0].retry_count, 1);
        drainer.drain_once().await;
        assert_eq!(queue.snapshot()[0].retry_count, 2);
        assert!(results.lock().unwrap().is_empty());

        drainer.drain_once().await;
        assert!(!queue.contains(id));
        assert_eq!(transport.paths().len(), 3);
        assert_eq!(
            results.lock().unwrap().as_slice(),
            &[("flaky".to_string(), Err(NetworkError::ServerError(500)))]
        );
    }

    #[tokio::test]
    async fn test_zero_budget_finalizes_after_one_drain() {
        let transport = Recorder::new(503);
        let (drainer, queue) = drainer(transport.clone());
        let results: Results = Arc::default();
        queue
            .enqueue(RequestDescriptor::get("once"), Priority::High, 0, recording(&results, "once"))
            .unwrap();

        drainer.drain_once().await;
        assert!(queue.is_empty());
        assert_eq!(results.lock().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_reconnect_triggers_exactly_one_drain() {
        let transport = Recorder::new(200);
        let queue = Arc::new(PendingRequestQueue::new());
        let monitor = Arc::new(ConnectivityMonitor::new());
        let pipeline = Arc::new(RequestPipeline::builder(transport.clone()).stage(ErrorMappingStage).build());
        let drainer = QueueDrainer::new(queue.clone(), pipeline, monitor.clone(), Duration::ZERO);
        let (shutdown_tx, shutdown_rx) = broadcast::channel(1);
        let worker = tokio::spawn(drainer.run(monitor.transitions(), shutdown_rx));

        monitor.apply(ConnectivityStatus::disconnected());
        queue
            .enqueue(RequestDescriptor::get("a"), Priority::Normal, 3, Completion::noop())
            .unwrap();

        monitor.apply(ConnectivityStatus::connected(InterfaceKind::Wifi));
        // Lateral change: stays connected, must not drain again.
        monitor.apply(ConnectivityStatus::connected(InterfaceKind::Cellular));
        tokio::time::sleep(Duration::from_millis(100)).await;
        assert_eq!(transport.paths(), vec!["a"]);

        queue
            .enqueue(RequestDescriptor::get("b"), Priority::Normal, 3, Completion::noop())
            .unwrap();
        monitor.apply(ConnectivityStatus::connected(InterfaceKind::Wired));
        tokio::time::sleep(Duration::from_millis(100)).await;
        assert_eq!(transport.paths(), vec!["a"]);
        assert_eq!(queue.len(), 1);

        shutdown_tx.send(()).unwrap();
        worker.await.unwrap();
    }

    #[tokio::test]
    async fn test_close_abandons_unstarted_items() {
        let transport = Recorder::new(200);
        let queue = Arc::new(PendingRequestQueue::new());
        let pipeline = Arc::new(RequestPipeline::builder(transport.clone()).build());
        let drainer = QueueDrainer::new(
            queue.clone(),
            pipeline,
            Arc::new(ConnectivityMonitor::new()),
            Duration::from_secs(10),
        );
        let results: Results = Arc::default();
        for path in ["first", "second", "third"] {
            queue
                .enqueue(RequestDescriptor::get(path), Priority::Normal, 3, recording(&results, path))
                .unwrap();
        }

        let closer = {
            let queue = queue.clone();
            tokio::spawn(async move {
                tokio::time::sleep(Duration::from_millis(50)).await;
                queue.close();
            })
        };
        drainer.drain_once().await;
        closer.await.unwrap();

        assert_eq!(transport.paths(), vec!["first"]);
        let results = results.lock().unwrap();
        assert_eq!(results.len(), 3);
        assert!(results[0].1.is_ok());
        assert_eq!(results[1].1, Err(NetworkError::Cancelled));
        assert_eq!(results[2].1, Err(NetworkError::Cancelled));
    }
}
