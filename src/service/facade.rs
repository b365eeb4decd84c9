//! Network-aware request façade.
//!
//! # Responsibilities
//! - Short-circuit requests while offline and queue them for reconnect
//! - Run online requests through the pipeline and report their state
//! - Cancel by id, whether in flight or queued
//! - Re-issue endpoint batches by retry scope
//! - Own the background tasks and shut them down
//!
//! # Design Decisions
//! - The offline check is a snapshot read, so an offline caller never waits
//!   on a transport timeout
//! - Only pre-flight offline detections are queued; a request that fails
//!   inside the pipeline is terminal for the caller
//! - Endpoint bookkeeping is keyed by a caller-chosen name, not by request id,
//!   because every re-issue gets a fresh id

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Instant;

use dashmap::DashMap;
use futures_util::future::join_all;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

use crate::config::NetawareConfig;
use crate::connectivity::{ConnectivityMonitor, ConnectivityStatus, TcpProbe};
use crate::error::{ErrorKind, NetworkError};
use crate::lifecycle::Shutdown;
use crate::observability::metrics;
use crate::pipeline::{CredentialProvider, PipelineRequest, RequestPipeline};
use crate::queue::{Completion, PendingRequestQueue, PendingSummary, Priority, QueueDrainer};
use crate::resilience::CancellationRegistry;
use crate::service::state::{RequestEvent, RequestState, StateSink};
use crate::transport::{RequestDescriptor, RequestId, ResponseDescriptor, Transport};

/// Which recorded endpoints a batch retry re-issues.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RetryScope {
    /// Only endpoints whose last state was a failure.
    FailedOnly,
    /// Every recorded endpoint.
    All,
}

#[derive(Debug, Clone)]
struct EndpointRecord {
    descriptor: RequestDescriptor,
    state: RequestState,
}

pub struct NetworkAwareService {
    config: NetawareConfig,
    monitor: Arc<ConnectivityMonitor>,
    pipeline: Arc<RequestPipeline>,
    queue: Arc<PendingRequestQueue>,
    cancellations: CancellationRegistry,
    endpoints: Arc<DashMap<String, EndpointRecord>>,
    shutdown: Shutdown,
    started: AtomicBool,
    tasks: Mutex<Vec<JoinHandle<()>>>,
}

impl NetworkAwareService {
    /// Build a service with the standard five-stage pipeline.
    pub fn new(
        config: NetawareConfig,
        monitor: Arc<ConnectivityMonitor>,
        transport: Arc<dyn Transport>,
        credentials: Arc<dyn CredentialProvider>,
    ) -> Self {
        let pipeline = RequestPipeline::standard(&config, monitor.clone(), credentials, transport);
        Self::with_pipeline(config, monitor, pipeline)
    }

    /// Build a service around a custom pipeline.
    pub fn with_pipeline(
        config: NetawareConfig,
        monitor: Arc<ConnectivityMonitor>,
        pipeline: RequestPipeline,
    ) -> Self {
        let queue = Arc::new(PendingRequestQueue::with_capacity(config.queue.capacity));
        Self {
            config,
            monitor,
            pipeline: Arc::new(pipeline),
            queue,
            cancellations: CancellationRegistry::new(),
            endpoints: Arc::new(DashMap::new()),
            shutdown: Shutdown::new(),
            started: AtomicBool::new(false),
            tasks: Mutex::new(Vec::new()),
        }
    }

    /// Spawn the drain worker, and the TCP probe if one is configured.
    /// Must run inside a tokio runtime. Later calls do nothing.
    pub fn start(&self) {
        if self.started.swap(true, Ordering::SeqCst) {
            return;
        }

        let drainer = QueueDrainer::new(
            self.queue.clone(),
            self.pipeline.clone(),
            self.monitor.clone(),
            self.config.queue.drain_stagger(),
        );
        let drain_task = tokio::spawn(drainer.run(self.monitor.transitions(), self.shutdown.subscribe()));
        self.track(drain_task);

        if let Some(probe_config) = &self.config.connectivity.probe {
            let (tx, rx) = mpsc::channel(16);
            self.attach_path_source(rx);
            let probe = TcpProbe::from_config(probe_config);
            let probe_task = tokio::spawn(probe.run(tx, self.shutdown.subscribe()));
            self.track(probe_task);
        }

        tracing::info!(
            stages = ?self.pipeline.stage_names(),
            probe = self.config.connectivity.probe.is_some(),
            "Network-aware service started"
        );
    }

    /// Feed path observations from a host-provided source into the monitor.
    pub fn attach_path_source(&self, observations: mpsc::Receiver<ConnectivityStatus>) {
        let writer = self.monitor.spawn_writer(observations, self.shutdown.subscribe());
        self.track(writer);
    }

    pub fn monitor(&self) -> &Arc<ConnectivityMonitor> {
        &self.monitor
    }

    /// Issue a request at normal priority.
    pub async fn request(&self, descriptor: RequestDescriptor, sink: impl StateSink + 'static) -> RequestState {
        self.request_with(descriptor, Priority::Normal, sink).await
    }

    /// Issue a request. `priority` orders it in the pending queue if it has to
    /// wait for a reconnect.
    pub async fn request_with(
        &self,
        descriptor: RequestDescriptor,
        priority: Priority,
        sink: impl StateSink + 'static,
    ) -> RequestState {
        self.dispatch(descriptor, priority, Arc::new(sink), None).await
    }

    /// Issue a request and record its outcome under `key` for batch retries.
    pub async fn request_endpoint(
        &self,
        key: impl Into<String>,
        descriptor: RequestDescriptor,
        sink: impl StateSink + 'static,
    ) -> RequestState {
        self.dispatch(descriptor, Priority::Normal, Arc::new(sink), Some(key.into()))
            .await
    }

    /// Re-issue recorded endpoints, each under a fresh request id.
    ///
    /// Endpoints whose current request is still pending are skipped. Returns
    /// the state each re-issued endpoint reached, keyed by endpoint.
    pub async fn retry(&self, scope: RetryScope, sink: impl StateSink + 'static) -> Vec<(String, RequestState)> {
        let targets: Vec<(String, RequestDescriptor)> = self
            .endpoints
            .iter()
            .filter(|entry| match scope {
                RetryScope::FailedOnly => entry.state.is_failed(),
                RetryScope::All => true,
            })
            .filter(|entry| !self.queue.contains(entry.descriptor.id))
            .map(|entry| (entry.key().clone(), entry.descriptor.reissue()))
            .collect();

        tracing::info!(scope = ?scope, count = targets.len(), "Retrying endpoints");

        let sink: Arc<dyn StateSink> = Arc::new(sink);
        let runs = targets.into_iter().map(|(key, descriptor)| {
            let sink = sink.clone();
            async move {
                let state = self
                    .dispatch(descriptor, Priority::Normal, sink, Some(key.clone()))
                    .await;
                (key, state)
            }
        });
        join_all(runs).await
    }

    /// Last recorded state of an endpoint.
    pub fn endpoint_state(&self, key: &str) -> Option<RequestState> {
        self.endpoints.get(key).map(|record| record.state.clone())
    }

    /// Cancel an in-flight or queued request. Idempotent; false when the id is
    /// unknown or already finished.
    pub fn cancel(&self, id: RequestId) -> bool {
        let in_flight = self.cancellations.cancel(id);
        let queued = self.queue.cancel(id);
        if in_flight || queued {
            tracing::info!(request_id = %id, "Request cancelled");
        }
        in_flight || queued
    }

    pub fn pending_count(&self) -> usize {
        self.queue.len()
    }

    pub fn pending_snapshot(&self) -> Vec<PendingSummary> {
        self.queue.snapshot()
    }

    /// Stop background tasks, cancel in-flight requests and finalize queued
    /// ones with `Cancelled`. Later calls do nothing.
    pub async fn shutdown(&self) {
        if !self.shutdown.trigger() {
            return;
        }

        self.cancellations.cancel_all();
        let finalized = self.queue.close();

        let tasks = std::mem::take(&mut *self.tasks.lock().expect("task list mutex poisoned"));
        for task in tasks {
            if let Err(e) = task.await {
                tracing::error!(error = %e, "Background task failed");
            }
        }
        tracing::info!(finalized, "Network-aware service stopped");
    }

    async fn dispatch(
        &self,
        descriptor: RequestDescriptor,
        priority: Priority,
        sink: Arc<dyn StateSink>,
        endpoint: Option<String>,
    ) -> RequestState {
        let id = descriptor.id;
        let started = Instant::now();

        if let Some(key) = &endpoint {
            self.record(key, &descriptor, RequestState::Loading);
        }

        if self.shutdown.is_triggered() {
            return self.finish(id, Err(NetworkError::Cancelled), started, &sink, endpoint.as_deref());
        }

        if !self.monitor.is_connected() {
            return self.defer(descriptor, priority, sink, endpoint, started);
        }

        sink.report(RequestEvent {
            id,
            state: RequestState::Loading,
        });

        let token = self.cancellations.register(id);
        let result = self
            .pipeline
            .execute(PipelineRequest::with_cancel(descriptor, token))
            .await;
        self.cancellations.complete(id);

        self.finish(id, result, started, &sink, endpoint.as_deref())
    }

    /// Queue an offline request for the next reconnect and report it offline.
    ///
    /// A reconnect can land between the caller's offline check and the
    /// enqueue, after the drain worker has already found the queue empty, so
    /// the link is checked again once the entry is in.
    fn defer(
        &self,
        descriptor: RequestDescriptor,
        priority: Priority,
        sink: Arc<dyn StateSink>,
        endpoint: Option<String>,
        started: Instant,
    ) -> RequestState {
        let id = descriptor.id;
        let completion = self.deferred_completion(id, sink.clone(), endpoint.clone());
        let max_retries = self.config.queue.default_max_retries;

        match self.queue.enqueue(descriptor, priority, max_retries, completion) {
            Ok(_) => {
                tracing::info!(request_id = %id, "Offline, request deferred until reconnect");
                if self.monitor.is_connected() {
                    tracing::debug!(request_id = %id, "Reconnected while deferring, requesting drain");
                    self.queue.request_drain();
                }
                self.finish(id, Err(NetworkError::Offline), started, &sink, endpoint.as_deref())
            }
            Err(e) => {
                tracing::warn!(request_id = %id, error = %e, "Could not defer offline request");
                let state = RequestState::Failed {
                    kind: ErrorKind::Offline,
                    message: format!("{}; request not queued: {e}", NetworkError::Offline),
                };
                self.settle(id, state, "offline", started, &sink, endpoint.as_deref())
            }
        }
    }

    /// Report and record a caller-visible outcome.
    fn finish(
        &self,
        id: RequestId,
        result: Result<ResponseDescriptor, NetworkError>,
        started: Instant,
        sink: &Arc<dyn StateSink>,
        endpoint: Option<&str>,
    ) -> RequestState {
        let label = outcome_label(&result);
        self.settle(id, RequestState::from_result(result), label, started, sink, endpoint)
    }

    fn settle(
        &self,
        id: RequestId,
        state: RequestState,
        label: &'static str,
        started: Instant,
        sink: &Arc<dyn StateSink>,
        endpoint: Option<&str>,
    ) -> RequestState {
        metrics::record_request(label, started);
        if let Some(key) = endpoint {
            update_endpoint(&self.endpoints, key, id, &state);
        }
        sink.report(RequestEvent {
            id,
            state: state.clone(),
        });
        state
    }

    /// Completion for a deferred request: reports its final state to the
    /// original sink.
    fn deferred_completion(
        &self,
        id: RequestId,
        sink: Arc<dyn StateSink>,
        endpoint: Option<String>,
    ) -> Completion {
        let endpoints = self.endpoints.clone();
        let enqueued = Instant::now();
        Completion::new(move |result| {
            metrics::record_request(outcome_label(&result), enqueued);
            let state = RequestState::from_result(result);
            if let Some(key) = &endpoint {
                update_endpoint(&endpoints, key, id, &state);
            }
            sink.report(RequestEvent { id, state });
        })
    }

    fn record(&self, key: &str, descriptor: &RequestDescriptor, state: RequestState) {
        self.endpoints.insert(
            key.to_string(),
            EndpointRecord {
                descriptor: descriptor.clone(),
                state,
            },
        );
    }

    fn track(&self, task: JoinHandle<()>) {
        self.tasks
            .lock()
            .expect("task list mutex poisoned")
            .push(task);
    }
}

impl std::fmt::Debug for NetworkAwareService {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("NetworkAwareService")
            .field("monitor", &self.monitor)
            .field("pipeline", &self.pipeline)
            .field("queue", &self.queue)
            .field("endpoints", &self.endpoints.len())
            .finish()
    }
}

/// Record the state of an endpoint's current request. States from a request
/// the endpoint has since moved past are ignored.
fn update_endpoint(
    endpoints: &DashMap<String, EndpointRecord>,
    key: &str,
    id: RequestId,
    state: &RequestState,
) {
    if let Some(mut record) = endpoints.get_mut(key) {
        if record.descriptor.id == id {
            record.state = state.clone();
        }
    }
}

fn outcome_label(result: &Result<ResponseDescriptor, NetworkError>) -> &'static str {
    match result {
        Ok(_) => "success",
        Err(error) => error.kind().as_str(),
    }
}
