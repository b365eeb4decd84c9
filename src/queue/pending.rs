//! Priority queue of requests deferred while offline.
//!
//! # Responsibilities
//! - Order entries by priority, FIFO within a priority band
//! - Hand the whole queue to a drain cycle in one atomic step
//! - Track drained entries until they finish or come back
//! - Cancel queued or in-drain entries by id
//!
//! # Design Decisions
//! - One mutex over all state: enqueue, drain snapshot and cancel serialize
//! - Entries are keyed by `(Reverse(priority), sequence)` so a `BTreeMap`
//!   iterates in drain order
//! - A re-enqueued entry keeps its id but takes a fresh sequence number, so it
//!   lands behind entries of its band that arrived while it was out
//! - Completions fire outside the lock

use std::cmp::Reverse;
use std::collections::{BTreeMap, HashMap};
use std::fmt;
use std::sync::Mutex;
use std::time::Instant;

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tokio::sync::Notify;
use tokio_util::sync::CancellationToken;

use crate::error::NetworkError;
use crate::observability::metrics;
use crate::transport::{RequestDescriptor, RequestId, ResponseDescriptor};

/// Drain priority. Declaration order is the ordering: `Critical` is highest.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Priority {
    Low,
    #[default]
    Normal,
    High,
    Critical,
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum QueueError {
    #[error("pending queue is full")]
    Full,

    #[error("request {0} is already pending")]
    Duplicate(RequestId),

    #[error("pending queue is closed")]
    Closed,

    #[error("request {0} was cancelled")]
    Cancelled(RequestId),
}

/// Terminal callback of a pending request. Consumed on first use.
pub struct Completion(Box<dyn FnOnce(Result<ResponseDescriptor, NetworkError>) + Send>);

impl Completion {
    pub fn new<F>(f: F) -> Self
    where
        F: FnOnce(Result<ResponseDescriptor, NetworkError>) + Send + 'static,
    {
        Self(Box::new(f))
    }

    pub fn noop() -> Self {
        Self::new(|_| {})
    }

    pub fn fire(self, result: Result<ResponseDescriptor, NetworkError>) {
        (self.0)(result)
    }
}

/// A request waiting for connectivity.
pub struct PendingRequest {
    pub id: RequestId,
    pub descriptor: RequestDescriptor,
    pub priority: Priority,
    /// Drain attempts that have failed so far. Never exceeds `max_retries`.
    pub retry_count: u32,
    pub max_retries: u32,
    pub enqueued_at: Instant,
    cancel: CancellationToken,
    completion: Completion,
}

impl PendingRequest {
    /// Token that fires when this request is cancelled through the queue.
    pub fn cancel_token(&self) -> &CancellationToken {
        &self.cancel
    }

    /// Whether a failed drain attempt ends this request.
    pub fn is_exhausted(&self) -> bool {
        self.retry_count >= self.max_retries
    }

    /// Finalize with `result`.
    pub fn complete(self, result: Result<ResponseDescriptor, NetworkError>) {
        self.completion.fire(result)
    }
}

impl fmt::Debug for PendingRequest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PendingRequest")
            .field("id", &self.id)
            .field("priority", &self.priority)
            .field("retry_count", &self.retry_count)
            .field("max_retries", &self.max_retries)
            .finish_non_exhaustive()
    }
}

/// Inspection view of a queued entry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PendingSummary {
    pub id: RequestId,
    pub priority: Priority,
    pub retry_count: u32,
    pub max_retries: u32,
    pub enqueued_at: Instant,
}

type Key = (Reverse<Priority>, u64);

#[derive(Default)]
struct QueueState {
    entries: BTreeMap<Key, PendingRequest>,
    index: HashMap<RequestId, Key>,
    /// Entries taken by a drain cycle and not yet finished or re-enqueued.
    in_flight: HashMap<RequestId, CancellationToken>,
    next_seq: u64,
}

impl QueueState {
    fn insert(&mut self, item: PendingRequest) -> RequestId {
        let key = (Reverse(item.priority), self.next_seq);
        self.next_seq += 1;
        let id = item.id;
        self.index.insert(id, key);
        self.entries.insert(key, item);
        id
    }
}

/// In-memory pending request queue. Lost on process exit.
pub struct PendingRequestQueue {
    state: Mutex<QueueState>,
    capacity: Option<usize>,
    closed: CancellationToken,
    drain_wanted: Notify,
}

impl PendingRequestQueue {
    pub fn new() -> Self {
        Self::with_capacity(None)
    }

    pub fn with_capacity(capacity: Option<usize>) -> Self {
        Self {
            state: Mutex::new(QueueState::default()),
            capacity,
            closed: CancellationToken::new(),
            drain_wanted: Notify::new(),
        }
    }

    /// Add a request. Its id is the descriptor's id.
    pub fn enqueue(
        &self,
        descriptor: RequestDescriptor,
        priority: Priority,
        max_retries: u32,
        completion: Completion,
    ) -> Result<RequestId, QueueError> {
        let item = PendingRequest {
            id: descriptor.id,
            descriptor,
            priority,
            retry_count: 0,
            max_retries,
            enqueued_at: Instant::now(),
            cancel: CancellationToken::new(),
            completion,
        };

        let mut state = self.state.lock().expect("queue mutex poisoned");
        if self.closed.is_cancelled() {
            return Err(QueueError::Closed);
        }
        if state.index.contains_key(&item.id) || state.in_flight.contains_key(&item.id) {
            return Err(QueueError::Duplicate(item.id));
        }
        if self.is_full(&state) {
            return Err(QueueError::Full);
        }

        let id = state.insert(item);
        metrics::record_pending(state.entries.len());
        tracing::debug!(request_id = %id, priority = ?priority, depth = state.entries.len(), "Request enqueued");
        Ok(id)
    }

    /// Put a drained entry back after a failed attempt.
    ///
    /// Rejected entries are handed back so the caller can finalize them.
    pub fn requeue(&self, item: PendingRequest) -> Result<(), (QueueError, PendingRequest)> {
        let mut state = self.state.lock().expect("queue mutex poisoned");
        state.in_flight.remove(&item.id);

        if item.cancel.is_cancelled() {
            return Err((QueueError::Cancelled(item.id), item));
        }
        if self.closed.is_cancelled() {
            return Err((QueueError::Closed, item));
        }
        if self.is_full(&state) {
            return Err((QueueError::Full, item));
        }

        state.insert(item);
        metrics::record_pending(state.entries.len());
        Ok(())
    }

    /// Remove and return every entry in drain order. Taken entries stay
    /// cancellable until `finish` or `requeue`.
    pub fn take_all(&self) -> Vec<PendingRequest> {
        let mut state = self.state.lock().expect("queue mutex poisoned");
        let entries = std::mem::take(&mut state.entries);
        state.index.clear();

        let items: Vec<PendingRequest> = entries.into_values().collect();
        for item in &items {
            state.in_flight.insert(item.id, item.cancel.clone());
        }
        metrics::record_pending(0);
        items
    }

    /// Forget a drained entry that reached a terminal outcome.
    pub fn finish(&self, id: RequestId) {
        self.state
            .lock()
            .expect("queue mutex poisoned")
            .in_flight
            .remove(&id);
    }

    /// Cancel a queued or in-drain entry. Queued entries are finalized with
    /// `Cancelled` here; in-drain entries are finalized by their drain task.
    /// Returns false if the id is unknown or already finished.
    pub fn cancel(&self, id: RequestId) -> bool {
        let removed = {
            let mut state = self.state.lock().expect("queue mutex poisoned");
            if let Some(token) = state.in_flight.get(&id) {
                token.cancel();
                return true;
            }
            let removed = state.index.remove(&id).and_then(|key| state.entries.remove(&key));
            metrics::record_pending(state.entries.len());
            removed
        };

        match removed {
            Some(item) => {
                tracing::debug!(request_id = %id, "Pending request cancelled");
                item.cancel.cancel();
                item.complete(Err(NetworkError::Cancelled));
                true
            }
            None => false,
        }
    }

    /// Refuse further entries, cancel in-drain entries and finalize queued
    /// ones with `Cancelled`. Returns how many queued entries were finalized.
    pub fn close(&self) -> usize {
        let items = {
            let mut state = self.state.lock().expect("queue mutex poisoned");
            self.closed.cancel();
            for token in state.in_flight.values() {
                token.cancel();
            }
            state.index.clear();
            std::mem::take(&mut state.entries)
        };
        metrics::record_pending(0);

        let count = items.len();
        for item in items.into_values() {
            item.cancel.cancel();
            item.complete(Err(NetworkError::Cancelled));
        }
        count
    }

    pub fn is_closed(&self) -> bool {
        self.closed.is_cancelled()
    }

    /// Resolves once the queue is closed.
    pub async fn closed(&self) {
        self.closed.cancelled().await
    }

    /// Ask the drain worker for a cycle outside of a reconnect. Requests made
    /// before the worker wakes collapse into one.
    pub fn request_drain(&self) {
        self.drain_wanted.notify_one();
    }

    /// Resolves once a drain has been asked for.
    pub async fn drain_requested(&self) {
        self.drain_wanted.notified().await
    }

    /// True while the id is queued or being drained.
    pub fn contains(&self, id: RequestId) -> bool {
        let state = self.state.lock().expect("queue mutex poisoned");
        state.index.contains_key(&id) || state.in_flight.contains_key(&id)
    }

    /// Queued entries, excluding those currently being drained.
    pub fn len(&self) -> usize {
        self.state.lock().expect("queue mutex poisoned").entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Queued entries in drain order.
    pub fn snapshot(&self) -> Vec<PendingSummary> {
        let state = self.state.lock().expect("queue mutex poisoned");
        state
            .entries
            .values()
            .map(|item| PendingSummary {
                id: item.id,
                priority: item.priority,
                retry_count: item.retry_count,
                max_retries: item.max_retries,
                enqueued_at: item.enqueued_at,
            })
            .collect()
    }

    fn is_full(&self, state: &QueueState) -> bool {
        self.capacity
            .is_some_and(|capacity| state.entries.len() >= capacity)
    }
}

impl Default for PendingRequestQueue {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for PendingRequestQueue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PendingRequestQueue")
            .field("len", &self.len())
            .field("capacity", &self.capacity)
            .field("closed", &self.is_closed())
            .finish()
    }
}
