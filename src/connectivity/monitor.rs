//! Connectivity monitor.
//!
//! # Responsibilities
//! - Hold the single authoritative [`ConnectivityStatus`]
//! - Apply path observations and publish transitions
//! - Let callers wait, with a bound, for the link to come back
//!
//! # Design Decisions
//! - Readers load an `ArcSwap` snapshot and never lock
//! - One writer at a time; observations are serialized by a mutex
//! - Repeated identical observations are collapsed into nothing
//! - Transitions go out both as callbacks and on a broadcast channel

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use arc_swap::ArcSwap;
use dashmap::DashMap;
use tokio::sync::{broadcast, mpsc, watch};
use tokio::task::JoinHandle;

use crate::connectivity::status::{ConnectivityStatus, LinkState, Transition};
use crate::error::NetworkError;
use crate::observability::metrics;

const TRANSITION_CHANNEL_CAPACITY: usize = 64;

type Callback = Arc<dyn Fn(&Transition) + Send + Sync>;

/// Handle returned by [`ConnectivityMonitor::subscribe`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SubscriptionHandle(u64);

#[derive(Debug, Clone, Copy)]
struct Snapshot {
    state: LinkState,
    status: ConnectivityStatus,
}

pub struct ConnectivityMonitor {
    snapshot: ArcSwap<Snapshot>,
    writer: Mutex<()>,
    connected_tx: watch::Sender<bool>,
    transitions_tx: broadcast::Sender<Transition>,
    subscribers: DashMap<u64, Callback>,
    next_subscription: AtomicU64,
}

impl ConnectivityMonitor {
    /// Create a monitor in the optimistic Unknown state.
    pub fn new() -> Self {
        let initial = Snapshot {
            state: LinkState::Unknown,
            status: ConnectivityStatus::optimistic(),
        };
        let (connected_tx, _) = watch::channel(initial.status.is_connected);
        let (transitions_tx, _) = broadcast::channel(TRANSITION_CHANNEL_CAPACITY);

        Self {
            snapshot: ArcSwap::from_pointee(initial),
            writer: Mutex::new(()),
            connected_tx,
            transitions_tx,
            subscribers: DashMap::new(),
            next_subscription: AtomicU64::new(1),
        }
    }

    /// Latest known status. Non-blocking.
    pub fn current_status(&self) -> ConnectivityStatus {
        self.snapshot.load().status
    }

    pub fn link_state(&self) -> LinkState {
        self.snapshot.load().state
    }

    pub fn is_connected(&self) -> bool {
        self.current_status().is_connected
    }

    /// Apply one path observation.
    ///
    /// Returns the transition if the observation changed anything. Callbacks
    /// run on the caller's thread while the writer lock is held, so they must
    /// not call `apply` themselves.
    pub fn apply(&self, observed: ConnectivityStatus) -> Option<Transition> {
        let _writer = self.writer.lock().expect("connectivity writer mutex poisoned");

        let status = observed.normalized();
        let state = status.link_state();
        let previous = **self.snapshot.load();
        if previous.state == state && previous.status == status {
            return None;
        }

        self.snapshot.store(Arc::new(Snapshot { state, status }));
        self.connected_tx.send_replace(status.is_connected);

        let transition = Transition {
            from: previous.state,
            to: state,
            status,
        };

        if transition.is_lateral() {
            tracing::debug!(
                interface = ?status.interface,
                expensive = status.is_expensive,
                constrained = status.is_constrained,
                "Connectivity quality changed"
            );
        } else {
            tracing::info!(
                from = transition.from.as_str(),
                to = transition.to.as_str(),
                interface = ?status.interface,
                "Connectivity changed"
            );
        }
        metrics::record_transition(transition.to.as_str());

        // No receivers is fine: nobody is draining yet.
        let _ = self.transitions_tx.send(transition);

        let callbacks: Vec<Callback> = self
            .subscribers
            .iter()
            .map(|entry| entry.value().clone())
            .collect();
        for callback in callbacks {
            callback(&transition);
        }

        Some(transition)
    }

    /// Deliver every future transition to `on_change`.
    pub fn subscribe<F>(&self, on_change: F) -> SubscriptionHandle
    where
        F: Fn(&Transition) + Send + Sync + 'static,
    {
        let id = self.next_subscription.fetch_add(1, Ordering::Relaxed);
        self.subscribers.insert(id, Arc::new(on_change));
        SubscriptionHandle(id)
    }

    /// Stop delivery. Returns false if the handle was already unsubscribed.
    pub fn unsubscribe(&self, handle: SubscriptionHandle) -> bool {
        self.subscribers.remove(&handle.0).is_some()
    }

    /// Channel view of the same transitions, for async consumers.
    pub fn transitions(&self) -> broadcast::Receiver<Transition> {
        self.transitions_tx.subscribe()
    }

    /// Resolve once connected, or fail with `Timeout` after `timeout`.
    ///
    /// Returns immediately when already connected. Dropping the future cancels
    /// the wait.
    pub async fn wait_for_connection(&self, timeout: Duration) -> Result<(), NetworkError> {
        let mut connected = self.connected_tx.subscribe();
        if *connected.borrow_and_update() {
            return Ok(());
        }

        let waited = tokio::time::timeout(timeout, connected.wait_for(|is_connected| *is_connected))
            .await
            .map(|changed| changed.map(|_| ()));
        match waited {
            Ok(Ok(())) => Ok(()),
            // The sender lives as long as the monitor, so a closed channel
            // only happens mid-teardown.
            Ok(Err(_)) => Err(NetworkError::Offline),
            Err(_) => Err(NetworkError::Timeout),
        }
    }

    /// Spawn the writer task fed by a path source.
    ///
    /// The task exits when the source closes or shutdown fires.
    pub fn spawn_writer(
        self: &Arc<Self>,
        mut observations: mpsc::Receiver<ConnectivityStatus>,
        mut shutdown: broadcast::Receiver<()>,
    ) -> JoinHandle<()> {
        let monitor = Arc::clone(self);
        tokio::spawn(async move {
            loop {
                tokio::select! {
                    observed = observations.recv() => match observed {
                        Some(status) => {
                            monitor.apply(status);
                        }
                        None => {
                            tracing::debug!("Path source closed, connectivity writer exiting");
                            break;
                        }
                    },
                    _ = shutdown.recv() => {
                        tracing::debug!("Connectivity writer received shutdown signal");
                        break;
                    }
                }
            }
        })
    }
}

impl Default for ConnectivityMonitor {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for ConnectivityMonitor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let snapshot = self.snapshot.load();
        f.debug_struct("ConnectivityMonitor")
            .field("state", &snapshot.state)
            .field("status", &snapshot.status)
            .field("subscribers", &self.subscribers.len())
            .finish()
    }
}
