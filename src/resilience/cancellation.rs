//! Per-request cancellation.
//!
//! Every request that can still reach a terminal state owns a
//! [`CancellationToken`] in the registry. Suspension points (connectivity wait,
//! backoff sleep, drain stagger, the transport call itself) select on it.
//! Entries are removed on completion, so cancelling a finished id finds
//! nothing and is a no-op.

use dashmap::DashMap;
use tokio_util::sync::CancellationToken;

use crate::transport::RequestId;

#[derive(Debug, Default)]
pub struct CancellationRegistry {
    tokens: DashMap<RequestId, CancellationToken>,
}

impl CancellationRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Token for `id`, created on first use.
    pub fn register(&self, id: RequestId) -> CancellationToken {
        self.tokens.entry(id).or_default().clone()
    }

    /// Cancel `id` if it is still live. Returns false for unknown or finished ids.
    pub fn cancel(&self, id: RequestId) -> bool {
        let token = self.tokens.get(&id).map(|entry| entry.value().clone());
        match token {
            Some(token) => {
                token.cancel();
                tracing::debug!(request_id = %id, "Request cancelled");
                true
            }
            None => false,
        }
    }

    /// Forget `id` once it reached a terminal state.
    pub fn complete(&self, id: RequestId) {
        self.tokens.remove(&id);
    }

    pub fn is_cancelled(&self, id: RequestId) -> bool {
        self.tokens
            .get(&id)
            .map(|entry| entry.value().is_cancelled())
            .unwrap_or(false)
    }

    /// Cancel everything still live (used on shutdown).
    pub fn cancel_all(&self) {
        let tokens: Vec<CancellationToken> =
            self.tokens.iter().map(|entry| entry.value().clone()).collect();
        for token in tokens {
            token.cancel();
        }
    }

    /// Number of requests that have not reached a terminal state.
    pub fn live_count(&self) -> usize {
        self.tokens.len()
    }
}
