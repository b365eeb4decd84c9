//! Connectivity snapshot types.
//!
//! # States
//! - Unknown: initial, before the first observation; reported as connected
//! - Connected: reachable, with interface and quality flags
//! - Disconnected: unreachable; quality fields are meaningless and zeroed
//!
//! # State Transitions
//! ```text
//! Unknown      → Connected | Disconnected   (first observation)
//! Connected    → Disconnected
//! Disconnected → Connected                  (reconnect: drains the pending queue)
//! Connected    → Connected                  (lateral, quality fields only)
//! ```

use serde::{Deserialize, Serialize};

/// Network interface carrying traffic.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum InterfaceKind {
    Wifi,
    Cellular,
    Wired,
    #[default]
    Unknown,
}

/// Point-in-time belief about outbound connectivity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConnectivityStatus {
    pub is_connected: bool,
    pub interface: InterfaceKind,
    /// Metered link (e.g., cellular or a personal hotspot).
    pub is_expensive: bool,
    /// Low-data mode or similar restriction.
    pub is_constrained: bool,
}

impl ConnectivityStatus {
    /// Assumed status before anything has been observed.
    pub fn optimistic() -> Self {
        Self::connected(InterfaceKind::Unknown)
    }

    pub fn connected(interface: InterfaceKind) -> Self {
        Self {
            is_connected: true,
            interface,
            is_expensive: false,
            is_constrained: false,
        }
    }

    pub fn disconnected() -> Self {
        Self {
            is_connected: false,
            interface: InterfaceKind::Unknown,
            is_expensive: false,
            is_constrained: false,
        }
    }

    pub fn with_expensive(mut self, expensive: bool) -> Self {
        self.is_expensive = expensive;
        self
    }

    pub fn with_constrained(mut self, constrained: bool) -> Self {
        self.is_constrained = constrained;
        self
    }

    /// Quality fields only mean something while connected.
    pub(crate) fn normalized(self) -> Self {
        if self.is_connected {
            self
        } else {
            Self::disconnected()
        }
    }

    pub fn link_state(&self) -> LinkState {
        if self.is_connected {
            LinkState::Connected
        } else {
            LinkState::Disconnected
        }
    }
}

impl Default for ConnectivityStatus {
    fn default() -> Self {
        Self::optimistic()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LinkState {
    Unknown,
    Connected,
    Disconnected,
}

impl LinkState {
    pub fn as_str(&self) -> &'static str {
        match self {
            LinkState::Unknown => "unknown",
            LinkState::Connected => "connected",
            LinkState::Disconnected => "disconnected",
        }
    }
}

/// An observed change, delivered to subscribers.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Transition {
    pub from: LinkState,
    pub to: LinkState,
    /// Status after the change.
    pub status: ConnectivityStatus,
}

impl Transition {
    /// The single edge that triggers a queue drain.
    pub fn is_reconnect(&self) -> bool {
        self.from == LinkState::Disconnected && self.to == LinkState::Connected
    }

    pub fn is_lateral(&self) -> bool {
        self.from == self.to
    }
}
