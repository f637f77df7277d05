//! Link state machine and status events

use std::fmt;

use offgrid_core::PeripheralIdentity;

use crate::error::BleTransportError;

// ----------------------------------------------------------------------------
// Link State
// ----------------------------------------------------------------------------

/// Lifecycle of the single link owned by the connection manager.
///
/// ```text
/// Idle -> Scanning -> Connecting -> ServiceDiscovery -> Ready
///   \________________/                              \-> ReadyWithoutIo
/// any state -> Disconnected -> Idle
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum LinkState {
    Idle,
    Scanning,
    Connecting,
    ServiceDiscovery,
    Ready,
    /// Connected, but the expected service or characteristics are missing
    ReadyWithoutIo,
    Disconnected,
}

impl LinkState {
    /// Whether the state machine allows moving from `self` to `next`
    pub fn can_transition_to(self, next: LinkState) -> bool {
        use LinkState::*;

        match (self, next) {
            (_, Disconnected) => self != Disconnected,
            (Idle, Scanning) | (Idle, Connecting) => true,
            (Scanning, Connecting) => true,
            (Connecting, ServiceDiscovery) => true,
            (ServiceDiscovery, Ready) | (ServiceDiscovery, ReadyWithoutIo) => true,
            (Disconnected, Idle) => true,
            _ => false,
        }
    }

    /// An attempt is pending or a link is established
    pub fn is_active(self) -> bool {
        !matches!(self, LinkState::Idle | LinkState::Disconnected)
    }
}

impl fmt::Display for LinkState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            LinkState::Idle => "idle",
            LinkState::Scanning => "scanning",
            LinkState::Connecting => "connecting",
            LinkState::ServiceDiscovery => "discovering services",
            LinkState::Ready => "ready",
            LinkState::ReadyWithoutIo => "ready (no I/O)",
            LinkState::Disconnected => "disconnected",
        };
        f.write_str(label)
    }
}

// ----------------------------------------------------------------------------
// Status Events
// ----------------------------------------------------------------------------

/// Events published on the connection manager's status stream
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LinkStatus {
    /// The link moved to a new state
    State(LinkState),
    /// Discovery picked this peripheral
    Matched(PeripheralIdentity),
    /// A named failure; the caller decides whether to retry
    Failed(BleTransportError),
}
