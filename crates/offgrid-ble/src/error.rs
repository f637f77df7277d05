//! Error types for the BLE link

use offgrid_core::{FrameError, HardwareAddress};
use thiserror::Error;
use uuid::Uuid;

// ----------------------------------------------------------------------------
// Error Types
// ----------------------------------------------------------------------------

/// Errors reported by the BLE link.
///
/// All of them are recoverable: link and discovery failures are delivered
/// on the status stream, write failures are returned to the caller. The
/// type is `Clone` so a single failure can fan out to every status
/// subscriber.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum BleTransportError {
    #[error("Bluetooth permission denied")]
    PermissionDenied,

    #[error("Bluetooth adapter is disabled")]
    AdapterDisabled,

    #[error("BLE adapter not available: {0}")]
    AdapterNotAvailable(String),

    #[error("Discovery scan failed: {0}")]
    ScanFailed(String),

    #[error("No matching peripheral found before the discovery timeout")]
    ScanTimeout,

    #[error("Failed to connect to {address}: {reason}")]
    ConnectFailed { address: String, reason: String },

    #[error("Service not found: {service}")]
    ServiceNotFound { service: Uuid },

    #[error("Characteristic not found: {characteristic} ({reason})")]
    CharacteristicNotFound { characteristic: Uuid, reason: String },

    #[error("Failed to enable notifications: {0}")]
    SubscriptionFailed(String),

    #[error("Write rejected: {0}")]
    WriteRejected(String),

    #[error("Link to peripheral lost")]
    LinkLost,

    #[error("No connection established")]
    NotConnected,

    #[error("Frame error: {0}")]
    Frame(#[from] FrameError),
}

impl BleTransportError {
    pub fn connect_failed(address: HardwareAddress, reason: impl Into<String>) -> Self {
        BleTransportError::ConnectFailed {
            address: address.to_string(),
            reason: reason.into(),
        }
    }

    pub fn characteristic_not_found(characteristic: Uuid, reason: impl Into<String>) -> Self {
        BleTransportError::CharacteristicNotFound {
            characteristic,
            reason: reason.into(),
        }
    }

    /// Conditions that stop a connection attempt before a link exists
    pub fn is_discovery_failure(&self) -> bool {
        matches!(
            self,
            BleTransportError::PermissionDenied
                | BleTransportError::AdapterDisabled
                | BleTransportError::AdapterNotAvailable(_)
                | BleTransportError::ScanFailed(_)
                | BleTransportError::ScanTimeout
        )
    }
}

pub type Result<T> = core::result::Result<T, BleTransportError>;
