//! Central-role abstraction over the platform BLE stack
//!
//! The connection manager drives a [`Central`] and the [`Link`]s it opens.
//! [`crate::platform`] implements both on top of `btleplug`; tests drive the
//! manager with in-memory implementations.

use std::pin::Pin;

use async_trait::async_trait;
use futures::Stream;
use offgrid_core::{HardwareAddress, PeripheralIdentity};
use uuid::Uuid;

use crate::error::Result;

// ----------------------------------------------------------------------------
// GATT Model
// ----------------------------------------------------------------------------

/// Properties advertised by a characteristic
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CharacteristicProperties {
    pub read: bool,
    pub write: bool,
    pub write_without_response: bool,
    pub notify: bool,
    pub indicate: bool,
}

impl CharacteristicProperties {
    pub fn can_write(&self) -> bool {
        self.write || self.write_without_response
    }

    pub fn can_notify(&self) -> bool {
        self.notify || self.indicate
    }
}

/// A characteristic resolved on a connected peripheral
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GattCharacteristic {
    pub uuid: Uuid,
    pub service_uuid: Uuid,
    pub properties: CharacteristicProperties,
}

/// A primary service and its characteristics
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GattService {
    pub uuid: Uuid,
    pub characteristics: Vec<GattCharacteristic>,
}

/// One value pushed by the peripheral
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Notification {
    pub characteristic: Uuid,
    pub value: Vec<u8>,
}

/// Link-layer write flavour
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WriteMode {
    WithResponse,
    WithoutResponse,
}

pub type DiscoveryStream = Pin<Box<dyn Stream<Item = PeripheralIdentity> + Send>>;
pub type NotificationStream = Pin<Box<dyn Stream<Item = Notification> + Send>>;

// ----------------------------------------------------------------------------
// Traits
// ----------------------------------------------------------------------------

/// The local adapter acting in the central role
#[async_trait]
pub trait Central: Send + Sync + 'static {
    type Link: Link;

    /// Fail with `PermissionDenied` or `AdapterDisabled` when BLE is unusable
    async fn check_ready(&self) -> Result<()>;

    /// Start a discovery scan; the stream yields peripherals as they are seen
    async fn start_scan(&self) -> Result<DiscoveryStream>;

    async fn stop_scan(&self) -> Result<()>;

    /// Peripherals the adapter already knows about (cached or bonded)
    async fn known_peripherals(&self) -> Result<Vec<PeripheralIdentity>>;

    /// Establish a link-layer connection to `address`
    async fn connect(&self, address: HardwareAddress) -> Result<Self::Link>;
}

/// A live link-layer connection to one peripheral
#[async_trait]
pub trait Link: Send + Sync + 'static {
    fn address(&self) -> HardwareAddress;

    async fn discover_services(&self) -> Result<Vec<GattService>>;

    /// Enable notifications on `characteristic` by writing its client
    /// configuration descriptor, and stream its values
    async fn subscribe(&self, characteristic: &GattCharacteristic) -> Result<NotificationStream>;

    async fn write(
        &self,
        characteristic: &GattCharacteristic,
        data: &[u8],
        mode: WriteMode,
    ) -> Result<()>;

    /// Resolve once the peripheral has dropped the link
    async fn closed(&self);

    async fn disconnect(&self) -> Result<()>;
}
