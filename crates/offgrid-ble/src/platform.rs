//! [`Central`] and [`Link`] on top of btleplug

use std::time::Duration;

use async_trait::async_trait;
use btleplug::api::{
    BDAddr, Central as _, CentralEvent, CentralState, CharPropFlags, Characteristic,
    Manager as _, Peripheral as _, ScanFilter, WriteType,
};
use btleplug::platform::{Adapter, Manager, Peripheral, PeripheralId};
use futures::{future, StreamExt};
use offgrid_core::{HardwareAddress, PeripheralIdentity};
use tokio::time::timeout;
use tracing::{debug, info, warn};

use crate::central::{
    Central, CharacteristicProperties, DiscoveryStream, GattCharacteristic, GattService, Link,
    Notification, NotificationStream, WriteMode,
};
use crate::config::BleTransportConfig;
use crate::error::{BleTransportError, Result};
use crate::manager::ConnectionManager;

fn to_bd_addr(address: HardwareAddress) -> BDAddr {
    BDAddr::from(*address.as_bytes())
}

fn from_bd_addr(address: BDAddr) -> HardwareAddress {
    HardwareAddress::new(address.into_inner())
}

fn is_permission_error(error: &btleplug::Error) -> bool {
    matches!(error, btleplug::Error::PermissionDenied)
}

async fn identify(peripheral: &Peripheral) -> Option<PeripheralIdentity> {
    match peripheral.properties().await {
        Ok(Some(properties)) => Some(PeripheralIdentity {
            address: from_bd_addr(properties.address),
            name: properties.local_name,
        }),
        Ok(None) => Some(PeripheralIdentity::new(from_bd_addr(peripheral.address()))),
        Err(e) => {
            debug!("Failed to read peripheral properties: {}", e);
            None
        }
    }
}

// ----------------------------------------------------------------------------
// Central
// ----------------------------------------------------------------------------

/// The first BLE adapter reported by the platform
pub struct BtleplugCentral {
    adapter: Adapter,
    direct_connect_timeout: Duration,
}

impl BtleplugCentral {
    /// Open the first available adapter
    pub async fn new(direct_connect_timeout: Duration) -> Result<Self> {
        let manager = Manager::new().await.map_err(|e| {
            if is_permission_error(&e) {
                BleTransportError::PermissionDenied
            } else {
                BleTransportError::AdapterNotAvailable(format!("Failed to create BLE manager: {}", e))
            }
        })?;

        let adapter = manager
            .adapters()
            .await
            .map_err(|e| {
                BleTransportError::AdapterNotAvailable(format!("Failed to get BLE adapters: {}", e))
            })?
            .into_iter()
            .next()
            .ok_or_else(|| {
                BleTransportError::AdapterNotAvailable("No BLE adapters available".to_string())
            })?;

        match adapter.adapter_info().await {
            Ok(description) => info!(adapter = %description, "BLE adapter initialized"),
            Err(_) => info!("BLE adapter initialized"),
        }

        Ok(Self {
            adapter,
            direct_connect_timeout,
        })
    }

    async fn find_peripheral(&self, address: BDAddr) -> Result<Option<Peripheral>> {
        let peripherals = self
            .adapter
            .peripherals()
            .await
            .map_err(|e| BleTransportError::ScanFailed(e.to_string()))?;

        for peripheral in peripherals {
            if peripheral.address() == address {
                return Ok(Some(peripheral));
            }
            if let Ok(Some(properties)) = peripheral.properties().await {
                if properties.address == address {
                    return Ok(Some(peripheral));
                }
            }
        }
        Ok(None)
    }

    /// Look the address up among cached peripherals, scanning briefly when the
    /// adapter has not seen it yet
    async fn locate(&self, address: HardwareAddress) -> Result<Peripheral> {
        let bd_addr = to_bd_addr(address);
        if let Some(peripheral) = self.find_peripheral(bd_addr).await? {
            return Ok(peripheral);
        }

        debug!(%address, "Address not cached, scanning for it");
        let mut events = self
            .adapter
            .events()
            .await
            .map_err(|e| BleTransportError::ScanFailed(e.to_string()))?;
        self.adapter
            .start_scan(ScanFilter::default())
            .await
            .map_err(|e| BleTransportError::ScanFailed(e.to_string()))?;

        let found = timeout(self.direct_connect_timeout, async {
            while let Some(event) = events.next().await {
                if let CentralEvent::DeviceDiscovered(id) | CentralEvent::DeviceUpdated(id) = event {
                    if let Ok(peripheral) = self.adapter.peripheral(&id).await {
                        if peripheral.address() == bd_addr {
                            return Some(peripheral);
                        }
                    }
                }
            }
            None
        })
        .await
        .ok()
        .flatten();

        if let Err(e) = self.adapter.stop_scan().await {
            warn!("Failed to stop scan: {}", e);
        }

        found.ok_or_else(|| BleTransportError::connect_failed(address, "peripheral not found"))
    }
}

impl ConnectionManager<BtleplugCentral> {
    /// Manager driving the platform's first BLE adapter
    pub async fn with_btleplug(config: BleTransportConfig) -> Result<Self> {
        let central = BtleplugCentral::new(config.direct_connect_timeout).await?;
        Ok(Self::new(central, config))
    }
}

#[async_trait]
impl Central for BtleplugCentral {
    type Link = BtleplugLink;

    async fn check_ready(&self) -> Result<()> {
        match self.adapter.adapter_state().await {
            Ok(CentralState::PoweredOff) => Err(BleTransportError::AdapterDisabled),
            Ok(_) => Ok(()),
            Err(e) if is_permission_error(&e) => Err(BleTransportError::PermissionDenied),
            Err(e) => {
                // Some backends cannot report power state
                debug!("Adapter state unavailable: {}", e);
                Ok(())
            }
        }
    }

    async fn start_scan(&self) -> Result<DiscoveryStream> {
        let events = self.adapter.events().await.map_err(|e| {
            if is_permission_error(&e) {
                BleTransportError::PermissionDenied
            } else {
                BleTransportError::ScanFailed(e.to_string())
            }
        })?;

        self.adapter
            .start_scan(ScanFilter::default())
            .await
            .map_err(|e| {
                if is_permission_error(&e) {
                    BleTransportError::PermissionDenied
                } else {
                    BleTransportError::ScanFailed(e.to_string())
                }
            })?;

        let adapter = self.adapter.clone();
        let discovered = events.filter_map(move |event| {
            let adapter = adapter.clone();
            async move {
                match event {
                    CentralEvent::DeviceDiscovered(id) | CentralEvent::DeviceUpdated(id) => {
                        let peripheral = adapter.peripheral(&id).await.ok()?;
                        identify(&peripheral).await
                    }
                    _ => None,
                }
            }
        });

        Ok(Box::pin(discovered))
    }

    async fn stop_scan(&self) -> Result<()> {
        self.adapter
            .stop_scan()
            .await
            .map_err(|e| BleTransportError::ScanFailed(format!("Failed to stop BLE scan: {}", e)))
    }

    async fn known_peripherals(&self) -> Result<Vec<PeripheralIdentity>> {
        let peripherals = self
            .adapter
            .peripherals()
            .await
            .map_err(|e| BleTransportError::ScanFailed(e.to_string()))?;

        let mut known = Vec::with_capacity(peripherals.len());
        for peripheral in &peripherals {
            if let Some(identity) = identify(peripheral).await {
                known.push(identity);
            }
        }
        Ok(known)
    }

    async fn connect(&self, address: HardwareAddress) -> Result<BtleplugLink> {
        let peripheral = self.locate(address).await?;

        if !peripheral.is_connected().await.unwrap_or(false) {
            peripheral
                .connect()
                .await
                .map_err(|e| BleTransportError::connect_failed(address, e.to_string()))?;
        }
        info!(%address, "Link-layer connection established");

        Ok(BtleplugLink {
            adapter: self.adapter.clone(),
            id: peripheral.id(),
            peripheral,
            address,
        })
    }
}

// ----------------------------------------------------------------------------
// Link
// ----------------------------------------------------------------------------

/// A connected btleplug peripheral
pub struct BtleplugLink {
    adapter: Adapter,
    peripheral: Peripheral,
    id: PeripheralId,
    address: HardwareAddress,
}

impl BtleplugLink {
    fn characteristic(&self, uuid: uuid::Uuid, service: uuid::Uuid) -> Result<Characteristic> {
        self.peripheral
            .characteristics()
            .into_iter()
            .find(|c| c.uuid == uuid && c.service_uuid == service)
            .ok_or_else(|| BleTransportError::characteristic_not_found(uuid, "not on peripheral"))
    }
}

fn properties(flags: CharPropFlags) -> CharacteristicProperties {
    CharacteristicProperties {
        read: flags.contains(CharPropFlags::READ),
        write: flags.contains(CharPropFlags::WRITE),
        write_without_response: flags.contains(CharPropFlags::WRITE_WITHOUT_RESPONSE),
        notify: flags.contains(CharPropFlags::NOTIFY),
        indicate: flags.contains(CharPropFlags::INDICATE),
    }
}

#[async_trait]
impl Link for BtleplugLink {
    fn address(&self) -> HardwareAddress {
        self.address
    }

    async fn discover_services(&self) -> Result<Vec<GattService>> {
        self.peripheral
            .discover_services()
            .await
            .map_err(|e| BleTransportError::connect_failed(self.address, format!("service discovery failed: {}", e)))?;

        Ok(self
            .peripheral
            .services()
            .into_iter()
            .map(|service| GattService {
                uuid: service.uuid,
                characteristics: service
                    .characteristics
                    .into_iter()
                    .map(|c| GattCharacteristic {
                        uuid: c.uuid,
                        service_uuid: c.service_uuid,
                        properties: properties(c.properties),
                    })
                    .collect(),
            })
            .collect())
    }

    async fn subscribe(&self, characteristic: &GattCharacteristic) -> Result<NotificationStream> {
        let target = self.characteristic(characteristic.uuid, characteristic.service_uuid)?;

        // Take the stream before enabling so no early notification is missed
        let notifications = self
            .peripheral
            .notifications()
            .await
            .map_err(|e| BleTransportError::SubscriptionFailed(e.to_string()))?;

        self.peripheral
            .subscribe(&target)
            .await
            .map_err(|e| BleTransportError::SubscriptionFailed(e.to_string()))?;

        let uuid = target.uuid;
        let stream = notifications
            .filter(move |n| future::ready(n.uuid == uuid))
            .map(|n| Notification {
                characteristic: n.uuid,
                value: n.value,
            });
        Ok(Box::pin(stream))
    }

    async fn write(
        &self,
        characteristic: &GattCharacteristic,
        data: &[u8],
        mode: WriteMode,
    ) -> Result<()> {
        let target = self.characteristic(characteristic.uuid, characteristic.service_uuid)?;
        let write_type = match mode {
            WriteMode::WithResponse => WriteType::WithResponse,
            WriteMode::WithoutResponse => WriteType::WithoutResponse,
        };

        self.peripheral
            .write(&target, data, write_type)
            .await
            .map_err(|e| BleTransportError::WriteRejected(e.to_string()))
    }

    async fn closed(&self) {
        let mut events = match self.adapter.events().await {
            Ok(events) => events,
            Err(e) => {
                warn!("Cannot watch for disconnection: {}", e);
                return future::pending().await;
            }
        };

        if !self.peripheral.is_connected().await.unwrap_or(true) {
            return;
        }

        while let Some(event) = events.next().await {
            if let CentralEvent::DeviceDisconnected(id) = event {
                if id == self.id {
                    debug!(address = %self.address, "Peripheral disconnected");
                    return;
                }
            }
        }
    }

    async fn disconnect(&self) -> Result<()> {
        self.peripheral
            .disconnect()
            .await
            .map_err(|e| BleTransportError::connect_failed(self.address, format!("disconnect failed: {}", e)))
    }
}
