//! Service and characteristic binding
//!
//! After the link is up, the peer's services are resolved against the
//! configured profile: one service holding a write characteristic and a
//! notify characteristic, which may be the same characteristic.

use tracing::{debug, info};
use uuid::Uuid;

use crate::central::{GattCharacteristic, GattService, Link, NotificationStream, WriteMode};
use crate::config::BleTransportConfig;
use crate::error::{BleTransportError, Result};

// ----------------------------------------------------------------------------
// Bound Characteristics
// ----------------------------------------------------------------------------

/// Handles resolved on a connected peer, ready for I/O
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BoundCharacteristics {
    pub service: Uuid,
    pub write: GattCharacteristic,
    pub notify: GattCharacteristic,
    pub write_mode: WriteMode,
}

impl BoundCharacteristics {
    /// True when both directions share one characteristic
    pub fn is_shared(&self) -> bool {
        self.write.uuid == self.notify.uuid
    }
}

/// Resolve the configured profile against discovered services
pub fn bind_characteristics(
    services: &[GattService],
    config: &BleTransportConfig,
) -> Result<BoundCharacteristics> {
    let service = services
        .iter()
        .find(|s| s.uuid == config.service_uuid)
        .ok_or(BleTransportError::ServiceNotFound {
            service: config.service_uuid,
        })?;

    let find = |uuid: Uuid| {
        service
            .characteristics
            .iter()
            .find(|c| c.uuid == uuid)
            .cloned()
            .ok_or_else(|| BleTransportError::characteristic_not_found(uuid, "not in service"))
    };

    let write = find(config.write_characteristic_uuid)?;
    if !write.properties.can_write() {
        return Err(BleTransportError::characteristic_not_found(
            write.uuid,
            "not writable",
        ));
    }

    let notify = find(config.notify_characteristic_uuid)?;
    if !notify.properties.can_notify() {
        return Err(BleTransportError::characteristic_not_found(
            notify.uuid,
            "does not notify",
        ));
    }

    let write_mode = if (config.write_with_response && write.properties.write)
        || !write.properties.write_without_response
    {
        WriteMode::WithResponse
    } else {
        WriteMode::WithoutResponse
    };

    Ok(BoundCharacteristics {
        service: service.uuid,
        write,
        notify,
        write_mode,
    })
}

/// Discover services on `link`, bind the profile and enable notifications
pub async fn bind<L: Link + ?Sized>(
    link: &L,
    config: &BleTransportConfig,
) -> Result<(BoundCharacteristics, NotificationStream)> {
    let services = link.discover_services().await?;
    debug!(count = services.len(), "Services discovered");

    let bound = bind_characteristics(&services, config)?;
    let notifications = link.subscribe(&bound.notify).await?;

    info!(
        service = %bound.service,
        write = %bound.write.uuid,
        notify = %bound.notify.uuid,
        "Characteristics bound, notifications enabled"
    );
    Ok((bound, notifications))
}
