//! The live link to one peripheral and the tasks serving it

use std::sync::Arc;

use futures::StreamExt;
use offgrid_core::{NotificationSink, PeripheralIdentity};
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, trace};
use uuid::Uuid;

use crate::binding::BoundCharacteristics;
use crate::central::{GattCharacteristic, Link, NotificationStream, WriteMode};
use crate::error::{BleTransportError, Result};

/// Shared slot holding the manager's single connection
pub(crate) type LinkSlot<L> = Arc<Mutex<Option<LinkConnection<L>>>>;

// ----------------------------------------------------------------------------
// Link Connection
// ----------------------------------------------------------------------------

/// Session state for the one connected peripheral: the link handle, the
/// bound characteristics (absent when binding failed) and the background
/// tasks tied to the link's lifetime.
pub(crate) struct LinkConnection<L: Link> {
    link: Arc<L>,
    peer: PeripheralIdentity,
    io: Option<BoundCharacteristics>,
    pump: Option<JoinHandle<()>>,
    monitor: Option<JoinHandle<()>>,
}

/// Everything the writer needs, detached from the slot lock
pub(crate) struct WriteTarget<L: Link> {
    pub link: Arc<L>,
    pub characteristic: GattCharacteristic,
    pub mode: WriteMode,
}

impl<L: Link> LinkConnection<L> {
    pub fn new(link: Arc<L>, peer: PeripheralIdentity) -> Self {
        Self {
            link,
            peer,
            io: None,
            pump: None,
            monitor: None,
        }
    }

    pub fn peer(&self) -> &PeripheralIdentity {
        &self.peer
    }

    pub fn is_link(&self, other: &Arc<L>) -> bool {
        Arc::ptr_eq(&self.link, other)
    }

    pub fn attach_io(&mut self, bound: BoundCharacteristics, pump: JoinHandle<()>) {
        self.io = Some(bound);
        self.pump = Some(pump);
    }

    pub fn attach_monitor(&mut self, monitor: JoinHandle<()>) {
        self.monitor = Some(monitor);
    }

    pub fn write_target(&self, write_uuid: Uuid) -> Result<WriteTarget<L>> {
        let bound = self.io.as_ref().ok_or_else(|| {
            BleTransportError::characteristic_not_found(write_uuid, "unresolved on this link")
        })?;
        Ok(WriteTarget {
            link: Arc::clone(&self.link),
            characteristic: bound.write.clone(),
            mode: bound.write_mode,
        })
    }

    /// Stop background tasks and close the physical link
    pub async fn close(mut self) {
        self.stop_tasks(true);
        if let Err(e) = self.link.disconnect().await {
            error!("Failed to disconnect from {}: {}", self.peer, e);
        }
        info!(peer = %self.peer, "Disconnected");
    }

    /// Release a link the peer already dropped. Called from the monitor
    /// task, which is left to finish on its own.
    pub fn detach(mut self) {
        self.stop_tasks(false);
    }

    fn stop_tasks(&mut self, include_monitor: bool) {
        if let Some(pump) = self.pump.take() {
            pump.abort();
        }
        if include_monitor {
            if let Some(monitor) = self.monitor.take() {
                monitor.abort();
            }
        }
    }
}

// ----------------------------------------------------------------------------
// Notification Pump
// ----------------------------------------------------------------------------

/// Forward notifications for `characteristic` into `sink`, in arrival order
pub(crate) fn spawn_notification_pump(
    mut notifications: NotificationStream,
    characteristic: Uuid,
    sink: NotificationSink,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        while let Some(notification) = notifications.next().await {
            if notification.characteristic != characteristic {
                trace!(uuid = %notification.characteristic, "Ignoring foreign notification");
                continue;
            }
            let len = notification.value.len();
            let receivers = sink.publish(notification.value);
            trace!(len, receivers, "Notification published");
        }
        debug!("Notification stream ended");
    })
}
