//! Connection manager
//!
//! Owns the single link to the peer and drives it through
//! [`LinkState`]. Public operations return as soon as the work has been
//! started; outcomes that depend on the link layer arrive on the status
//! stream.

use std::sync::{Arc, Weak};
use std::time::Duration;

use offgrid_core::{
    FrameCodec, HardwareAddress, NotificationSink, OutboundFrame, PeripheralIdentity, Subscription,
};
use tokio::sync::{broadcast, watch, Mutex};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::binding;
use crate::central::{Central, Link};
use crate::config::BleTransportConfig;
use crate::connection::{spawn_notification_pump, LinkConnection, LinkSlot};
use crate::discovery::{fallback_candidates, scan_for_match};
use crate::error::{BleTransportError, Result};
use crate::protocol::MatchPeripheral;
use crate::state::{LinkState, LinkStatus};
use crate::writer::OutboundWriter;

/// Status events buffered per subscriber
const STATUS_CHANNEL_CAPACITY: usize = 64;

// ----------------------------------------------------------------------------
// Connection Manager
// ----------------------------------------------------------------------------

/// Scans for, connects to and talks with one peripheral at a time.
///
/// Must be created inside a Tokio runtime; it spawns the outbound writer
/// task on construction.
pub struct ConnectionManager<C: Central> {
    inner: Arc<Inner<C>>,
    writer: OutboundWriter,
}

struct Inner<C: Central> {
    central: C,
    config: BleTransportConfig,
    state: watch::Sender<LinkState>,
    status: broadcast::Sender<LinkStatus>,
    sink: NotificationSink,
    slot: LinkSlot<C::Link>,
    attempt: Mutex<Option<JoinHandle<()>>>,
}

impl<C: Central> ConnectionManager<C> {
    pub fn new(central: C, config: BleTransportConfig) -> Self {
        let (state, _) = watch::channel(LinkState::Idle);
        let (status, _) = broadcast::channel(STATUS_CHANNEL_CAPACITY);
        let slot: LinkSlot<C::Link> = Arc::new(Mutex::new(None));

        let writer = OutboundWriter::spawn(
            Arc::clone(&slot),
            FrameCodec::new(config.codec.clone()),
            config.write_chunk_size,
            config.write_characteristic_uuid,
        );

        let inner = Arc::new(Inner {
            central,
            sink: NotificationSink::new(config.notification_capacity),
            config,
            state,
            status,
            slot,
            attempt: Mutex::new(None),
        });

        Self { inner, writer }
    }

    pub fn config(&self) -> &BleTransportConfig {
        &self.inner.config
    }

    pub fn central(&self) -> &C {
        &self.inner.central
    }

    /// Codec matching the manager's framing settings, for decoding inbound data
    pub fn codec(&self) -> FrameCodec {
        FrameCodec::new(self.inner.config.codec.clone())
    }

    pub fn state(&self) -> LinkState {
        *self.inner.state.borrow()
    }

    /// Watch the current state; intermediate states may be skipped
    pub fn watch_state(&self) -> watch::Receiver<LinkState> {
        self.inner.state.subscribe()
    }

    /// Every state transition and failure, in order
    pub fn subscribe_status(&self) -> broadcast::Receiver<LinkStatus> {
        self.inner.status.subscribe()
    }

    /// Raw notification buffers received from the peer from now on
    pub fn subscribe_inbound(&self) -> Subscription {
        self.inner.sink.subscribe()
    }

    /// The peripheral currently linked, if any
    pub async fn connected_peer(&self) -> Option<PeripheralIdentity> {
        self.inner
            .slot
            .lock()
            .await
            .as_ref()
            .map(|connection| connection.peer().clone())
    }

    /// Wait until the state satisfies `predicate`
    pub async fn wait_for_state<F>(&self, predicate: F) -> LinkState
    where
        F: FnMut(&LinkState) -> bool,
    {
        let mut receiver = self.watch_state();
        // The watch guard must drop before `receiver` does
        let reached = match receiver.wait_for(predicate).await {
            Ok(state) => *state,
            Err(_) => self.state(),
        };
        reached
    }

    /// Check that BLE is usable before starting an attempt
    pub async fn preflight(&self) -> Result<()> {
        self.inner.central.check_ready().await
    }

    /// Scan for a peripheral accepted by `matcher` and connect to the first
    /// one found. When nothing matches within `scan_timeout`, matching known
    /// peripherals and then the configured addresses are tried in order.
    ///
    /// Any previous attempt or link is torn down first.
    pub async fn scan_and_connect<M: MatchPeripheral>(&self, matcher: M, scan_timeout: Duration) {
        self.inner.begin_attempt().await;

        let inner = Arc::clone(&self.inner);
        let handle = tokio::spawn(async move {
            inner.run_scan_and_connect(matcher, scan_timeout).await;
        });
        *self.inner.attempt.lock().await = Some(handle);
    }

    /// [`scan_and_connect`](Self::scan_and_connect) with the configured name
    /// tokens and scan timeout
    pub async fn scan_and_connect_default(&self) {
        let matcher = self.inner.config.name_matcher();
        let timeout = self.inner.config.scan_timeout;
        self.scan_and_connect(matcher, timeout).await;
    }

    /// Connect to a known address without scanning
    pub async fn connect_direct(&self, address: HardwareAddress) {
        self.inner.begin_attempt().await;

        let inner = Arc::clone(&self.inner);
        let handle = tokio::spawn(async move {
            if let Err(e) = inner.central.check_ready().await {
                return inner.fail(e);
            }
            if inner.transition(LinkState::Connecting) {
                inner.connect_first(vec![PeripheralIdentity::new(address)]).await;
            }
        });
        *self.inner.attempt.lock().await = Some(handle);
    }

    /// Cancel any pending attempt and close the link. Safe to call at any
    /// time, including with nothing connected.
    pub async fn disconnect(&self) {
        self.inner.teardown().await;
    }

    /// Frame and send one message. Completes once every chunk has been
    /// handed to the link layer; delivery to the peer is not confirmed.
    pub async fn write(&self, frame: OutboundFrame) -> Result<()> {
        self.writer.write(frame).await.map(|_| ())
    }
}

impl<C: Central> Inner<C> {
    // ------------------------------------------------------------------
    // State
    // ------------------------------------------------------------------

    /// Move to `next` if the state machine allows it
    fn transition(&self, next: LinkState) -> bool {
        let mut previous = None;
        self.state.send_if_modified(|current| {
            if !current.can_transition_to(next) {
                return false;
            }
            previous = Some(*current);
            *current = next;
            // Published before watchers wake so the event is never behind the state
            self.report(LinkStatus::State(next));
            true
        });

        match previous {
            Some(from) => {
                debug!(%from, to = %next, "Link state changed");
                true
            }
            None => {
                debug!(from = %*self.state.borrow(), to = %next, "Ignoring transition");
                false
            }
        }
    }

    fn report(&self, status: LinkStatus) {
        // No subscribers is fine
        let _ = self.status.send(status);
    }

    fn fail(&self, error: BleTransportError) {
        warn!("Connection attempt failed: {}", error);
        self.report(LinkStatus::Failed(error));
        self.transition(LinkState::Disconnected);
    }

    // ------------------------------------------------------------------
    // Attempts
    // ------------------------------------------------------------------

    async fn begin_attempt(&self) {
        self.teardown().await;
        if *self.state.borrow() == LinkState::Disconnected {
            self.transition(LinkState::Idle);
        }
    }

    async fn run_scan_and_connect<M: MatchPeripheral>(
        self: Arc<Self>,
        matcher: M,
        scan_timeout: Duration,
    ) {
        if let Err(e) = self.central.check_ready().await {
            return self.fail(e);
        }
        if !self.transition(LinkState::Scanning) {
            return;
        }

        let found = match scan_for_match(&self.central, &matcher, scan_timeout).await {
            Ok(found) => found,
            Err(e) => return self.fail(e),
        };

        let candidates = match found {
            Some(peer) => {
                self.report(LinkStatus::Matched(peer.clone()));
                vec![peer]
            }
            None => {
                info!("No matching peripheral found, trying known devices");
                let candidates =
                    fallback_candidates(&self.central, &matcher, &self.config.known_addresses)
                        .await;
                if candidates.is_empty() {
                    return self.fail(BleTransportError::ScanTimeout);
                }
                candidates
            }
        };

        if self.transition(LinkState::Connecting) {
            self.connect_first(candidates).await;
        }
    }

    /// Try each candidate in order; the first successful connection wins
    async fn connect_first(self: &Arc<Self>, candidates: Vec<PeripheralIdentity>) {
        let mut last_error = None;

        for peer in candidates {
            info!(peer = %peer, "Connecting");
            match self.central.connect(peer.address).await {
                Ok(link) => return self.establish(link, peer).await,
                Err(e) => {
                    warn!(address = %peer.address, "Connect failed: {}", e);
                    last_error = Some(e);
                }
            }
        }

        self.fail(last_error.unwrap_or(BleTransportError::ScanTimeout));
    }

    /// Install a fresh link, bind its characteristics and start its tasks
    async fn establish(self: &Arc<Self>, link: C::Link, peer: PeripheralIdentity) {
        let link = Arc::new(link);
        *self.slot.lock().await = Some(LinkConnection::new(Arc::clone(&link), peer.clone()));
        self.transition(LinkState::ServiceDiscovery);

        let monitor = self.spawn_monitor(Arc::clone(&link));

        match binding::bind(link.as_ref(), &self.config).await {
            Ok((bound, notifications)) => {
                let pump =
                    spawn_notification_pump(notifications, bound.notify.uuid, self.sink.clone());

                let mut slot = self.slot.lock().await;
                match slot.as_mut().filter(|c| c.is_link(&link)) {
                    Some(connection) => {
                        connection.attach_io(bound, pump);
                        connection.attach_monitor(monitor);
                    }
                    None => {
                        // Link went away while binding
                        pump.abort();
                        monitor.abort();
                        return;
                    }
                }
                drop(slot);

                if self.transition(LinkState::Ready) {
                    info!(peer = %peer, "Link ready");
                }
            }
            Err(e) => {
                warn!(peer = %peer, "Link up without I/O: {}", e);
                if let Some(connection) = self.slot.lock().await.as_mut().filter(|c| c.is_link(&link)) {
                    connection.attach_monitor(monitor);
                }
                self.report(LinkStatus::Failed(e));
                self.transition(LinkState::ReadyWithoutIo);
            }
        }
    }

    fn spawn_monitor(self: &Arc<Self>, link: Arc<C::Link>) -> JoinHandle<()> {
        let manager: Weak<Self> = Arc::downgrade(self);
        tokio::spawn(async move {
            link.closed().await;
            if let Some(inner) = manager.upgrade() {
                inner.on_link_lost(&link).await;
            }
        })
    }

    async fn on_link_lost(&self, link: &Arc<C::Link>) {
        let connection = {
            let mut slot = self.slot.lock().await;
            match slot.as_ref() {
                Some(connection) if connection.is_link(link) => slot.take(),
                _ => None,
            }
        };

        if let Some(connection) = connection {
            warn!(peer = %connection.peer(), "Link lost");
            connection.detach();
            self.report(LinkStatus::Failed(BleTransportError::LinkLost));
            self.transition(LinkState::Disconnected);
        }
    }

    // ------------------------------------------------------------------
    // Teardown
    // ------------------------------------------------------------------

    async fn teardown(&self) {
        let pending = self.attempt.lock().await.take();
        if let Some(handle) = pending {
            handle.abort();
            // Wait for the attempt to stop touching the slot
            let _ = handle.await;
        }

        if *self.state.borrow() == LinkState::Scanning {
            if let Err(e) = self.central.stop_scan().await {
                debug!("Failed to stop scan during teardown: {}", e);
            }
        }

        let connection = self.slot.lock().await.take();
        if let Some(connection) = connection {
            connection.close().await;
        }

        let active = self.state.borrow().is_active();
        if active {
            self.transition(LinkState::Disconnected);
        }
    }
}
