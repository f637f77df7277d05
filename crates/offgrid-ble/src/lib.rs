//! Bluetooth Low Energy link to an OffGridChat peer
//!
//! The peer is a microcontroller exposing the Nordic UART service. This
//! crate plays the central role: it finds the peer, connects, binds the
//! write and notify characteristics and then moves framed messages over
//! them.
//!
//! ## Architecture
//!
//! - [`config`] - Link configuration and defaults for the peer firmware
//! - [`error`] - Error taxonomy reported on the status stream and by writes
//! - [`protocol`] - GATT profile constants and peripheral matching
//! - [`central`] - Central/link traits the manager drives
//! - [`state`] - Link state machine and status events
//! - [`manager`] - The connection manager
//! - [`platform`] - btleplug implementation of the central traits
//!
//! ## Usage
//!
//! ```rust,no_run
//! use offgrid_ble::{BleTransportConfig, ConnectionManager, LinkState};
//! use offgrid_core::OutboundFrame;
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let manager = ConnectionManager::with_btleplug(BleTransportConfig::default()).await?;
//! let mut inbound = manager.subscribe_inbound();
//!
//! manager.scan_and_connect_default().await;
//! if manager.wait_for_state(|s| matches!(s, LinkState::Ready | LinkState::Disconnected)).await
//!     == LinkState::Ready
//! {
//!     manager.write(OutboundFrame::text("hello")).await?;
//! }
//!
//! let mut decoder = manager.codec().decoder();
//! while let Some(chunk) = inbound.recv().await {
//!     for message in decoder.push(&chunk) {
//!         println!("{:?}", message?.kind());
//!     }
//! }
//! # Ok(())
//! # }
//! ```

mod binding;
pub mod central;
pub mod config;
mod connection;
mod discovery;
pub mod error;
pub mod manager;
pub mod platform;
pub mod protocol;
pub mod state;
mod writer;

// Public API exports
pub use binding::{bind_characteristics, BoundCharacteristics};
pub use central::{
    Central, CharacteristicProperties, DiscoveryStream, GattCharacteristic, GattService, Link,
    Notification, NotificationStream, WriteMode,
};
pub use config::BleTransportConfig;
pub use error::{BleTransportError, Result};
pub use manager::ConnectionManager;
pub use platform::{BtleplugCentral, BtleplugLink};
pub use protocol::{
    MatchPeripheral, NameMatcher, BOARD_A_ADDRESS, BOARD_B_ADDRESS,
    DEFAULT_NAME_TOKENS, UART_NOTIFY_CHARACTERISTIC_UUID, UART_SERVICE_UUID,
    UART_WRITE_CHARACTERISTIC_UUID,
};
pub use state::{LinkState, LinkStatus};
