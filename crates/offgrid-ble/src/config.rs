//! BLE link configuration

use std::time::Duration;

use offgrid_core::{CodecConfig, HardwareAddress, DEFAULT_NOTIFICATION_CAPACITY, DEFAULT_WRITE_CHUNK_SIZE};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::protocol::{
    NameMatcher, BOARD_A_ADDRESS, BOARD_B_ADDRESS, DEFAULT_NAME_TOKENS, UART_NOTIFY_CHARACTERISTIC_UUID,
    UART_SERVICE_UUID, UART_WRITE_CHARACTERISTIC_UUID,
};

// ----------------------------------------------------------------------------
// Configuration
// ----------------------------------------------------------------------------

/// Configuration for the BLE link
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BleTransportConfig {
    /// Service exposing the UART characteristics
    pub service_uuid: Uuid,
    /// Characteristic written by the central
    pub write_characteristic_uuid: Uuid,
    /// Characteristic notified by the peer (may equal the write characteristic)
    pub notify_characteristic_uuid: Uuid,
    /// Name fragments that identify the peer during discovery
    pub name_tokens: Vec<String>,
    /// Addresses tried in order when discovery finds nothing
    pub known_addresses: Vec<HardwareAddress>,
    /// How long to scan before falling back to known addresses
    pub scan_timeout: Duration,
    /// How long to look for a known address before giving up on it
    pub direct_connect_timeout: Duration,
    /// Inbound notification buffers held per subscriber
    pub notification_capacity: usize,
    /// Largest single write issued to the write characteristic. btleplug
    /// does not report the negotiated ATT MTU, so this stands in for it and
    /// must not exceed `MTU - 3` for the peer's link.
    pub write_chunk_size: usize,
    /// Prefer acknowledged link-layer writes when the characteristic allows them
    pub write_with_response: bool,
    /// Frame codec settings
    pub codec: CodecConfig,
}

impl Default for BleTransportConfig {
    fn default() -> Self {
        Self {
            service_uuid: UART_SERVICE_UUID,
            write_characteristic_uuid: UART_WRITE_CHARACTERISTIC_UUID,
            notify_characteristic_uuid: UART_NOTIFY_CHARACTERISTIC_UUID,
            name_tokens: DEFAULT_NAME_TOKENS.iter().map(|t| t.to_string()).collect(),
            known_addresses: vec![BOARD_A_ADDRESS, BOARD_B_ADDRESS],
            scan_timeout: Duration::from_secs(10),
            direct_connect_timeout: Duration::from_secs(5),
            notification_capacity: DEFAULT_NOTIFICATION_CAPACITY,
            write_chunk_size: DEFAULT_WRITE_CHUNK_SIZE,
            write_with_response: true,
            codec: CodecConfig::default(),
        }
    }
}

impl BleTransportConfig {
    /// Create a new configuration with default settings
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the service and characteristic identifiers
    pub fn with_gatt_profile(mut self, service: Uuid, write: Uuid, notify: Uuid) -> Self {
        self.service_uuid = service;
        self.write_characteristic_uuid = write;
        self.notify_characteristic_uuid = notify;
        self
    }

    /// Set discovery name tokens
    pub fn with_name_tokens<I, S>(mut self, tokens: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.name_tokens = tokens.into_iter().map(Into::into).collect();
        self
    }

    /// Set the fallback address list
    pub fn with_known_addresses(mut self, addresses: Vec<HardwareAddress>) -> Self {
        self.known_addresses = addresses;
        self
    }

    /// Set scan timeout
    pub fn with_scan_timeout(mut self, timeout: Duration) -> Self {
        self.scan_timeout = timeout;
        self
    }

    /// Set direct-connect lookup timeout
    pub fn with_direct_connect_timeout(mut self, timeout: Duration) -> Self {
        self.direct_connect_timeout = timeout;
        self
    }

    /// Set notification buffer capacity
    pub fn with_notification_capacity(mut self, capacity: usize) -> Self {
        self.notification_capacity = capacity;
        self
    }

    /// Set maximum write size
    pub fn with_write_chunk_size(mut self, size: usize) -> Self {
        self.write_chunk_size = size;
        self
    }

    /// Choose acknowledged or unacknowledged link-layer writes
    pub fn with_write_with_response(mut self, enabled: bool) -> Self {
        self.write_with_response = enabled;
        self
    }

    /// Set codec settings
    pub fn with_codec(mut self, codec: CodecConfig) -> Self {
        self.codec = codec;
        self
    }

    /// Matcher built from the configured name tokens
    pub fn name_matcher(&self) -> NameMatcher {
        NameMatcher::new(&self.name_tokens)
    }

    /// Check the configuration for values the link cannot work with
    pub fn validate(&self) -> Result<(), String> {
        if self.write_chunk_size == 0 {
            return Err("write_chunk_size must be greater than zero".to_string());
        }
        if self.notification_capacity == 0 {
            return Err("notification_capacity must be greater than zero".to_string());
        }
        if self.codec.max_payload_len == 0 {
            return Err("codec.max_payload_len must be greater than zero".to_string());
        }
        if self.name_matcher().tokens().is_empty() && self.known_addresses.is_empty() {
            return Err("either name_tokens or known_addresses must be set".to_string());
        }
        Ok(())
    }
}
