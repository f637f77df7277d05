//! GATT profile constants and peripheral matching for the OffGridChat peer

use offgrid_core::{HardwareAddress, PeripheralIdentity};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

// ----------------------------------------------------------------------------
// Nordic UART Service UUIDs
// ----------------------------------------------------------------------------

/// UART service exposed by the peer firmware
pub const UART_SERVICE_UUID: Uuid = Uuid::from_u128(0x6E400001_B5A3_F393_E0A9_E50E24DCCA9E);

/// Central -> peer (write / write without response)
pub const UART_WRITE_CHARACTERISTIC_UUID: Uuid =
    Uuid::from_u128(0x6E400002_B5A3_F393_E0A9_E50E24DCCA9E);

/// Peer -> central (notify)
pub const UART_NOTIFY_CHARACTERISTIC_UUID: Uuid =
    Uuid::from_u128(0x6E400003_B5A3_F393_E0A9_E50E24DCCA9E);

// ----------------------------------------------------------------------------
// Known Boards
// ----------------------------------------------------------------------------

pub const BOARD_A_ADDRESS: HardwareAddress = HardwareAddress::new([0x48, 0xCA, 0x43, 0x3A, 0x67, 0x51]);
pub const BOARD_B_ADDRESS: HardwareAddress = HardwareAddress::new([0x64, 0xE8, 0x33, 0x5C, 0x2C, 0x41]);

/// Advertised-name fragments identifying the peer firmware
pub const DEFAULT_NAME_TOKENS: [&str; 3] = ["OffGridChat-ESP32", "ESP32", "OffGridChat"];

// ----------------------------------------------------------------------------
// Peripheral Matching
// ----------------------------------------------------------------------------

/// Decides whether a discovered peripheral is the peer to connect to
pub trait MatchPeripheral: Send + Sync + 'static {
    fn matches(&self, peripheral: &PeripheralIdentity) -> bool;
}

impl<F> MatchPeripheral for F
where
    F: Fn(&PeripheralIdentity) -> bool + Send + Sync + 'static,
{
    fn matches(&self, peripheral: &PeripheralIdentity) -> bool {
        self(peripheral)
    }
}

/// Matches peripherals whose advertised name contains any token,
/// ignoring case. Unnamed peripherals never match.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NameMatcher {
    tokens: Vec<String>,
}

impl Default for NameMatcher {
    fn default() -> Self {
        Self::new(DEFAULT_NAME_TOKENS)
    }
}

impl NameMatcher {
    pub fn new<I, S>(tokens: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        Self {
            tokens: tokens
                .into_iter()
                .map(|t| t.as_ref().to_lowercase())
                .filter(|t| !t.is_empty())
                .collect(),
        }
    }

    pub fn tokens(&self) -> &[String] {
        &self.tokens
    }

    pub fn matches_name(&self, name: Option<&str>) -> bool {
        let Some(name) = name else {
            return false;
        };
        let name = name.to_lowercase();
        self.tokens.iter().any(|token| name.contains(token.as_str()))
    }
}

impl MatchPeripheral for NameMatcher {
    fn matches(&self, peripheral: &PeripheralIdentity) -> bool {
        self.matches_name(peripheral.name.as_deref())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_name_matching_is_case_insensitive() {
        let matcher = NameMatcher::default();
        assert!(matcher.matches_name(Some("OffGridChat-ESP32")));
        assert!(matcher.matches_name(Some("my-esp32-board")));
        assert!(matcher.matches_name(Some("OFFGRIDCHAT")));
        assert!(!matcher.matches_name(Some("Galaxy Buds")));
        assert!(!matcher.matches_name(None));
    }

    #[test]
    fn test_empty_tokens_are_ignored() {
        let matcher = NameMatcher::new(["", "Node"]);
        assert_eq!(matcher.tokens(), &["node".to_string()]);
        assert!(!matcher.matches_name(Some("anything")));
    }

    #[test]
    fn test_closure_matcher() {
        let wanted = BOARD_B_ADDRESS;
        let matcher = move |p: &PeripheralIdentity| p.address == wanted;
        assert!(matcher.matches(&PeripheralIdentity::new(BOARD_B_ADDRESS)));
        assert!(!matcher.matches(&PeripheralIdentity::new(BOARD_A_ADDRESS)));
    }

    #[test]
    fn test_board_addresses() {
        assert_eq!(BOARD_A_ADDRESS.to_string(), "48:CA:43:3A:67:51");
        assert_eq!(BOARD_B_ADDRESS.to_string(), "64:E8:33:5C:2C:41");
    }
}
