//! Core types for the OffGridChat link
//!
//! Newtypes for hardware addresses and the identity a peripheral presents
//! during discovery, plus the logical kinds of frame carried on the wire.

use core::fmt;
use core::str::FromStr;
use serde::{Deserialize, Serialize};

use crate::errors::FrameError;

// ----------------------------------------------------------------------------
// Hardware Address
// ----------------------------------------------------------------------------

/// 48-bit Bluetooth device address, written `AA:BB:CC:DD:EE:FF`
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct HardwareAddress([u8; 6]);

impl HardwareAddress {
    /// Create an address from its six bytes, most significant first
    pub const fn new(bytes: [u8; 6]) -> Self {
        Self(bytes)
    }

    /// Get the raw bytes
    pub fn as_bytes(&self) -> &[u8; 6] {
        &self.0
    }

    /// Parse an address from its colon or dash separated form
    pub fn parse(s: &str) -> Result<Self, FrameError> {
        s.parse()
    }
}

impl fmt::Display for HardwareAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let [a, b, c, d, e, g] = self.0;
        write!(f, "{a:02X}:{b:02X}:{c:02X}:{d:02X}:{e:02X}:{g:02X}")
    }
}

impl FromStr for HardwareAddress {
    type Err = FrameError;

    /// Six two-digit hex groups joined by one kind of separator, `:` or `-`
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let invalid = || FrameError::InvalidAddress(s.to_string());
        let trimmed = s.trim();
        let separator = if trimmed.contains(':') { ':' } else { '-' };

        let mut bytes = [0u8; 6];
        let mut groups = trimmed.split(separator);
        for byte in bytes.iter_mut() {
            let group = groups.next().ok_or_else(invalid)?;
            if group.len() != 2 {
                return Err(invalid());
            }
            let decoded = hex::decode(group).map_err(|_| invalid())?;
            *byte = decoded[0];
        }
        if groups.next().is_some() {
            return Err(invalid());
        }
        Ok(Self(bytes))
    }
}

impl TryFrom<String> for HardwareAddress {
    type Error = FrameError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<HardwareAddress> for String {
    fn from(address: HardwareAddress) -> Self {
        address.to_string()
    }
}

// ----------------------------------------------------------------------------
// Peripheral Identity
// ----------------------------------------------------------------------------

/// What a peripheral looks like from the central's side: its stable address
/// and, when advertised, its local name.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct PeripheralIdentity {
    pub address: HardwareAddress,
    pub name: Option<String>,
}

impl PeripheralIdentity {
    pub fn new(address: HardwareAddress) -> Self {
        Self {
            address,
            name: None,
        }
    }

    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    /// Advertised name, or `"<unnamed>"` for display
    pub fn display_name(&self) -> &str {
        self.name.as_deref().unwrap_or("<unnamed>")
    }
}

impl fmt::Display for PeripheralIdentity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({})", self.display_name(), self.address)
    }
}

// ----------------------------------------------------------------------------
// Frame Kind
// ----------------------------------------------------------------------------

/// Logical kind of a frame, identified on the wire by its ASCII token
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum FrameKind {
    Text,
    Photo,
    Audio,
}

impl FrameKind {
    pub const ALL: [FrameKind; 3] = [FrameKind::Text, FrameKind::Photo, FrameKind::Audio];

    /// Wire token preceding the first separator
    pub fn token(&self) -> &'static [u8] {
        match self {
            FrameKind::Text => b"TEXT",
            FrameKind::Photo => b"PHOTO",
            FrameKind::Audio => b"AUDIO",
        }
    }

    pub fn from_token(token: &[u8]) -> Option<Self> {
        Self::ALL.into_iter().find(|kind| kind.token() == token)
    }

    /// True when `partial` could still grow into one of the known tokens
    pub(crate) fn is_token_prefix(partial: &[u8]) -> bool {
        Self::ALL
            .iter()
            .any(|kind| kind.token().starts_with(partial))
    }
}

impl fmt::Display for FrameKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FrameKind::Text => write!(f, "text"),
            FrameKind::Photo => write!(f, "photo"),
            FrameKind::Audio => write!(f, "audio"),
        }
    }
}
