//! Outbound frames and decoded messages

use serde::{Deserialize, Serialize};

use crate::errors::{FrameError, Result};
use crate::types::FrameKind;

// ----------------------------------------------------------------------------
// Outbound Frame
// ----------------------------------------------------------------------------

/// One logical message to send: a kind and its raw payload
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OutboundFrame {
    kind: FrameKind,
    payload: Vec<u8>,
}

impl OutboundFrame {
    pub fn new(kind: FrameKind, payload: Vec<u8>) -> Self {
        Self { kind, payload }
    }

    /// A chat text message
    pub fn text(text: impl Into<String>) -> Self {
        Self::new(FrameKind::Text, text.into().into_bytes())
    }

    /// An image attachment
    pub fn photo(bytes: Vec<u8>) -> Self {
        Self::new(FrameKind::Photo, bytes)
    }

    /// A voice message
    pub fn audio(bytes: Vec<u8>) -> Self {
        Self::new(FrameKind::Audio, bytes)
    }

    pub fn kind(&self) -> FrameKind {
        self.kind
    }

    pub fn payload(&self) -> &[u8] {
        &self.payload
    }

    pub fn len(&self) -> usize {
        self.payload.len()
    }

    pub fn is_empty(&self) -> bool {
        self.payload.is_empty()
    }
}

// ----------------------------------------------------------------------------
// Decoded Message
// ----------------------------------------------------------------------------

/// A frame reassembled from the inbound stream.
///
/// The decoder only constructs a `DecodedMessage` once every declared
/// payload byte has arrived.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DecodedMessage {
    kind: FrameKind,
    payload: Vec<u8>,
}

impl DecodedMessage {
    pub(crate) fn new(kind: FrameKind, payload: Vec<u8>) -> Self {
        Self { kind, payload }
    }

    pub fn kind(&self) -> FrameKind {
        self.kind
    }

    pub fn payload(&self) -> &[u8] {
        &self.payload
    }

    pub fn into_payload(self) -> Vec<u8> {
        self.payload
    }

    /// Payload as UTF-8 text
    pub fn text(&self) -> Result<&str> {
        core::str::from_utf8(&self.payload).map_err(|_| FrameError::InvalidText)
    }
}

impl From<DecodedMessage> for OutboundFrame {
    fn from(message: DecodedMessage) -> Self {
        OutboundFrame::new(message.kind, message.payload)
    }
}
