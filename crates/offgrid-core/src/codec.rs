//! Wire framing for the OffGridChat link
//!
//! Every frame starts with an ASCII kind token and a colon. Binary kinds
//! carry a decimal length and a second colon before their raw bytes:
//!
//! ```text
//! TEXT:<len>:<utf8 bytes>      (length-prefixed text, the default)
//! TEXT:<utf8 bytes>            (chunk-delimited text, legacy firmware)
//! PHOTO:<len>:<raw bytes>
//! AUDIO:<len>:<raw bytes>
//! ```
//!
//! Lengths are written in decimal without leading zeros. The decoder treats
//! inbound notifications as one concatenated stream and reassembles payloads
//! that span any number of notifications.

use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::errors::{FrameError, Result};
use crate::frame::{DecodedMessage, OutboundFrame};
use crate::types::FrameKind;

// ----------------------------------------------------------------------------
// Constants
// ----------------------------------------------------------------------------

/// Separator between header fields
const SEPARATOR: u8 = b':';

/// Longest decimal length field accepted (covers any `usize` on 64-bit)
const MAX_LENGTH_DIGITS: usize = 20;

/// Default upper bound on a declared payload (8 MiB)
pub const DEFAULT_MAX_PAYLOAD_LEN: usize = 8 * 1024 * 1024;

/// Largest up-front allocation made on the strength of a declared length
const MAX_PREALLOCATION: usize = 64 * 1024;

/// Bytes of discarded input included in log output
const DISCARD_PREVIEW_LEN: usize = 16;

// ----------------------------------------------------------------------------
// Configuration
// ----------------------------------------------------------------------------

/// How `TEXT` frames delimit their payload
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TextFraming {
    /// `TEXT:<len>:<bytes>`, reassembled across notifications like binary kinds
    #[default]
    LengthPrefixed,
    /// `TEXT:<bytes>`, the text runs to the end of the notification that
    /// completed its header
    ChunkDelimited,
}

/// Codec settings shared by the encoder and decoder
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CodecConfig {
    pub text_framing: TextFraming,
    /// Declared lengths above this are rejected
    pub max_payload_len: usize,
}

impl Default for CodecConfig {
    fn default() -> Self {
        Self {
            text_framing: TextFraming::LengthPrefixed,
            max_payload_len: DEFAULT_MAX_PAYLOAD_LEN,
        }
    }
}

impl CodecConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_text_framing(mut self, framing: TextFraming) -> Self {
        self.text_framing = framing;
        self
    }

    pub fn with_max_payload_len(mut self, max: usize) -> Self {
        self.max_payload_len = max;
        self
    }
}

// ----------------------------------------------------------------------------
// Encoder
// ----------------------------------------------------------------------------

/// Serializes outbound frames into wire bytes
#[derive(Debug, Clone, Default)]
pub struct FrameCodec {
    config: CodecConfig,
}

impl FrameCodec {
    pub fn new(config: CodecConfig) -> Self {
        Self { config }
    }

    /// Codec speaking the unframed `TEXT:` convention of older peer firmware
    pub fn legacy() -> Self {
        Self::new(CodecConfig::default().with_text_framing(TextFraming::ChunkDelimited))
    }

    pub fn config(&self) -> &CodecConfig {
        &self.config
    }

    /// A decoder with the same settings as this codec
    pub fn decoder(&self) -> FrameDecoder {
        FrameDecoder::new(self.config.clone())
    }

    /// Serialize a frame into its wire form
    pub fn encode(&self, frame: &OutboundFrame) -> Result<Vec<u8>> {
        let payload = frame.payload();
        if payload.len() > self.config.max_payload_len {
            return Err(FrameError::PayloadTooLarge {
                declared: payload.len(),
                max: self.config.max_payload_len,
            });
        }

        let kind = frame.kind();
        let length = payload.len().to_string();
        let mut bytes = Vec::with_capacity(kind.token().len() + length.len() + 2 + payload.len());
        bytes.extend_from_slice(kind.token());
        bytes.push(SEPARATOR);

        if !self.is_chunk_delimited(kind) {
            bytes.extend_from_slice(length.as_bytes());
            bytes.push(SEPARATOR);
        }

        bytes.extend_from_slice(payload);
        Ok(bytes)
    }

    /// Serialize a frame that will be written in units of `unit` bytes.
    ///
    /// Chunk-delimited text cannot span notifications, so such a frame must
    /// fit into a single unit.
    pub fn encode_for_transfer(&self, frame: &OutboundFrame, unit: usize) -> Result<Vec<u8>> {
        let bytes = self.encode(frame)?;
        if self.is_chunk_delimited(frame.kind()) && bytes.len() > unit {
            return Err(FrameError::FrameTooLarge {
                size: bytes.len(),
                max: unit,
            });
        }
        Ok(bytes)
    }

    fn is_chunk_delimited(&self, kind: FrameKind) -> bool {
        kind == FrameKind::Text && self.config.text_framing == TextFraming::ChunkDelimited
    }
}

// ----------------------------------------------------------------------------
// Streaming Decoder
// ----------------------------------------------------------------------------

#[derive(Debug)]
enum DecodeState {
    /// Accumulating the kind token up to the first separator
    Kind { token: Vec<u8> },
    /// Accumulating decimal length digits up to the second separator
    Length { kind: FrameKind, digits: Vec<u8> },
    /// Accumulating payload bytes until `remaining` reaches zero
    Payload {
        kind: FrameKind,
        remaining: usize,
        payload: Vec<u8>,
    },
}

impl DecodeState {
    fn start() -> Self {
        DecodeState::Kind { token: Vec::new() }
    }
}

/// Outcome of feeding one byte to a header state
enum Step {
    Continue,
    Next(DecodeState),
    Emit(DecodedMessage),
    /// Header is malformed; drop the rest of this notification
    Fail(FrameError),
}

/// Reassembles frames from a sequence of inbound notification buffers.
///
/// Buffers are treated as one concatenated stream. A malformed header
/// produces an error, the remainder of the offending buffer is discarded and
/// parsing restarts with the next buffer.
#[derive(Debug)]
pub struct FrameDecoder {
    config: CodecConfig,
    state: DecodeState,
}

impl Default for FrameDecoder {
    fn default() -> Self {
        Self::new(CodecConfig::default())
    }
}

impl FrameDecoder {
    pub fn new(config: CodecConfig) -> Self {
        Self {
            config,
            state: DecodeState::start(),
        }
    }

    /// Drop any partially received frame
    pub fn reset(&mut self) {
        self.state = DecodeState::start();
    }

    /// True when no frame is partially received
    pub fn is_idle(&self) -> bool {
        matches!(&self.state, DecodeState::Kind { token } if token.is_empty())
    }

    /// Payload bytes still owed to the frame in progress
    pub fn bytes_outstanding(&self) -> usize {
        match &self.state {
            DecodeState::Payload { remaining, .. } => *remaining,
            _ => 0,
        }
    }

    /// Feed one notification buffer, returning every frame completed by it
    /// and every error encountered, in stream order.
    pub fn push(&mut self, chunk: &[u8]) -> Vec<Result<DecodedMessage>> {
        let mut results = Vec::new();
        let mut pos = 0;

        while pos < chunk.len() {
            if let DecodeState::Payload {
                remaining, payload, ..
            } = &mut self.state
            {
                let take = (*remaining).min(chunk.len() - pos);
                payload.extend_from_slice(&chunk[pos..pos + take]);
                *remaining -= take;
                pos += take;

                if *remaining == 0 {
                    if let DecodeState::Payload { kind, payload, .. } =
                        std::mem::replace(&mut self.state, DecodeState::start())
                    {
                        debug!(%kind, len = payload.len(), "Frame complete");
                        results.push(Ok(DecodedMessage::new(kind, payload)));
                    }
                }
                continue;
            }

            let byte = chunk[pos];
            pos += 1;

            match self.step(byte) {
                Step::Continue => {}
                Step::Next(state) => self.state = state,
                Step::Emit(message) => {
                    results.push(Ok(message));
                    self.state = DecodeState::start();
                }
                Step::Fail(error) => {
                    let discarded = &chunk[pos..];
                    warn!(
                        %error,
                        discarded = discarded.len(),
                        preview = %hex::encode(&discarded[..discarded.len().min(DISCARD_PREVIEW_LEN)]),
                        "Discarding malformed frame bytes"
                    );
                    results.push(Err(error));
                    self.state = DecodeState::start();
                    pos = chunk.len();
                }
            }

            // Chunk-delimited text takes whatever is left of this buffer
            if let DecodeState::Length {
                kind: FrameKind::Text,
                digits,
            } = &self.state
            {
                if digits.is_empty() && self.config.text_framing == TextFraming::ChunkDelimited {
                    let text = chunk[pos..].to_vec();
                    pos = chunk.len();
                    results.push(Ok(DecodedMessage::new(FrameKind::Text, text)));
                    self.state = DecodeState::start();
                }
            }
        }

        results
    }

    fn step(&mut self, byte: u8) -> Step {
        match &mut self.state {
            DecodeState::Kind { token } => {
                if byte == SEPARATOR {
                    return match FrameKind::from_token(token) {
                        Some(kind) => Step::Next(DecodeState::Length {
                            kind,
                            digits: Vec::new(),
                        }),
                        None => Step::Fail(FrameError::unknown_kind(token)),
                    };
                }
                token.push(byte);
                if FrameKind::is_token_prefix(token) {
                    Step::Continue
                } else {
                    Step::Fail(FrameError::unknown_kind(token))
                }
            }
            DecodeState::Length { kind, digits } => {
                if byte == SEPARATOR {
                    let kind = *kind;
                    return match parse_length(digits, self.config.max_payload_len) {
                        Ok(0) => Step::Emit(DecodedMessage::new(kind, Vec::new())),
                        Ok(len) => Step::Next(DecodeState::Payload {
                            kind,
                            remaining: len,
                            payload: Vec::with_capacity(len.min(MAX_PREALLOCATION)),
                        }),
                        Err(error) => Step::Fail(error),
                    };
                }
                digits.push(byte);
                if !byte.is_ascii_digit() || digits.len() > MAX_LENGTH_DIGITS {
                    return Step::Fail(FrameError::invalid_length(digits));
                }
                Step::Continue
            }
            DecodeState::Payload { .. } => Step::Continue,
        }
    }
}

fn parse_length(digits: &[u8], max: usize) -> Result<usize> {
    if digits.is_empty() || (digits.len() > 1 && digits[0] == b'0') {
        return Err(FrameError::invalid_length(digits));
    }

    let declared = std::str::from_utf8(digits)
        .ok()
        .and_then(|s| s.parse::<usize>().ok())
        .ok_or_else(|| FrameError::invalid_length(digits))?;

    if declared > max {
        return Err(FrameError::PayloadTooLarge { declared, max });
    }
    Ok(declared)
}
