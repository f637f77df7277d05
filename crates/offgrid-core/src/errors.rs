//! Error types for frame encoding and decoding

use thiserror::Error;

// ----------------------------------------------------------------------------
// Frame Errors
// ----------------------------------------------------------------------------

/// Errors produced by the frame codec.
///
/// None of these are fatal to a stream: the decoder reports the error,
/// discards the rest of the offending notification and resumes parsing at
/// the next one.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum FrameError {
    #[error("Unknown frame kind: {prefix:?}")]
    UnknownFrameKind { prefix: String },

    #[error("Invalid length field: {field:?}")]
    InvalidLength { field: String },

    #[error("Declared payload too large: {declared} bytes (max: {max})")]
    PayloadTooLarge { declared: usize, max: usize },

    #[error("Frame too large for a single transfer unit: {size} bytes (max: {max})")]
    FrameTooLarge { size: usize, max: usize },

    #[error("Text payload is not valid UTF-8")]
    InvalidText,

    #[error("Invalid hardware address: {0}")]
    InvalidAddress(String),
}

impl FrameError {
    pub(crate) fn unknown_kind(prefix: &[u8]) -> Self {
        FrameError::UnknownFrameKind {
            prefix: String::from_utf8_lossy(prefix).into_owned(),
        }
    }

    pub(crate) fn invalid_length(field: &[u8]) -> Self {
        FrameError::InvalidLength {
            field: String::from_utf8_lossy(field).into_owned(),
        }
    }
}

pub type Result<T> = core::result::Result<T, FrameError>;
