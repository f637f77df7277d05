//! OffGridChat Core
//!
//! Transport-independent building blocks of the OffGridChat link to a
//! microcontroller peer:
//!
//! - [`types`] - hardware addresses, peripheral identities and frame kinds
//! - [`frame`] - outbound frames and decoded messages
//! - [`codec`] - the `TEXT:` / `PHOTO:<len>:` / `AUDIO:<len>:` wire framing,
//!   with a streaming decoder that reassembles frames across notifications
//! - [`chunking`] - splitting serialized frames into transfer-unit sized writes
//! - [`sink`] - drop-oldest broadcast fan-out of inbound notification buffers
//!
//! ## Usage
//!
//! ```rust
//! use offgrid_core::{FrameCodec, FrameDecoder, OutboundFrame, chunk_payload};
//!
//! let codec = FrameCodec::default();
//! let wire = codec.encode(&OutboundFrame::photo(vec![1, 2, 3, 4, 5])).unwrap();
//!
//! let mut decoder = FrameDecoder::new(codec.config().clone());
//! let mut decoded = Vec::new();
//! for chunk in chunk_payload(&wire, 4) {
//!     decoded.extend(decoder.push(chunk).into_iter().filter_map(Result::ok));
//! }
//! assert_eq!(decoded.len(), 1);
//! assert_eq!(decoded[0].payload(), &[1, 2, 3, 4, 5]);
//! ```

// ----------------------------------------------------------------------------
// Module Declarations
// ----------------------------------------------------------------------------

pub mod chunking;
pub mod codec;
pub mod errors;
pub mod frame;
pub mod sink;
pub mod types;

// ----------------------------------------------------------------------------
// Public API
// ----------------------------------------------------------------------------

pub use chunking::{chunk_payload, DEFAULT_WRITE_CHUNK_SIZE};
pub use codec::{CodecConfig, FrameCodec, FrameDecoder, TextFraming, DEFAULT_MAX_PAYLOAD_LEN};
pub use errors::{FrameError, Result};
pub use frame::{DecodedMessage, OutboundFrame};
pub use sink::{NotificationSink, Subscription, DEFAULT_NOTIFICATION_CAPACITY};
pub use types::{FrameKind, HardwareAddress, PeripheralIdentity};
