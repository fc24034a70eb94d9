//! Wire protocol framing and message types for the gossamer overlay.
//!
//! This crate provides the low-level wire protocol shared by every peer:
//! length-prefixed typed frames carried over stream transports or packed
//! into unreliable datagrams, plus the protobuf message types exchanged
//! inside those frames.
//!
//! ## Wire Format
//!
//! ```text
//! +----------------------+----------------------------+
//! | u32 length (BE)      | length of bytes that follow|
//! +----------------------+----------------------------+
//! | u8 frame type        | see FrameType              |
//! +----------------------+----------------------------+
//! | payload              | length - 1 bytes           |
//! +----------------------+----------------------------+
//! ```
//!
//! The same layout is used for datagram frames, with the payload capped at
//! [`MAX_DATAGRAM_PAYLOAD`] so a frame fits in a single unreliable datagram
//! without fragmentation.

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod error;
pub mod frame;
pub mod proto;

pub use error::WireError;
pub use frame::{
    decode_datagram, encode_datagram, read_frame, write_frame, FrameType, MAX_DATAGRAM_PAYLOAD,
    MAX_FRAME_SIZE,
};
pub use proto::{
    message_data, ChatMessage, Envelope, HandshakeInit, HandshakeResponse, MessageData, PeerInfo,
    PeerRequest, PeerResponse, PeerStoreEntry,
};
