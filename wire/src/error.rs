//! Wire protocol error types.

use thiserror::Error;

/// Wire protocol errors
#[derive(Error, Debug)]
pub enum WireError {
    /// Frame shorter than the type byte
    #[error("empty frame")]
    Empty,

    /// Size limit exceeded
    #[error("size limit exceeded: {0}")]
    Size(usize),

    /// Payload too large for an unreliable datagram
    #[error("datagram payload too large: {0}")]
    DatagramTooLarge(usize),

    /// Protobuf decode failure
    #[error("protobuf decode failed")]
    Decode(#[from] prost::DecodeError),

    /// Underlying stream I/O error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}
