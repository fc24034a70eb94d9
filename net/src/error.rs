//! Network error types.

use thiserror::Error;

/// Transport and session errors.
#[derive(Error, Debug)]
pub enum NetError {
    /// Peer failed the authentication handshake
    #[error("authentication failed: {0}")]
    AuthFailed(String),

    /// Operation exceeded its deadline
    #[error("timed out")]
    Timeout,

    /// TLS configuration failure
    #[error("TLS setup failed: {0}")]
    Tls(String),

    /// Wire framing failure
    #[error(transparent)]
    Wire(#[from] gossamer_wire::WireError),

    /// Connection could not be initiated
    #[error("connect failed: {0}")]
    Connect(#[from] quinn::ConnectError),

    /// Established connection failed
    #[error("connection lost: {0}")]
    Connection(#[from] quinn::ConnectionError),

    /// Stream write failure
    #[error("stream write failed: {0}")]
    Write(#[from] quinn::WriteError),

    /// Datagram could not be sent
    #[error("datagram send failed: {0}")]
    Datagram(#[from] quinn::SendDatagramError),

    /// Socket-level failure
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}
