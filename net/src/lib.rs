//! QUIC transport, authentication handshake, and per-session loops.
//!
//! This crate turns anonymous QUIC sessions into identity-bound peers. The
//! TLS layer only carries a self-signed certificate whose CommonName is the
//! claimed identity; the proof of possession happens in the nonce-challenge
//! handshake run over the first bidirectional stream of every session.
//! Authenticated sessions are surfaced as [`NewSessionEvent`]s for the
//! swarm to register.

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod error;
pub mod handshake;
pub mod peer_link;
pub mod tls;
pub mod transport;

pub use error::NetError;
pub use peer_link::{DataSink, PeerLink};
pub use transport::{NewSessionEvent, Transport};

use quinn::VarInt;

/// Application close codes carried in the QUIC CONNECTION_CLOSE frame.
pub mod close_code {
    use super::VarInt;

    /// Clean shutdown
    pub const NO_ERROR: VarInt = VarInt::from_u32(0);
    /// Malformed frame or message
    pub const PROTOCOL_VIOLATION: VarInt = VarInt::from_u32(1);
    /// Abusive traffic
    pub const SPAM_DETECTED: VarInt = VarInt::from_u32(2);
    /// Stream-level failure
    pub const STREAM_ERROR: VarInt = VarInt::from_u32(3);
    /// Handshake verification failed
    pub const AUTH_FAILED: VarInt = VarInt::from_u32(4);
    /// Deliberate session close
    pub const NORMAL_CLOSE: VarInt = VarInt::from_u32(5);
}

/// ALPN protocol identifier for the gossip overlay.
pub const ALPN: &[u8] = b"my-gossip-protocol";

/// Dial timeout.
pub const DIAL_TIMEOUT: std::time::Duration = std::time::Duration::from_secs(3);
/// Unidirectional stream open deadline for outgoing messages.
pub const STREAM_OPEN_TIMEOUT: std::time::Duration = std::time::Duration::from_secs(2);
/// Per-frame write deadline for outgoing messages.
pub const WRITE_TIMEOUT: std::time::Duration = std::time::Duration::from_secs(1);
