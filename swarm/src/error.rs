//! Swarm error types.

use thiserror::Error;

/// Errors from swarm operations and services.
#[derive(Error, Debug)]
pub enum SwarmError {
    /// The addressed peer is not in the active set
    #[error("peer is not connected")]
    PeerNotConnected,

    /// The peer's bounded send queue rejected the message
    #[error("peer send queue unavailable")]
    SendQueue,

    /// Cryptographic failure (encryption, decryption, key handling)
    #[error(transparent)]
    Crypto(#[from] gossamer_crypto::CryptoError),

    /// Persistence failure
    #[error(transparent)]
    Storage(#[from] gossamer_storage::StorageError),

    /// Transport failure
    #[error(transparent)]
    Net(#[from] gossamer_net::NetError),
}
