//! Crypto error types.

use thiserror::Error;

/// Cryptographic operation errors.
///
/// Decryption failures carry no detail on purpose: neither key material nor
/// plaintext fragments may surface through error values.
#[derive(Error, Debug)]
pub enum CryptoError {
    /// Malformed or rejected public/private key
    #[error("invalid key")]
    InvalidKey,

    /// Signature did not verify
    #[error("invalid signature")]
    Signature,

    /// AEAD open failed: wrong key, tampering, or short ciphertext
    #[error("decryption failed")]
    Decryption,

    /// Shared-secret derivation was rejected (non-contributory exchange)
    #[error("key derivation failed")]
    KeyDerivation,

    /// TLS certificate generation failed
    #[error("certificate generation failed: {0}")]
    Certificate(String),

    /// Persisted key material could not be decoded
    #[error("stored key material malformed")]
    MalformedKeyFile,

    /// Key-value store failure
    #[error(transparent)]
    Storage(#[from] gossamer_storage::StorageError),
}
