//! Cryptographic identity and end-to-end encryption for gossamer.
//!
//! A node's identity is a long-lived Ed25519 keypair; the public key *is*
//! the peer's network identity. This crate derives per-peer AES-256-GCM
//! keys from that identity via a static X25519 exchange, signs and verifies
//! gossip envelopes, persists the identity key (optionally wrapped with a
//! password-derived AEAD), and mints the self-signed TLS certificate the
//! transport presents.

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod engine;
pub mod error;
pub mod identity;
pub mod keystore;

pub use engine::Engine;
pub use error::CryptoError;
pub use identity::{sha256, sha256_hex, verify_envelope, verify_signature, Identity, PeerId};
pub use keystore::KeyStore;
