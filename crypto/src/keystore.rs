//! Identity key persistence.
//!
//! The identity lives in the key-value store under `secret:keys`. Without a
//! password the value is a JSON document with hex-encoded key material;
//! with a password the private key is wrapped with XChaCha20-Poly1305 under
//! an Argon2id-derived key and stored as a protobuf record. A wrong
//! password surfaces as a decryption failure carrying no key material.

use crate::error::CryptoError;
use crate::identity::Identity;
use argon2::{Algorithm, Argon2, Params, Version};
use chacha20poly1305::aead::{Aead, KeyInit};
use chacha20poly1305::{Key, XChaCha20Poly1305, XNonce};
use gossamer_storage::{Kv, KvHandle};
use prost::Message;
use rand::RngCore;
use serde::{Deserialize, Serialize};
use tracing::info;

/// KV key holding the identity material.
pub const IDENTITY_KEY: &[u8] = b"secret:keys";

const SALT_LEN: usize = 16;
const NONCE_LEN: usize = 24;
const ARGON2_M_COST_KIB: u32 = 65536;
const ARGON2_T_COST: u32 = 1;
const ARGON2_P_COST: u32 = 4;

#[derive(Serialize, Deserialize)]
struct PlainKeyFile {
    private_key_hex: String,
    public_key_hex: String,
}

/// Password-wrapped identity record.
#[derive(Clone, PartialEq, ::prost::Message)]
struct EncryptedIdentity {
    /// Argon2id salt, 16 bytes
    #[prost(bytes = "vec", tag = "1")]
    salt: Vec<u8>,
    /// XChaCha20-Poly1305 nonce, 24 bytes
    #[prost(bytes = "vec", tag = "2")]
    nonce: Vec<u8>,
    /// AEAD ciphertext of the 64-byte keypair
    #[prost(bytes = "vec", tag = "3")]
    encrypted_key: Vec<u8>,
    /// Wrapping algorithm marker
    #[prost(string, tag = "4")]
    algorithm: String,
}

const WRAP_ALGORITHM: &str = "argon2id-xchacha20poly1305";

/// Loads the node identity from storage, generating and persisting one on
/// first run.
pub struct KeyStore {
    kv: KvHandle,
    password: Option<String>,
}

impl KeyStore {
    /// Plaintext key store.
    pub fn new(kv: KvHandle) -> Self {
        Self { kv, password: None }
    }

    /// Password-protected key store.
    pub fn with_password(kv: KvHandle, password: impl Into<String>) -> Self {
        Self {
            kv,
            password: Some(password.into()),
        }
    }

    /// Load the identity, or generate and persist a fresh one if none is
    /// stored yet.
    pub async fn get_or_generate(&self) -> Result<Identity, CryptoError> {
        match self.kv.get(IDENTITY_KEY).await? {
            Some(stored) => self.decode(&stored),
            None => {
                let identity = Identity::generate();
                info!(
                    "generated new node identity {}",
                    hex::encode(identity.public_key_bytes())
                );
                let encoded = self.encode(&identity)?;
                self.kv.put(IDENTITY_KEY, &encoded).await?;
                Ok(identity)
            }
        }
    }

    fn encode(&self, identity: &Identity) -> Result<Vec<u8>, CryptoError> {
        match &self.password {
            None => {
                let file = PlainKeyFile {
                    private_key_hex: hex::encode(identity.to_keypair_bytes()),
                    public_key_hex: hex::encode(identity.public_key_bytes()),
                };
                serde_json::to_vec(&file).map_err(|_| CryptoError::MalformedKeyFile)
            }
            Some(password) => {
                let mut salt = [0u8; SALT_LEN];
                let mut nonce = [0u8; NONCE_LEN];
                rand::rngs::OsRng.fill_bytes(&mut salt);
                rand::rngs::OsRng.fill_bytes(&mut nonce);

                let key = derive_wrapping_key(password.as_bytes(), &salt)?;
                let cipher = XChaCha20Poly1305::new(Key::from_slice(&key));
                let encrypted_key = cipher
                    .encrypt(XNonce::from_slice(&nonce), &identity.to_keypair_bytes()[..])
                    .map_err(|_| CryptoError::Decryption)?;

                let record = EncryptedIdentity {
                    salt: salt.to_vec(),
                    nonce: nonce.to_vec(),
                    encrypted_key,
                    algorithm: WRAP_ALGORITHM.to_string(),
                };
                Ok(record.encode_to_vec())
            }
        }
    }

    fn decode(&self, stored: &[u8]) -> Result<Identity, CryptoError> {
        match &self.password {
            None => {
                let file: PlainKeyFile =
                    serde_json::from_slice(stored).map_err(|_| CryptoError::MalformedKeyFile)?;
                let keypair =
                    hex::decode(&file.private_key_hex).map_err(|_| CryptoError::MalformedKeyFile)?;
                Identity::from_keypair_bytes(&keypair)
            }
            Some(password) => {
                let record = EncryptedIdentity::decode(stored)
                    .map_err(|_| CryptoError::MalformedKeyFile)?;
                if record.salt.len() != SALT_LEN || record.nonce.len() != NONCE_LEN {
                    return Err(CryptoError::MalformedKeyFile);
                }

                let key = derive_wrapping_key(password.as_bytes(), &record.salt)?;
                let cipher = XChaCha20Poly1305::new(Key::from_slice(&key));
                let keypair = cipher
                    .decrypt(
                        XNonce::from_slice(&record.nonce),
                        record.encrypted_key.as_slice(),
                    )
                    .map_err(|_| CryptoError::Decryption)?;

                Identity::from_keypair_bytes(&keypair)
            }
        }
    }
}

fn derive_wrapping_key(password: &[u8], salt: &[u8]) -> Result<[u8; 32], CryptoError> {
    let params = Params::new(ARGON2_M_COST_KIB, ARGON2_T_COST, ARGON2_P_COST, Some(32))
        .map_err(|_| CryptoError::KeyDerivation)?;
    let argon2 = Argon2::new(Algorithm::Argon2id, Version::V0x13, params);

    let mut key = [0u8; 32];
    argon2
        .hash_password_into(password, salt, &mut key)
        .map_err(|_| CryptoError::KeyDerivation)?;
    Ok(key)
}
