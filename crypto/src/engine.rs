//! Pairwise encryption engine.
//!
//! Both directions of a peer pair derive the same AES-256-GCM key: the
//! local Ed25519 private key is mapped to X25519, the peer's Ed25519 public
//! point to its Montgomery form, and the ECDH output is stretched through
//! HKDF-SHA256. Replay protection is a higher-layer concern.

use crate::error::CryptoError;
use crate::identity::{Identity, PUBLIC_KEY_LEN};
use aes_gcm::aead::{Aead, KeyInit};
use aes_gcm::{Aes256Gcm, Key, Nonce};
use ed25519_dalek::VerifyingKey;
use hkdf::Hkdf;
use rand::RngCore;
use sha2::{Digest, Sha256, Sha512};
use x25519_dalek::{PublicKey as X25519Public, StaticSecret};

const HKDF_INFO: &[u8] = b"p2p-messenger-v1-aes-key";
const NONCE_LEN: usize = 12;

/// Derives per-peer symmetric keys from the node identity and seals/opens
/// chat payloads with them.
pub struct Engine {
    dh_secret: StaticSecret,
}

impl Engine {
    /// Build the engine from the node identity.
    pub fn new(identity: &Identity) -> Self {
        // RFC 8032 secret-scalar derivation: SHA-512 of the 32-byte seed,
        // lower half clamped.
        let seed = identity.signing_key().to_bytes();
        let digest = Sha512::digest(seed);

        let mut scalar = [0u8; 32];
        scalar.copy_from_slice(&digest[..32]);
        scalar[0] &= 248;
        scalar[31] &= 127;
        scalar[31] |= 64;

        Self {
            dh_secret: StaticSecret::from(scalar),
        }
    }

    /// Derive the shared AES key for a peer identified by its Ed25519
    /// public key.
    pub fn compute_shared_key(&self, peer_ed_pub: &[u8]) -> Result<[u8; 32], CryptoError> {
        let pub_arr: &[u8; PUBLIC_KEY_LEN] =
            peer_ed_pub.try_into().map_err(|_| CryptoError::InvalidKey)?;
        let verifying = VerifyingKey::from_bytes(pub_arr).map_err(|_| CryptoError::InvalidKey)?;

        let montgomery = verifying.to_montgomery();
        let their_pub = X25519Public::from(montgomery.to_bytes());

        let shared = self.dh_secret.diffie_hellman(&their_pub);
        if !shared.was_contributory() {
            return Err(CryptoError::KeyDerivation);
        }

        let hk = Hkdf::<Sha256>::new(None, shared.as_bytes());
        let mut key = [0u8; 32];
        hk.expand(HKDF_INFO, &mut key)
            .map_err(|_| CryptoError::KeyDerivation)?;

        Ok(key)
    }

    /// Encrypt a plaintext to a recipient. Output is `nonce || ciphertext
    /// || tag`; the nonce is fresh per call, so repeated encryptions of the
    /// same plaintext differ.
    pub fn encrypt(&self, plaintext: &[u8], recipient_ed_pub: &[u8]) -> Result<Vec<u8>, CryptoError> {
        let key = self.compute_shared_key(recipient_ed_pub)?;
        let cipher = Aes256Gcm::new(Key::<Aes256Gcm>::from_slice(&key));

        let mut nonce = [0u8; NONCE_LEN];
        rand::rngs::OsRng.fill_bytes(&mut nonce);

        let ciphertext = cipher
            .encrypt(Nonce::from_slice(&nonce), plaintext)
            .map_err(|_| CryptoError::Decryption)?;

        let mut out = Vec::with_capacity(NONCE_LEN + ciphertext.len());
        out.extend_from_slice(&nonce);
        out.extend_from_slice(&ciphertext);
        Ok(out)
    }

    /// Decrypt a `nonce || ciphertext || tag` blob from a sender.
    pub fn decrypt(&self, ciphertext: &[u8], sender_ed_pub: &[u8]) -> Result<Vec<u8>, CryptoError> {
        if ciphertext.len() < NONCE_LEN {
            return Err(CryptoError::Decryption);
        }

        let key = self.compute_shared_key(sender_ed_pub)?;
        let cipher = Aes256Gcm::new(Key::<Aes256Gcm>::from_slice(&key));

        let (nonce, body) = ciphertext.split_at(NONCE_LEN);
        cipher
            .decrypt(Nonce::from_slice(nonce), body)
            .map_err(|_| CryptoError::Decryption)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_shared_key_is_symmetric() {
        let a = Identity::generate();
        let b = Identity::generate();

        let key_ab = Engine::new(&a)
            .compute_shared_key(&b.public_key_bytes())
            .unwrap();
        let key_ba = Engine::new(&b)
            .compute_shared_key(&a.public_key_bytes())
            .unwrap();

        assert_eq!(key_ab, key_ba);
    }

    #[test]
    fn test_distinct_pairs_distinct_keys() {
        let a = Identity::generate();
        let b = Identity::generate();
        let c = Identity::generate();

        let engine = Engine::new(&a);
        let key_ab = engine.compute_shared_key(&b.public_key_bytes()).unwrap();
        let key_ac = engine.compute_shared_key(&c.public_key_bytes()).unwrap();

        assert_ne!(key_ab, key_ac);
    }

    #[test]
    fn test_encrypt_decrypt_roundtrip() {
        let sender = Identity::generate();
        let recipient = Identity::generate();

        let ciphertext = Engine::new(&sender)
            .encrypt(b"hello", &recipient.public_key_bytes())
            .unwrap();
        let plaintext = Engine::new(&recipient)
            .decrypt(&ciphertext, &sender.public_key_bytes())
            .unwrap();

        assert_eq!(plaintext, b"hello");
    }

    #[test]
    fn test_ciphertext_differs_per_call() {
        let sender = Identity::generate();
        let recipient = Identity::generate();
        let engine = Engine::new(&sender);

        let c1 = engine.encrypt(b"same", &recipient.public_key_bytes()).unwrap();
        let c2 = engine.encrypt(b"same", &recipient.public_key_bytes()).unwrap();

        assert_ne!(c1, c2);
    }

    #[test]
    fn test_third_party_cannot_decrypt() {
        let sender = Identity::generate();
        let recipient = Identity::generate();
        let eavesdropper = Identity::generate();

        let ciphertext = Engine::new(&sender)
            .encrypt(b"secret", &recipient.public_key_bytes())
            .unwrap();

        let result = Engine::new(&eavesdropper).decrypt(&ciphertext, &sender.public_key_bytes());
        assert!(matches!(result, Err(CryptoError::Decryption)));
    }

    #[test]
    fn test_short_ciphertext_rejected() {
        let a = Identity::generate();
        let b = Identity::generate();

        let result = Engine::new(&a).decrypt(&[0u8; 5], &b.public_key_bytes());
        assert!(matches!(result, Err(CryptoError::Decryption)));
    }

    #[test]
    fn test_invalid_peer_point_rejected() {
        let a = Identity::generate();
        // Not a valid Edwards point encoding.
        let bogus = [0xFFu8; 32];
        assert!(Engine::new(&a).compute_shared_key(&bogus).is_err());
    }
}
