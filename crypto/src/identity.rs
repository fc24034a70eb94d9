//! Node identity: Ed25519 keypair, peer ids, envelope signing, TLS cert.

use crate::error::CryptoError;
use ed25519_dalek::pkcs8::EncodePrivateKey;
use ed25519_dalek::{Signature, Signer, SigningKey, Verifier, VerifyingKey};
use gossamer_wire::{Envelope, MessageData};
use prost::Message;
use rustls::pki_types::{CertificateDer, PrivateKeyDer, PrivatePkcs8KeyDer};
use sha2::{Digest, Sha256};
use std::fmt;

/// Ed25519 public key length.
pub const PUBLIC_KEY_LEN: usize = 32;
/// Ed25519 signature length.
pub const SIGNATURE_LEN: usize = 64;

/// SHA-256 of arbitrary bytes.
pub fn sha256(data: &[u8]) -> [u8; 32] {
    Sha256::digest(data).into()
}

/// Hex-encoded SHA-256 of arbitrary bytes.
pub fn sha256_hex(data: &[u8]) -> String {
    hex::encode(sha256(data))
}

/// In-memory map key for a peer: SHA-256 of its identity public key.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct PeerId([u8; 32]);

impl PeerId {
    /// Derive the peer id from an identity public key.
    pub fn from_public_key(pub_key: &[u8]) -> Self {
        Self(sha256(pub_key))
    }

    /// Raw hash bytes.
    pub fn as_bytes(&self) -> &[u8; 32] {
        &self.0
    }

    /// Hex form, used in ban keys and logs.
    pub fn to_hex(&self) -> String {
        hex::encode(self.0)
    }
}

impl fmt::Display for PeerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_hex())
    }
}

impl fmt::Debug for PeerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "PeerId({}…)", &self.to_hex()[..8])
    }
}

/// The node's long-lived signing identity.
#[derive(Clone)]
pub struct Identity {
    signing: SigningKey,
}

impl Identity {
    /// Generate a fresh random identity.
    pub fn generate() -> Self {
        let mut csprng = rand::rngs::OsRng;
        Self {
            signing: SigningKey::generate(&mut csprng),
        }
    }

    /// Reconstruct an identity from the 64-byte keypair form.
    pub fn from_keypair_bytes(bytes: &[u8]) -> Result<Self, CryptoError> {
        let arr: &[u8; 64] = bytes.try_into().map_err(|_| CryptoError::InvalidKey)?;
        let signing = SigningKey::from_keypair_bytes(arr).map_err(|_| CryptoError::InvalidKey)?;
        Ok(Self { signing })
    }

    /// 64-byte keypair form (seed followed by public key) for persistence.
    pub fn to_keypair_bytes(&self) -> [u8; 64] {
        self.signing.to_keypair_bytes()
    }

    /// The 32-byte public key naming this node on the network.
    pub fn public_key_bytes(&self) -> [u8; 32] {
        self.signing.verifying_key().to_bytes()
    }

    /// SHA-256 of the public key, the active-peer map key.
    pub fn peer_id(&self) -> PeerId {
        PeerId::from_public_key(&self.public_key_bytes())
    }

    /// Borrow the signing key (the crypto engine derives from it).
    pub fn signing_key(&self) -> &SigningKey {
        &self.signing
    }

    /// Sign a payload with the identity key.
    pub fn sign(&self, payload: &[u8]) -> [u8; 64] {
        self.signing.sign(payload).to_bytes()
    }

    /// Wrap a [`MessageData`] in a signed [`Envelope`].
    pub fn seal_envelope(&self, msg: &MessageData) -> Envelope {
        let data = msg.encode_to_vec();
        let signature = self.sign(&data).to_vec();
        Envelope {
            pub_key: self.public_key_bytes().to_vec(),
            data,
            signature,
        }
    }

    /// Mint the self-signed TLS certificate whose CommonName is the hex
    /// public key. The chain is never validated by peers; it only carries
    /// the claimed identity, which the handshake then proves.
    pub fn tls_certificate(
        &self,
    ) -> Result<(CertificateDer<'static>, PrivateKeyDer<'static>), CryptoError> {
        let pkcs8 = self
            .signing
            .to_pkcs8_der()
            .map_err(|e| CryptoError::Certificate(e.to_string()))?;
        let key_pair = rcgen::KeyPair::try_from(pkcs8.as_bytes())
            .map_err(|e| CryptoError::Certificate(e.to_string()))?;

        let mut params = rcgen::CertificateParams::new(vec!["gossamer".to_string()])
            .map_err(|e| CryptoError::Certificate(e.to_string()))?;
        let mut dn = rcgen::DistinguishedName::new();
        dn.push(
            rcgen::DnType::CommonName,
            hex::encode(self.public_key_bytes()),
        );
        dn.push(rcgen::DnType::OrganizationName, "gossamer-p2p");
        params.distinguished_name = dn;

        let cert = params
            .self_signed(&key_pair)
            .map_err(|e| CryptoError::Certificate(e.to_string()))?;

        let key = PrivateKeyDer::Pkcs8(PrivatePkcs8KeyDer::from(pkcs8.as_bytes().to_vec()));
        Ok((cert.der().clone(), key))
    }
}

impl fmt::Debug for Identity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Identity({})", hex::encode(self.public_key_bytes()))
    }
}

/// Verify an Ed25519 signature. Empty or malformed inputs verify as false.
pub fn verify_signature(pub_key: &[u8], payload: &[u8], signature: &[u8]) -> bool {
    if signature.is_empty() {
        return false;
    }
    let Ok(pub_arr) = <&[u8; PUBLIC_KEY_LEN]>::try_from(pub_key) else {
        return false;
    };
    let Ok(verifying) = VerifyingKey::from_bytes(pub_arr) else {
        return false;
    };
    let Ok(sig) = Signature::from_slice(signature) else {
        return false;
    };
    verifying.verify(payload, &sig).is_ok()
}

/// Check an envelope: 32-byte key and a valid signature over its data.
pub fn verify_envelope(env: &Envelope) -> bool {
    env.pub_key.len() == PUBLIC_KEY_LEN
        && verify_signature(&env.pub_key, &env.data, &env.signature)
}
