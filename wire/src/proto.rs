//! Protobuf message types for the gossip overlay.
//!
//! Messages are declared with prost derives rather than generated from a
//! `.proto` file; field tags are part of the wire contract and must not be
//! renumbered.

/// Signed outer wrapper for every gossip payload.
///
/// `data` is a serialized [`MessageData`]; `signature` is Ed25519 over
/// `data` by the key in `pub_key`. The dispatcher verifies the signature
/// before any routing happens.
#[derive(Clone, PartialEq, ::prost::Message)]
pub struct Envelope {
    /// Author's 32-byte Ed25519 public key
    #[prost(bytes = "vec", tag = "1")]
    pub pub_key: Vec<u8>,
    /// Serialized MessageData
    #[prost(bytes = "vec", tag = "2")]
    pub data: Vec<u8>,
    /// 64-byte Ed25519 signature over `data`
    #[prost(bytes = "vec", tag = "3")]
    pub signature: Vec<u8>,
}

/// Application message with routing metadata and a tagged payload.
#[derive(Clone, PartialEq, ::prost::Message)]
pub struct MessageData {
    /// Unique id used for gossip deduplication
    #[prost(string, tag = "1")]
    pub message_id: ::prost::alloc::string::String,
    /// Originating node's 32-byte public key
    #[prost(bytes = "vec", tag = "2")]
    pub origin_id: Vec<u8>,
    /// Target node's 32-byte public key
    #[prost(bytes = "vec", tag = "3")]
    pub target_id: Vec<u8>,
    /// Creation time, nanoseconds since the Unix epoch
    #[prost(uint64, tag = "4")]
    pub timestamp: u64,
    /// Remaining forwarding budget; decremented at every hop
    #[prost(uint32, tag = "5")]
    pub hop_limit: u32,
    /// Tagged payload
    #[prost(oneof = "message_data::Payload", tags = "6, 7, 8, 9, 10")]
    pub payload: Option<message_data::Payload>,
}

/// Nested types for [`MessageData`].
pub mod message_data {
    /// Payload variants carried by a [`super::MessageData`].
    #[derive(Clone, PartialEq, ::prost::Oneof)]
    pub enum Payload {
        /// End-to-end encrypted chat message
        #[prost(message, tag = "6")]
        ChatMessage(super::ChatMessage),
        /// Handshake nonce challenge
        #[prost(message, tag = "7")]
        HandshakeInit(super::HandshakeInit),
        /// Handshake proof of possession
        #[prost(message, tag = "8")]
        HandshakeResponse(super::HandshakeResponse),
        /// Peer directory request
        #[prost(message, tag = "9")]
        PeerRequest(super::PeerRequest),
        /// Peer directory response
        #[prost(message, tag = "10")]
        PeerResponse(super::PeerResponse),
    }
}

/// AEAD ciphertext addressed to a single recipient.
#[derive(Clone, PartialEq, ::prost::Message)]
pub struct ChatMessage {
    /// `nonce || ciphertext || tag` under the pairwise AES-GCM key
    #[prost(bytes = "vec", tag = "1")]
    pub encrypted_payload: Vec<u8>,
}

/// First half of the mutual handshake: a fresh random challenge.
#[derive(Clone, PartialEq, ::prost::Message)]
pub struct HandshakeInit {
    /// 32 random bytes
    #[prost(bytes = "vec", tag = "1")]
    pub nonce: Vec<u8>,
}

/// Second half of the mutual handshake: signature over `nonce || pub_key`.
#[derive(Clone, PartialEq, ::prost::Message)]
pub struct HandshakeResponse {
    /// Responder's 32-byte Ed25519 public key
    #[prost(bytes = "vec", tag = "1")]
    pub pub_key: Vec<u8>,
    /// Ed25519 signature over the challenger's nonce concatenated with
    /// `pub_key`
    #[prost(bytes = "vec", tag = "2")]
    pub signature: Vec<u8>,
    /// Protocol version string
    #[prost(string, tag = "3")]
    pub version: ::prost::alloc::string::String,
}

/// Request for up to `count` known peers.
#[derive(Clone, PartialEq, ::prost::Message)]
pub struct PeerRequest {
    /// Maximum number of peers wanted
    #[prost(uint32, tag = "1")]
    pub count: u32,
}

/// Directory answer to a [`PeerRequest`].
#[derive(Clone, PartialEq, ::prost::Message)]
pub struct PeerResponse {
    /// Known peers, at most the requested count
    #[prost(message, repeated, tag = "1")]
    pub peers: Vec<PeerInfo>,
}

/// A single advertised peer.
#[derive(Clone, PartialEq, ::prost::Message)]
pub struct PeerInfo {
    /// Peer's 32-byte Ed25519 public key
    #[prost(bytes = "vec", tag = "1")]
    pub pub_key: Vec<u8>,
    /// Last known dialable address
    #[prost(string, tag = "2")]
    pub address: ::prost::alloc::string::String,
}

/// Persisted peer directory record, stored under `saved:peers:<sha256(pub)>`.
#[derive(Clone, PartialEq, ::prost::Message)]
pub struct PeerStoreEntry {
    /// Peer's 32-byte Ed25519 public key
    #[prost(bytes = "vec", tag = "1")]
    pub pub_key: Vec<u8>,
    /// Last address a session was established with
    #[prost(string, tag = "2")]
    pub last_known_addr: ::prost::alloc::string::String,
    /// Nanoseconds since the Unix epoch of the last successful connection
    #[prost(uint64, tag = "3")]
    pub last_seen: u64,
    /// Naive trust bookkeeping, 0..=100
    #[prost(uint32, tag = "4")]
    pub trust_score: u32,
}

#[cfg(test)]
mod tests {
    use super::*;
    use prost::Message;

    #[test]
    fn test_envelope_roundtrip() {
        let env = Envelope {
            pub_key: vec![7u8; 32],
            data: b"inner".to_vec(),
            signature: vec![9u8; 64],
        };

        let bytes = env.encode_to_vec();
        let decoded = Envelope::decode(bytes.as_slice()).unwrap();
        assert_eq!(decoded, env);
    }

    #[test]
    fn test_message_data_payload_variants() {
        let msg = MessageData {
            message_id: "id-1".into(),
            origin_id: vec![1u8; 32],
            target_id: vec![2u8; 32],
            timestamp: 1234,
            hop_limit: 20,
            payload: Some(message_data::Payload::PeerRequest(PeerRequest { count: 5 })),
        };

        let decoded = MessageData::decode(msg.encode_to_vec().as_slice()).unwrap();
        match decoded.payload {
            Some(message_data::Payload::PeerRequest(req)) => assert_eq!(req.count, 5),
            other => panic!("unexpected payload: {other:?}"),
        }
    }

    #[test]
    fn test_garbage_rejected() {
        assert!(Envelope::decode(&[0xFF, 0xFF, 0xFF][..]).is_err());
    }
}
