//! Mutual nonce-challenge handshake.
//!
//! Both ends run the same sequence over the session's first bidirectional
//! stream: send a fresh 32-byte challenge, answer the peer's challenge with
//! a signature over `nonce || own_public_key`, then verify the peer's
//! answer against the nonce originally sent. The 32-byte identity returned
//! here is the one the peer must sign gossip envelopes with.

use crate::error::NetError;
use gossamer_crypto::{verify_signature, Identity};
use gossamer_wire::{
    message_data, read_frame, write_frame, FrameType, HandshakeInit, HandshakeResponse,
    MessageData,
};
use prost::Message;
use rand::RngCore;
use tokio::io::{AsyncRead, AsyncWrite};
use tracing::debug;

/// Protocol version advertised in handshake responses.
pub const PROTOCOL_VERSION: &str = "1-0-0";

const NONCE_LEN: usize = 32;

/// Run the full mutual handshake over an established stream pair and
/// return the peer's verified 32-byte identity.
pub async fn authenticate<R, W>(
    recv: &mut R,
    send: &mut W,
    identity: &Identity,
) -> Result<[u8; 32], NetError>
where
    R: AsyncRead + Unpin,
    W: AsyncWrite + Unpin,
{
    let mut nonce = [0u8; NONCE_LEN];
    rand::rngs::OsRng.fill_bytes(&mut nonce);

    send_challenge(send, &nonce).await?;
    answer_challenge(recv, send, identity).await?;
    verify_response(recv, &nonce).await
}

/// Send our nonce challenge.
async fn send_challenge<W>(send: &mut W, nonce: &[u8; NONCE_LEN]) -> Result<(), NetError>
where
    W: AsyncWrite + Unpin,
{
    let init = MessageData {
        payload: Some(message_data::Payload::HandshakeInit(HandshakeInit {
            nonce: nonce.to_vec(),
        })),
        ..Default::default()
    };
    write_frame(send, FrameType::Handshake, &init.encode_to_vec()).await?;
    Ok(())
}

/// Read the peer's challenge and answer it with a signature over
/// `nonce || our_public_key`.
async fn answer_challenge<R, W>(
    recv: &mut R,
    send: &mut W,
    identity: &Identity,
) -> Result<(), NetError>
where
    R: AsyncRead + Unpin,
    W: AsyncWrite + Unpin,
{
    let (frame_type, payload) = read_frame(recv).await?;
    if frame_type != FrameType::Handshake {
        return Err(NetError::AuthFailed(format!(
            "expected handshake frame, got {frame_type:?}"
        )));
    }

    let data = MessageData::decode(payload.as_ref())
        .map_err(|_| NetError::AuthFailed("malformed handshake init".into()))?;
    let Some(message_data::Payload::HandshakeInit(init)) = data.payload else {
        return Err(NetError::AuthFailed("not a handshake init".into()));
    };

    let pub_key = identity.public_key_bytes();
    let mut to_sign = init.nonce.clone();
    to_sign.extend_from_slice(&pub_key);
    let signature = identity.sign(&to_sign);

    let response = MessageData {
        payload: Some(message_data::Payload::HandshakeResponse(HandshakeResponse {
            pub_key: pub_key.to_vec(),
            signature: signature.to_vec(),
            version: PROTOCOL_VERSION.to_string(),
        })),
        ..Default::default()
    };
    write_frame(send, FrameType::Handshake, &response.encode_to_vec()).await?;
    Ok(())
}

/// Read the peer's answer and verify it against the nonce we sent.
async fn verify_response<R>(recv: &mut R, nonce: &[u8; NONCE_LEN]) -> Result<[u8; 32], NetError>
where
    R: AsyncRead + Unpin,
{
    let (frame_type, payload) = read_frame(recv).await?;
    if frame_type != FrameType::Handshake {
        return Err(NetError::AuthFailed(format!(
            "expected handshake frame, got {frame_type:?}"
        )));
    }

    let data = MessageData::decode(payload.as_ref())
        .map_err(|_| NetError::AuthFailed("malformed handshake response".into()))?;
    let Some(message_data::Payload::HandshakeResponse(response)) = data.payload else {
        return Err(NetError::AuthFailed("not a handshake response".into()));
    };

    let mut signed = nonce.to_vec();
    signed.extend_from_slice(&response.pub_key);
    if !verify_signature(&response.pub_key, &signed, &response.signature) {
        return Err(NetError::AuthFailed("invalid handshake signature".into()));
    }

    let peer_key: [u8; 32] = response
        .pub_key
        .as_slice()
        .try_into()
        .map_err(|_| NetError::AuthFailed("identity key is not 32 bytes".into()))?;

    debug!(version = %response.version, "handshake verified");
    Ok(peer_key)
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Both legs of the handshake over an in-memory duplex pipe.
    #[tokio::test]
    async fn test_mutual_authentication_succeeds() {
        let alice = Identity::generate();
        let bob = Identity::generate();

        let (alice_side, bob_side) = tokio::io::duplex(64 * 1024);
        let (mut alice_recv, mut alice_send) = tokio::io::split(alice_side);
        let (mut bob_recv, mut bob_send) = tokio::io::split(bob_side);

        let alice_pub = alice.public_key_bytes();
        let bob_pub = bob.public_key_bytes();

        let bob_task = tokio::spawn(async move {
            authenticate(&mut bob_recv, &mut bob_send, &bob).await
        });

        let seen_by_alice = authenticate(&mut alice_recv, &mut alice_send, &alice)
            .await
            .unwrap();
        let seen_by_bob = bob_task.await.unwrap().unwrap();

        assert_eq!(seen_by_alice, bob_pub);
        assert_eq!(seen_by_bob, alice_pub);
    }

    /// A responder that signs the wrong public key is rejected.
    #[tokio::test]
    async fn test_signature_over_wrong_key_rejected() {
        let alice = Identity::generate();
        let mallory = Identity::generate();
        let claimed = Identity::generate();

        let (alice_side, mallory_side) = tokio::io::duplex(64 * 1024);
        let (mut alice_recv, mut alice_send) = tokio::io::split(alice_side);
        let (mut mallory_recv, mut mallory_send) = tokio::io::split(mallory_side);

        let mallory_task = tokio::spawn(async move {
            // Read alice's init and respond claiming a key mallory does not
            // control.
            let (_, payload) = read_frame(&mut mallory_recv).await.unwrap();
            let data = MessageData::decode(payload.as_ref()).unwrap();
            let Some(message_data::Payload::HandshakeInit(init)) = data.payload else {
                panic!("expected init");
            };

            let mut to_sign = init.nonce.clone();
            to_sign.extend_from_slice(&claimed.public_key_bytes());

            let response = MessageData {
                payload: Some(message_data::Payload::HandshakeResponse(HandshakeResponse {
                    pub_key: claimed.public_key_bytes().to_vec(),
                    signature: mallory.sign(&to_sign).to_vec(),
                    version: PROTOCOL_VERSION.to_string(),
                })),
                ..Default::default()
            };
            write_frame(
                &mut mallory_send,
                FrameType::Handshake,
                &response.encode_to_vec(),
            )
            .await
            .unwrap();
        });

        let mut nonce = [0u8; NONCE_LEN];
        rand::rngs::OsRng.fill_bytes(&mut nonce);
        send_challenge(&mut alice_send, &nonce).await.unwrap();

        let result = verify_response(&mut alice_recv, &nonce).await;
        assert!(matches!(result, Err(NetError::AuthFailed(_))));

        mallory_task.await.unwrap();
    }

    /// A replayed response signed over a different nonce is rejected.
    #[tokio::test]
    async fn test_stale_nonce_rejected() {
        let alice = Identity::generate();
        let bob = Identity::generate();

        let (alice_side, bob_side) = tokio::io::duplex(64 * 1024);
        let (mut alice_recv, mut alice_send) = tokio::io::split(alice_side);
        let (mut bob_recv, mut bob_send) = tokio::io::split(bob_side);

        // Bob answers whatever challenge arrives, but alice verifies
        // against a nonce she never sent.
        let bob_task = tokio::spawn(async move {
            answer_challenge(&mut bob_recv, &mut bob_send, &bob).await
        });

        let mut sent_nonce = [0u8; NONCE_LEN];
        rand::rngs::OsRng.fill_bytes(&mut sent_nonce);
        send_challenge(&mut alice_send, &sent_nonce).await.unwrap();
        bob_task.await.unwrap().unwrap();

        let other_nonce = [0x42u8; NONCE_LEN];
        let result = verify_response(&mut alice_recv, &other_nonce).await;
        assert!(matches!(result, Err(NetError::AuthFailed(_))));
    }

    /// Non-handshake frames abort authentication.
    #[tokio::test]
    async fn test_wrong_frame_type_rejected() {
        let (mut near, far) = tokio::io::duplex(1024);
        let (mut far_recv, _far_send) = tokio::io::split(far);

        write_frame(&mut near, FrameType::Gossip, b"junk")
            .await
            .unwrap();

        let nonce = [0u8; NONCE_LEN];
        let result = verify_response(&mut far_recv, &nonce).await;
        assert!(matches!(result, Err(NetError::AuthFailed(_))));
    }
}
