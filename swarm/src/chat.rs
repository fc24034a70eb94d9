//! End-to-end encrypted chat service.

use crate::dispatcher::Handler;
use crate::error::SwarmError;
use crate::gossip::GossipManager;
use crate::{now_unix_ns, DEFAULT_HOP_LIMIT};
use async_trait::async_trait;
use gossamer_crypto::{Engine, Identity, PeerId};
use gossamer_wire::{message_data, ChatMessage, FrameType, MessageData};
use std::sync::Arc;
use tokio::sync::mpsc;
use tracing::{debug, warn};
use uuid::Uuid;

/// Routing tag for chat payloads.
pub const CHAT_TAG: &str = "ChatMessage";

/// A decrypted chat message surfaced to the application.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IncomingChat {
    /// Sender's 32-byte identity public key
    pub from: Vec<u8>,
    /// Decrypted message body
    pub plaintext: Vec<u8>,
    /// Sender-reported creation time, nanoseconds since the Unix epoch
    pub timestamp: u64,
}

/// Encrypts outgoing chat to a recipient identity and decrypts incoming
/// chat with the origin's identity. Undecryptable payloads (messages for
/// someone else, or tampered ones) are dropped.
pub struct ChatService {
    identity: Arc<Identity>,
    engine: Arc<Engine>,
    gossip: Arc<GossipManager>,
    delivery_tx: mpsc::UnboundedSender<IncomingChat>,
}

impl ChatService {
    /// Create the service; the returned receiver is the application's view
    /// of delivered messages.
    pub fn new(
        identity: Arc<Identity>,
        engine: Arc<Engine>,
        gossip: Arc<GossipManager>,
    ) -> (Arc<Self>, mpsc::UnboundedReceiver<IncomingChat>) {
        let (delivery_tx, delivery_rx) = mpsc::unbounded_channel();
        (
            Arc::new(Self {
                identity,
                engine,
                gossip,
                delivery_tx,
            }),
            delivery_rx,
        )
    }

    /// Encrypt `plaintext` to the target identity and flood it.
    pub async fn send(&self, target_pub_key: &[u8], plaintext: &[u8]) -> Result<(), SwarmError> {
        let encrypted_payload = self.engine.encrypt(plaintext, target_pub_key)?;

        let msg = MessageData {
            message_id: Uuid::new_v4().to_string(),
            origin_id: self.identity.public_key_bytes().to_vec(),
            target_id: target_pub_key.to_vec(),
            timestamp: now_unix_ns(),
            hop_limit: DEFAULT_HOP_LIMIT,
            payload: Some(message_data::Payload::ChatMessage(ChatMessage {
                encrypted_payload,
            })),
        };

        self.gossip.broadcast(FrameType::ChatMessage, msg).await;
        Ok(())
    }
}

#[async_trait]
impl Handler for ChatService {
    async fn handle(&self, msg: MessageData, from_peer: PeerId) {
        {
            let Some(message_data::Payload::ChatMessage(chat)) = &msg.payload else {
                return;
            };

            match self.engine.decrypt(&chat.encrypted_payload, &msg.origin_id) {
                Ok(plaintext) => {
                    debug!(from = %from_peer, len = plaintext.len(), "chat delivered");
                    self.delivery_tx
                        .send(IncomingChat {
                            from: msg.origin_id.clone(),
                            plaintext,
                            timestamp: msg.timestamp,
                        })
                        .ok();
                }
                Err(err) => {
                    // Not for us, or tampered with; either way it only gets
                    // forwarded, never surfaced.
                    warn!(from = %from_peer, "chat decryption failed: {err}");
                }
            }
        }

        // Keep the flood going for everyone else; duplicates die in the
        // seen-cache.
        self.gossip
            .handle_incoming(FrameType::ChatMessage, msg)
            .await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dispatcher::Dispatcher;
    use crate::swarm::{Swarm, SwarmConfig};
    use gossamer_net::Transport;
    use gossamer_storage::{KvHandle, MemoryKv};
    use std::net::{IpAddr, Ipv4Addr, SocketAddr};

    fn loopback() -> SocketAddr {
        SocketAddr::new(IpAddr::V4(Ipv4Addr::LOCALHOST), 0)
    }

    fn chat_stack(identity: Arc<Identity>) -> (Arc<ChatService>, mpsc::UnboundedReceiver<IncomingChat>) {
        let kv: KvHandle = Arc::new(MemoryKv::new());
        let (transport, _rx) = Transport::bind(loopback(), Arc::clone(&identity)).unwrap();
        let dispatcher = Dispatcher::new();
        let swarm = Swarm::new(
            Arc::clone(&identity),
            kv,
            transport,
            dispatcher.ingress_sender(),
            SwarmConfig::default(),
        );
        let gossip = GossipManager::new(swarm);
        let engine = Arc::new(Engine::new(&identity));
        ChatService::new(identity, engine, gossip)
    }

    fn sealed_chat(from: &Identity, to: &Identity, text: &[u8]) -> MessageData {
        let encrypted = Engine::new(from)
            .encrypt(text, &to.public_key_bytes())
            .unwrap();
        MessageData {
            message_id: Uuid::new_v4().to_string(),
            origin_id: from.public_key_bytes().to_vec(),
            target_id: to.public_key_bytes().to_vec(),
            timestamp: 42,
            hop_limit: DEFAULT_HOP_LIMIT,
            payload: Some(message_data::Payload::ChatMessage(ChatMessage {
                encrypted_payload: encrypted,
            })),
        }
    }

    #[tokio::test]
    async fn test_recipient_decrypts_exactly_the_plaintext() {
        let alice = Arc::new(Identity::generate());
        let bob = Arc::new(Identity::generate());
        let (bob_chat, mut bob_rx) = chat_stack(Arc::clone(&bob));

        let msg = sealed_chat(&alice, &bob, b"hello");
        bob_chat.handle(msg, alice.peer_id()).await;

        let delivered = bob_rx.recv().await.unwrap();
        assert_eq!(delivered.plaintext, b"hello");
        assert_eq!(delivered.from, alice.public_key_bytes().to_vec());
        assert_eq!(delivered.timestamp, 42);
    }

    #[tokio::test]
    async fn test_third_party_gets_nothing() {
        let alice = Arc::new(Identity::generate());
        let bob = Arc::new(Identity::generate());
        let carol = Arc::new(Identity::generate());
        let (carol_chat, mut carol_rx) = chat_stack(Arc::clone(&carol));

        // Carol relays alice→bob traffic but cannot read it.
        let msg = sealed_chat(&alice, &bob, b"not for carol");
        carol_chat.handle(msg, alice.peer_id()).await;

        assert!(carol_rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn test_non_chat_payload_ignored() {
        let bob = Arc::new(Identity::generate());
        let (bob_chat, mut bob_rx) = chat_stack(Arc::clone(&bob));

        let msg = MessageData {
            message_id: "x".into(),
            payload: None,
            ..Default::default()
        };
        bob_chat.handle(msg, PeerId::from_public_key(&[0u8; 32])).await;

        assert!(bob_rx.try_recv().is_err());
    }
}
