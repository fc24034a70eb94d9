//! Ingress dispatcher: envelope verification and payload routing.
//!
//! All peer read loops feed one bounded channel; a single worker drains it
//! in FIFO order, so handler invocations are serialized and handlers need
//! no locking against each other. Handlers must not block the worker for
//! long.

use async_trait::async_trait;
use gossamer_crypto::{verify_envelope, PeerId};
use gossamer_wire::{message_data, Envelope, MessageData};
use prost::Message;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::{mpsc, Mutex, RwLock};
use tracing::{debug, warn};

/// Bounded ingress capacity; a full queue back-pressures peer readers.
pub const INGRESS_CAPACITY: usize = 1000;

/// One envelope as received from a peer session.
#[derive(Debug)]
pub struct IngressPacket {
    /// The raw signed envelope
    pub envelope: Envelope,
    /// Hashed id of the session the envelope arrived on
    pub from_peer: PeerId,
}

/// A payload handler registered for one routing tag.
#[async_trait]
pub trait Handler: Send + Sync {
    /// Handle one verified, decoded message.
    async fn handle(&self, msg: MessageData, from_peer: PeerId);
}

/// Routes verified envelopes to payload handlers.
pub struct Dispatcher {
    ingress_tx: mpsc::Sender<IngressPacket>,
    ingress_rx: Mutex<Option<mpsc::Receiver<IngressPacket>>>,
    handlers: RwLock<HashMap<&'static str, Arc<dyn Handler>>>,
}

impl Dispatcher {
    /// Create a dispatcher with an empty handler table.
    pub fn new() -> Arc<Self> {
        let (ingress_tx, ingress_rx) = mpsc::channel(INGRESS_CAPACITY);
        Arc::new(Self {
            ingress_tx,
            ingress_rx: Mutex::new(Some(ingress_rx)),
            handlers: RwLock::new(HashMap::new()),
        })
    }

    /// The producer side of the ingress queue, handed to peer sessions.
    pub fn ingress_sender(&self) -> mpsc::Sender<IngressPacket> {
        self.ingress_tx.clone()
    }

    /// Register a handler for a payload tag. Last write wins.
    pub async fn register(&self, tag: &'static str, handler: Arc<dyn Handler>) {
        self.handlers.write().await.insert(tag, handler);
    }

    /// Start the single ingress worker. Subsequent calls are no-ops.
    pub fn start(self: &Arc<Self>) -> tokio::task::JoinHandle<()> {
        let dispatcher = Arc::clone(self);
        tokio::spawn(async move {
            let receiver = dispatcher.ingress_rx.lock().await.take();
            let Some(mut receiver) = receiver else {
                return;
            };
            while let Some(packet) = receiver.recv().await {
                dispatcher.process(packet).await;
            }
        })
    }

    async fn process(&self, packet: IngressPacket) {
        let IngressPacket {
            envelope,
            from_peer,
        } = packet;

        if !verify_envelope(&envelope) {
            warn!(from = %from_peer, "invalid envelope signature, dropping");
            return;
        }

        let msg = match MessageData::decode(envelope.data.as_slice()) {
            Ok(msg) => msg,
            Err(err) => {
                warn!(from = %from_peer, "undecodable message data: {err}");
                return;
            }
        };

        let Some(tag) = route_tag(&msg.payload) else {
            debug!(from = %from_peer, "unroutable payload, dropping");
            return;
        };

        let handler = self.handlers.read().await.get(tag).cloned();
        if let Some(handler) = handler {
            handler.handle(msg, from_peer).await;
        }
    }
}

/// Map a payload variant to its handler tag. Handshake inits never travel
/// in envelopes, so they are unroutable here.
pub fn route_tag(payload: &Option<message_data::Payload>) -> Option<&'static str> {
    match payload {
        Some(message_data::Payload::ChatMessage(_)) => Some(crate::CHAT_TAG),
        Some(message_data::Payload::HandshakeResponse(_)) => Some("HandshakeResponse"),
        Some(message_data::Payload::PeerRequest(_))
        | Some(message_data::Payload::PeerResponse(_)) => Some(crate::DISCOVERY_TAG),
        Some(message_data::Payload::HandshakeInit(_)) | None => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use gossamer_crypto::Identity;
    use gossamer_wire::{ChatMessage, HandshakeInit, PeerRequest};
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct CountingHandler {
        calls: AtomicUsize,
        seen_tx: mpsc::UnboundedSender<(MessageData, PeerId)>,
    }

    impl CountingHandler {
        fn new() -> (Arc<Self>, mpsc::UnboundedReceiver<(MessageData, PeerId)>) {
            let (seen_tx, seen_rx) = mpsc::unbounded_channel();
            (
                Arc::new(Self {
                    calls: AtomicUsize::new(0),
                    seen_tx,
                }),
                seen_rx,
            )
        }
    }

    #[async_trait]
    impl Handler for CountingHandler {
        async fn handle(&self, msg: MessageData, from_peer: PeerId) {
            self.calls.fetch_add(1, Ordering::SeqCst);
            self.seen_tx.send((msg, from_peer)).ok();
        }
    }

    fn chat_message(identity: &Identity) -> MessageData {
        MessageData {
            message_id: "m1".into(),
            origin_id: identity.public_key_bytes().to_vec(),
            target_id: vec![0u8; 32],
            timestamp: 1,
            hop_limit: 20,
            payload: Some(message_data::Payload::ChatMessage(ChatMessage {
                encrypted_payload: vec![1, 2, 3],
            })),
        }
    }

    #[tokio::test]
    async fn test_valid_envelope_reaches_handler_once() {
        let dispatcher = Dispatcher::new();
        let (handler, mut seen_rx) = CountingHandler::new();
        dispatcher.register(crate::CHAT_TAG, handler.clone()).await;
        dispatcher.start();

        let identity = Identity::generate();
        let msg = chat_message(&identity);
        let envelope = identity.seal_envelope(&msg);
        let from = identity.peer_id();

        dispatcher
            .ingress_sender()
            .send(IngressPacket {
                envelope,
                from_peer: from,
            })
            .await
            .unwrap();

        let (routed, routed_from) = seen_rx.recv().await.unwrap();
        assert_eq!(routed.message_id, "m1");
        assert_eq!(routed_from, from);
        assert_eq!(handler.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_bad_signature_drops_before_routing() {
        let dispatcher = Dispatcher::new();
        let (handler, _seen_rx) = CountingHandler::new();
        dispatcher.register(crate::CHAT_TAG, handler.clone()).await;
        dispatcher.start();

        let identity = Identity::generate();
        let msg = chat_message(&identity);
        let mut envelope = identity.seal_envelope(&msg);
        envelope.signature[0] ^= 0xFF;

        dispatcher
            .ingress_sender()
            .send(IngressPacket {
                envelope,
                from_peer: identity.peer_id(),
            })
            .await
            .unwrap();

        tokio::time::sleep(std::time::Duration::from_millis(100)).await;
        assert_eq!(handler.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_wrong_key_length_drops() {
        let dispatcher = Dispatcher::new();
        let (handler, _seen_rx) = CountingHandler::new();
        dispatcher.register(crate::CHAT_TAG, handler.clone()).await;
        dispatcher.start();

        let identity = Identity::generate();
        let msg = chat_message(&identity);
        let mut envelope = identity.seal_envelope(&msg);
        envelope.pub_key.truncate(31);

        dispatcher
            .ingress_sender()
            .send(IngressPacket {
                envelope,
                from_peer: identity.peer_id(),
            })
            .await
            .unwrap();

        tokio::time::sleep(std::time::Duration::from_millis(100)).await;
        assert_eq!(handler.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_route_tag_mapping() {
        use message_data::Payload;

        assert_eq!(
            route_tag(&Some(Payload::ChatMessage(ChatMessage::default()))),
            Some("ChatMessage")
        );
        assert_eq!(
            route_tag(&Some(Payload::PeerRequest(PeerRequest { count: 1 }))),
            Some("DiscoveryPeer")
        );
        assert_eq!(
            route_tag(&Some(Payload::PeerResponse(Default::default()))),
            Some("DiscoveryPeer")
        );
        assert_eq!(
            route_tag(&Some(Payload::HandshakeInit(HandshakeInit::default()))),
            None
        );
        assert_eq!(route_tag(&None), None);
    }

    #[tokio::test]
    async fn test_registration_last_write_wins() {
        let dispatcher = Dispatcher::new();
        let (first, _rx1) = CountingHandler::new();
        let (second, mut rx2) = CountingHandler::new();

        dispatcher.register(crate::CHAT_TAG, first.clone()).await;
        dispatcher.register(crate::CHAT_TAG, second.clone()).await;
        dispatcher.start();

        let identity = Identity::generate();
        let envelope = identity.seal_envelope(&chat_message(&identity));
        dispatcher
            .ingress_sender()
            .send(IngressPacket {
                envelope,
                from_peer: identity.peer_id(),
            })
            .await
            .unwrap();

        rx2.recv().await.unwrap();
        assert_eq!(first.calls.load(Ordering::SeqCst), 0);
        assert_eq!(second.calls.load(Ordering::SeqCst), 1);
    }
}
