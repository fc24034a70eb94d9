//! Peer discovery service.
//!
//! Answers `PeerRequest`s with a sample of the active set, unicast to the
//! requester when it is directly connected and flooded otherwise.

use crate::dispatcher::Handler;
use crate::gossip::GossipManager;
use crate::swarm::Swarm;
use crate::{now_unix_ns, DEFAULT_HOP_LIMIT};
use async_trait::async_trait;
use gossamer_crypto::PeerId;
use gossamer_wire::{message_data, FrameType, MessageData, PeerInfo, PeerRequest, PeerResponse};
use std::sync::Arc;
use tracing::{debug, warn};
use uuid::Uuid;

/// Routing tag both discovery payload variants map to.
pub const DISCOVERY_TAG: &str = "DiscoveryPeer";

/// Handles peer directory requests and responses.
pub struct DiscoveryService {
    swarm: Arc<Swarm>,
    gossip: Arc<GossipManager>,
}

impl DiscoveryService {
    /// Create the service.
    pub fn new(swarm: Arc<Swarm>, gossip: Arc<GossipManager>) -> Arc<Self> {
        Arc::new(Self { swarm, gossip })
    }

    async fn handle_request(&self, msg: &MessageData, request: &PeerRequest) {
        let sampled = self.swarm.get_random_peers(request.count as usize).await;

        let mut peers = Vec::with_capacity(sampled.len());
        for peer in &sampled {
            peers.push(PeerInfo {
                pub_key: peer.public_key().to_vec(),
                address: peer.address().to_string(),
            });
        }

        let response = MessageData {
            message_id: Uuid::new_v4().to_string(),
            origin_id: self.swarm.identity().public_key_bytes().to_vec(),
            target_id: msg.origin_id.clone(),
            timestamp: now_unix_ns(),
            hop_limit: DEFAULT_HOP_LIMIT,
            payload: Some(message_data::Payload::PeerResponse(PeerResponse { peers })),
        };

        let requester = PeerId::from_public_key(&msg.origin_id);
        if self.swarm.is_active(requester).await {
            match self
                .swarm
                .send_to_peer(requester, FrameType::GetPeerResponse, &response)
                .await
            {
                Ok(()) => return,
                Err(err) => warn!(peer = %requester, "unicast peer response failed: {err}"),
            }
        }

        self.gossip
            .broadcast(FrameType::GetPeerResponse, response)
            .await;
    }
}

#[async_trait]
impl Handler for DiscoveryService {
    async fn handle(&self, msg: MessageData, from_peer: PeerId) {
        let forward_as = match &msg.payload {
            Some(message_data::Payload::PeerRequest(request)) => {
                debug!(from = %from_peer, count = request.count, "peer request");
                let request = request.clone();
                self.handle_request(&msg, &request).await;
                FrameType::GetPeerRequest
            }
            Some(message_data::Payload::PeerResponse(response)) => {
                // Placeholder: responses are observed but not yet acted on.
                debug!(from = %from_peer, peers = response.peers.len(), "peer response");
                FrameType::GetPeerResponse
            }
            _ => return,
        };

        self.gossip.handle_incoming(forward_as, msg).await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dispatcher::Dispatcher;
    use gossamer_crypto::Identity;
    use gossamer_net::Transport;
    use gossamer_storage::{KvHandle, MemoryKv};
    use std::net::{IpAddr, Ipv4Addr, SocketAddr};

    fn test_parts() -> (Arc<Swarm>, Arc<GossipManager>) {
        let identity = Arc::new(Identity::generate());
        let kv: KvHandle = Arc::new(MemoryKv::new());
        let addr = SocketAddr::new(IpAddr::V4(Ipv4Addr::LOCALHOST), 0);
        let (transport, _rx) = Transport::bind(addr, Arc::clone(&identity)).unwrap();
        let dispatcher = Dispatcher::new();
        let swarm = Swarm::new(
            identity,
            kv,
            transport,
            dispatcher.ingress_sender(),
            Default::default(),
        );
        let gossip = GossipManager::new(Arc::clone(&swarm));
        (swarm, gossip)
    }

    #[tokio::test]
    async fn test_request_is_answered_and_forwarded() {
        let (swarm, gossip) = test_parts();
        let service = DiscoveryService::new(swarm, Arc::clone(&gossip));
        let requester = Identity::generate();

        let msg = MessageData {
            message_id: "req-1".into(),
            origin_id: requester.public_key_bytes().to_vec(),
            target_id: vec![],
            timestamp: 1,
            hop_limit: DEFAULT_HOP_LIMIT,
            payload: Some(message_data::Payload::PeerRequest(PeerRequest { count: 4 })),
        };

        service.handle(msg, requester.peer_id()).await;

        // The request itself re-entered the flood after being answered.
        assert!(gossip.has_seen("req-1").await);
    }

    #[tokio::test]
    async fn test_response_is_forwarded_not_answered() {
        let (swarm, gossip) = test_parts();
        let service = DiscoveryService::new(swarm, Arc::clone(&gossip));
        let sender = Identity::generate();

        let msg = MessageData {
            message_id: "res-1".into(),
            origin_id: sender.public_key_bytes().to_vec(),
            target_id: vec![],
            timestamp: 1,
            hop_limit: DEFAULT_HOP_LIMIT,
            payload: Some(message_data::Payload::PeerResponse(PeerResponse {
                peers: vec![PeerInfo {
                    pub_key: vec![9u8; 32],
                    address: "10.0.0.9:4242".into(),
                }],
            })),
        };

        service.handle(msg, sender.peer_id()).await;
        assert!(gossip.has_seen("res-1").await);
    }
}
