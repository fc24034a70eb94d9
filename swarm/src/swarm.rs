//! The swarm: owner of the active peer set and mediator of egress.

use crate::dispatcher::IngressPacket;
use crate::error::SwarmError;
use crate::peer::Peer;
use async_trait::async_trait;
use bytes::Bytes;
use gossamer_crypto::{Identity, PeerId};
use gossamer_net::{DataSink, NewSessionEvent, PeerLink, Transport};
use gossamer_storage::{Kv, KvHandle};
use gossamer_wire::{FrameType, MessageData, PeerStoreEntry};
use prost::Message;
use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::sync::{mpsc, RwLock};
use tracing::{debug, info, warn};

const BAN_PREFIX: &[u8] = b"bans:peer:";
const SAVED_PEER_PREFIX: &[u8] = b"saved:peers:";

/// Trust score recorded for a peer on every successful connection.
const CONNECT_TRUST_SCORE: u32 = 100;

/// Swarm tunables.
#[derive(Clone, Debug)]
pub struct SwarmConfig {
    /// Upper bound on active sessions maintained by reconnection sweeps
    pub max_connections: usize,
}

impl Default for SwarmConfig {
    fn default() -> Self {
        Self {
            max_connections: 20,
        }
    }
}

/// Owns the set of active peers, keyed by hashed identity. Reads take the
/// shared lock, mutations the exclusive one; no lock is held across I/O.
pub struct Swarm {
    identity: Arc<Identity>,
    active_peers: RwLock<HashMap<PeerId, Arc<Peer>>>,
    kv: KvHandle,
    transport: Arc<Transport>,
    ingress_tx: mpsc::Sender<IngressPacket>,
    config: SwarmConfig,
}

/// The narrow capability a peer session holds into the node: decode the
/// envelope and enqueue it for dispatch. Undecodable payloads are dropped
/// silently.
struct IngressSink {
    ingress_tx: mpsc::Sender<IngressPacket>,
}

#[async_trait]
impl DataSink for IngressSink {
    async fn on_data(&self, _frame_type: FrameType, payload: Bytes, from: PeerId) {
        let Ok(envelope) = gossamer_wire::Envelope::decode(payload.as_ref()) else {
            return;
        };
        self.ingress_tx
            .send(IngressPacket {
                envelope,
                from_peer: from,
            })
            .await
            .ok();
    }
}

impl Swarm {
    /// Create the swarm. Sessions are consumed via
    /// [`Swarm::spawn_registration_loop`].
    pub fn new(
        identity: Arc<Identity>,
        kv: KvHandle,
        transport: Arc<Transport>,
        ingress_tx: mpsc::Sender<IngressPacket>,
        config: SwarmConfig,
    ) -> Arc<Self> {
        Arc::new(Self {
            identity,
            active_peers: RwLock::new(HashMap::new()),
            kv,
            transport,
            ingress_tx,
            config,
        })
    }

    /// The node's own identity.
    pub fn identity(&self) -> &Arc<Identity> {
        &self.identity
    }

    /// Seal a message in a signed envelope, ready for framing.
    pub fn seal(&self, msg: &MessageData) -> Bytes {
        Bytes::from(self.identity.seal_envelope(msg).encode_to_vec())
    }

    /// Consume authenticated sessions from the transport, refusing banned
    /// peers and registering the rest.
    pub fn spawn_registration_loop(
        self: &Arc<Self>,
        mut session_rx: mpsc::Receiver<NewSessionEvent>,
    ) -> tokio::task::JoinHandle<()> {
        let swarm = Arc::clone(self);
        tokio::spawn(async move {
            while let Some(event) = session_rx.recv().await {
                let peer_id = PeerId::from_public_key(&event.peer_key);

                match swarm.is_banned(peer_id).await {
                    Ok(true) => {
                        warn!(peer = %peer_id, "refusing session from banned peer");
                        PeerLink::new(event.connection).close();
                        continue;
                    }
                    Ok(false) => {}
                    Err(err) => {
                        warn!(peer = %peer_id, "ban check failed, refusing session: {err}");
                        PeerLink::new(event.connection).close();
                        continue;
                    }
                }

                swarm.add_peer(event).await;
            }
        })
    }

    /// Register a session as an active peer. A duplicate identity evicts
    /// the older session before the new one is installed.
    pub async fn add_peer(&self, event: NewSessionEvent) -> Arc<Peer> {
        let peer_id = PeerId::from_public_key(&event.peer_key);

        let evicted = self.active_peers.write().await.remove(&peer_id);
        if let Some(old) = evicted {
            info!(peer = %peer_id, "duplicate identity, closing older session");
            old.close();
        }

        let link = Arc::new(PeerLink::new(event.connection));
        let peer = Peer::new(event.peer_key, Arc::clone(&link), event.addr, event.is_outbound);
        self.active_peers
            .write()
            .await
            .insert(peer_id, Arc::clone(&peer));

        link.start_loops(
            peer_id,
            Arc::new(IngressSink {
                ingress_tx: self.ingress_tx.clone(),
            }),
        );
        peer.set_ready();

        // Refresh the persisted directory off the registration path.
        {
            let kv = Arc::clone(&self.kv);
            let pub_key = event.peer_key;
            let addr = event.addr.to_string();
            tokio::spawn(async move {
                if let Err(err) =
                    save_peer_record(&kv, &pub_key, &addr, CONNECT_TRUST_SCORE).await
                {
                    warn!("saving peer record failed: {err}");
                }
            });
        }

        info!(peer = %peer_id, addr = %event.addr, outbound = event.is_outbound, "peer registered");
        peer
    }

    /// Close and forget a peer.
    pub async fn remove_peer(&self, peer_id: PeerId) {
        let removed = self.active_peers.write().await.remove(&peer_id);
        if let Some(peer) = removed {
            peer.close();
            info!(peer = %peer_id, "peer removed");
        }
    }

    /// Look up one active peer.
    pub async fn get_peer(&self, peer_id: PeerId) -> Option<Arc<Peer>> {
        self.active_peers.read().await.get(&peer_id).cloned()
    }

    /// Snapshot of every active peer.
    pub async fn get_all_peers(&self) -> Vec<Arc<Peer>> {
        self.active_peers.read().await.values().cloned().collect()
    }

    /// Up to `count` active peers in map order.
    pub async fn get_random_peers(&self, count: usize) -> Vec<Arc<Peer>> {
        self.active_peers
            .read()
            .await
            .values()
            .take(count)
            .cloned()
            .collect()
    }

    /// Whether a peer is currently in the active set.
    pub async fn is_active(&self, peer_id: PeerId) -> bool {
        self.active_peers.read().await.contains_key(&peer_id)
    }

    /// Number of active sessions.
    pub async fn peer_count(&self) -> usize {
        self.active_peers.read().await.len()
    }

    /// Mark a peer banned and drop its session if one is active.
    pub async fn ban(&self, peer_id: PeerId) -> Result<(), SwarmError> {
        self.kv.put(&ban_key(peer_id), b"true").await?;
        self.remove_peer(peer_id).await;
        Ok(())
    }

    /// Clear a ban marker.
    pub async fn unban(&self, peer_id: PeerId) -> Result<(), SwarmError> {
        self.kv.delete(&ban_key(peer_id)).await?;
        Ok(())
    }

    /// Presence of the ban marker means banned.
    pub async fn is_banned(&self, peer_id: PeerId) -> Result<bool, SwarmError> {
        Ok(self.kv.get(&ban_key(peer_id)).await?.is_some())
    }

    /// Upsert the persisted directory record for a peer.
    pub async fn save_peer(
        &self,
        pub_key: &[u8],
        addr: &str,
        trust_score: u32,
    ) -> Result<(), SwarmError> {
        save_peer_record(&self.kv, pub_key, addr, trust_score).await
    }

    /// Fire-and-forget dial; the session arrives through the registration
    /// loop if authentication succeeds.
    pub fn connect(self: &Arc<Self>, addr: SocketAddr) {
        let transport = Arc::clone(&self.transport);
        tokio::spawn(async move {
            if let Err(err) = transport.dial(addr).await {
                debug!(%addr, "dial failed: {err}");
            }
        });
    }

    /// Previously seen peers from the persisted directory; `0` means all.
    pub async fn get_history(&self, count: usize) -> Vec<PeerStoreEntry> {
        let pairs = match self.kv.scan_prefix(SAVED_PEER_PREFIX).await {
            Ok(pairs) => pairs,
            Err(err) => {
                warn!("peer history scan failed: {err}");
                return Vec::new();
            }
        };

        let mut peers = Vec::new();
        for (_, value) in pairs {
            if count != 0 && peers.len() >= count {
                break;
            }
            match PeerStoreEntry::decode(value.as_slice()) {
                Ok(entry) => peers.push(entry),
                Err(err) => debug!("skipping undecodable peer record: {err}"),
            }
        }
        peers
    }

    /// Walk the peer directory and dial everyone not already connected,
    /// stopping once the connection budget is reached.
    pub async fn find_and_connect(self: &Arc<Self>) {
        for entry in self.get_history(0).await {
            let peer_id = PeerId::from_public_key(&entry.pub_key);

            {
                let peers = self.active_peers.read().await;
                if peers.len() >= self.config.max_connections {
                    break;
                }
                if peers.contains_key(&peer_id) {
                    continue;
                }
            }

            match entry.last_known_addr.parse::<SocketAddr>() {
                Ok(addr) => self.connect(addr),
                Err(_) => debug!(peer = %peer_id, addr = %entry.last_known_addr, "unparseable saved address"),
            }
        }
    }

    /// Unicast a message to one active peer.
    pub async fn send_to_peer(
        &self,
        peer_id: PeerId,
        frame_type: FrameType,
        msg: &MessageData,
    ) -> Result<(), SwarmError> {
        let peer = self
            .get_peer(peer_id)
            .await
            .ok_or(SwarmError::PeerNotConnected)?;
        peer.send_envelope(frame_type, self.seal(msg))
    }
}

fn ban_key(peer_id: PeerId) -> Vec<u8> {
    let hex = peer_id.to_hex();
    let mut key = Vec::with_capacity(BAN_PREFIX.len() + hex.len());
    key.extend_from_slice(BAN_PREFIX);
    key.extend_from_slice(hex.as_bytes());
    key
}

fn saved_peer_key(pub_key: &[u8]) -> Vec<u8> {
    let hash = gossamer_crypto::sha256(pub_key);
    let mut key = Vec::with_capacity(SAVED_PEER_PREFIX.len() + hash.len());
    key.extend_from_slice(SAVED_PEER_PREFIX);
    key.extend_from_slice(&hash);
    key
}

async fn save_peer_record(
    kv: &KvHandle,
    pub_key: &[u8],
    addr: &str,
    trust_score: u32,
) -> Result<(), SwarmError> {
    let entry = PeerStoreEntry {
        pub_key: pub_key.to_vec(),
        last_known_addr: addr.to_string(),
        last_seen: crate::now_unix_ns(),
        trust_score,
    };
    kv.put(&saved_peer_key(pub_key), &entry.encode_to_vec())
        .await?;
    Ok(())
}
