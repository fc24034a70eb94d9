//! An active peer: identity, session handle, and bounded egress queue.

use crate::error::SwarmError;
use bytes::Bytes;
use gossamer_crypto::PeerId;
use gossamer_net::PeerLink;
use gossamer_wire::FrameType;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::sync::mpsc;
use tracing::debug;

const SEND_QUEUE_CAPACITY: usize = 100;

/// In-memory record for a connected, authenticated peer.
pub struct Peer {
    peer_id: PeerId,
    pub_key: [u8; 32],
    addr: SocketAddr,
    is_outbound: bool,
    ready: AtomicBool,
    link: Arc<PeerLink>,
    send_tx: mpsc::Sender<(FrameType, Bytes)>,
}

impl Peer {
    /// Wrap an authenticated session. Spawns the egress worker that drains
    /// this peer's bounded send queue.
    pub(crate) fn new(
        pub_key: [u8; 32],
        link: Arc<PeerLink>,
        addr: SocketAddr,
        is_outbound: bool,
    ) -> Arc<Self> {
        let peer_id = PeerId::from_public_key(&pub_key);
        let (send_tx, mut send_rx) = mpsc::channel::<(FrameType, Bytes)>(SEND_QUEUE_CAPACITY);

        let peer = Arc::new(Self {
            peer_id,
            pub_key,
            addr,
            is_outbound,
            ready: AtomicBool::new(false),
            link: Arc::clone(&link),
            send_tx,
        });

        let cancel = link.cancellation_token().clone();
        tokio::spawn(async move {
            loop {
                tokio::select! {
                    _ = cancel.cancelled() => break,
                    queued = send_rx.recv() => {
                        let Some((frame_type, bytes)) = queued else { break };
                        if let Err(err) = link.send_message(frame_type, &bytes).await {
                            debug!(peer = %peer_id, "send failed: {err}");
                        }
                    }
                }
            }
        });

        peer
    }

    /// SHA-256 of the identity key; the active-set map key.
    pub fn id(&self) -> PeerId {
        self.peer_id
    }

    /// The peer's 32-byte identity public key.
    pub fn public_key(&self) -> &[u8; 32] {
        &self.pub_key
    }

    /// Remote address of the session.
    pub fn address(&self) -> SocketAddr {
        self.addr
    }

    /// Whether we dialed this peer.
    pub fn is_outbound(&self) -> bool {
        self.is_outbound
    }

    /// Registration-complete flag.
    pub fn is_ready(&self) -> bool {
        self.ready.load(Ordering::Acquire)
    }

    pub(crate) fn set_ready(&self) {
        self.ready.store(true, Ordering::Release);
    }

    /// The underlying session handle.
    pub fn link(&self) -> &Arc<PeerLink> {
        &self.link
    }

    /// Enqueue one pre-sealed envelope frame for this peer. Fails when the
    /// bounded queue is full or the session is gone; gossip callers
    /// swallow that.
    pub fn send_envelope(&self, frame_type: FrameType, bytes: Bytes) -> Result<(), SwarmError> {
        self.send_tx
            .try_send((frame_type, bytes))
            .map_err(|_| SwarmError::SendQueue)
    }

    /// Cancel the session: stops both receive loops and the egress worker,
    /// then closes the connection.
    pub fn close(&self) {
        self.link.close();
    }
}

impl std::fmt::Debug for Peer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Peer")
            .field("id", &self.peer_id)
            .field("addr", &self.addr)
            .field("outbound", &self.is_outbound)
            .finish()
    }
}
