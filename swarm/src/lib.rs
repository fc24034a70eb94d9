//! Overlay core: the swarm of active peers, the ingress dispatcher, the
//! flood-gossip broadcaster, and the discovery and chat services.
//!
//! Data flow: the transport hands authenticated sessions to the swarm's
//! registration loop; per-peer read loops decode envelopes and push them
//! onto the dispatcher's bounded ingress queue; the single dispatcher
//! worker verifies envelope signatures and routes payloads to registered
//! handlers; services build new messages and hand them to the gossip
//! manager, which fans them out through the swarm's peers.

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod chat;
pub mod discovery;
pub mod dispatcher;
pub mod error;
pub mod gossip;
pub mod peer;
pub mod swarm;

pub use chat::{ChatService, IncomingChat, CHAT_TAG};
pub use discovery::{DiscoveryService, DISCOVERY_TAG};
pub use dispatcher::{Dispatcher, Handler, IngressPacket, INGRESS_CAPACITY};
pub use error::SwarmError;
pub use gossip::GossipManager;
pub use peer::Peer;
pub use swarm::{Swarm, SwarmConfig};

/// Hop budget given to freshly built messages.
pub const DEFAULT_HOP_LIMIT: u32 = 20;

/// Nanoseconds since the Unix epoch, the timestamp format carried in
/// message metadata.
pub fn now_unix_ns() -> u64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .map(|d| d.as_nanos() as u64)
        .unwrap_or(0)
}
