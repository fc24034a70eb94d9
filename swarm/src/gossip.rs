//! Flood-gossip broadcaster with dedup and hop-limit control.

use crate::swarm::Swarm;
use gossamer_wire::{FrameType, MessageData};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::Mutex;
use tracing::{debug, trace};

/// How long a message id stays in the seen-cache. Matches the diameter a
/// hop-limited flood can realistically take to die out.
const SEEN_TTL: Duration = Duration::from_secs(600);

/// Hard cap on tracked ids; oldest entries go first when exceeded.
const SEEN_CAP: usize = 65536;

/// Bounded set of recently observed message ids.
pub(crate) struct SeenCache {
    entries: HashMap<String, Instant>,
    ttl: Duration,
    cap: usize,
}

impl SeenCache {
    pub(crate) fn new(ttl: Duration, cap: usize) -> Self {
        Self {
            entries: HashMap::new(),
            ttl,
            cap,
        }
    }

    /// Record an id. Returns `false` when it was already present and
    /// unexpired (a duplicate).
    pub(crate) fn insert(&mut self, id: &str) -> bool {
        let now = Instant::now();

        if let Some(seen_at) = self.entries.get(id) {
            if now.duration_since(*seen_at) < self.ttl {
                return false;
            }
        }

        self.entries.insert(id.to_string(), now);
        if self.entries.len() > self.cap {
            self.evict(now);
        }
        true
    }

    /// Whether an id is present and unexpired.
    pub(crate) fn contains(&self, id: &str) -> bool {
        self.entries
            .get(id)
            .map(|seen_at| seen_at.elapsed() < self.ttl)
            .unwrap_or(false)
    }

    fn evict(&mut self, now: Instant) {
        let ttl = self.ttl;
        self.entries
            .retain(|_, seen_at| now.duration_since(*seen_at) < ttl);

        if self.entries.len() > self.cap {
            let mut by_age: Vec<(String, Instant)> = self
                .entries
                .iter()
                .map(|(id, t)| (id.clone(), *t))
                .collect();
            by_age.sort_by_key(|(_, t)| *t);
            for (id, _) in by_age.iter().take(self.entries.len() - self.cap) {
                self.entries.remove(id);
            }
        }
    }

    #[cfg(test)]
    fn len(&self) -> usize {
        self.entries.len()
    }
}

/// Best-effort flood broadcaster.
pub struct GossipManager {
    swarm: Arc<Swarm>,
    seen: Mutex<SeenCache>,
}

impl GossipManager {
    /// Create the manager over a swarm.
    pub fn new(swarm: Arc<Swarm>) -> Arc<Self> {
        Arc::new(Self {
            swarm,
            seen: Mutex::new(SeenCache::new(SEEN_TTL, SEEN_CAP)),
        })
    }

    /// Fan a message out to every active peer except its origin. Dedup is
    /// test-and-set on the message id, so calling this twice with the same
    /// id broadcasts once. The hop limit is decremented before fan-out and
    /// an exhausted budget stops propagation. Individual send failures are
    /// swallowed.
    pub async fn broadcast(&self, frame_type: FrameType, mut msg: MessageData) {
        if !self.seen.lock().await.insert(&msg.message_id) {
            trace!(id = %msg.message_id, "duplicate, not broadcasting");
            return;
        }

        let hops_left = msg.hop_limit.saturating_sub(1);
        if hops_left == 0 {
            trace!(id = %msg.message_id, "hop limit exhausted");
            return;
        }
        msg.hop_limit = hops_left;

        let envelope = self.swarm.seal(&msg);
        let peers = self.swarm.get_all_peers().await;
        debug!(id = %msg.message_id, fanout = peers.len(), "broadcasting");

        for peer in peers {
            if peer.public_key().as_slice() == msg.origin_id.as_slice() {
                continue;
            }
            if let Err(err) = peer.send_envelope(frame_type, envelope.clone()) {
                debug!(peer = %peer.id(), "gossip send dropped: {err}");
            }
        }
    }

    /// Handle a message received from the network: drop duplicates,
    /// otherwise re-broadcast.
    pub async fn handle_incoming(&self, frame_type: FrameType, msg: MessageData) {
        if self.seen.lock().await.contains(&msg.message_id) {
            return;
        }
        self.broadcast(frame_type, msg).await;
    }

    /// Whether a message id has been observed (test and introspection).
    pub async fn has_seen(&self, message_id: &str) -> bool {
        self.seen.lock().await.contains(message_id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_seen_cache_dedups() {
        let mut cache = SeenCache::new(Duration::from_secs(60), 100);

        assert!(cache.insert("a"));
        assert!(!cache.insert("a"));
        assert!(cache.contains("a"));
        assert!(!cache.contains("b"));
        assert!(cache.insert("b"));
    }

    #[test]
    fn test_seen_cache_expires() {
        let mut cache = SeenCache::new(Duration::from_millis(0), 100);

        assert!(cache.insert("a"));
        // Zero TTL: the entry is immediately stale again.
        assert!(cache.insert("a"));
        assert!(!cache.contains("a"));
    }

    #[test]
    fn test_seen_cache_capped() {
        let mut cache = SeenCache::new(Duration::from_secs(3600), 10);

        for i in 0..25 {
            cache.insert(&format!("id-{i}"));
        }
        assert!(cache.len() <= 10);
        // The most recent id survives the eviction.
        assert!(cache.contains("id-24"));
    }
}
