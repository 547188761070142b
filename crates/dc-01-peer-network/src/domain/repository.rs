//! # Peer repository
//!
//! Bounded store of known peers keyed by ip. Once full, adding a new peer
//! evicts the earliest added one (insertion order, not score or recency).
//!
//! Adding a peer whose ip is already present replaces the stored record
//! (last write wins) and keeps its original eviction position.

use parking_lot::RwLock;
use shared_types::BoundedFifoMap;
use std::net::IpAddr;

use super::entities::Peer;

pub struct PeerRepository {
    peers: RwLock<BoundedFifoMap<IpAddr, Peer>>,
}

impl PeerRepository {
    pub fn new(capacity: usize) -> Self {
        Self {
            peers: RwLock::new(BoundedFifoMap::new(capacity)),
        }
    }

    /// Insert or replace. Returns the peer evicted to make room, if any.
    pub fn add(&self, peer: Peer) -> Option<Peer> {
        self.peers
            .write()
            .insert(peer.ip, peer)
            .map(|(_, evicted)| evicted)
    }

    pub fn remove(&self, ip: &IpAddr) -> Option<Peer> {
        self.peers.write().remove(ip)
    }

    pub fn get(&self, ip: &IpAddr) -> Option<Peer> {
        self.peers.read().get(ip).cloned()
    }

    pub fn has(&self, ip: &IpAddr) -> bool {
        self.peers.read().contains_key(ip)
    }

    /// All peers, earliest added first.
    pub fn list(&self) -> Vec<Peer> {
        self.peers.read().values().cloned().collect()
    }

    pub fn count(&self) -> usize {
        self.peers.read().len()
    }

    pub fn capacity(&self) -> usize {
        self.peers.read().capacity()
    }

    /// Mutate a stored peer in place. Returns `false` if it is unknown.
    pub fn update<F>(&self, ip: &IpAddr, mutate: F) -> bool
    where
        F: FnOnce(&mut Peer),
    {
        match self.peers.write().get_mut(ip) {
            Some(peer) => {
                mutate(peer);
                true
            }
            None => false,
        }
    }

    /// Peers with a successful verification no older than `ttl_secs`.
    pub fn eligible(&self, now: u64, ttl_secs: u64) -> Vec<Peer> {
        self.peers
            .read()
            .values()
            .filter(|peer| peer.is_eligible(now, ttl_secs))
            .cloned()
            .collect()
    }
}
