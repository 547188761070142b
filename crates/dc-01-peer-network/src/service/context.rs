//! Explicitly constructed context shared by every peer network component.

use shared_types::SlotClock;
use std::sync::Arc;
use tokio::sync::broadcast;

use crate::domain::{
    ConfigError, P2pConfig, Peer, PeerEvent, PeerGuard, PeerRateLimiter, PeerRepository, ProtocolHeaders,
    QuorumPolicy, VerifiedBlockCache,
};
use crate::ports::{BlockVerifier, ChainReader, PeerTransport, TimeSource};

const EVENT_CHANNEL_CAPACITY: usize = 1024;

/// Shared state and ports of the peer network subsystem.
///
/// `repository` and `verified_blocks` are the only shared mutable state;
/// both lock internally.
pub struct PeerNetworkContext {
    pub config: P2pConfig,
    pub slots: SlotClock,
    pub repository: Arc<PeerRepository>,
    pub guard: PeerGuard,
    pub verified_blocks: VerifiedBlockCache,
    pub rate_limiter: PeerRateLimiter,
    pub transport: Arc<dyn PeerTransport>,
    pub chain: Arc<dyn ChainReader>,
    pub block_verifier: Arc<dyn BlockVerifier>,
    pub time: Arc<dyn TimeSource>,
    events: broadcast::Sender<PeerEvent>,
}

impl PeerNetworkContext {
    pub fn new(
        config: P2pConfig,
        slots: SlotClock,
        transport: Arc<dyn PeerTransport>,
        chain: Arc<dyn ChainReader>,
        block_verifier: Arc<dyn BlockVerifier>,
        time: Arc<dyn TimeSource>,
    ) -> Result<Arc<Self>, ConfigError> {
        config.validate()?;
        let guard = PeerGuard::new(&config)?;
        let rate_limiter = PeerRateLimiter::new(
            config.rate_limit_attempts,
            config.rate_limit_window_secs,
            config.peer_capacity.saturating_mul(4).max(64),
        );

        let (events, _) = broadcast::channel(EVENT_CHANNEL_CAPACITY);

        Ok(Arc::new(Self {
            events,
            repository: Arc::new(PeerRepository::new(config.peer_capacity)),
            verified_blocks: VerifiedBlockCache::new(config.verified_block_cache_capacity),
            guard,
            rate_limiter,
            slots,
            transport,
            chain,
            block_verifier,
            time,
            config,
        }))
    }

    pub fn now(&self) -> u64 {
        self.time.now()
    }

    pub fn current_slot(&self) -> u64 {
        self.slots.slot_number(self.slots.epoch_time(self.now()))
    }

    pub fn local_headers(&self) -> ProtocolHeaders {
        ProtocolHeaders::new(
            self.config.nethash.clone(),
            self.config.version.clone(),
            self.config.port,
        )
    }

    pub fn quorum_policy(&self) -> QuorumPolicy {
        QuorumPolicy {
            minimum_network_reach: self.config.minimum_network_reach,
            quorum_threshold: self.config.quorum_threshold,
            height_tolerance: self.config.quorum_height_tolerance,
            seed_mode: self.config.is_seed_mode(),
        }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<PeerEvent> {
        self.events.subscribe()
    }

    pub fn publish(&self, event: PeerEvent) {
        // No subscribers is fine.
        let _ = self.events.send(event);
    }

    /// Eligible peers right now.
    pub fn eligible_peers(&self) -> Vec<Peer> {
        self.repository
            .eligible(self.now(), self.config.verification_ttl_secs)
    }
}
