//! # Subsystem Container
//!
//! Holds every subsystem instance, built once in dependency order:
//!
//! ```text
//! Level 0: chain store (genesis), transaction pool, signature verifier
//! Level 1: peer network context, network monitor (dc-01)
//! Level 2: block processor, sync service (dc-02)
//! Level 3: peer responder (serves dc-01 wire requests into dc-02)
//! ```
//!
//! Everything is shared through `Arc`. The sync service reaches the network
//! through `PeerNetworkApi` and the responder pushes into the sync service
//! through `BlockSink`, so neither crate names the other's concrete types.

use std::sync::Arc;

use dc_01_peer_network::{
    NetworkMonitor, PeerNetworkContext, PeerRequestHandler, PeerResponder, PeerTransport,
    SystemTimeSource, TimeSource, TransportError,
};
use dc_02_block_sync::{BlockProcessor, MemoryChainStore, MemoryTransactionPool, SyncService};
use shared_types::BlockId;
use thiserror::Error;
use tracing::info;

use crate::adapters::signature::Ed25519BlockVerifier;
use crate::container::config::NodeConfig;
use crate::genesis::{GenesisBuilder, GenesisError};

#[derive(Debug, Error)]
pub enum ContainerError {
    #[error(transparent)]
    Genesis(#[from] GenesisError),

    #[error("peer network: {0}")]
    Network(#[from] dc_01_peer_network::ConfigError),

    #[error("transport: {0}")]
    Transport(#[from] TransportError),
}

/// Central container holding all subsystem instances.
pub struct SubsystemContainer {
    pub config: NodeConfig,
    pub genesis_id: BlockId,

    pub store: Arc<MemoryChainStore>,
    pub pool: Arc<MemoryTransactionPool>,

    pub network: Arc<PeerNetworkContext>,
    pub monitor: Arc<NetworkMonitor>,

    pub processor: Arc<BlockProcessor>,
    pub sync: Arc<SyncService>,

    /// Handler behind the peer HTTP routes.
    pub responder: Arc<dyn PeerRequestHandler>,
}

impl SubsystemContainer {
    /// Production wiring: HTTP transport and the system clock.
    pub fn new(config: NodeConfig) -> Result<Self, ContainerError> {
        let p2p = &config.p2p;
        let timeout = p2p
            .get_blocks_timeout()
            .max(p2p.post_block_timeout())
            .max(p2p.request_timeout());
        let transport = Arc::new(dc_01_peer_network::HttpTransport::new(timeout)?);
        Self::with_transport(config, transport, Arc::new(SystemTimeSource::new()))
    }

    /// Wiring with an injected transport and clock.
    pub fn with_transport(
        mut config: NodeConfig,
        transport: Arc<dyn PeerTransport>,
        time: Arc<dyn TimeSource>,
    ) -> Result<Self, ContainerError> {
        let genesis = GenesisBuilder::new(&config.chain).build()?;
        let genesis_id = genesis.id();
        match config.sync.genesis_block_id {
            Some(expected) if expected != genesis_id => {
                tracing::warn!(
                    configured = %expected,
                    derived = %genesis_id,
                    "[node] configured genesis id differs from chain config"
                );
            }
            Some(_) => {}
            None => config.sync.genesis_block_id = Some(genesis_id),
        }

        // Level 0
        let store = Arc::new(MemoryChainStore::new(genesis, config.chain.delegates.clone()));
        let pool = Arc::new(MemoryTransactionPool::new(config.node.transaction_pool_capacity));
        let verifier = Arc::new(Ed25519BlockVerifier::new(Some(genesis_id)));

        // Level 1
        let network = PeerNetworkContext::new(
            config.p2p.clone(),
            config.chain.slots(),
            transport,
            store.clone(),
            verifier,
            time,
        )?;
        let monitor = Arc::new(NetworkMonitor::new(network.clone()));

        // Level 2
        let processor = Arc::new(BlockProcessor::new(
            network.clone(),
            store.clone(),
            pool.clone(),
            &config.sync,
        ));
        let sync = Arc::new(SyncService::new(
            config.sync.clone(),
            monitor.clone(),
            processor.clone(),
        ));

        // Level 3
        let responder: Arc<dyn PeerRequestHandler> =
            Arc::new(PeerResponder::new(&monitor, sync.clone(), pool.clone()));

        info!(
            genesis = %genesis_id,
            nethash = %config.p2p.nethash,
            seeds = config.p2p.seeds.len(),
            delegates = config.chain.delegates.len(),
            "[node] subsystems initialized"
        );

        Ok(Self {
            config,
            genesis_id,
            store,
            pool,
            network,
            monitor,
            processor,
            sync,
            responder,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use dc_01_peer_network::test_utils::{FixedTimeSource, SimulatedNetwork};
    use std::net::{IpAddr, Ipv4Addr};

    const DELEGATE: &str = "d75a980182b10ab7d54bfed3c964073a0ee172f3daa62325af021a68f707511a";

    fn config() -> NodeConfig {
        let mut config = NodeConfig::default();
        config.chain.delegates = vec![DELEGATE.into()];
        config
    }

    fn build(config: NodeConfig) -> SubsystemContainer {
        let network = SimulatedNetwork::new();
        SubsystemContainer::with_transport(
            config,
            network.transport_for(IpAddr::V4(Ipv4Addr::LOCALHOST)),
            Arc::new(FixedTimeSource::new(1_000)),
        )
        .unwrap()
    }

    #[tokio::test]
    async fn test_container_starts_from_genesis() {
        let container = build(config());
        assert_eq!(container.store.height(), 1);
        assert_eq!(container.config.sync.genesis_block_id, Some(container.genesis_id));

        let tip = container.processor.load_tip(Some(container.genesis_id)).await.unwrap();
        assert_eq!(tip.id, container.genesis_id);
    }

    #[tokio::test]
    async fn test_genesis_shared_across_nodes() {
        let a = build(config());
        let b = build(config());
        assert_eq!(a.genesis_id, b.genesis_id);
    }

    #[test]
    fn test_missing_delegates_fail() {
        let network = SimulatedNetwork::new();
        let result = SubsystemContainer::with_transport(
            NodeConfig::default(),
            network.transport_for(IpAddr::V4(Ipv4Addr::LOCALHOST)),
            Arc::new(FixedTimeSource::new(0)),
        );
        assert!(matches!(result, Err(ContainerError::Genesis(_))));
    }
}
