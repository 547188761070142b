//! # Cluster Fixtures
//!
//! Every node is a full [`SubsystemContainer`] whose responder is
//! registered on a shared [`SimulatedNetwork`] at `10.0.0.<n>:4002`. All
//! nodes share one clock and one delegate key, so chains forged here are
//! valid everywhere.

use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::sync::Arc;
use std::time::Duration;

use dc_01_peer_network::test_utils::{
    test_config, FixedTimeSource, SimulatedNetwork, TEST_PORT,
};
use dc_01_peer_network::P2pConfig;
use dc_02_block_sync::{DatabaseService, SyncState, SyncStatus};
use ed25519_dalek::SigningKey;
use node_runtime::adapters::forge_block;
use node_runtime::container::ChainConfig;
use node_runtime::genesis::GenesisBuilder;
use node_runtime::{NodeConfig, SubsystemContainer};
use shared_types::{Block, BlockId};
use tokio::sync::watch;

/// Unix time every node sees: slot 1250.
pub const NOW: u64 = 10_000;

const DELEGATE_SEED: [u8; 32] = [7; 32];

pub fn address(n: u8) -> SocketAddr {
    SocketAddr::new(IpAddr::V4(Ipv4Addr::new(10, 0, 0, n)), TEST_PORT)
}

pub struct Cluster {
    pub network: Arc<SimulatedNetwork>,
    pub time: Arc<FixedTimeSource>,
    key: SigningKey,
    genesis: Block,
}

impl Default for Cluster {
    fn default() -> Self {
        Self::new()
    }
}

impl Cluster {
    pub fn new() -> Self {
        let key = SigningKey::from_bytes(&DELEGATE_SEED);
        let chain = ChainConfig {
            delegates: vec![hex::encode(key.verifying_key().as_bytes())],
            ..ChainConfig::default()
        };
        let genesis = GenesisBuilder::new(&chain).build().expect("genesis");
        Self {
            network: SimulatedNetwork::new(),
            time: Arc::new(FixedTimeSource::new(NOW)),
            key,
            genesis,
        }
    }

    pub fn delegate(&self) -> String {
        hex::encode(self.key.verifying_key().as_bytes())
    }

    pub fn key(&self) -> &SigningKey {
        &self.key
    }

    /// Genesis followed by `len - 1` blocks, one per slot.
    pub fn chain(&self, len: u64) -> Vec<Block> {
        self.extend(&[self.genesis.clone()], len - 1, 1)
    }

    /// `base` plus `count` signed blocks, `spacing` slots apart. Different
    /// spacings from the same base give competing branches.
    pub fn extend(&self, base: &[Block], count: u64, spacing: u64) -> Vec<Block> {
        let mut chain = base.to_vec();
        for _ in 0..count {
            let previous = chain.last().expect("non-empty base").header.clone();
            let timestamp = previous.timestamp + 8 * spacing;
            chain.push(forge_block(&self.key, &previous, timestamp, Vec::new()));
        }
        chain
    }

    pub fn config(&self, seeds: Vec<SocketAddr>) -> NodeConfig {
        let mut config = NodeConfig::default();
        config.p2p = P2pConfig {
            seeds,
            ..test_config()
        };
        config.sync.check_network_retry_ms = 20;
        config.sync.idle_wakeup_secs = Some(1);
        config.chain.delegates = vec![self.delegate()];
        config.api.enabled = false;
        config
    }

    /// Build node `n` holding `blocks` and put it on the network. It answers
    /// peers right away but runs no loops until [`TestNode::start`].
    pub async fn add(&self, n: u8, blocks: &[Block], seeds: Vec<SocketAddr>) -> TestNode {
        self.add_with(n, blocks, self.config(seeds)).await
    }

    pub async fn add_with(&self, n: u8, blocks: &[Block], config: NodeConfig) -> TestNode {
        let address = address(n);
        let container = SubsystemContainer::with_transport(
            config,
            self.network.transport_for(address.ip()),
            self.time.clone(),
        )
        .expect("container");
        assert_eq!(container.genesis_id, self.genesis.id());
        for block in blocks.iter().skip(1) {
            container.store.save_block(block).await.expect("preload block");
        }
        self.network
            .register_handler(address, container.responder.clone());

        let (shutdown, _) = watch::channel(false);
        TestNode {
            address,
            container: Arc::new(container),
            shutdown,
        }
    }
}

pub struct TestNode {
    pub address: SocketAddr,
    pub container: Arc<SubsystemContainer>,
    shutdown: watch::Sender<bool>,
}

impl TestNode {
    /// Admit seeds, then run the monitor and sync loops.
    pub fn start(&self) {
        let monitor = self.container.monitor.clone();
        let rx = self.shutdown.subscribe();
        tokio::spawn(async move {
            monitor.start().await;
            monitor.run(rx).await;
        });

        let sync = self.container.sync.clone();
        tokio::spawn(sync.run(self.shutdown.subscribe()));
        self.container.sync.request();
    }

    pub fn height(&self) -> u64 {
        self.container.store.height()
    }

    pub fn tip_id(&self) -> Option<BlockId> {
        self.container.processor.tip().map(|header| header.id)
    }

    pub fn ip(&self) -> IpAddr {
        self.address.ip()
    }

    pub async fn wait_for(&self, done: impl Fn(&SyncStatus) -> bool) -> SyncStatus {
        let mut rx = self.container.sync.subscribe_status();
        let status = tokio::time::timeout(Duration::from_secs(15), rx.wait_for(|status| done(status)))
            .await
            .expect("node did not reach the expected status")
            .expect("status channel closed")
            .clone();
        status
    }

    pub async fn wait_for_idle_at(&self, height: u64) -> SyncStatus {
        self.wait_for(|s| s.state == SyncState::Idle && s.tip_height == height)
            .await
    }

    /// Poll the store; blocks pushed by peers land without a state change.
    pub async fn wait_for_height(&self, height: u64) {
        tokio::time::timeout(Duration::from_secs(15), async {
            while self.height() < height {
                tokio::time::sleep(Duration::from_millis(20)).await;
            }
        })
        .await
        .expect("node did not reach the expected height");
    }
}

impl Drop for TestNode {
    fn drop(&mut self) {
        let _ = self.shutdown.send(true);
    }
}
