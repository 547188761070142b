//! Test utilities for the peer network.
//!
//! Deterministic chains, a controllable clock and an in-process network of
//! simulated nodes speaking the wire protocol. Enable with the `test-utils`
//! feature flag.
//!
//! # Example
//!
//! ```rust,ignore
//! use dc_01_peer_network::test_utils::{build_chain, fork_chain};
//!
//! let main = build_chain(10, 1);
//! let fork = fork_chain(&main, 6, 4, 2);
//! assert_eq!(main[5].id(), fork[5].id());
//! assert_ne!(main[6].id(), fork[6].id());
//! ```

use async_trait::async_trait;
use parking_lot::{Mutex, RwLock};
use shared_types::{Block, BlockHeader, BlockId, SerializedTransaction, SlotClock};
use std::collections::HashMap;
use std::net::{IpAddr, SocketAddr};
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use crate::domain::{
    BlocksReply, CommonBlock, CommonBlockReply, P2pConfig, PeerBroadcast, PeerConfigInfo,
    PeerListReply, ProtocolHeaders, StatusReply, WireReply, WireRequest,
};
use crate::ports::{
    BlockSink, BlockSubmission, BlockVerifier, ChainReadError, ChainReader, PeerRequestHandler,
    PeerTransport, TimeSource, TransactionSink, TransportError,
};
use crate::service::PeerNetworkContext;

/// The only delegate of every test chain.
pub const TEST_DELEGATE: &str = "d1e9a7e3c0b5f2a4d6c8e0f1a3b5c7d9e1f3a5c7e9b1d3f5a7c9e1b3d5f7a9c1";

pub const TEST_NETHASH: &str = "devnet";
pub const TEST_VERSION: &str = "1.0.0";
pub const TEST_PORT: u16 = 4002;

// =============================================================================
// CLOCK
// =============================================================================

/// Unix seconds that only move when told to.
#[derive(Debug, Default)]
pub struct FixedTimeSource {
    now: AtomicU64,
}

impl FixedTimeSource {
    pub fn new(now: u64) -> Self {
        Self {
            now: AtomicU64::new(now),
        }
    }

    pub fn set(&self, now: u64) {
        self.now.store(now, Ordering::SeqCst);
    }

    pub fn advance(&self, secs: u64) {
        self.now.fetch_add(secs, Ordering::SeqCst);
    }
}

impl TimeSource for FixedTimeSource {
    fn now(&self) -> u64 {
        self.now.load(Ordering::SeqCst)
    }
}

// =============================================================================
// CHAINS
// =============================================================================

/// Block at `height` on branch `tag`. Ids are deterministic: the height in
/// the first 8 bytes, the tag in the ninth.
pub fn make_block(height: u64, tag: u8, previous: Option<BlockId>) -> Block {
    let mut id = [0u8; 32];
    id[..8].copy_from_slice(&height.to_be_bytes());
    id[8] = tag;
    Block::new(BlockHeader {
        id: BlockId::new(id),
        version: 0,
        height,
        previous_block_id: previous,
        timestamp: height * 8,
        number_of_transactions: 0,
        payload_hash: String::new(),
        generator_public_key: TEST_DELEGATE.to_string(),
        signature: BlockId::new(id).to_hex(),
    })
}

/// Chain of heights `1..=len`. The genesis block is shared by every tag.
pub fn build_chain(len: u64, tag: u8) -> Vec<Block> {
    let mut chain: Vec<Block> = Vec::with_capacity(len as usize);
    for height in 1..=len {
        let branch = if height == 1 { 0 } else { tag };
        let previous = chain.last().map(Block::id);
        chain.push(make_block(height, branch, previous));
    }
    chain
}

/// `base[..at]` extended by `extra` blocks on branch `tag`. With an empty
/// base the genesis block itself carries the tag.
pub fn fork_chain(base: &[Block], at: u64, extra: u64, tag: u8) -> Vec<Block> {
    let mut chain: Vec<Block> = base.iter().take(at as usize).cloned().collect();
    let start = chain.len() as u64 + 1;
    for height in start..start + extra {
        let previous = chain.last().map(Block::id);
        chain.push(make_block(height, tag, previous));
    }
    chain
}

/// In-memory [`ChainReader`] over a vector of consecutive blocks.
#[derive(Debug, Default)]
pub struct MockChain {
    blocks: RwLock<Vec<Block>>,
    unavailable: AtomicBool,
}

impl MockChain {
    pub fn new(blocks: Vec<Block>) -> Self {
        Self {
            blocks: RwLock::new(blocks),
            unavailable: AtomicBool::new(false),
        }
    }

    /// Panics on an empty chain.
    pub fn tip(&self) -> BlockHeader {
        self.blocks.read().last().map(|b| b.header.clone()).expect("chain is empty")
    }

    pub fn blocks(&self) -> Vec<Block> {
        self.blocks.read().clone()
    }

    pub fn push(&self, block: Block) {
        self.blocks.write().push(block);
    }

    /// Keep heights `1..=height`.
    pub fn truncate(&self, height: u64) {
        self.blocks.write().truncate(height as usize);
    }

    pub fn set_unavailable(&self, unavailable: bool) {
        self.unavailable.store(unavailable, Ordering::SeqCst);
    }

    fn check(&self) -> Result<(), ChainReadError> {
        if self.unavailable.load(Ordering::SeqCst) {
            return Err(ChainReadError::Unavailable("mock chain switched off".into()));
        }
        Ok(())
    }
}

#[async_trait]
impl ChainReader for MockChain {
    async fn last_block(&self) -> Result<BlockHeader, ChainReadError> {
        self.check()?;
        self.blocks
            .read()
            .last()
            .map(|b| b.header.clone())
            .ok_or_else(|| ChainReadError::Unavailable("empty chain".into()))
    }

    async fn headers_at_heights(&self, heights: &[u64]) -> Result<Vec<BlockHeader>, ChainReadError> {
        self.check()?;
        let blocks = self.blocks.read();
        heights
            .iter()
            .map(|&height| {
                height
                    .checked_sub(1)
                    .and_then(|i| blocks.get(i as usize))
                    .map(|b| b.header.clone())
                    .ok_or(ChainReadError::MissingHeight(height))
            })
            .collect()
    }

    async fn blocks_after(&self, height: u64, limit: u64) -> Result<Vec<Block>, ChainReadError> {
        self.check()?;
        Ok(self
            .blocks
            .read()
            .iter()
            .filter(|b| b.height() > height)
            .take(limit as usize)
            .cloned()
            .collect())
    }

    async fn common_block(&self, ids: &[BlockId]) -> Result<Option<BlockHeader>, ChainReadError> {
        self.check()?;
        Ok(self
            .blocks
            .read()
            .iter()
            .rev()
            .find(|b| ids.contains(&b.id()))
            .map(|b| b.header.clone()))
    }

    async fn active_delegates(&self, _round: u64) -> Result<Vec<String>, ChainReadError> {
        self.check()?;
        Ok(vec![TEST_DELEGATE.to_string()])
    }
}

pub struct AcceptAllVerifier;

impl BlockVerifier for AcceptAllVerifier {
    fn verify_integrity(&self, _block: &Block) -> bool {
        true
    }

    fn verify_signature(&self, _block: &Block) -> bool {
        true
    }
}

pub struct RejectAllVerifier;

impl BlockVerifier for RejectAllVerifier {
    fn verify_integrity(&self, _block: &Block) -> bool {
        false
    }

    fn verify_signature(&self, _block: &Block) -> bool {
        false
    }
}

/// Stands in for real hashing over fake-id test chains: a block keeps its
/// integrity while everything but the signature matches the known block with
/// that id, and passes the signature check only when it matches exactly.
pub struct KnownBlocksVerifier {
    blocks: HashMap<BlockId, Block>,
}

impl KnownBlocksVerifier {
    pub fn new<'a>(blocks: impl IntoIterator<Item = &'a Block>) -> Self {
        Self {
            blocks: blocks.into_iter().map(|b| (b.id(), b.clone())).collect(),
        }
    }
}

impl BlockVerifier for KnownBlocksVerifier {
    fn verify_integrity(&self, block: &Block) -> bool {
        let Some(known) = self.blocks.get(&block.id()) else {
            return false;
        };
        let mut unsigned = block.header.clone();
        unsigned.signature = known.header.signature.clone();
        unsigned == known.header && block.transactions == known.transactions
    }

    fn verify_signature(&self, block: &Block) -> bool {
        self.blocks.get(&block.id()) == Some(block)
    }
}

/// Records whatever peers push to us.
#[derive(Debug, Default)]
pub struct RecordingSink {
    blocks: Mutex<Vec<(Block, Option<IpAddr>)>>,
    transactions: Mutex<Vec<SerializedTransaction>>,
}

impl RecordingSink {
    pub fn blocks(&self) -> Vec<(Block, Option<IpAddr>)> {
        self.blocks.lock().clone()
    }

    pub fn transactions(&self) -> Vec<SerializedTransaction> {
        self.transactions.lock().clone()
    }
}

#[async_trait]
impl BlockSink for RecordingSink {
    async fn submit_block(&self, block: Block, source: Option<IpAddr>) -> BlockSubmission {
        self.blocks.lock().push((block, source));
        BlockSubmission::Queued
    }
}

#[async_trait]
impl TransactionSink for RecordingSink {
    async fn submit_transactions(&self, transactions: Vec<SerializedTransaction>) -> usize {
        let accepted = transactions.len();
        self.transactions.lock().extend(transactions);
        accepted
    }
}

// =============================================================================
// CONTEXT
// =============================================================================

/// Small, fast configuration for a devnet of a handful of nodes.
pub fn test_config() -> P2pConfig {
    P2pConfig {
        nethash: TEST_NETHASH.into(),
        version: TEST_VERSION.into(),
        port: TEST_PORT,
        minimum_network_reach: 2,
        refresh_deadline_ms: 2_000,
        verify_timeout_ms: 20_000,
        max_download_blocks: 100,
        peer_capacity: 100,
        verified_block_cache_capacity: 1_000,
        ..P2pConfig::default()
    }
}

/// 8 second slots, 51 delegates, epoch at unix time 0.
pub fn test_slots() -> SlotClock {
    SlotClock::new(0, 8, 51)
}

pub fn test_context(
    transport: Arc<dyn PeerTransport>,
    chain: Arc<dyn ChainReader>,
    time: Arc<dyn TimeSource>,
) -> Arc<PeerNetworkContext> {
    test_context_with(transport, chain, time, test_config(), Arc::new(AcceptAllVerifier))
}

pub fn test_context_with(
    transport: Arc<dyn PeerTransport>,
    chain: Arc<dyn ChainReader>,
    time: Arc<dyn TimeSource>,
    config: P2pConfig,
    block_verifier: Arc<dyn BlockVerifier>,
) -> Arc<PeerNetworkContext> {
    PeerNetworkContext::new(config, test_slots(), transport, chain, block_verifier, time)
        .expect("test config is valid")
}

// =============================================================================
// SIMULATED NETWORK
// =============================================================================

/// Routes requests between in-process handlers by socket address.
#[derive(Default)]
pub struct SimulatedNetwork {
    routes: RwLock<HashMap<SocketAddr, Route>>,
}

#[derive(Clone)]
struct Route {
    handler: Arc<dyn PeerRequestHandler>,
    node: Option<Arc<SimulatedNode>>,
}

impl SimulatedNetwork {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Serve `address` from a simulated node, honouring its offline switch.
    pub fn register(&self, address: SocketAddr, node: Arc<SimulatedNode>) {
        let route = Route {
            handler: node.clone(),
            node: Some(node),
        };
        self.routes.write().insert(address, route);
    }

    /// Serve `address` from any handler, e.g. a real responder.
    pub fn register_handler(&self, address: SocketAddr, handler: Arc<dyn PeerRequestHandler>) {
        self.routes.write().insert(address, Route { handler, node: None });
    }

    pub fn unregister(&self, address: &SocketAddr) {
        self.routes.write().remove(address);
    }

    /// Transport whose requests appear to come from `source`.
    pub fn transport_for(self: &Arc<Self>, source: IpAddr) -> Arc<dyn PeerTransport> {
        Arc::new(SimulatedTransport {
            network: self.clone(),
            source,
        })
    }
}

struct SimulatedTransport {
    network: Arc<SimulatedNetwork>,
    source: IpAddr,
}

#[async_trait]
impl PeerTransport for SimulatedTransport {
    async fn send(
        &self,
        target: SocketAddr,
        headers: &ProtocolHeaders,
        request: &WireRequest,
    ) -> Result<WireReply, TransportError> {
        let route = self.network.routes.read().get(&target).cloned();
        let Some(route) = route else {
            return Err(TransportError::Refused(format!("nothing listens on {target}")));
        };
        if route.node.as_ref().is_some_and(|node| node.is_offline()) {
            return Err(TransportError::Refused(format!("{target} is offline")));
        }
        Ok(route.handler.handle(self.source, Some(headers.clone()), request.clone()).await)
    }
}

/// A remote node serving its own [`MockChain`].
pub struct SimulatedNode {
    chain: Arc<MockChain>,
    nethash: RwLock<String>,
    peers: RwLock<Vec<PeerBroadcast>>,
    delay: RwLock<Option<Duration>>,
    offline: AtomicBool,
    refuse_blocks_from: RwLock<Option<u64>>,
    current_slot: AtomicU64,
    posted_blocks: Mutex<Vec<Block>>,
    posted_transactions: Mutex<Vec<SerializedTransaction>>,
    requests: AtomicUsize,
}

impl SimulatedNode {
    pub fn new(chain: Arc<MockChain>) -> Arc<Self> {
        Arc::new(Self {
            chain,
            nethash: RwLock::new(TEST_NETHASH.into()),
            peers: RwLock::new(Vec::new()),
            delay: RwLock::new(None),
            offline: AtomicBool::new(false),
            refuse_blocks_from: RwLock::new(None),
            current_slot: AtomicU64::new(0),
            posted_blocks: Mutex::new(Vec::new()),
            posted_transactions: Mutex::new(Vec::new()),
            requests: AtomicUsize::new(0),
        })
    }

    pub fn chain(&self) -> &Arc<MockChain> {
        &self.chain
    }

    pub fn set_offline(&self, offline: bool) {
        self.offline.store(offline, Ordering::SeqCst);
    }

    pub fn is_offline(&self) -> bool {
        self.offline.load(Ordering::SeqCst)
    }

    /// Hold every reply for `delay`.
    pub fn set_delay(&self, delay: Option<Duration>) {
        *self.delay.write() = delay;
    }

    pub fn set_nethash(&self, nethash: impl Into<String>) {
        *self.nethash.write() = nethash.into();
    }

    pub fn set_peers(&self, peers: Vec<PeerBroadcast>) {
        *self.peers.write() = peers;
    }

    pub fn set_current_slot(&self, slot: u64) {
        self.current_slot.store(slot, Ordering::SeqCst);
    }

    /// Serve no blocks above `height`.
    pub fn refuse_blocks_from(&self, height: u64) {
        *self.refuse_blocks_from.write() = Some(height);
    }

    pub fn posted_blocks(&self) -> Vec<Block> {
        self.posted_blocks.lock().clone()
    }

    pub fn posted_transactions(&self) -> Vec<SerializedTransaction> {
        self.posted_transactions.lock().clone()
    }

    /// Requests served so far.
    pub fn requests(&self) -> usize {
        self.requests.load(Ordering::SeqCst)
    }

    fn headers(&self) -> ProtocolHeaders {
        ProtocolHeaders::new(self.nethash.read().clone(), TEST_VERSION, TEST_PORT)
    }

    fn reply<T: serde::Serialize>(&self, status: u16, body: &T) -> WireReply {
        WireReply {
            status,
            headers: Some(self.headers()),
            body: serde_json::to_value(body).expect("reply serializes"),
        }
    }

    async fn serve(&self, request: WireRequest) -> Result<WireReply, ChainReadError> {
        let reply = match request {
            WireRequest::GetPeers => self.reply(
                200,
                &PeerListReply {
                    success: true,
                    peers: self.peers.read().clone(),
                },
            ),
            WireRequest::GetBlocks { from_height, limit } => {
                let refused = self.refuse_blocks_from.read().is_some_and(|h| from_height >= h);
                let blocks = if refused {
                    Vec::new()
                } else {
                    let limit = self
                        .refuse_blocks_from
                        .read()
                        .map_or(limit, |h| limit.min(h - from_height));
                    self.chain.blocks_after(from_height, limit).await?
                };
                self.reply(200, &BlocksReply { blocks })
            }
            WireRequest::GetCommonBlocks { ids } => {
                let common = self.chain.common_block(&ids).await?;
                let last = self.chain.last_block().await?;
                self.reply(
                    200,
                    &CommonBlockReply {
                        common: common.map(|h| CommonBlock {
                            id: h.id,
                            height: h.height,
                        }),
                        last_block_height: last.height,
                    },
                )
            }
            WireRequest::GetStatus => {
                let header = self.chain.last_block().await?;
                self.reply(
                    200,
                    &StatusReply {
                        height: header.height,
                        header,
                        forging_allowed: true,
                        current_slot: self.current_slot.load(Ordering::SeqCst),
                        config: Some(PeerConfigInfo {
                            version: TEST_VERSION.into(),
                            plugins: Default::default(),
                        }),
                    },
                )
            }
            WireRequest::PostBlock { block } => {
                self.posted_blocks.lock().push(*block);
                WireReply {
                    status: 204,
                    headers: Some(self.headers()),
                    body: serde_json::Value::Null,
                }
            }
            WireRequest::PostTransactions { transactions } => {
                let accepted = transactions.len();
                self.posted_transactions.lock().extend(transactions);
                self.reply(200, &serde_json::json!({ "success": true, "accepted": accepted }))
            }
        };
        Ok(reply)
    }
}

#[async_trait]
impl PeerRequestHandler for SimulatedNode {
    async fn handle(
        &self,
        _remote: IpAddr,
        _headers: Option<ProtocolHeaders>,
        request: WireRequest,
    ) -> WireReply {
        self.requests.fetch_add(1, Ordering::SeqCst);
        let delay = *self.delay.read();
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
        match self.serve(request).await {
            Ok(reply) => reply,
            Err(e) => self.reply(503, &serde_json::json!({ "success": false, "message": e.to_string() })),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_forks_share_prefix() {
        let base = build_chain(10, 1);
        let fork = fork_chain(&base, 6, 4, 2);
        assert_eq!(fork.len(), 10);
        assert_eq!(fork[5], base[5]);
        assert_ne!(fork[6].id(), base[6].id());
        assert_eq!(fork[6].header.previous_block_id, Some(base[5].id()));
    }

    #[test]
    fn test_separate_genesis() {
        let a = fork_chain(&[], 0, 3, 1);
        let b = fork_chain(&[], 0, 3, 2);
        assert_ne!(a[0].id(), b[0].id());
        assert_eq!(build_chain(3, 1)[0], build_chain(3, 2)[0]);
    }

    #[tokio::test]
    async fn test_mock_chain_reads() {
        let chain = MockChain::new(build_chain(10, 1));
        let after: Vec<u64> = chain.blocks_after(4, 3).await.unwrap().iter().map(Block::height).collect();
        assert_eq!(after, vec![5, 6, 7]);
        assert_eq!(
            chain.headers_at_heights(&[11]).await,
            Err(ChainReadError::MissingHeight(11))
        );
        chain.set_unavailable(true);
        assert!(chain.last_block().await.is_err());
    }
}
