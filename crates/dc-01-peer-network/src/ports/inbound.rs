//! # Driving Ports (Inbound API)
//!
//! What the rest of the node (block sync, forger, status endpoints) uses.

use async_trait::async_trait;
use shared_types::{Block, SerializedTransaction};
use std::net::IpAddr;

use crate::domain::{
    DownloadError, NetworkHealth, NetworkState, ProtocolHeaders, WireReply, WireRequest,
};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ColdStartOptions {
    /// Accept being the only node of the network.
    pub allow_single_node: bool,
}

#[async_trait]
pub trait PeerNetworkApi: Send + Sync {
    /// Probe a sample of eligible peers and recompute the network state.
    async fn refresh_network_state(&self) -> NetworkState;

    /// Last computed state without probing.
    fn last_network_state(&self) -> Option<NetworkState>;

    /// Median height reported by eligible peers, 0 without any.
    fn network_height(&self) -> u64;

    /// Whether this node may forge with no or few peers.
    fn is_cold_start_ok(&self, options: ColdStartOptions) -> bool;

    fn eligible_peer_count(&self) -> usize;

    /// Whether the local chain is forked away from the verified majority.
    async fn check_network_health(&self) -> NetworkHealth;

    /// Blocks above `from_height` from eligible peers, in height order and
    /// without gaps.
    async fn download_blocks(&self, from_height: u64) -> Result<Vec<Block>, DownloadError>;

    /// Returns how many peers accepted the block.
    async fn broadcast_block(&self, block: &Block) -> usize;

    async fn broadcast_transactions(&self, transactions: &[SerializedTransaction]) -> usize;
}

/// Serving side of the wire protocol, independent of the transport that
/// carries it.
#[async_trait]
pub trait PeerRequestHandler: Send + Sync {
    /// `headers` is `None` when the request lacked valid protocol headers.
    async fn handle(
        &self,
        remote: IpAddr,
        headers: Option<ProtocolHeaders>,
        request: WireRequest,
    ) -> WireReply;
}
