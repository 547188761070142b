//! # Driven Ports (Outbound SPI)
//!
//! Interfaces the host application implements for this subsystem: the wire
//! transport, read access to the local chain, block signature checks, a
//! clock, and the sinks that receive blocks and transactions pushed by peers.
//!
//! All ports are `Send + Sync` so one instance can be shared by the monitor,
//! the responder and any number of in-flight verifications.

use async_trait::async_trait;
use shared_types::{Block, BlockHeader, BlockId, SerializedTransaction};
use std::net::{IpAddr, SocketAddr};
use thiserror::Error;

use crate::domain::{ProtocolHeaders, WireReply, WireRequest};

/// One request/response exchange with a remote node.
///
/// Implementations enforce no deadline of their own beyond connection
/// setup; the communicator bounds every call.
#[async_trait]
pub trait PeerTransport: Send + Sync {
    async fn send(
        &self,
        target: SocketAddr,
        headers: &ProtocolHeaders,
        request: &WireRequest,
    ) -> Result<WireReply, TransportError>;
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TransportError {
    #[error("timed out")]
    Timeout,

    #[error("connection refused: {0}")]
    Refused(String),

    /// The bytes arrived but were not a reply.
    #[error("undecodable reply: {0}")]
    Decode(String),
}

/// Read-only view of the local chain.
#[async_trait]
pub trait ChainReader: Send + Sync {
    async fn last_block(&self) -> Result<BlockHeader, ChainReadError>;

    /// Headers at the given heights, in the same order. Fails if any height
    /// is above the tip.
    async fn headers_at_heights(&self, heights: &[u64]) -> Result<Vec<BlockHeader>, ChainReadError>;

    /// Up to `limit` consecutive blocks starting at `height + 1`.
    async fn blocks_after(&self, height: u64, limit: u64) -> Result<Vec<Block>, ChainReadError>;

    /// The highest of `ids` that is part of the local chain.
    async fn common_block(&self, ids: &[BlockId]) -> Result<Option<BlockHeader>, ChainReadError>;

    /// Generator public keys (hex) of the delegates active in `round`.
    async fn active_delegates(&self, round: u64) -> Result<Vec<String>, ChainReadError>;
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ChainReadError {
    #[error("chain store unavailable: {0}")]
    Unavailable(String),

    #[error("no block at height {0}")]
    MissingHeight(u64),
}

/// Integrity and signature checks of a block.
pub trait BlockVerifier: Send + Sync {
    /// The block's id commits to its header fields and transaction payload.
    /// Cheap; run on every block, cached or not.
    fn verify_integrity(&self, block: &Block) -> bool;

    /// Integrity plus the generator's signature over the id.
    fn verify_signature(&self, block: &Block) -> bool;
}

/// Wall clock in unix seconds.
pub trait TimeSource: Send + Sync {
    fn now(&self) -> u64;
}

/// Where blocks pushed by peers go.
#[async_trait]
pub trait BlockSink: Send + Sync {
    async fn submit_block(&self, block: Block, source: Option<IpAddr>) -> BlockSubmission;
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BlockSubmission {
    Queued,
    Discarded(String),
}

/// Where transactions pushed by peers go. Returns how many were accepted.
#[async_trait]
pub trait TransactionSink: Send + Sync {
    async fn submit_transactions(&self, transactions: Vec<SerializedTransaction>) -> usize;
}
