//! # Peer responder
//!
//! Serving side of the wire protocol. Transport adapters (the runtime's
//! HTTP server, the simulated network in tests) turn incoming requests into
//! [`WireRequest`]s and hand them to [`PeerRequestHandler::handle`].

use async_trait::async_trait;
use rand::seq::SliceRandom;
use serde::Serialize;
use shared_types::{Block, BlockId, SerializedTransaction};
use std::net::IpAddr;
use std::sync::Arc;
use tracing::debug;

use super::context::PeerNetworkContext;
use super::monitor::NetworkMonitor;
use super::processor::{AcceptOptions, PeerProcessor};
use crate::domain::{
    BlocksReply, CommonBlock, CommonBlockReply, Peer, PeerConfigInfo, PeerListReply,
    ProtocolHeaders, StatusReply, WireReply, WireRequest,
};
use crate::ports::{
    BlockSink, BlockSubmission, ChainReadError, PeerRequestHandler, TransactionSink,
};

pub struct PeerResponder {
    ctx: Arc<PeerNetworkContext>,
    processor: Arc<PeerProcessor>,
    blocks: Arc<dyn BlockSink>,
    transactions: Arc<dyn TransactionSink>,
}

impl PeerResponder {
    pub fn new(
        monitor: &NetworkMonitor,
        blocks: Arc<dyn BlockSink>,
        transactions: Arc<dyn TransactionSink>,
    ) -> Self {
        Self {
            ctx: monitor.context().clone(),
            processor: monitor.processor().clone(),
            blocks,
            transactions,
        }
    }

    /// Headers attached to every reply.
    pub fn headers(&self) -> ProtocolHeaders {
        self.ctx.local_headers()
    }

    /// Eligible peers, at most one reply's worth, in random order.
    pub fn list_peers(&self) -> PeerListReply {
        let mut peers: Vec<_> = self
            .ctx
            .eligible_peers()
            .iter()
            .map(Peer::to_broadcast)
            .collect();
        peers.shuffle(&mut rand::thread_rng());
        peers.truncate(self.ctx.config.max_peers_per_reply);
        PeerListReply {
            success: true,
            peers,
        }
    }

    pub async fn blocks(&self, from_height: u64, limit: u64) -> Result<BlocksReply, ChainReadError> {
        let limit = limit.clamp(1, self.ctx.config.max_download_blocks);
        let blocks = self.ctx.chain.blocks_after(from_height, limit).await?;
        Ok(BlocksReply { blocks })
    }

    pub async fn common_block(&self, ids: &[BlockId]) -> Result<CommonBlockReply, ChainReadError> {
        let common = self.ctx.chain.common_block(ids).await?;
        let last = self.ctx.chain.last_block().await?;
        Ok(CommonBlockReply {
            common: common.map(|header| CommonBlock {
                id: header.id,
                height: header.height,
            }),
            last_block_height: last.height,
        })
    }

    pub async fn status(&self) -> Result<StatusReply, ChainReadError> {
        let header = self.ctx.chain.last_block().await?;
        let now = self.ctx.slots.epoch_time(self.ctx.now());
        Ok(StatusReply {
            height: header.height,
            header,
            forging_allowed: self.ctx.slots.is_forging_allowed(now),
            current_slot: self.ctx.slots.slot_number(now),
            config: Some(PeerConfigInfo {
                version: self.ctx.config.version.clone(),
                plugins: self.ctx.config.plugins.clone(),
            }),
        })
    }

    pub async fn post_block(&self, source: Option<IpAddr>, block: Block) -> BlockSubmission {
        self.blocks.submit_block(block, source).await
    }

    pub async fn post_transactions(&self, transactions: Vec<SerializedTransaction>) -> usize {
        self.transactions.submit_transactions(transactions).await
    }

    /// Refuse requests without our network's headers or from banned peers.
    fn check_request(&self, remote: IpAddr, headers: Option<ProtocolHeaders>) -> Result<ProtocolHeaders, WireReply> {
        let Some(headers) = headers else {
            return Err(self.error(400, "missing protocol headers"));
        };
        if headers.nethash != self.ctx.config.nethash {
            return Err(self.error(400, "request is for another network"));
        }
        if self.ctx.guard.is_blacklisted(&remote) || self.ctx.guard.is_suspended(&remote, self.ctx.now()) {
            return Err(self.error(403, "peer is banned"));
        }
        Ok(headers)
    }

    /// Unknown requesters are verified in the background.
    fn observe_requester(&self, remote: IpAddr, headers: &ProtocolHeaders) {
        if self.ctx.repository.has(&remote) || self.ctx.config.is_myself(&remote) {
            return;
        }
        let peer = Peer::new(remote, headers.port).with_version(headers.version.clone());
        let processor = self.processor.clone();
        tokio::spawn(async move {
            let options = AcceptOptions {
                source: Some(remote),
                ..Default::default()
            };
            if let Err(rejection) = processor.validate_and_accept_peer(peer, options).await {
                debug!(peer = %remote, "[dc-01] requester not admitted: {rejection}");
            }
        });
    }

    fn json<T: Serialize>(&self, status: u16, body: &T) -> WireReply {
        WireReply {
            status,
            headers: Some(self.headers()),
            body: serde_json::to_value(body).unwrap_or_default(),
        }
    }

    fn error(&self, status: u16, message: &str) -> WireReply {
        self.json(status, &serde_json::json!({ "success": false, "message": message }))
    }

    fn unavailable(&self, error: ChainReadError) -> WireReply {
        debug!("[dc-01] cannot serve request: {error}");
        self.error(503, &error.to_string())
    }
}

#[async_trait]
impl PeerRequestHandler for PeerResponder {
    async fn handle(
        &self,
        remote: IpAddr,
        headers: Option<ProtocolHeaders>,
        request: WireRequest,
    ) -> WireReply {
        let headers = match self.check_request(remote, headers) {
            Ok(headers) => headers,
            Err(reply) => return reply,
        };
        self.observe_requester(remote, &headers);

        match request {
            WireRequest::GetPeers => self.json(200, &self.list_peers()),
            WireRequest::GetBlocks { from_height, limit } => match self.blocks(from_height, limit).await {
                Ok(reply) => self.json(200, &reply),
                Err(e) => self.unavailable(e),
            },
            WireRequest::GetCommonBlocks { ids } => match self.common_block(&ids).await {
                Ok(reply) => self.json(200, &reply),
                Err(e) => self.unavailable(e),
            },
            WireRequest::GetStatus => match self.status().await {
                Ok(reply) => self.json(200, &reply),
                Err(e) => self.unavailable(e),
            },
            WireRequest::PostBlock { block } => match self.post_block(Some(remote), *block).await {
                BlockSubmission::Queued => WireReply {
                    status: 204,
                    headers: Some(self.headers()),
                    body: serde_json::Value::Null,
                },
                BlockSubmission::Discarded(reason) => self.error(200, &reason),
            },
            WireRequest::PostTransactions { transactions } => {
                let accepted = self.post_transactions(transactions).await;
                self.json(200, &serde_json::json!({ "success": true, "accepted": accepted }))
            }
        }
    }
}
