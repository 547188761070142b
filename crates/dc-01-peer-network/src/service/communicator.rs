//! # Peer communicator
//!
//! Typed client for the peer wire protocol. Every call:
//!
//! 1. runs under one overall deadline (the retry uses what is left of it),
//! 2. retries once on transport failure or a 429/5xx reply, never on
//!    protocol failure,
//! 3. checks the reply headers (network, version) and decodes the body
//!    against the wire schema,
//! 4. records latency on success and charges the peer on failure.

use serde::de::{DeserializeOwned, IgnoredAny};
use shared_types::{Block, BlockId, SerializedTransaction};
use std::net::IpAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;
use tracing::{debug, warn};

use super::context::PeerNetworkContext;
use crate::domain::{
    BlocksReply, CommonBlock, CommonBlockReply, CommunicationError, FailureOutcome, Peer,
    PeerBroadcast, PeerEvent, PeerListReply, PeerStatus, ProtocolHeaders, StatusReply, WireReply,
    WireRequest,
};
use crate::ports::TransportError;

const ATTEMPTS: u32 = 2;

pub struct PeerCommunicator {
    ctx: Arc<PeerNetworkContext>,
}

impl PeerCommunicator {
    pub fn new(ctx: Arc<PeerNetworkContext>) -> Self {
        Self { ctx }
    }

    pub async fn get_status(&self, peer: &Peer) -> Result<PeerStatus, CommunicationError> {
        let timeout = self.ctx.config.request_timeout();
        let (headers, reply) = self
            .call::<StatusReply>(peer, WireRequest::GetStatus, timeout)
            .await?;

        if reply.height != reply.header.height {
            return Err(self.malformed(
                peer,
                format!(
                    "status height {} differs from header height {}",
                    reply.height, reply.header.height
                ),
            ));
        }
        Ok(PeerStatus::from_reply(reply, &headers))
    }

    pub async fn get_peers(&self, peer: &Peer) -> Result<Vec<PeerBroadcast>, CommunicationError> {
        let timeout = self.ctx.config.request_timeout();
        let (_, reply) = self
            .call::<PeerListReply>(peer, WireRequest::GetPeers, timeout)
            .await?;

        if !reply.success {
            return Err(self.malformed(peer, "peer list reply without success".into()));
        }
        let max = self.ctx.config.max_peers_per_reply;
        if reply.peers.len() > max {
            return Err(self.malformed(
                peer,
                format!("{} peers listed, at most {max} allowed", reply.peers.len()),
            ));
        }
        Ok(reply.peers)
    }

    /// Blocks above `from_height`, checked to be consecutive.
    pub async fn get_blocks(&self, peer: &Peer, from_height: u64) -> Result<Vec<Block>, CommunicationError> {
        let limit = self.ctx.config.max_download_blocks;
        let request = WireRequest::GetBlocks { from_height, limit };
        let timeout = self.ctx.config.get_blocks_timeout();
        let (_, reply) = self.call::<BlocksReply>(peer, request, timeout).await?;

        if reply.blocks.len() as u64 > limit {
            return Err(self.malformed(
                peer,
                format!("{} blocks returned, {limit} requested", reply.blocks.len()),
            ));
        }
        for (offset, block) in reply.blocks.iter().enumerate() {
            let expected = from_height + 1 + offset as u64;
            if block.height() != expected {
                return Err(self.malformed(
                    peer,
                    format!("block at position {offset} has height {}, expected {expected}", block.height()),
                ));
            }
        }
        Ok(reply.blocks)
    }

    /// Highest of `ids` the peer has. A reply naming an id we did not offer
    /// is malformed.
    pub async fn get_common_block(
        &self,
        peer: &Peer,
        ids: &[BlockId],
    ) -> Result<Option<CommonBlock>, CommunicationError> {
        let request = WireRequest::GetCommonBlocks { ids: ids.to_vec() };
        let timeout = self.ctx.config.request_timeout();
        let (_, reply) = self.call::<CommonBlockReply>(peer, request, timeout).await?;

        match reply.common {
            Some(common) if !ids.contains(&common.id) => Err(self.malformed(
                peer,
                format!("common block {} was not among the requested ids", common.id),
            )),
            common => Ok(common),
        }
    }

    pub async fn post_block(&self, peer: &Peer, block: &Block) -> Result<(), CommunicationError> {
        let request = WireRequest::PostBlock {
            block: Box::new(block.clone()),
        };
        let timeout = self.ctx.config.post_block_timeout();
        self.call::<IgnoredAny>(peer, request, timeout).await?;
        Ok(())
    }

    pub async fn post_transactions(
        &self,
        peer: &Peer,
        transactions: &[SerializedTransaction],
    ) -> Result<(), CommunicationError> {
        let request = WireRequest::PostTransactions {
            transactions: transactions.to_vec(),
        };
        let timeout = self.ctx.config.request_timeout();
        self.call::<IgnoredAny>(peer, request, timeout).await?;
        Ok(())
    }

    /// Exchange and decode. Empty bodies decode as `null`.
    async fn call<T: DeserializeOwned>(
        &self,
        peer: &Peer,
        request: WireRequest,
        timeout: Duration,
    ) -> Result<(ProtocolHeaders, T), CommunicationError> {
        let (headers, body) = self.exchange(peer, &request, timeout).await?;
        match serde_json::from_value::<T>(body) {
            Ok(decoded) => Ok((headers, decoded)),
            Err(e) => Err(self.malformed(peer, format!("{} reply: {e}", request.name()))),
        }
    }

    async fn exchange(
        &self,
        peer: &Peer,
        request: &WireRequest,
        timeout: Duration,
    ) -> Result<(ProtocolHeaders, serde_json::Value), CommunicationError> {
        let started = Instant::now();
        let deadline = started + timeout;
        let headers = self.ctx.local_headers();
        let target = peer.socket_addr();

        let mut attempt = 0;
        let reply = loop {
            attempt += 1;
            let sent = tokio::time::timeout_at(deadline, self.ctx.transport.send(target, &headers, request))
                .await
                .unwrap_or(Err(TransportError::Timeout));

            match sent {
                Ok(reply) if reply.is_transient() && attempt < ATTEMPTS && Instant::now() < deadline => {
                    debug!("[dc-01] {} to {} answered {}, retrying", request.name(), peer.ip, reply.status);
                }
                Ok(reply) => break reply,
                Err(TransportError::Decode(reason)) => {
                    return Err(self.malformed(peer, reason));
                }
                Err(e) if attempt < ATTEMPTS && Instant::now() < deadline => {
                    debug!("[dc-01] {} to {} failed ({}), retrying", request.name(), peer.ip, e);
                }
                Err(e) => {
                    let error = match e {
                        TransportError::Refused(reason) => CommunicationError::Refused { peer: peer.ip, reason },
                        _ => CommunicationError::Timeout { peer: peer.ip },
                    };
                    return Err(self.penalize(error));
                }
            }
        };

        let headers = self.check_reply(peer.ip, reply.headers.clone(), &reply)?;
        let latency = started.elapsed().as_millis() as u64;
        let now = self.ctx.now();
        self.ctx.repository.update(&peer.ip, |stored| {
            stored.latency_ms = Some(latency);
            stored.last_pinged = Some(now);
        });
        Ok((headers, reply.body))
    }

    fn check_reply(
        &self,
        ip: IpAddr,
        headers: Option<ProtocolHeaders>,
        reply: &WireReply,
    ) -> Result<ProtocolHeaders, CommunicationError> {
        // Busy or temporarily unable to serve: not the peer's fault.
        if reply.is_transient() {
            return Err(self.penalize(CommunicationError::Refused {
                peer: ip,
                reason: format!("status {}", reply.status),
            }));
        }
        if !reply.is_success() {
            return Err(self.penalize(CommunicationError::Malformed {
                peer: ip,
                reason: format!("status {}", reply.status),
            }));
        }
        let Some(headers) = headers else {
            return Err(self.penalize(CommunicationError::Malformed {
                peer: ip,
                reason: "missing protocol headers".into(),
            }));
        };
        if headers.nethash != self.ctx.config.nethash {
            return Err(self.penalize(CommunicationError::WrongNetwork {
                peer: ip,
                theirs: headers.nethash,
            }));
        }
        if !self.ctx.guard.is_valid_version(&headers.version) {
            return Err(self.penalize(CommunicationError::IncompatibleVersion {
                peer: ip,
                version: headers.version,
            }));
        }
        Ok(headers)
    }

    fn malformed(&self, peer: &Peer, reason: String) -> CommunicationError {
        self.penalize(CommunicationError::Malformed { peer: peer.ip, reason })
    }

    /// Charge the peer and drop it from the repository once suspended.
    fn penalize(&self, error: CommunicationError) -> CommunicationError {
        let ip = error.peer();
        let outcome = self.ctx.guard.record_failure(ip, error.offence(), self.ctx.now());
        match outcome {
            FailureOutcome::Suspended { until } => {
                self.ctx.repository.remove(&ip);
                self.ctx.publish(PeerEvent::Suspended {
                    ip,
                    offence: error.offence(),
                    until,
                });
                warn!(peer = %ip, offence = %error.offence(), until, "[dc-01] peer suspended: {error}");
            }
            FailureOutcome::Counted { failures } => {
                debug!(peer = %ip, failures, "[dc-01] {error}");
            }
            FailureOutcome::Whitelisted => {
                debug!(peer = %ip, "[dc-01] whitelisted peer failed: {error}");
            }
        }
        error
    }
}
