//! # Peer verifier
//!
//! Establishes whether a peer is on a chain rooted in our history:
//!
//! 1. fetch its status (network, version, claimed tip)
//! 2. find the highest common block, directly when the peer's tip is one of
//!    ours, otherwise by n-ary search over `getCommonBlock`
//! 3. check its blocks above the common one up to the end of that round
//!    (chaining, id integrity, signature, active delegate); a block whose id
//!    and signature were verified before skips the last two
//!
//! The whole run shares a single deadline.

use shared_types::{chaining_violation, Block, BlockHeader, BlockId};
use std::sync::Arc;
use tokio::time::Instant;

use super::communicator::PeerCommunicator;
use super::context::PeerNetworkContext;
use crate::domain::{
    NarySearch, Peer, PeerStatus, PeerVerificationResult, ProbeOutcome, VerificationFailure,
};

/// Successful verification together with the status it was based on.
#[derive(Debug, Clone)]
pub struct VerifiedPeer {
    pub result: PeerVerificationResult,
    pub status: PeerStatus,
}

pub struct PeerVerifier {
    ctx: Arc<PeerNetworkContext>,
    communicator: Arc<PeerCommunicator>,
    search: NarySearch,
}

impl PeerVerifier {
    pub fn new(ctx: Arc<PeerNetworkContext>, communicator: Arc<PeerCommunicator>) -> Self {
        Self {
            ctx,
            communicator,
            search: NarySearch::default(),
        }
    }

    pub async fn verify(&self, peer: &Peer) -> Result<VerifiedPeer, VerificationFailure> {
        let deadline = Instant::now() + self.ctx.config.verify_timeout();
        tokio::time::timeout_at(deadline, self.run(peer))
            .await
            .unwrap_or(Err(VerificationFailure::DeadlineExceeded))
    }

    async fn run(&self, peer: &Peer) -> Result<VerifiedPeer, VerificationFailure> {
        let status = self.communicator.get_status(peer).await?;
        let local = self.ctx.chain.last_block().await?;

        let common = self.highest_common_height(peer, &status, &local).await?;
        if common < status.height {
            self.verify_peer_blocks(peer, common, status.height).await?;
        }

        let result = PeerVerificationResult::success(local.height, status.height, common, self.ctx.now());
        Ok(VerifiedPeer { result, status })
    }

    async fn highest_common_height(
        &self,
        peer: &Peer,
        status: &PeerStatus,
        local: &BlockHeader,
    ) -> Result<u64, VerificationFailure> {
        let claimed = status.height;
        if claimed == 0 {
            return Err(VerificationFailure::NoCommonBlock);
        }
        if claimed <= local.height {
            let ours = self.ctx.chain.headers_at_heights(&[claimed]).await?;
            if ours.first().is_some_and(|header| header.id == status.header.id) {
                return Ok(claimed);
            }
        }

        let top = claimed.min(local.height);
        self.search
            .find(1, top, |heights| self.probe_common(peer, heights))
            .await?
            .ok_or(VerificationFailure::NoCommonBlock)
    }

    async fn probe_common(&self, peer: &Peer, heights: Vec<u64>) -> Result<ProbeOutcome, VerificationFailure> {
        let ours = self.ctx.chain.headers_at_heights(&heights).await?;
        let ids: Vec<BlockId> = ours.iter().map(|header| header.id).collect();

        let Some(common) = self.communicator.get_common_block(peer, &ids).await? else {
            return Ok(ProbeOutcome::NoneCommon);
        };
        match ours.iter().find(|header| header.id == common.id) {
            Some(header) if header.height == common.height => Ok(ProbeOutcome::Highest(header.height)),
            Some(header) => Err(VerificationFailure::BogusCommonBlock(format!(
                "block {} is at height {}, peer says {}",
                common.id, header.height, common.height
            ))),
            None => Err(VerificationFailure::BogusCommonBlock(format!(
                "block {} was not offered",
                common.id
            ))),
        }
    }

    /// Check the peer's blocks in `(common, min(claimed, end of round)]`.
    /// The first must extend our block at `common` and each later one the
    /// block before it.
    async fn verify_peer_blocks(&self, peer: &Peer, common: u64, claimed: u64) -> Result<(), VerificationFailure> {
        let round = self.ctx.slots.round(common + 1);
        let last = claimed.min(self.ctx.slots.round_end_height(round));
        let delegates = self.ctx.chain.active_delegates(round).await?;
        let mut previous = self
            .ctx
            .chain
            .headers_at_heights(&[common])
            .await?
            .into_iter()
            .next()
            .ok_or(VerificationFailure::NoCommonBlock)?;

        while previous.height < last {
            let blocks = self.communicator.get_blocks(peer, previous.height).await?;
            if blocks.is_empty() {
                return Err(VerificationFailure::MissingPeerBlock(previous.height + 1));
            }
            for block in blocks.iter().take_while(|block| block.height() <= last) {
                if let Some(reason) = chaining_violation(&self.ctx.slots, &previous, &block.header) {
                    return Err(VerificationFailure::InvalidPeerBlock {
                        height: block.height(),
                        reason: reason.into(),
                    });
                }
                self.verify_block(block, &delegates)?;
                previous = block.header.clone();
            }
        }
        Ok(())
    }

    fn verify_block(&self, block: &Block, delegates: &[String]) -> Result<(), VerificationFailure> {
        let invalid = |reason: String| VerificationFailure::InvalidPeerBlock {
            height: block.height(),
            reason,
        };
        if !self.ctx.block_verifier.verify_integrity(block) {
            return Err(invalid("id does not match content".into()));
        }
        // Id and signature both match a verified block.
        if self.ctx.verified_blocks.contains(&block.header) {
            return Ok(());
        }
        if !self.ctx.block_verifier.verify_signature(block) {
            return Err(invalid("invalid signature".into()));
        }
        if !delegates.contains(&block.header.generator_public_key) {
            return Err(invalid(format!(
                "generator {} is not an active delegate",
                block.header.generator_public_key
            )));
        }
        self.ctx.verified_blocks.insert(&block.header);
        Ok(())
    }
}
