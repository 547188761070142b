//! # Block Processor
//!
//! The only writer of the local chain. Every accept and revert runs inside
//! one async critical section, so two candidates are never evaluated
//! against the same tip concurrently.
//!
//! Readers get the tip through a `watch` channel: a consistent snapshot
//! that may lag the writer by one block. A write dropped between the store
//! and the tip update marks the tip stale; the next writer re-reads it from
//! the store before doing anything else.

use dc_01_peer_network::PeerNetworkContext;
use shared_types::{Block, BlockHeader, BlockId, BoundedFifoMap, StorageError};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::sync::{broadcast, watch, Mutex};
use tracing::{debug, info, warn};

use crate::domain::{
    chaining_violation, is_chained, AcceptOutcome, BlockEvent, BlockSyncError, RejectReason,
    SyncConfig,
};
use crate::ports::{DatabaseService, TransactionPool};

const EVENT_CHANNEL_CAPACITY: usize = 1024;

/// State owned by the writer.
struct Writer {
    /// Blocks above tip + 1, keyed by height and id. The first copy of an
    /// id is kept.
    future: BoundedFifoMap<(u64, BlockId), Block>,
}

pub struct BlockProcessor {
    network: Arc<PeerNetworkContext>,
    database: Arc<dyn DatabaseService>,
    pool: Arc<dyn TransactionPool>,
    writer: Mutex<Writer>,
    tip: watch::Sender<Option<BlockHeader>>,
    tip_stale: AtomicBool,
    events: broadcast::Sender<BlockEvent>,
}

impl BlockProcessor {
    pub fn new(
        network: Arc<PeerNetworkContext>,
        database: Arc<dyn DatabaseService>,
        pool: Arc<dyn TransactionPool>,
        config: &SyncConfig,
    ) -> Self {
        let (tip, _) = watch::channel(None);
        let (events, _) = broadcast::channel(EVENT_CHANNEL_CAPACITY);
        Self {
            network,
            database,
            pool,
            writer: Mutex::new(Writer {
                future: BoundedFifoMap::new(config.future_buffer_capacity.max(1)),
            }),
            tip,
            tip_stale: AtomicBool::new(false),
            events,
        }
    }

    pub fn network(&self) -> &Arc<PeerNetworkContext> {
        &self.network
    }

    /// Read the tip from storage, checking the genesis block when `genesis`
    /// is given.
    pub async fn load_tip(&self, genesis: Option<BlockId>) -> Result<BlockHeader, BlockSyncError> {
        let _writer = self.writer.lock().await;
        if let Some(expected) = genesis {
            let found = self
                .database
                .block_at_height(1)
                .await?
                .ok_or_else(|| StorageError::NotFound("genesis block".into()))?;
            if found.id() != expected {
                return Err(BlockSyncError::GenesisMismatch {
                    expected: expected.to_string(),
                    found: found.id().to_string(),
                });
            }
        }
        let last = self.database.last_block().await?;
        self.tip.send_replace(Some(last.header.clone()));
        self.tip_stale.store(false, Ordering::SeqCst);
        info!(height = last.height(), id = %last.id(), "[dc-02] tip loaded");
        Ok(last.header)
    }

    /// Re-read the tip from storage if a write was interrupted.
    pub async fn recover_tip(&self) -> Result<(), BlockSyncError> {
        let _writer = self.writer.lock().await;
        self.settle_tip().await
    }

    async fn settle_tip(&self) -> Result<(), BlockSyncError> {
        if !self.tip_stale.load(Ordering::SeqCst) {
            return Ok(());
        }
        let last = self.database.last_block().await?;
        self.tip.send_replace(Some(last.header));
        self.tip_stale.store(false, Ordering::SeqCst);
        warn!(height = self.tip_height(), "[dc-02] tip re-read after an interrupted write");
        Ok(())
    }

    pub fn tip(&self) -> Option<BlockHeader> {
        self.tip.borrow().clone()
    }

    pub fn tip_height(&self) -> u64 {
        self.tip.borrow().as_ref().map_or(0, |h| h.height)
    }

    pub fn subscribe_tip(&self) -> watch::Receiver<Option<BlockHeader>> {
        self.tip.subscribe()
    }

    pub fn subscribe(&self) -> broadcast::Receiver<BlockEvent> {
        self.events.subscribe()
    }

    pub fn is_chained(&self, previous: &BlockHeader, candidate: &BlockHeader) -> bool {
        is_chained(&self.network.slots, previous, candidate)
    }

    /// Offer a block. Rejections are outcomes; only storage failures are
    /// errors.
    pub async fn accept(&self, block: Block) -> Result<AcceptOutcome, BlockSyncError> {
        let mut writer = self.writer.lock().await;
        self.settle_tip().await?;
        match self.accept_locked(&mut writer, block).await? {
            AcceptOutcome::Accepted { id, height, .. } => {
                let unbuffered = self.drain_future(&mut writer).await?;
                Ok(AcceptOutcome::Accepted {
                    id,
                    height,
                    unbuffered,
                })
            }
            rejected => Ok(rejected),
        }
    }

    /// Remove up to `count` blocks from the top of the chain. Genesis is
    /// never removed. Returns the removed blocks, highest first.
    pub async fn revert_blocks(&self, count: u64) -> Result<Vec<Block>, BlockSyncError> {
        let mut writer = self.writer.lock().await;
        self.settle_tip().await?;
        writer.future.clear();

        let mut reverted = Vec::new();
        for _ in 0..count {
            let tip = self.tip().ok_or(BlockSyncError::NotInitialised)?;
            if tip.is_genesis() {
                break;
            }
            self.tip_stale.store(true, Ordering::SeqCst);
            let removed = self.database.delete_block(&tip.id).await?;
            let parent = self.database.last_block().await?;
            self.tip.send_replace(Some(parent.header));
            self.tip_stale.store(false, Ordering::SeqCst);

            self.pool.requeue(removed.transactions.clone()).await;
            self.publish(BlockEvent::Reverted {
                id: removed.id(),
                height: removed.height(),
            });
            reverted.push(removed);
        }

        if !reverted.is_empty() {
            warn!(
                reverted = reverted.len(),
                tip = self.tip_height(),
                "[dc-02] rolled back chain"
            );
        }
        Ok(reverted)
    }

    /// Drop buffered future blocks. Returns how many there were.
    pub async fn clear_future_blocks(&self) -> usize {
        let mut writer = self.writer.lock().await;
        let dropped = writer.future.len();
        writer.future.clear();
        dropped
    }

    pub async fn future_block_count(&self) -> usize {
        self.writer.lock().await.future.len()
    }

    async fn accept_locked(
        &self,
        writer: &mut Writer,
        block: Block,
    ) -> Result<AcceptOutcome, BlockSyncError> {
        let slots = &self.network.slots;
        if slots.slot_number(block.timestamp()) > self.network.current_slot() {
            return Ok(self.reject(&block, RejectReason::FutureSlot));
        }

        let tip = self.tip().ok_or(BlockSyncError::NotInitialised)?;
        let height = block.height();

        if height <= tip.height {
            if self.database.get_block(&block.id()).await?.is_some() {
                return Ok(self.reject(&block, RejectReason::AlreadyInChain));
            }
            // A competing branch no longer than ours. Ours was seen first.
            return Ok(self.fork(&block, RejectReason::ForkInsufficientWeight));
        }

        if height > tip.height + 1 {
            let key = (height, block.id());
            if !writer.future.contains_key(&key) {
                writer.future.insert(key, block);
            }
            self.publish(BlockEvent::FutureBlock {
                from: tip.height + 1,
                to: height,
            });
            debug!(height, tip = tip.height, "[dc-02] buffered future block");
            return Ok(AcceptOutcome::Rejected(RejectReason::Future));
        }

        if block.header.previous_block_id != Some(tip.id) {
            return Ok(self.fork(&block, RejectReason::ForkUnverified));
        }
        if let Some(violation) = chaining_violation(slots, &tip, &block.header) {
            debug!(height, violation, "[dc-02] block does not chain");
            return Ok(self.reject(&block, RejectReason::NotChained));
        }
        if !self.verify(&block).await? {
            return Ok(self.reject(&block, RejectReason::InvalidBlock));
        }

        self.apply(block).await
    }

    /// Id integrity always; signature and generator checks unless the same
    /// id and signature were verified before.
    async fn verify(&self, block: &Block) -> Result<bool, BlockSyncError> {
        if !self.network.block_verifier.verify_integrity(block) {
            return Ok(false);
        }
        if self.network.verified_blocks.contains(&block.header) {
            return Ok(true);
        }
        if !self.network.block_verifier.verify_signature(block) {
            return Ok(false);
        }
        let round = self.network.slots.round(block.height());
        let delegates = self
            .network
            .chain
            .active_delegates(round)
            .await
            .map_err(|e| StorageError::Unavailable(e.to_string()))?;
        Ok(delegates.contains(&block.header.generator_public_key))
    }

    async fn apply(&self, block: Block) -> Result<AcceptOutcome, BlockSyncError> {
        self.tip_stale.store(true, Ordering::SeqCst);
        self.database.save_block(&block).await?;
        let (id, height) = (block.id(), block.height());
        self.network.verified_blocks.insert(&block.header);
        self.tip.send_replace(Some(block.header.clone()));
        self.tip_stale.store(false, Ordering::SeqCst);

        self.pool.remove_confirmed(&block.transactions).await;
        self.publish(BlockEvent::Accepted { id, height });
        info!(height, %id, "[dc-02] block accepted");

        Ok(AcceptOutcome::Accepted {
            id,
            height,
            unbuffered: 0,
        })
    }

    /// Apply buffered blocks that now sit on top of the tip. A rejected
    /// candidate is dropped and the next one naming the tip as parent tried.
    async fn drain_future(&self, writer: &mut Writer) -> Result<usize, BlockSyncError> {
        let mut applied = 0;
        while let Some(tip) = self.tip() {
            writer.future.retain(|(height, _), _| *height > tip.height);
            let next = writer
                .future
                .iter()
                .find(|((height, _), block)| {
                    *height == tip.height + 1 && block.header.previous_block_id == Some(tip.id)
                })
                .map(|(key, _)| *key);
            let Some(block) = next.and_then(|key| writer.future.remove(&key)) else {
                break;
            };
            if self.accept_locked(writer, block).await?.is_accepted() {
                applied += 1;
            }
        }
        Ok(applied)
    }

    fn reject(&self, block: &Block, reason: RejectReason) -> AcceptOutcome {
        match reason {
            RejectReason::NotChained | RejectReason::InvalidBlock => {
                warn!(height = block.height(), id = %block.id(), %reason, "[dc-02] block rejected")
            }
            _ => debug!(height = block.height(), id = %block.id(), %reason, "[dc-02] block rejected"),
        }
        self.publish(BlockEvent::Rejected {
            id: block.id(),
            height: block.height(),
            reason,
        });
        AcceptOutcome::Rejected(reason)
    }

    fn fork(&self, block: &Block, reason: RejectReason) -> AcceptOutcome {
        warn!(
            height = block.height(),
            id = %block.id(),
            tip = self.tip_height(),
            %reason,
            "[dc-02] fork detected"
        );
        self.publish(BlockEvent::ForkDetected {
            id: block.id(),
            height: block.height(),
            reason,
        });
        AcceptOutcome::Rejected(reason)
    }

    fn publish(&self, event: BlockEvent) {
        // No subscribers is fine.
        let _ = self.events.send(event);
    }
}
