//! # Driven Ports (Outbound SPI)
//!
//! Persistence and the transaction pool are injected. The block processor is
//! their only writer.

use async_trait::async_trait;
use shared_types::{Block, BlockId, SerializedTransaction, StorageError};

/// Block store.
#[async_trait]
pub trait DatabaseService: Send + Sync {
    /// Append `block` on top of the stored tip.
    async fn save_block(&self, block: &Block) -> Result<(), StorageError>;

    async fn get_block(&self, id: &BlockId) -> Result<Option<Block>, StorageError>;

    async fn block_at_height(&self, height: u64) -> Result<Option<Block>, StorageError>;

    /// Remove the tip block `id` and return it. Only the tip may be deleted.
    async fn delete_block(&self, id: &BlockId) -> Result<Block, StorageError>;

    async fn last_block(&self) -> Result<Block, StorageError>;
}

#[async_trait]
pub trait TransactionPool: Send + Sync {
    /// Drop transactions that made it into an applied block.
    async fn remove_confirmed(&self, transactions: &[SerializedTransaction]);

    /// Return transactions of a reverted block to the pool.
    async fn requeue(&self, transactions: Vec<SerializedTransaction>);

    /// Up to `limit` pooled transactions, for the local forger.
    async fn pooled(&self, limit: usize) -> Vec<SerializedTransaction>;
}
