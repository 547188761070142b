//! # In-Memory Chain Store
//!
//! A single linear chain held in memory. Serves both the block processor
//! ([`DatabaseService`]) and the peer network ([`ChainReader`]).

use async_trait::async_trait;
use dc_01_peer_network::{ChainReadError, ChainReader};
use parking_lot::RwLock;
use shared_types::{Block, BlockHeader, BlockId, StorageError};
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};

use crate::ports::DatabaseService;

#[derive(Default)]
struct Chain {
    /// Index `i` holds height `i + 1`.
    blocks: Vec<Block>,
    heights: HashMap<BlockId, u64>,
}

impl Chain {
    fn at(&self, height: u64) -> Option<&Block> {
        height.checked_sub(1).and_then(|i| self.blocks.get(i as usize))
    }
}

pub struct MemoryChainStore {
    chain: RwLock<Chain>,
    delegates: Vec<String>,
    offline: AtomicBool,
}

impl MemoryChainStore {
    /// Store holding only `genesis`. `delegates` is the active delegate list
    /// for every round.
    pub fn new(genesis: Block, delegates: Vec<String>) -> Self {
        let mut chain = Chain::default();
        chain.heights.insert(genesis.id(), genesis.height());
        chain.blocks.push(genesis);
        Self {
            chain: RwLock::new(chain),
            delegates,
            offline: AtomicBool::new(false),
        }
    }

    /// Store preloaded with consecutive blocks starting at genesis.
    pub fn with_blocks(blocks: Vec<Block>, delegates: Vec<String>) -> Self {
        let mut chain = Chain::default();
        for block in blocks {
            chain.heights.insert(block.id(), block.height());
            chain.blocks.push(block);
        }
        Self {
            chain: RwLock::new(chain),
            delegates,
            offline: AtomicBool::new(false),
        }
    }

    pub fn height(&self) -> u64 {
        self.chain.read().blocks.len() as u64
    }

    /// Make every call fail as if the database went away.
    pub fn set_offline(&self, offline: bool) {
        self.offline.store(offline, Ordering::SeqCst);
    }

    fn check(&self) -> Result<(), StorageError> {
        if self.offline.load(Ordering::SeqCst) {
            return Err(StorageError::Unavailable("store is offline".into()));
        }
        Ok(())
    }
}

fn read_error(error: StorageError) -> ChainReadError {
    ChainReadError::Unavailable(error.to_string())
}

#[async_trait]
impl DatabaseService for MemoryChainStore {
    async fn save_block(&self, block: &Block) -> Result<(), StorageError> {
        self.check()?;
        let mut chain = self.chain.write();
        let expected_height = chain.blocks.len() as u64 + 1;
        let parent = chain.blocks.last().map(Block::id);
        if block.height() != expected_height || block.header.previous_block_id != parent {
            return Err(StorageError::ParentNotFound {
                height: block.height(),
            });
        }
        chain.heights.insert(block.id(), block.height());
        chain.blocks.push(block.clone());
        Ok(())
    }

    async fn get_block(&self, id: &BlockId) -> Result<Option<Block>, StorageError> {
        self.check()?;
        let chain = self.chain.read();
        Ok(chain.heights.get(id).and_then(|h| chain.at(*h)).cloned())
    }

    async fn block_at_height(&self, height: u64) -> Result<Option<Block>, StorageError> {
        self.check()?;
        Ok(self.chain.read().at(height).cloned())
    }

    async fn delete_block(&self, id: &BlockId) -> Result<Block, StorageError> {
        self.check()?;
        let mut chain = self.chain.write();
        match chain.blocks.last() {
            Some(tip) if tip.id() == *id => {}
            Some(_) => return Err(StorageError::DatabaseError(format!("{id} is not the tip"))),
            None => return Err(StorageError::NotFound(id.to_string())),
        }
        if chain.blocks.len() == 1 {
            return Err(StorageError::GenesisImmutable);
        }
        let removed = chain
            .blocks
            .pop()
            .ok_or_else(|| StorageError::NotFound(id.to_string()))?;
        chain.heights.remove(id);
        Ok(removed)
    }

    async fn last_block(&self) -> Result<Block, StorageError> {
        self.check()?;
        self.chain
            .read()
            .blocks
            .last()
            .cloned()
            .ok_or_else(|| StorageError::NotFound("empty chain".into()))
    }
}

#[async_trait]
impl ChainReader for MemoryChainStore {
    async fn last_block(&self) -> Result<BlockHeader, ChainReadError> {
        DatabaseService::last_block(self)
            .await
            .map(|b| b.header)
            .map_err(read_error)
    }

    async fn headers_at_heights(&self, heights: &[u64]) -> Result<Vec<BlockHeader>, ChainReadError> {
        self.check().map_err(read_error)?;
        let chain = self.chain.read();
        heights
            .iter()
            .map(|&h| {
                chain
                    .at(h)
                    .map(|b| b.header.clone())
                    .ok_or(ChainReadError::MissingHeight(h))
            })
            .collect()
    }

    async fn blocks_after(&self, height: u64, limit: u64) -> Result<Vec<Block>, ChainReadError> {
        self.check().map_err(read_error)?;
        let chain = self.chain.read();
        let start = (height as usize).min(chain.blocks.len());
        Ok(chain.blocks[start..]
            .iter()
            .take(limit as usize)
            .cloned()
            .collect())
    }

    async fn common_block(&self, ids: &[BlockId]) -> Result<Option<BlockHeader>, ChainReadError> {
        self.check().map_err(read_error)?;
        let chain = self.chain.read();
        Ok(ids
            .iter()
            .filter_map(|id| chain.heights.get(id))
            .max()
            .and_then(|h| chain.at(*h))
            .map(|b| b.header.clone()))
    }

    async fn active_delegates(&self, _round: u64) -> Result<Vec<String>, ChainReadError> {
        self.check().map_err(read_error)?;
        Ok(self.delegates.clone())
    }
}
