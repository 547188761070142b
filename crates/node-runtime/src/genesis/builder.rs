//! # Genesis Block Builder
//!
//! Derives the genesis block from chain configuration. Every node on a
//! network must produce the same id from the same config.

use shared_types::{Block, BlockHeader, BlockId};
use thiserror::Error;

use crate::adapters::signature::{compute_block_id, compute_payload_hash, BLOCK_VERSION};
use crate::container::config::ChainConfig;

/// Genesis block creation errors.
#[derive(Debug, Error)]
pub enum GenesisError {
    /// Invalid genesis configuration.
    #[error("Invalid genesis configuration: {0}")]
    InvalidConfig(String),
}

/// Builder for the height-1 block.
pub struct GenesisBuilder {
    timestamp: u64,
    generator: String,
}

impl GenesisBuilder {
    /// The generator defaults to the first configured delegate.
    pub fn new(config: &ChainConfig) -> Self {
        let generator = if config.genesis_generator.is_empty() {
            config.delegates.first().cloned().unwrap_or_default()
        } else {
            config.genesis_generator.clone()
        };
        Self {
            timestamp: config.genesis_timestamp,
            generator,
        }
    }

    pub fn build(self) -> Result<Block, GenesisError> {
        if self.generator.is_empty() {
            return Err(GenesisError::InvalidConfig(
                "no genesis generator and no delegates configured".into(),
            ));
        }
        let mut header = BlockHeader {
            id: BlockId::new([0; 32]),
            version: BLOCK_VERSION,
            height: 1,
            previous_block_id: None,
            timestamp: self.timestamp,
            number_of_transactions: 0,
            payload_hash: compute_payload_hash(&[]),
            generator_public_key: self.generator,
            signature: String::new(),
        };
        header.id = compute_block_id(&header);
        Ok(Block::new(header))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const DELEGATE: &str = "d75a980182b10ab7d54bfed3c964073a0ee172f3daa62325af021a68f707511a";

    fn chain_config() -> ChainConfig {
        ChainConfig {
            delegates: vec![DELEGATE.into()],
            genesis_timestamp: 1_700_000_000,
            ..Default::default()
        }
    }

    #[test]
    fn test_genesis_shape() {
        let genesis = GenesisBuilder::new(&chain_config()).build().unwrap();
        assert_eq!(genesis.height(), 1);
        assert!(genesis.header.is_genesis());
        assert_eq!(genesis.header.generator_public_key, DELEGATE);
        assert!(genesis.transactions.is_empty());
    }

    #[test]
    fn test_genesis_id_deterministic() {
        let a = GenesisBuilder::new(&chain_config()).build().unwrap();
        let b = GenesisBuilder::new(&chain_config()).build().unwrap();
        assert_eq!(a.id(), b.id());

        let mut other = chain_config();
        other.genesis_timestamp += 1;
        let c = GenesisBuilder::new(&other).build().unwrap();
        assert_ne!(a.id(), c.id());
    }

    #[test]
    fn test_requires_a_generator() {
        let result = GenesisBuilder::new(&ChainConfig::default()).build();
        assert!(matches!(result, Err(GenesisError::InvalidConfig(_))));
    }
}
