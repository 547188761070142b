//! # Core Domain Entities
//!
//! The block types that cross the peer network and block sync boundaries.
//!
//! Only the header subset this node reasons about is typed. Transaction
//! payloads stay opaque (serialized hex strings) because serialization and
//! signature schemes are injected primitives.

use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;
use std::str::FromStr;

use crate::errors::TypeError;

/// A 32-byte hash (block ids are SHA-256 digests of the serialized header).
pub type Hash = [u8; 32];

/// A serialized transaction, hex encoded. Opaque to this node.
pub type SerializedTransaction = String;

// =============================================================================
// BLOCK ID
// =============================================================================

/// Identifier of a block. Serialized as lowercase hex on the wire.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default)]
pub struct BlockId(pub Hash);

impl BlockId {
    pub const fn new(hash: Hash) -> Self {
        Self(hash)
    }

    pub fn as_bytes(&self) -> &Hash {
        &self.0
    }

    pub fn to_hex(&self) -> String {
        hex::encode(self.0)
    }

    /// Parse a 64 character hex string.
    pub fn from_hex(value: &str) -> Result<Self, TypeError> {
        let bytes = hex::decode(value).map_err(|e| TypeError::InvalidHex(e.to_string()))?;
        let hash: Hash = bytes
            .as_slice()
            .try_into()
            .map_err(|_| TypeError::InvalidLength {
                expected: 32,
                actual: bytes.len(),
            })?;
        Ok(Self(hash))
    }
}

impl fmt::Display for BlockId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_hex())
    }
}

impl fmt::Debug for BlockId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "BlockId({}..)", &self.to_hex()[..12])
    }
}

impl FromStr for BlockId {
    type Err = TypeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::from_hex(s)
    }
}

impl Serialize for BlockId {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.to_hex())
    }
}

impl<'de> Deserialize<'de> for BlockId {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let value = String::deserialize(deserializer)?;
        Self::from_hex(&value).map_err(serde::de::Error::custom)
    }
}

// =============================================================================
// BLOCKS
// =============================================================================

/// The header of a block.
///
/// `timestamp` is measured in seconds since the network epoch, not since the
/// unix epoch; see [`crate::SlotClock`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BlockHeader {
    pub id: BlockId,
    #[serde(default)]
    pub version: u8,
    pub height: u64,
    /// Absent only for the genesis block.
    #[serde(default)]
    pub previous_block_id: Option<BlockId>,
    pub timestamp: u64,
    #[serde(default)]
    pub number_of_transactions: u32,
    /// Hex encoded digest of the ordered transaction payload.
    pub payload_hash: String,
    /// Hex encoded public key of the delegate that forged the block.
    pub generator_public_key: String,
    /// Hex encoded signature over the block id.
    pub signature: String,
}

impl BlockHeader {
    pub fn is_genesis(&self) -> bool {
        self.previous_block_id.is_none()
    }
}

/// A full block: header plus opaque transaction payload.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Block {
    #[serde(flatten)]
    pub header: BlockHeader,
    #[serde(default)]
    pub transactions: Vec<SerializedTransaction>,
}

impl Block {
    pub fn new(header: BlockHeader) -> Self {
        Self {
            header,
            transactions: Vec::new(),
        }
    }

    pub fn id(&self) -> BlockId {
        self.header.id
    }

    pub fn height(&self) -> u64 {
        self.header.height
    }

    pub fn timestamp(&self) -> u64 {
        self.header.timestamp
    }
}

impl From<BlockHeader> for Block {
    fn from(header: BlockHeader) -> Self {
        Self::new(header)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn header() -> BlockHeader {
        BlockHeader {
            id: BlockId::new([7u8; 32]),
            version: 0,
            height: 12,
            previous_block_id: Some(BlockId::new([6u8; 32])),
            timestamp: 96,
            number_of_transactions: 0,
            payload_hash: "cc".repeat(32),
            generator_public_key: "aa".repeat(32),
            signature: "bb".repeat(64),
        }
    }

    #[test]
    fn test_block_id_hex_round_trip() {
        let id = BlockId::new([0xab; 32]);
        assert_eq!(id.to_hex().len(), 64);
        assert_eq!(BlockId::from_hex(&id.to_hex()).unwrap(), id);
    }

    #[test]
    fn test_block_id_rejects_short_hex() {
        assert_eq!(
            BlockId::from_hex("abcd"),
            Err(TypeError::InvalidLength {
                expected: 32,
                actual: 2
            })
        );
        assert!(matches!(
            BlockId::from_hex("zz"),
            Err(TypeError::InvalidHex(_))
        ));
    }

    #[test]
    fn test_block_wire_format_is_flat_camel_case() {
        let block = Block::new(header());
        let json = serde_json::to_value(&block).unwrap();

        assert_eq!(json["height"], 12);
        assert_eq!(json["previousBlockId"], BlockId::new([6u8; 32]).to_hex());
        assert!(json.get("header").is_none());

        let back: Block = serde_json::from_value(json).unwrap();
        assert_eq!(back, block);
    }

    #[test]
    fn test_genesis_has_no_parent() {
        let mut genesis = header();
        genesis.previous_block_id = None;
        assert!(genesis.is_genesis());
        assert!(!header().is_genesis());
    }
}
