//! # Block Signatures
//!
//! Block ids are SHA-256 over the header fields that precede the signature,
//! including the payload hash, so the id commits to the transactions. A
//! delegate signs the 32 id bytes with Ed25519; header keys and signatures
//! travel as lowercase hex.

use dc_01_peer_network::BlockVerifier;
use ed25519_dalek::{Signature, Signer, SigningKey, Verifier, VerifyingKey};
use sha2::{Digest, Sha256};
use shared_types::{Block, BlockHeader, BlockId, SerializedTransaction};

/// Block format version written by this node.
pub const BLOCK_VERSION: u8 = 1;

/// SHA-256 over the ordered transactions, each prefixed with its length.
pub fn compute_payload_hash(transactions: &[SerializedTransaction]) -> String {
    let mut hasher = Sha256::new();
    for transaction in transactions {
        hasher.update((transaction.len() as u64).to_be_bytes());
        hasher.update(transaction.as_bytes());
    }
    hex::encode(hasher.finalize())
}

/// Deterministic block id. `id` and `signature` are not part of the preimage.
pub fn compute_block_id(header: &BlockHeader) -> BlockId {
    let mut hasher = Sha256::new();
    hasher.update([header.version]);
    hasher.update(header.height.to_be_bytes());
    match &header.previous_block_id {
        Some(previous) => hasher.update(previous.as_bytes()),
        None => hasher.update([0u8; 32]),
    }
    hasher.update(header.timestamp.to_be_bytes());
    hasher.update(header.number_of_transactions.to_be_bytes());
    hasher.update(header.payload_hash.as_bytes());
    hasher.update(header.generator_public_key.as_bytes());
    BlockId::new(hasher.finalize().into())
}

/// Build and sign the block following `previous`.
pub fn forge_block(
    key: &SigningKey,
    previous: &BlockHeader,
    timestamp: u64,
    transactions: Vec<SerializedTransaction>,
) -> Block {
    let mut header = BlockHeader {
        id: BlockId::new([0; 32]),
        version: BLOCK_VERSION,
        height: previous.height + 1,
        previous_block_id: Some(previous.id),
        timestamp,
        number_of_transactions: transactions.len() as u32,
        payload_hash: compute_payload_hash(&transactions),
        generator_public_key: hex::encode(key.verifying_key().as_bytes()),
        signature: String::new(),
    };
    header.id = compute_block_id(&header);
    header.signature = hex::encode(key.sign(header.id.as_bytes()).to_bytes());
    Block {
        header,
        transactions,
    }
}

/// Checks payload and id integrity and the generator's Ed25519 signature.
///
/// The configured genesis block carries no delegate signature and is
/// trusted by id.
pub struct Ed25519BlockVerifier {
    genesis: Option<BlockId>,
}

impl Ed25519BlockVerifier {
    pub fn new(genesis: Option<BlockId>) -> Self {
        Self { genesis }
    }

    fn check(&self, header: &BlockHeader) -> Option<()> {
        if header.is_genesis() && self.genesis == Some(header.id) {
            return Some(());
        }
        let key: [u8; 32] = hex::decode(&header.generator_public_key)
            .ok()?
            .try_into()
            .ok()?;
        let signature: [u8; 64] = hex::decode(&header.signature).ok()?.try_into().ok()?;
        let key = VerifyingKey::from_bytes(&key).ok()?;
        key.verify(header.id.as_bytes(), &Signature::from_bytes(&signature))
            .ok()
    }
}

impl BlockVerifier for Ed25519BlockVerifier {
    fn verify_integrity(&self, block: &Block) -> bool {
        let header = &block.header;
        block.transactions.len() == header.number_of_transactions as usize
            && compute_payload_hash(&block.transactions) == header.payload_hash
            && compute_block_id(header) == header.id
    }

    fn verify_signature(&self, block: &Block) -> bool {
        self.verify_integrity(block) && self.check(&block.header).is_some()
    }
}
