//! Bounded FIFO cache of blocks known to belong to a verified chain.
//!
//! Keyed by block id, holding the signature that was checked. A hit lets a
//! caller skip the signature and delegate checks for a block whose id
//! already commits to its content (see `BlockVerifier::verify_integrity`).
//! It never gates local application of a block.

use parking_lot::Mutex;
use shared_types::{BlockHeader, BlockId, BoundedFifoMap};

pub struct VerifiedBlockCache {
    signatures: Mutex<BoundedFifoMap<BlockId, String>>,
}

impl VerifiedBlockCache {
    pub fn new(capacity: usize) -> Self {
        Self {
            signatures: Mutex::new(BoundedFifoMap::new(capacity)),
        }
    }

    /// Record a verified header. Returns `true` if its id was not cached
    /// before.
    pub fn insert(&self, header: &BlockHeader) -> bool {
        let mut signatures = self.signatures.lock();
        if signatures.contains_key(&header.id) {
            return false;
        }
        signatures.insert(header.id, header.signature.clone());
        true
    }

    /// The header's id was verified with exactly this signature.
    pub fn contains(&self, header: &BlockHeader) -> bool {
        self.signatures
            .lock()
            .get(&header.id)
            .is_some_and(|signature| *signature == header.signature)
    }

    pub fn contains_id(&self, id: &BlockId) -> bool {
        self.signatures.lock().contains_key(id)
    }

    pub fn len(&self) -> usize {
        self.signatures.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.signatures.lock().is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.signatures.lock().capacity()
    }
}
