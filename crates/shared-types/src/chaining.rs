//! # Chaining Rule
//!
//! A candidate block extends a previous block iff:
//! 1. its `previous_block_id` is the previous block's id
//! 2. its height is exactly one above
//! 3. its slot is strictly later than the previous block's slot

use crate::entities::BlockHeader;
use crate::slots::SlotClock;

pub fn is_chained(slots: &SlotClock, previous: &BlockHeader, candidate: &BlockHeader) -> bool {
    candidate.previous_block_id == Some(previous.id)
        && Some(candidate.height) == previous.height.checked_add(1)
        && slots.slot_number(candidate.timestamp) > slots.slot_number(previous.timestamp)
}

/// Why a candidate does not chain, for logs. `None` when it does.
pub fn chaining_violation(
    slots: &SlotClock,
    previous: &BlockHeader,
    candidate: &BlockHeader,
) -> Option<&'static str> {
    if candidate.previous_block_id != Some(previous.id) {
        Some("previous block id mismatch")
    } else if Some(candidate.height) != previous.height.checked_add(1) {
        Some("height is not consecutive")
    } else if slots.slot_number(candidate.timestamp) <= slots.slot_number(previous.timestamp) {
        Some("slot does not advance")
    } else {
        None
    }
}

/// Every consecutive pair of `blocks` chains.
pub fn is_chain(slots: &SlotClock, blocks: &[BlockHeader]) -> bool {
    blocks.windows(2).all(|pair| is_chained(slots, &pair[0], &pair[1]))
}
