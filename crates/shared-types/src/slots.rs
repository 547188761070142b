//! # Slot Arithmetic
//!
//! Delegated proof-of-stake divides time into fixed-length slots, each owned
//! by one delegate of the current round. All timestamps here are seconds
//! since the network epoch.

use serde::{Deserialize, Serialize};

/// Slot and round calculator for a network with a fixed block time.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SlotClock {
    /// Unix time (seconds) of the network epoch.
    pub epoch_unix_secs: u64,
    /// Length of one slot in seconds.
    pub block_time: u64,
    /// Number of delegates forging in each round.
    pub active_delegates: u32,
}

impl Default for SlotClock {
    fn default() -> Self {
        Self {
            epoch_unix_secs: 0,
            block_time: 8,
            active_delegates: 51,
        }
    }
}

impl SlotClock {
    pub fn new(epoch_unix_secs: u64, block_time: u64, active_delegates: u32) -> Self {
        Self {
            epoch_unix_secs,
            block_time: block_time.max(1),
            active_delegates: active_delegates.max(1),
        }
    }

    /// Convert a unix timestamp to network epoch time.
    pub fn epoch_time(&self, unix_secs: u64) -> u64 {
        unix_secs.saturating_sub(self.epoch_unix_secs)
    }

    pub fn slot_number(&self, timestamp: u64) -> u64 {
        timestamp / self.block_time
    }

    /// Start of the given slot, saturating at `u64::MAX`.
    pub fn slot_time(&self, slot: u64) -> u64 {
        slot.saturating_mul(self.block_time)
    }

    /// Forging is allowed only in the first half of a slot: the slot at
    /// `timestamp` and at `timestamp + block_time / 2` must be the same.
    /// Never allowed when the half slot runs past `u64::MAX`.
    pub fn is_forging_allowed(&self, timestamp: u64) -> bool {
        timestamp
            .checked_add(self.block_time / 2)
            .is_some_and(|half| self.slot_number(timestamp) == self.slot_number(half))
    }

    /// Round containing the given height. Rounds start at 1.
    pub fn round(&self, height: u64) -> u64 {
        let delegates = u64::from(self.active_delegates);
        height.saturating_sub(1) / delegates + 1
    }

    /// Last height of the given round.
    pub fn round_end_height(&self, round: u64) -> u64 {
        round.saturating_mul(u64::from(self.active_delegates))
    }

    pub fn forging_info(&self, timestamp: u64) -> ForgingInfo {
        let delegates = u64::from(self.active_delegates);
        let slot = self.slot_number(timestamp);
        ForgingInfo {
            current_slot: slot,
            current_forger: (slot % delegates) as u32,
            next_forger: ((slot % delegates + 1) % delegates) as u32,
            block_timestamp: self.slot_time(slot),
            can_forge: self.is_forging_allowed(timestamp),
        }
    }
}

/// Who forges now and next, as indices into the round's delegate list.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ForgingInfo {
    pub current_slot: u64,
    pub current_forger: u32,
    pub next_forger: u32,
    pub block_timestamp: u64,
    pub can_forge: bool,
}
