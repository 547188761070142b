//! Results of offering a block to the block processor, and the events it
//! publishes.

use serde::Serialize;
use shared_types::BlockId;
use std::fmt;

/// Why a candidate block was not applied. None of these are errors: the
/// sync loop logs them and carries on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum RejectReason {
    /// Forged for a slot that has not started yet.
    FutureSlot,
    /// Already part of our chain.
    AlreadyInChain,
    /// Competes with a block we already hold at its height. Our branch is at
    /// least as long and was seen first.
    ForkInsufficientWeight,
    /// Builds on a different parent at our tip height + 1.
    ForkUnverified,
    /// Above tip + 1; buffered until the gap is filled.
    Future,
    /// Height or slot does not follow our tip.
    NotChained,
    /// Bad signature or not forged by an active delegate.
    InvalidBlock,
}

impl RejectReason {
    pub const ALL: [RejectReason; 7] = [
        RejectReason::FutureSlot,
        RejectReason::AlreadyInChain,
        RejectReason::ForkInsufficientWeight,
        RejectReason::ForkUnverified,
        RejectReason::Future,
        RejectReason::NotChained,
        RejectReason::InvalidBlock,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            RejectReason::FutureSlot => "future-slot",
            RejectReason::AlreadyInChain => "already-in-chain",
            RejectReason::ForkInsufficientWeight => "fork-insufficient-weight",
            RejectReason::ForkUnverified => "fork-unverified",
            RejectReason::Future => "future",
            RejectReason::NotChained => "not-chained",
            RejectReason::InvalidBlock => "invalid-block",
        }
    }

    pub fn is_fork(self) -> bool {
        matches!(self, RejectReason::ForkInsufficientWeight | RejectReason::ForkUnverified)
    }
}

impl fmt::Display for RejectReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AcceptOutcome {
    Accepted {
        id: BlockId,
        height: u64,
        /// Buffered future blocks applied right after this one.
        unbuffered: usize,
    },
    Rejected(RejectReason),
}

impl AcceptOutcome {
    pub fn is_accepted(&self) -> bool {
        matches!(self, AcceptOutcome::Accepted { .. })
    }

    pub fn rejection(&self) -> Option<RejectReason> {
        match self {
            AcceptOutcome::Rejected(reason) => Some(*reason),
            AcceptOutcome::Accepted { .. } => None,
        }
    }
}

/// Published on the block processor's event channel.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum BlockEvent {
    Accepted {
        id: BlockId,
        height: u64,
    },
    Rejected {
        id: BlockId,
        height: u64,
        reason: RejectReason,
    },
    ForkDetected {
        id: BlockId,
        height: u64,
        reason: RejectReason,
    },
    /// Heights `from..=to` are missing below a buffered block.
    FutureBlock {
        from: u64,
        to: u64,
    },
    Reverted {
        id: BlockId,
        height: u64,
    },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_reason_labels_are_unique() {
        let mut labels: Vec<_> = RejectReason::ALL.iter().map(|r| r.as_str()).collect();
        labels.sort_unstable();
        labels.dedup();
        assert_eq!(labels.len(), RejectReason::ALL.len());
    }

    #[test]
    fn test_reason_serializes_as_label() {
        for reason in RejectReason::ALL {
            assert_eq!(serde_json::to_value(reason).unwrap(), reason.as_str());
        }
    }
}
