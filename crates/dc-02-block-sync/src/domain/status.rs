use serde::Serialize;
use shared_types::BlockId;

use super::state_machine::SyncState;

/// Snapshot of sync progress, served on the node status endpoint.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SyncStatus {
    pub state: SyncState,
    pub tip_height: u64,
    pub tip_id: Option<BlockId>,
    /// Median height of eligible peers.
    pub network_height: u64,
    pub quorum: Option<f64>,
    pub forging_allowed: bool,
    /// Consecutive failed network checks.
    pub check_network_attempts: u32,
    pub transitions: u64,
    /// Unix seconds.
    pub last_transition: u64,
}

impl SyncStatus {
    pub fn initial(now: u64) -> Self {
        Self {
            state: SyncState::Start,
            tip_height: 0,
            tip_id: None,
            network_height: 0,
            quorum: None,
            forging_allowed: false,
            check_network_attempts: 0,
            transitions: 0,
            last_transition: now,
        }
    }

    pub fn is_synced(&self) -> bool {
        matches!(self.state, SyncState::Idle | SyncState::Process)
    }
}
