//! # Driving Ports (Inbound API)
//!
//! Hooks for the external delegate forger.

use async_trait::async_trait;
use dc_01_peer_network::NetworkState;
use serde::Serialize;
use shared_types::{Block, ForgingInfo};

use crate::domain::{AcceptOutcome, BlockSyncError, SyncStatus};

/// Whether the local delegate may forge right now, and why.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ForgingPermission {
    pub info: ForgingInfo,
    /// The peer network has reach and quorum, or runs cold.
    pub network_allowed: bool,
    /// First half of the current slot.
    pub slot_allowed: bool,
    /// The sync loop is idle on an up to date chain.
    pub synced: bool,
    pub can_forge: bool,
}

#[async_trait]
pub trait ForgerHooks: Send + Sync {
    fn network_state(&self) -> Option<NetworkState>;

    /// `now` is unix seconds.
    fn forging_permission(&self, now: u64) -> ForgingPermission;

    /// Apply a locally forged block and broadcast it when accepted.
    async fn submit_forged_block(&self, block: Block) -> Result<AcceptOutcome, BlockSyncError>;

    fn status(&self) -> SyncStatus;
}
