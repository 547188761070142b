use serde::Deserialize;
use shared_types::BlockId;
use std::time::Duration;

/// Block sync settings. Network thresholds (reach, quorum, rollback) live in
/// the peer network config.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct SyncConfig {
    /// Pause between failed network checks.
    pub check_network_retry_ms: u64,
    /// Idle re-check period; one block time when unset.
    pub idle_wakeup_secs: Option<u64>,
    /// Consecutive empty downloads tolerated before giving up on the peers.
    pub no_block_limit: u32,
    /// The tip counts as recent when it is at most this many block times old.
    pub synced_block_times: u64,
    pub future_buffer_capacity: usize,
    pub incoming_queue_capacity: usize,
    /// Treat a node without peers as ready to forge.
    pub allow_single_node: bool,
    /// Checked against the stored genesis block at init when set.
    pub genesis_block_id: Option<BlockId>,
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            check_network_retry_ms: 2_000,
            idle_wakeup_secs: None,
            no_block_limit: 3,
            synced_block_times: 10,
            future_buffer_capacity: 256,
            incoming_queue_capacity: 1_024,
            allow_single_node: false,
            genesis_block_id: None,
        }
    }
}

impl SyncConfig {
    pub fn check_network_retry(&self) -> Duration {
        Duration::from_millis(self.check_network_retry_ms)
    }

    pub fn idle_wakeup(&self, block_time: u64) -> Duration {
        Duration::from_secs(self.idle_wakeup_secs.unwrap_or(block_time).max(1))
    }
}
