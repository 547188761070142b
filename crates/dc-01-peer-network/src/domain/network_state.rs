//! # Network state
//!
//! Point-in-time summary of what sampled peers report, relative to the local
//! tip. Pure functions only; probing lives in the network monitor.
//!
//! - **quorum**: share of *sampled* peers agreeing with the local chain. A
//!   peer agrees when its height is within tolerance of ours (and, at our
//!   exact height, on our block), or when it is below us and not forked.
//!   More peers reporting our height can only raise it.
//! - **modal height**: plurality height among responders. Ties prefer our
//!   own height, else the lowest tied height.
//! - **network consensus**: share of sampled peers at the modal height.

use serde::Serialize;
use shared_types::{BlockHeader, BlockId};
use std::collections::HashMap;
use std::net::IpAddr;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum NetworkStatus {
    Default,
    ColdStart,
    BelowMinimumPeers,
    Unknown,
}

/// One successful status probe.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ProbeResponse {
    pub ip: IpAddr,
    pub height: u64,
    pub header: BlockHeader,
    pub current_slot: u64,
    pub forging_allowed: bool,
    /// From the peer's last verification.
    pub forked: bool,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct QuorumDetails {
    pub peers_quorum: usize,
    pub peers_no_quorum: usize,
    pub peers_over_height: usize,
    pub peers_forked: usize,
    pub peers_different_slot: usize,
    pub peers_forging_not_allowed: usize,
    pub over_height_block_headers: Vec<BlockHeader>,
}

/// Thresholds used to derive `forging_allowed`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct QuorumPolicy {
    pub minimum_network_reach: usize,
    pub quorum_threshold: f64,
    pub height_tolerance: u64,
    pub seed_mode: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct NetworkState {
    pub status: NetworkStatus,
    pub node_height: u64,
    pub last_block_id: Option<BlockId>,
    pub sampled_peers: usize,
    pub responded_peers: usize,
    pub modal_height: Option<u64>,
    pub quorum: f64,
    pub network_consensus: f64,
    pub minimum_network_reach: usize,
    pub forging_allowed: bool,
    pub details: QuorumDetails,
}

impl NetworkState {
    pub fn analyze(
        local: &BlockHeader,
        current_slot: u64,
        sampled: usize,
        responses: &[ProbeResponse],
        policy: &QuorumPolicy,
    ) -> Self {
        let mut details = QuorumDetails::default();

        for response in responses {
            if response.current_slot != current_slot {
                details.peers_different_slot += 1;
            }
            if !response.forging_allowed {
                details.peers_forging_not_allowed += 1;
            }

            if agrees_with_local(response, local, policy.height_tolerance) {
                details.peers_quorum += 1;
                continue;
            }

            details.peers_no_quorum += 1;
            if response.forked {
                details.peers_forked += 1;
            }
            if response.height > local.height + policy.height_tolerance {
                details.peers_over_height += 1;
                details.over_height_block_headers.push(response.header.clone());
            }
        }

        let heights: Vec<u64> = responses.iter().map(|r| r.height).collect();
        let modal = modal_height(&heights, local.height);
        let at_modal = modal.map_or(0, |m| heights.iter().filter(|h| **h == m).count());

        let quorum = ratio(details.peers_quorum, sampled);
        let has_reach = sampled >= policy.minimum_network_reach;
        let forging_allowed =
            policy.seed_mode || (has_reach && quorum >= policy.quorum_threshold);

        let status = if has_reach || policy.seed_mode {
            NetworkStatus::Default
        } else {
            NetworkStatus::BelowMinimumPeers
        };

        Self {
            status,
            node_height: local.height,
            last_block_id: Some(local.id),
            sampled_peers: sampled,
            responded_peers: responses.len(),
            modal_height: modal,
            quorum,
            network_consensus: ratio(at_modal, sampled),
            minimum_network_reach: policy.minimum_network_reach,
            forging_allowed,
            details,
        }
    }

    /// Network-start node: forging is allowed without peers.
    pub fn cold_start(local: &BlockHeader, policy: &QuorumPolicy) -> Self {
        Self {
            status: NetworkStatus::ColdStart,
            node_height: local.height,
            last_block_id: Some(local.id),
            sampled_peers: 0,
            responded_peers: 0,
            modal_height: None,
            quorum: 1.0,
            network_consensus: 1.0,
            minimum_network_reach: policy.minimum_network_reach,
            forging_allowed: true,
            details: QuorumDetails::default(),
        }
    }

    /// The local chain could not be read.
    pub fn unknown(policy: &QuorumPolicy) -> Self {
        Self {
            status: NetworkStatus::Unknown,
            node_height: 0,
            last_block_id: None,
            sampled_peers: 0,
            responded_peers: 0,
            modal_height: None,
            quorum: 0.0,
            network_consensus: 0.0,
            minimum_network_reach: policy.minimum_network_reach,
            forging_allowed: false,
            details: QuorumDetails::default(),
        }
    }

    pub fn has_minimum_reach(&self) -> bool {
        self.sampled_peers >= self.minimum_network_reach
    }

    /// The plurality of the network is ahead of us.
    pub fn is_behind(&self, tolerance: u64) -> bool {
        self.modal_height
            .is_some_and(|modal| modal > self.node_height + tolerance)
    }
}

fn agrees_with_local(response: &ProbeResponse, local: &BlockHeader, tolerance: u64) -> bool {
    if response.forked {
        return false;
    }
    if response.height == local.height {
        return response.header.id == local.id;
    }
    // Below us on our chain, or within tolerance either side.
    response.height < local.height || response.height - local.height <= tolerance
}

fn ratio(part: usize, whole: usize) -> f64 {
    if whole == 0 {
        0.0
    } else {
        part as f64 / whole as f64
    }
}

/// Plurality height. Ties prefer `local` if tied, else the lowest tied
/// height.
pub fn modal_height(heights: &[u64], local: u64) -> Option<u64> {
    let mut counts: HashMap<u64, usize> = HashMap::new();
    for height in heights {
        *counts.entry(*height).or_default() += 1;
    }

    let best = counts.values().copied().max()?;
    let mut tied: Vec<u64> = counts
        .into_iter()
        .filter(|(_, count)| *count == best)
        .map(|(height, _)| height)
        .collect();
    tied.sort_unstable();

    if tied.contains(&local) {
        Some(local)
    } else {
        tied.first().copied()
    }
}

/// Outcome of a fork health check across verified peers.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct NetworkHealth {
    pub forked: bool,
    pub common_height: Option<u64>,
    pub blocks_to_rollback: u64,
}
