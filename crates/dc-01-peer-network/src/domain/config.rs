//! Peer network configuration.
//!
//! Every field has a default so a partial TOML table (or none at all) yields
//! a working configuration.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::net::{IpAddr, SocketAddr};
use std::time::Duration;

use super::entities::PluginInfo;
use super::errors::ConfigError;

/// Configuration consumed by the peer network subsystem.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct P2pConfig {
    /// Network identifier; peers on another network are refused.
    pub nethash: String,
    /// Version this node advertises.
    pub version: String,
    /// Port this node listens on for the wire protocol.
    pub port: u16,
    /// Addresses that belong to this node (self-connection guard).
    pub local_addresses: Vec<IpAddr>,
    pub seeds: Vec<SocketAddr>,
    /// Accepted peer versions as semver requirements (e.g. `>=2.6.0`).
    /// Empty accepts every parseable version.
    pub minimum_versions: Vec<String>,
    pub whitelist: Vec<IpAddr>,
    pub blacklist: Vec<IpAddr>,
    /// Plugins advertised in our status reply.
    pub plugins: BTreeMap<String, PluginInfo>,

    // --- quorum ---
    pub minimum_network_reach: usize,
    pub quorum_threshold: f64,
    /// Height difference still counted as agreeing with the local tip.
    pub quorum_height_tolerance: u64,
    /// Peers probed per refresh; all eligible peers below this are probed.
    pub status_sample_size: usize,

    // --- capacities ---
    pub peer_capacity: usize,
    pub verified_block_cache_capacity: usize,

    // --- verification ---
    /// A successful verification stays valid this long.
    pub verification_ttl_secs: u64,
    /// A failed peer is not re-verified before this has elapsed.
    pub verification_cooldown_secs: u64,

    // --- timeouts ---
    pub request_timeout_ms: u64,
    pub get_blocks_timeout_ms: u64,
    pub post_block_timeout_ms: u64,
    pub verify_timeout_ms: u64,
    /// Overall deadline of one network state refresh.
    pub refresh_deadline_ms: u64,

    // --- guard ---
    pub max_failures: u32,
    pub failure_window_secs: u64,
    pub ban_duration_secs: u64,
    pub rate_limit_attempts: u32,
    pub rate_limit_window_secs: u64,

    // --- discovery, download, broadcast ---
    pub discovery_fanout: usize,
    pub max_peers_per_reply: usize,
    pub max_download_blocks: u64,
    pub max_parallel_downloads: usize,
    pub max_peers_broadcast: usize,
    pub refresh_interval_secs: u64,
    pub max_rollback: u64,

    // --- modes ---
    /// Genesis start: this node bootstraps the network.
    pub network_start: bool,
    /// Seed mode: forge and sync without a minimum peer count.
    pub ignore_minimum_network_reach: bool,
}

impl Default for P2pConfig {
    fn default() -> Self {
        Self {
            nethash: String::from("devnet"),
            version: String::from(env!("CARGO_PKG_VERSION")),
            port: 4002,
            local_addresses: Vec::new(),
            seeds: Vec::new(),
            minimum_versions: Vec::new(),
            whitelist: Vec::new(),
            blacklist: Vec::new(),
            plugins: BTreeMap::new(),
            minimum_network_reach: 20,
            quorum_threshold: 0.66,
            quorum_height_tolerance: 0,
            status_sample_size: 50,
            peer_capacity: 2_000,
            verified_block_cache_capacity: 16_384,
            verification_ttl_secs: 600,
            verification_cooldown_secs: 60,
            request_timeout_ms: 5_000,
            get_blocks_timeout_ms: 10_000,
            post_block_timeout_ms: 10_000,
            verify_timeout_ms: 60_000,
            refresh_deadline_ms: 8_000,
            max_failures: 3,
            failure_window_secs: 600,
            ban_duration_secs: 600,
            rate_limit_attempts: 20,
            rate_limit_window_secs: 60,
            discovery_fanout: 8,
            max_peers_per_reply: 50,
            max_download_blocks: 400,
            max_parallel_downloads: 25,
            max_peers_broadcast: 20,
            refresh_interval_secs: 60,
            max_rollback: 5_000,
            network_start: false,
            ignore_minimum_network_reach: false,
        }
    }
}

impl P2pConfig {
    pub fn is_myself(&self, ip: &IpAddr) -> bool {
        self.local_addresses.contains(ip)
    }

    /// Seed or network-start node: quorum rules do not gate it.
    pub fn is_seed_mode(&self) -> bool {
        self.network_start || self.ignore_minimum_network_reach
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_millis(self.request_timeout_ms)
    }

    pub fn get_blocks_timeout(&self) -> Duration {
        Duration::from_millis(self.get_blocks_timeout_ms)
    }

    pub fn post_block_timeout(&self) -> Duration {
        Duration::from_millis(self.post_block_timeout_ms)
    }

    pub fn verify_timeout(&self) -> Duration {
        Duration::from_millis(self.verify_timeout_ms)
    }

    pub fn refresh_deadline(&self) -> Duration {
        Duration::from_millis(self.refresh_deadline_ms)
    }

    pub fn refresh_interval(&self) -> Duration {
        Duration::from_secs(self.refresh_interval_secs)
    }

    /// Reject values that would make the subsystem misbehave.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.nethash.is_empty() {
            return Err(ConfigError::Invalid("nethash must not be empty".into()));
        }
        if !(0.0..=1.0).contains(&self.quorum_threshold) {
            return Err(ConfigError::Invalid(format!(
                "quorum_threshold {} is outside [0, 1]",
                self.quorum_threshold
            )));
        }
        if self.peer_capacity == 0 || self.verified_block_cache_capacity == 0 {
            return Err(ConfigError::Invalid("capacities must be non-zero".into()));
        }
        if self.max_download_blocks == 0 {
            return Err(ConfigError::Invalid("max_download_blocks must be non-zero".into()));
        }
        for requirement in &self.minimum_versions {
            semver::VersionReq::parse(requirement).map_err(|e| {
                ConfigError::InvalidVersionRequirement {
                    requirement: requirement.clone(),
                    reason: e.to_string(),
                }
            })?;
        }
        Ok(())
    }
}
