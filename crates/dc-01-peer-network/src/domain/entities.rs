//! # Peer entities
//!
//! A [`Peer`] is keyed by its ip. It is created on first contact, mutated on
//! every successful exchange or verification and only becomes usable for
//! sync once it carries a fresh, successful [`PeerVerificationResult`].

use serde::{Deserialize, Serialize};
use shared_types::BlockHeader;
use std::collections::BTreeMap;
use std::net::{IpAddr, SocketAddr};

/// Chain state a peer reported in its last status reply.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PeerState {
    pub height: u64,
    pub forging_allowed: bool,
    pub current_slot: u64,
    #[serde(default)]
    pub header: Option<BlockHeader>,
}

/// A capability advertised by a peer (e.g. its public API).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PluginInfo {
    pub enabled: bool,
    pub port: u16,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChainValidation {
    pub highest_common_height: u64,
    pub forked: bool,
}

/// Outcome of the last verification run against a peer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PeerVerificationResult {
    pub verified: bool,
    pub my_height: u64,
    pub his_height: u64,
    pub chain_validation: ChainValidation,
    /// Unix seconds at which the verification finished.
    pub timestamp: u64,
}

impl PeerVerificationResult {
    /// The peer is forked when the highest common block is neither our tip
    /// nor its tip.
    pub fn success(my_height: u64, his_height: u64, highest_common_height: u64, timestamp: u64) -> Self {
        Self {
            verified: true,
            my_height,
            his_height,
            chain_validation: ChainValidation {
                highest_common_height,
                forked: highest_common_height != my_height && highest_common_height != his_height,
            },
            timestamp,
        }
    }

    pub fn failed(timestamp: u64) -> Self {
        Self {
            verified: false,
            my_height: 0,
            his_height: 0,
            chain_validation: ChainValidation::default(),
            timestamp,
        }
    }

    pub fn forked(&self) -> bool {
        self.verified && self.chain_validation.forked
    }

    pub fn age(&self, now: u64) -> u64 {
        now.saturating_sub(self.timestamp)
    }
}

/// A remote node.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Peer {
    pub ip: IpAddr,
    pub port: u16,
    pub version: String,
    /// Round trip of the last successful exchange, in milliseconds.
    pub latency_ms: Option<u64>,
    pub state: PeerState,
    pub plugins: BTreeMap<String, PluginInfo>,
    pub last_pinged: Option<u64>,
    pub verification_result: Option<PeerVerificationResult>,
}

impl Peer {
    pub fn new(ip: IpAddr, port: u16) -> Self {
        Self {
            ip,
            port,
            version: String::new(),
            latency_ms: None,
            state: PeerState::default(),
            plugins: BTreeMap::new(),
            last_pinged: None,
            verification_result: None,
        }
    }

    pub fn with_version(mut self, version: impl Into<String>) -> Self {
        self.version = version.into();
        self
    }

    pub fn from_broadcast(broadcast: PeerBroadcast) -> Self {
        let mut peer = Self::new(broadcast.ip, broadcast.port).with_version(broadcast.version);
        peer.state.height = broadcast.height;
        peer.latency_ms = broadcast.latency;
        peer
    }

    pub fn socket_addr(&self) -> SocketAddr {
        SocketAddr::new(self.ip, self.port)
    }

    pub fn is_verified(&self) -> bool {
        self.verification_result
            .as_ref()
            .is_some_and(|result| result.verified)
    }

    pub fn is_forked(&self) -> bool {
        self.verification_result
            .as_ref()
            .is_some_and(PeerVerificationResult::forked)
    }

    /// Usable for sync: successfully verified within `ttl_secs`.
    pub fn is_eligible(&self, now: u64, ttl_secs: u64) -> bool {
        self.verification_result
            .as_ref()
            .is_some_and(|result| result.verified && result.age(now) <= ttl_secs)
    }

    /// Last verification failed less than `cooldown_secs` ago.
    pub fn is_cooling_down(&self, now: u64, cooldown_secs: u64) -> bool {
        self.verification_result
            .as_ref()
            .is_some_and(|result| !result.verified && result.age(now) < cooldown_secs)
    }

    pub fn to_broadcast(&self) -> PeerBroadcast {
        PeerBroadcast {
            ip: self.ip,
            port: self.port,
            ports: self
                .plugins
                .iter()
                .filter(|(_, plugin)| plugin.enabled)
                .map(|(name, plugin)| (name.clone(), plugin.port))
                .collect(),
            version: self.version.clone(),
            height: self.state.height,
            latency: self.latency_ms,
        }
    }
}

/// How a peer is advertised to other nodes in `peer/list`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PeerBroadcast {
    pub ip: IpAddr,
    pub port: u16,
    #[serde(default)]
    pub ports: BTreeMap<String, u16>,
    pub version: String,
    #[serde(default)]
    pub height: u64,
    #[serde(default)]
    pub latency: Option<u64>,
}
