//! # Node Configuration
//!
//! One TOML file with a table per concern, every key optional:
//!
//! ```toml
//! [node]
//! bind_address = "0.0.0.0"
//!
//! [p2p]
//! nethash = "devnet"
//! port = 4002
//! seeds = ["10.0.0.2:4002"]
//!
//! [sync]
//! allow_single_node = true
//!
//! [chain]
//! block_time = 8
//! delegates = ["<hex public key>"]
//!
//! [api]
//! port = 4003
//! ```
//!
//! `DC_*` environment variables override the file.

use dc_01_peer_network::P2pConfig;
use dc_02_block_sync::SyncConfig;
use serde::Deserialize;
use shared_types::SlotClock;
use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::path::{Path, PathBuf};
use std::str::FromStr;
use thiserror::Error;

/// Complete node configuration.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct NodeConfig {
    pub node: NodeSection,
    pub p2p: P2pConfig,
    pub sync: SyncConfig,
    pub chain: ChainConfig,
    pub api: ApiConfig,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct NodeSection {
    /// Address both HTTP servers listen on.
    pub bind_address: IpAddr,
    /// Network name reported in logs.
    pub network: String,
    /// Pending transaction pool size.
    pub transaction_pool_capacity: usize,
    /// How long shutdown waits for background tasks.
    pub shutdown_grace_secs: u64,
}

impl Default for NodeSection {
    fn default() -> Self {
        Self {
            bind_address: IpAddr::V4(Ipv4Addr::UNSPECIFIED),
            network: "devnet".to_string(),
            transaction_pool_capacity: 10_000,
            shutdown_grace_secs: 5,
        }
    }
}

/// Slot parameters, delegate keys and the genesis block.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ChainConfig {
    /// Unix time of the network epoch.
    pub epoch_unix_secs: u64,
    pub block_time: u64,
    pub active_delegates: u32,
    /// Hex public keys of the active delegates.
    pub delegates: Vec<String>,
    /// Genesis timestamp, seconds since the network epoch.
    pub genesis_timestamp: u64,
    /// Hex public key named as the genesis generator.
    pub genesis_generator: String,
}

impl Default for ChainConfig {
    fn default() -> Self {
        Self {
            epoch_unix_secs: 0,
            block_time: 8,
            active_delegates: 51,
            delegates: Vec::new(),
            genesis_timestamp: 0,
            genesis_generator: String::new(),
        }
    }
}

impl ChainConfig {
    pub fn slots(&self) -> SlotClock {
        SlotClock::new(self.epoch_unix_secs, self.block_time, self.active_delegates)
    }
}

/// Node status and metrics server.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ApiConfig {
    pub enabled: bool,
    pub port: u16,
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            port: 4003,
        }
    }
}

/// Configuration errors.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("cannot read config file {path}: {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("invalid config file: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("invalid value for {key}: {value:?}")]
    Env { key: &'static str, value: String },

    #[error(transparent)]
    P2p(#[from] dc_01_peer_network::ConfigError),

    #[error("invalid chain config: {0}")]
    Chain(String),
}

impl NodeConfig {
    /// Read `path` when given, apply environment overrides, validate.
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        let config = match path {
            Some(path) => {
                let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
                    path: path.to_path_buf(),
                    source,
                })?;
                Self::from_toml(&text)?
            }
            None => Self::default(),
        };
        let config = config.with_overrides(|key| std::env::var(key).ok())?;
        config.validate()?;
        Ok(config)
    }

    pub fn from_toml(text: &str) -> Result<Self, ConfigError> {
        Ok(toml::from_str(text)?)
    }

    /// Apply `DC_*` overrides read through `lookup`.
    pub fn with_overrides(
        mut self,
        lookup: impl Fn(&str) -> Option<String>,
    ) -> Result<Self, ConfigError> {
        if let Some(port) = parse_var(&lookup, "DC_P2P_PORT")? {
            self.p2p.port = port;
        }
        if let Some(nethash) = lookup("DC_NETHASH") {
            self.p2p.nethash = nethash;
        }
        if let Some(seeds) = lookup("DC_SEEDS") {
            self.p2p.seeds = parse_list::<SocketAddr>("DC_SEEDS", &seeds)?;
        }
        if let Some(addresses) = lookup("DC_LOCAL_ADDRESSES") {
            self.p2p.local_addresses = parse_list::<IpAddr>("DC_LOCAL_ADDRESSES", &addresses)?;
        }
        if let Some(start) = parse_var(&lookup, "DC_NETWORK_START")? {
            self.p2p.network_start = start;
        }
        if let Some(reach) = parse_var(&lookup, "DC_MIN_NETWORK_REACH")? {
            self.p2p.minimum_network_reach = reach;
        }
        if let Some(single) = parse_var(&lookup, "DC_ALLOW_SINGLE_NODE")? {
            self.sync.allow_single_node = single;
        }
        if let Some(epoch) = parse_var(&lookup, "DC_EPOCH")? {
            self.chain.epoch_unix_secs = epoch;
        }
        if let Some(address) = parse_var(&lookup, "DC_BIND_ADDRESS")? {
            self.node.bind_address = address;
        }
        if let Some(port) = parse_var(&lookup, "DC_API_PORT")? {
            self.api.port = port;
        }
        Ok(self)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        self.p2p.validate()?;
        if self.chain.block_time == 0 {
            return Err(ConfigError::Chain("block_time must be positive".into()));
        }
        if self.chain.active_delegates == 0 {
            return Err(ConfigError::Chain("active_delegates must be positive".into()));
        }
        for key in &self.chain.delegates {
            if !is_public_key_hex(key) {
                return Err(ConfigError::Chain(format!("delegate key {key:?} is not 32 hex bytes")));
            }
        }
        if self.api.enabled && self.api.port != 0 && self.api.port == self.p2p.port {
            return Err(ConfigError::Chain(format!(
                "api port {} collides with the p2p port",
                self.api.port
            )));
        }
        Ok(())
    }

    pub fn p2p_address(&self) -> SocketAddr {
        SocketAddr::new(self.node.bind_address, self.p2p.port)
    }

    pub fn api_address(&self) -> SocketAddr {
        SocketAddr::new(self.node.bind_address, self.api.port)
    }
}

fn parse_var<T: FromStr>(
    lookup: &impl Fn(&str) -> Option<String>,
    key: &'static str,
) -> Result<Option<T>, ConfigError> {
    lookup(key)
        .map(|value| {
            value
                .trim()
                .parse()
                .map_err(|_| ConfigError::Env { key, value })
        })
        .transpose()
}

fn parse_list<T: FromStr>(key: &'static str, value: &str) -> Result<Vec<T>, ConfigError> {
    value
        .split(',')
        .map(str::trim)
        .filter(|item| !item.is_empty())
        .map(|item| {
            item.parse().map_err(|_| ConfigError::Env {
                key,
                value: item.to_string(),
            })
        })
        .collect()
}

fn is_public_key_hex(key: &str) -> bool {
    hex::decode(key).map(|bytes| bytes.len() == 32).unwrap_or(false)
}
