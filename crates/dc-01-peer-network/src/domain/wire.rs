//! # Wire protocol
//!
//! Requests, reply bodies and the protocol headers carried by every reply.
//! Reply bodies are decoded into these types and then checked by the
//! communicator; anything that fails either step is a malformed reply.

use serde::{Deserialize, Serialize};
use shared_types::{Block, BlockHeader, BlockId, SerializedTransaction};
use std::collections::BTreeMap;

use super::entities::{PeerBroadcast, PeerState, PluginInfo};

pub const HEADER_NETHASH: &str = "nethash";
pub const HEADER_VERSION: &str = "version";
pub const HEADER_PORT: &str = "port";
pub const HEADER_OS: &str = "os";

/// Headers sent with every request and required on every reply.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProtocolHeaders {
    pub nethash: String,
    pub version: String,
    pub port: u16,
    pub os: String,
}

impl ProtocolHeaders {
    pub fn new(nethash: impl Into<String>, version: impl Into<String>, port: u16) -> Self {
        Self {
            nethash: nethash.into(),
            version: version.into(),
            port,
            os: std::env::consts::OS.to_string(),
        }
    }

    /// Build from raw header lookups; `None` if any is missing or invalid.
    pub fn from_lookup<'a, F>(mut lookup: F) -> Option<Self>
    where
        F: FnMut(&str) -> Option<&'a str>,
    {
        Some(Self {
            nethash: lookup(HEADER_NETHASH)?.to_string(),
            version: lookup(HEADER_VERSION)?.to_string(),
            port: lookup(HEADER_PORT)?.parse().ok()?,
            os: lookup(HEADER_OS).unwrap_or("unknown").to_string(),
        })
    }

    pub fn pairs(&self) -> [(&'static str, String); 4] {
        [
            (HEADER_NETHASH, self.nethash.clone()),
            (HEADER_VERSION, self.version.clone()),
            (HEADER_PORT, self.port.to_string()),
            (HEADER_OS, self.os.clone()),
        ]
    }
}

/// Outgoing request.
#[derive(Debug, Clone, PartialEq)]
pub enum WireRequest {
    GetPeers,
    GetBlocks { from_height: u64, limit: u64 },
    GetCommonBlocks { ids: Vec<BlockId> },
    GetStatus,
    PostBlock { block: Box<Block> },
    PostTransactions { transactions: Vec<SerializedTransaction> },
}

/// Version prefix of every peer route. Bumped on incompatible wire changes.
pub const PEER_API_PREFIX: &str = "/v1";

impl WireRequest {
    pub fn name(&self) -> &'static str {
        match self {
            WireRequest::GetPeers => "getPeers",
            WireRequest::GetBlocks { .. } => "getBlocks",
            WireRequest::GetCommonBlocks { .. } => "getCommonBlocks",
            WireRequest::GetStatus => "getStatus",
            WireRequest::PostBlock { .. } => "postBlock",
            WireRequest::PostTransactions { .. } => "postTransactions",
        }
    }

    /// Versioned route and query string, relative to the peer's base url.
    pub fn path(&self) -> String {
        format!("{PEER_API_PREFIX}{}", self.route())
    }

    fn route(&self) -> String {
        match self {
            WireRequest::GetPeers => "/peer/list".to_string(),
            WireRequest::GetBlocks { from_height, limit } => {
                format!("/peer/blocks?height={from_height}&limit={limit}")
            }
            WireRequest::GetCommonBlocks { ids } => {
                let ids: Vec<String> = ids.iter().map(BlockId::to_hex).collect();
                format!("/peer/blocks/common?ids={}", ids.join(","))
            }
            WireRequest::GetStatus => "/peer/status".to_string(),
            WireRequest::PostBlock { .. } => "/peer/blocks".to_string(),
            WireRequest::PostTransactions { .. } => "/peer/transactions".to_string(),
        }
    }

    /// JSON body for POST requests.
    pub fn body(&self) -> Option<serde_json::Value> {
        match self {
            WireRequest::PostBlock { block } => serde_json::to_value(PostBlockBody {
                block: block.as_ref().clone(),
            })
            .ok(),
            WireRequest::PostTransactions { transactions } => {
                serde_json::to_value(PostTransactionsBody {
                    transactions: transactions.clone(),
                })
                .ok()
            }
            _ => None,
        }
    }
}

/// Raw reply as produced by a transport.
#[derive(Debug, Clone, PartialEq)]
pub struct WireReply {
    pub status: u16,
    /// `None` when a required protocol header was missing or unparseable.
    pub headers: Option<ProtocolHeaders>,
    pub body: serde_json::Value,
}

impl WireReply {
    pub fn ok(headers: ProtocolHeaders, body: serde_json::Value) -> Self {
        Self {
            status: 200,
            headers: Some(headers),
            body,
        }
    }

    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }

    /// Busy or failing server side: worth a retry and not the peer's
    /// protocol fault.
    pub fn is_transient(&self) -> bool {
        self.status == 429 || (500..600).contains(&self.status)
    }
}

// =============================================================================
// REPLY BODIES
// =============================================================================

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PeerListReply {
    pub success: bool,
    pub peers: Vec<PeerBroadcast>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BlocksReply {
    pub blocks: Vec<Block>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct CommonBlock {
    pub id: BlockId,
    pub height: u64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CommonBlockReply {
    pub common: Option<CommonBlock>,
    pub last_block_height: u64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PeerConfigInfo {
    pub version: String,
    #[serde(default)]
    pub plugins: BTreeMap<String, PluginInfo>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StatusReply {
    pub height: u64,
    pub header: BlockHeader,
    pub forging_allowed: bool,
    pub current_slot: u64,
    #[serde(default)]
    pub config: Option<PeerConfigInfo>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PostBlockBody {
    pub block: Block,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PostTransactionsBody {
    pub transactions: Vec<SerializedTransaction>,
}

/// A validated status reply together with the version from its headers.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PeerStatus {
    pub height: u64,
    pub header: BlockHeader,
    pub forging_allowed: bool,
    pub current_slot: u64,
    pub version: String,
    pub plugins: BTreeMap<String, PluginInfo>,
}

impl PeerStatus {
    pub fn from_reply(reply: StatusReply, headers: &ProtocolHeaders) -> Self {
        let plugins = reply.config.map(|c| c.plugins).unwrap_or_default();
        Self {
            height: reply.height,
            header: reply.header,
            forging_allowed: reply.forging_allowed,
            current_slot: reply.current_slot,
            version: headers.version.clone(),
            plugins,
        }
    }

    pub fn state(&self) -> PeerState {
        PeerState {
            height: self.height,
            forging_allowed: self.forging_allowed,
            current_slot: self.current_slot,
            header: Some(self.header.clone()),
        }
    }
}
