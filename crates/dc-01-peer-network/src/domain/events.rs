//! # Peer network events
//!
//! Published on a `tokio::sync::broadcast` channel owned by the context.
//! Nothing in this crate consumes them; the runtime turns them into
//! metrics. Sends never block and are dropped when nobody listens.

use serde::Serialize;
use std::net::IpAddr;

use super::guard::Offence;

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum PeerEvent {
    /// A peer passed verification and is stored.
    Accepted { ip: IpAddr, height: u64, forked: bool },

    /// A peer was turned away; `reason` is a stable label.
    Rejected { ip: IpAddr, reason: &'static str },

    Suspended { ip: IpAddr, offence: Offence, until: u64 },

    /// A stored peer failed re-verification and is unusable until it
    /// passes again.
    Demoted { ip: IpAddr },

    /// A peer was dropped from the repository without being suspended.
    Removed { ip: IpAddr },
}
