//! # Peer Network Subsystem
//!
//! **Subsystem ID:** dc-01
//!
//! Keeps a verified view of the peer network of a delegated proof-of-stake
//! node: which peers exist, which share our chain, how high the network is,
//! and whether enough of it agrees with us to forge.
//!
//! ## Architecture
//!
//! ```text
//!            ┌──────────────────────── NetworkMonitor ────────────────────────┐
//!  seeds ──► │ populate ─► discover ─► cleanse ─► refresh (quorum)            │
//!            │                │                                               │
//!            │          PeerProcessor ──► PeerVerifier ──► PeerCommunicator ──┼──► PeerTransport
//!            │                │          (common block,     (deadlines,       │
//!            │          PeerRepository    round blocks)      penalties)       │
//!            │          PeerGuard                                             │
//!            └────────────────────────────────────────────────────────────────┘
//!  PeerTransport ──► PeerResponder ──► ChainReader / BlockSink / TransactionSink
//! ```
//!
//! - **Domain Layer:** peer table, guard, quorum analysis, n-ary search, wire schema
//! - **Ports Layer:** [`PeerNetworkApi`] for the node, outbound traits for the host
//! - **Service Layer:** communicator, verifier, processor, monitor, responder
//! - **Adapters Layer:** system clock, HTTP transport (feature `http`)
//!
//! ## Features
//!
//! - `http` - reqwest-based [`adapters::HttpTransport`]
//! - `test-utils` - deterministic chains and an in-process simulated network

// =============================================================================
// CORE MODULES
// =============================================================================

pub mod adapters;
pub mod domain;
pub mod ports;
pub mod service;

/// Test utilities (FixedTimeSource, MockChain, SimulatedNetwork).
/// Requires feature: `test-utils`
#[cfg(any(test, feature = "test-utils"))]
pub mod test_utils;

// =============================================================================
// RE-EXPORTS
// =============================================================================

pub use domain::{
    ConfigError, DownloadError, NetworkHealth, NetworkState, NetworkStatus, Offence, P2pConfig,
    Peer, PeerBroadcast, PeerEvent, PeerRejection, PeerVerificationResult, ProtocolHeaders,
    VerificationFailure, WireReply, WireRequest, PEER_API_PREFIX,
};

pub use ports::{
    BlockSink, BlockSubmission, BlockVerifier, ChainReadError, ChainReader, ColdStartOptions,
    PeerNetworkApi, PeerRequestHandler, PeerTransport, TimeSource, TransactionSink,
    TransportError,
};

pub use service::{NetworkMonitor, PeerNetworkContext, PeerResponder};

pub use adapters::SystemTimeSource;

#[cfg(feature = "http")]
pub use adapters::HttpTransport;
