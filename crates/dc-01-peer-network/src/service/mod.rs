//! # Service Layer
//!
//! Wires the domain to the ports:
//!
//! - [`PeerCommunicator`]: one typed call per wire request, with deadlines and penalties
//! - [`PeerVerifier`]: common-ancestor search and block verification
//! - [`PeerProcessor`]: admission into the repository
//! - [`NetworkMonitor`]: discovery, cleansing, quorum refresh, download, broadcast
//! - [`PeerResponder`]: the serving side of the protocol

pub mod communicator;
pub mod context;
pub mod monitor;
pub mod processor;
pub mod responder;
pub mod verifier;

pub use communicator::PeerCommunicator;
pub use context::PeerNetworkContext;
pub use monitor::NetworkMonitor;
pub use processor::{AcceptOptions, PeerProcessor};
pub use responder::PeerResponder;
pub use verifier::{PeerVerifier, VerifiedPeer};
