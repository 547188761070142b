//! # Adapters
//!
//! Node-side implementations of subsystem outbound ports.

pub mod signature;

pub use signature::{
    compute_block_id, compute_payload_hash, forge_block, Ed25519BlockVerifier, BLOCK_VERSION,
};
