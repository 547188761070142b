//! # Integration Scenarios
//!
//! Whole nodes talking to each other. Each file covers one behaviour of the
//! network as a system rather than of a single crate.

pub mod block_integrity;
pub mod fork_recovery;
pub mod network_sync;
pub mod wire_http;
