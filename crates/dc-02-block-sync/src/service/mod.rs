//! # Service Layer
//!
//! - [`BlockProcessor`]: the single writer of the local chain
//! - [`SyncService`]: the sync state machine loop and forger hooks

pub mod block_processor;
pub mod sync_service;

pub use block_processor::BlockProcessor;
pub use sync_service::SyncService;
