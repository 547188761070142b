//! # Adapters
//!
//! In-memory collaborators for single-process nodes and tests.

pub mod memory_pool;
pub mod memory_store;

pub use memory_pool::MemoryTransactionPool;
pub use memory_store::MemoryChainStore;
