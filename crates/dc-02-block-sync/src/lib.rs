//! # Block Sync Subsystem
//!
//! **Subsystem ID:** dc-02
//!
//! Keeps the local chain on the network's best chain. Blocks arrive three
//! ways: pushed by peers, downloaded while behind, forged locally. All of
//! them go through one [`BlockProcessor`], which applies a block only when
//! it chains onto the current tip.
//!
//! ## Architecture
//!
//! ```text
//!  peers ──POST /v1/peer/blocks─► SyncService (BlockSink) ──► inbox
//!                                    │
//!                 state machine loop │ download / fork recovery
//!                                    ▼
//!                  PeerNetworkApi ◄──┴──► BlockProcessor ──► DatabaseService
//!                                          (single writer)  TransactionPool
//!  forger ──ForgerHooks──► SyncService
//! ```
//!
//! - **Domain Layer:** chaining rule, accept outcomes, state machine, status
//! - **Ports Layer:** [`ForgerHooks`] for the forger, storage and pool traits
//! - **Service Layer:** block processor, sync loop
//! - **Adapters Layer:** in-memory chain store and transaction pool

// =============================================================================
// CORE MODULES
// =============================================================================

pub mod adapters;
pub mod domain;
pub mod ports;
pub mod service;

// =============================================================================
// RE-EXPORTS
// =============================================================================

pub use domain::{
    is_chain, is_chained, AcceptOutcome, BlockEvent, BlockSyncError, RejectReason, SyncConfig,
    SyncEvent, SyncState, SyncStateMachine, SyncStatus,
};

pub use ports::{DatabaseService, ForgerHooks, ForgingPermission, TransactionPool};

pub use service::{BlockProcessor, SyncService};

pub use adapters::{MemoryChainStore, MemoryTransactionPool};
