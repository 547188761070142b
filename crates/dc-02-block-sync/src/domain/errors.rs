//! # Error Types
//!
//! Only conditions that make continued block application unsafe are errors.
//! Rejected blocks are [`crate::domain::AcceptOutcome::Rejected`].

use shared_types::StorageError;
use thiserror::Error;

#[derive(Debug, Clone, Error)]
pub enum BlockSyncError {
    #[error("storage failure: {0}")]
    Storage(#[from] StorageError),

    /// The tip has not been loaded from storage yet.
    #[error("block processor is not initialised")]
    NotInitialised,

    #[error("genesis block mismatch: expected {expected}, found {found}")]
    GenesisMismatch { expected: String, found: String },
}
