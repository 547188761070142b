//! # Error Types
//!
//! Defines error types used across subsystems.

use thiserror::Error;

/// Errors parsing the primitive types in this crate.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TypeError {
    #[error("invalid hex: {0}")]
    InvalidHex(String),

    #[error("invalid length: expected {expected} bytes, got {actual}")]
    InvalidLength { expected: usize, actual: usize },
}

/// Errors raised by the injected block store.
///
/// Any of these reaching the block processor is treated as fatal for the
/// sync loop: the node cannot safely keep applying blocks.
#[derive(Debug, Clone, Error)]
pub enum StorageError {
    /// Block not found in storage.
    #[error("block not found: {0}")]
    NotFound(String),

    /// Parent block not found.
    #[error("parent block not found: cannot write block at height {height}")]
    ParentNotFound { height: u64 },

    /// Refusing to delete the genesis block.
    #[error("cannot delete the genesis block")]
    GenesisImmutable,

    /// Store is not reachable.
    #[error("storage unavailable: {0}")]
    Unavailable(String),

    /// Database operation failed.
    #[error("database error: {0}")]
    DatabaseError(String),
}
