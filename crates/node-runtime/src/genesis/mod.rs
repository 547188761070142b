//! # Genesis Module
//!
//! The genesis block is height 1 with no parent. It is never forged or
//! signed; nodes trust it by id and it cannot be reverted.

pub mod builder;

pub use builder::{GenesisBuilder, GenesisError};
