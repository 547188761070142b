//! # Shared Types Crate
//!
//! Block entities, slot arithmetic, the chaining rule and bounded containers
//! shared by the peer network (`dc-01`) and block sync (`dc-02`) subsystems.
//!
//! ## Design Principles
//!
//! - **Single Source of Truth**: every type that crosses a crate boundary is
//!   defined here.
//! - **One eviction policy**: all bounded in-memory stores use
//!   [`BoundedFifoMap`], so eviction semantics are identical everywhere.
//! - **Opaque payloads**: transactions stay serialized; this node never
//!   interprets them.

pub mod bounded;
pub mod chaining;
pub mod entities;
pub mod errors;
pub mod slots;

pub use bounded::{BoundedFifoMap, BoundedFifoSet};
pub use chaining::{chaining_violation, is_chain, is_chained};
pub use entities::*;
pub use errors::*;
pub use slots::{ForgingInfo, SlotClock};
