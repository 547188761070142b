//! Domain layer: accept outcomes and the sync state machine. No I/O.
//! The chaining rule itself lives in `shared_types` so peer verification
//! applies the same one.

pub use shared_types::{chaining_violation, is_chain, is_chained};

pub mod config;
pub mod errors;
pub mod outcome;
pub mod state_machine;
pub mod status;

pub use config::*;
pub use errors::*;
pub use outcome::*;
pub use state_machine::*;
pub use status::*;
