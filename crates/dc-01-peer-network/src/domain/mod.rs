//! Domain layer: peer bookkeeping and network analysis with no I/O.
//!
//! - `guard`: blacklist, whitelist, version gate and failure suspensions
//! - `repository`: bounded peer table keyed by ip
//! - `network_state`: quorum and modal height over sampled peers
//! - `nary_search`: highest common block search
//! - `wire`: request and reply schema of the peer protocol

pub mod config;
pub mod entities;
pub mod errors;
pub mod events;
pub mod guard;
pub mod nary_search;
pub mod network_state;
pub mod rate_limit;
pub mod repository;
pub mod verified_cache;
pub mod wire;

pub use config::*;
pub use entities::*;
pub use errors::*;
pub use events::*;
pub use guard::*;
pub use nary_search::*;
pub use network_state::*;
pub use rate_limit::*;
pub use repository::*;
pub use verified_cache::*;
pub use wire::*;
