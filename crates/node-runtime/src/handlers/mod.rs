//! # HTTP Handlers
//!
//! Two axum routers: the peer wire protocol other nodes talk to, and the
//! local node API for operators and the forger.

pub mod node_api;
pub mod peer_api;

pub use node_api::{node_router, NodeApiState, NodeStatusResponse};
pub use peer_api::peer_router;
