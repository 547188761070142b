//! # Node Runtime Library
//!
//! Wires the Delegate-Chain subsystems into a running node. The `dc-node`
//! binary is a thin shell over [`NodeRuntime`].
//!
//! ## Modules
//!
//! - `container/` - configuration and dependency-ordered subsystem construction
//! - `genesis/`   - deterministic genesis block
//! - `adapters/`  - block ids and Ed25519 delegate signatures
//! - `handlers/`  - axum routers for the peer protocol and the node API
//! - `wiring/`    - subsystem events into metrics and logs
//! - `runtime`    - task lifecycle, startup and graceful shutdown

#![allow(clippy::type_complexity)]

pub mod adapters;
pub mod container;
pub mod genesis;
pub mod handlers;
pub mod runtime;
pub mod wiring;

pub use container::{NodeConfig, SubsystemContainer};
pub use runtime::NodeRuntime;
