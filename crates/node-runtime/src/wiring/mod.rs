//! # Subsystem Wiring
//!
//! dc-01 and dc-02 never see each other's concrete types. The container
//! connects them through ports; this module observes what both publish.

pub mod event_routing;

pub use event_routing::{record_block_event, record_peer_event, record_status, EventRouter};
