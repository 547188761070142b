//! Ports layer: the traits that connect the service to the outside world.

pub mod inbound;
pub mod outbound;

pub use inbound::*;
pub use outbound::*;
