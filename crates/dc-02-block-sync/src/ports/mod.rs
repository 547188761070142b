//! # Ports
//!
//! - `inbound`: what the external forger calls
//! - `outbound`: block store and transaction pool collaborators

pub mod inbound;
pub mod outbound;

pub use inbound::*;
pub use outbound::*;
