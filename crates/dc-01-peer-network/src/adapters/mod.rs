//! # Adapters
//!
//! Concrete port implementations. The system clock is always available; the
//! HTTP transport requires the `http` feature.

pub mod time;

#[cfg(feature = "http")]
pub mod http_transport;

pub use time::SystemTimeSource;

#[cfg(feature = "http")]
pub use http_transport::HttpTransport;
