//! # Delegate-Chain Test Suite
//!
//! Cross-crate scenarios that run several complete nodes (container,
//! network monitor, sync loop) against each other.
//!
//! ## Structure
//!
//! ```text
//! tests/
//! ├── src/
//! │   ├── fixtures.rs       # Cluster of nodes on a simulated network
//! │   └── integration/
//! │       ├── network_sync.rs   # catch-up and block propagation
//! │       ├── fork_recovery.rs  # minority forks, dishonest peers
//! │       └── wire_http.rs      # one node over real HTTP
//! └── benches/
//!     └── sync_benchmarks.rs
//! ```
//!
//! ## Running Tests
//!
//! ```bash
//! cargo test -p dc-tests
//! cargo test -p dc-tests integration::fork_recovery
//! cargo bench -p dc-tests
//! ```

pub mod fixtures;
pub mod integration;
