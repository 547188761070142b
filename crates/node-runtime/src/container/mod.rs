//! # Subsystem Container
//!
//! Configuration loading and the dependency-ordered construction of every
//! subsystem.

pub mod config;
pub mod subsystems;

pub use config::{ApiConfig, ChainConfig, ConfigError, NodeConfig, NodeSection};
pub use subsystems::{ContainerError, SubsystemContainer};
