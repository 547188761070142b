//! # Node Telemetry
//!
//! Logging and metrics for Delegate-Chain nodes.
//!
//! - **Logs:** `tracing-subscriber` with an `EnvFilter`, JSON lines or
//!   human-readable output
//! - **Metrics:** Prometheus counters and gauges in one registry, rendered
//!   by [`encode_metrics`] for `GET /metrics`
//!
//! ## Usage
//!
//! ```rust,ignore
//! use node_telemetry::{init_telemetry, TelemetryConfig};
//!
//! let _guard = init_telemetry(TelemetryConfig::from_env())?;
//! ```
//!
//! ## Environment Variables
//!
//! | Variable | Default | Description |
//! |----------|---------|-------------|
//! | `DC_LOG_LEVEL` / `RUST_LOG` | `info` | Log filter directive |
//! | `DC_JSON_LOGS` | `true` in containers | JSON log lines |
//! | `DC_CONSOLE_OUTPUT` | `true` | Log to stdout |
//! | `DC_SERVICE_NAME` | `delegate-chain` | Service name |
//! | `DC_NETWORK` | `devnet` | Network name |

mod config;
mod logging;
pub mod metrics;

pub use config::TelemetryConfig;
pub use logging::init_logging;
pub use metrics::{
    encode_metrics, register_metrics, HistogramTimer, BLOCKS_ACCEPTED, BLOCKS_REJECTED,
    BLOCKS_REVERTED, CHAIN_HEIGHT, FORKS_DETECTED, NETWORK_HEIGHT, NETWORK_QUORUM,
    PEERS_ACCEPTED, PEERS_KNOWN, PEER_REJECTIONS, PEER_REQUEST_DURATION, PEER_SUSPENSIONS,
    SYNC_TRANSITIONS,
};

use thiserror::Error;

#[derive(Error, Debug)]
pub enum TelemetryError {
    #[error("Failed to initialize logging: {0}")]
    LoggingInit(String),

    #[error("Failed to initialize Prometheus metrics: {0}")]
    MetricsInit(String),

    #[error("Invalid configuration: {0}")]
    Config(String),
}

/// Register metrics, then install the log subscriber.
///
/// Hold the returned guard for the lifetime of the process.
pub fn init_telemetry(config: TelemetryConfig) -> Result<TelemetryGuard, TelemetryError> {
    register_metrics()?;
    init_logging(&config)?;
    Ok(TelemetryGuard {
        service_name: config.service_name,
    })
}

pub struct TelemetryGuard {
    service_name: String,
}

impl Drop for TelemetryGuard {
    fn drop(&mut self) {
        tracing::info!(service = %self.service_name, "telemetry shut down");
    }
}
