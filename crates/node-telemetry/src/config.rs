//! Telemetry configuration from environment variables.

use std::env;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TelemetryConfig {
    /// Reported in the startup log line.
    pub service_name: String,

    /// `EnvFilter` directive, e.g. `info` or `dc_01_peer_network=debug,info`.
    pub log_level: String,

    /// Write logs to stdout at all.
    pub console_output: bool,

    /// One JSON object per line instead of the human-readable format.
    pub json_logs: bool,

    /// Network name (mainnet, testnet, devnet).
    pub network: String,
}

impl Default for TelemetryConfig {
    fn default() -> Self {
        Self {
            service_name: "delegate-chain".to_string(),
            log_level: "info".to_string(),
            console_output: true,
            json_logs: false,
            network: "devnet".to_string(),
        }
    }
}

impl TelemetryConfig {
    /// Create configuration from environment variables.
    ///
    /// - `DC_SERVICE_NAME`: service name (default: delegate-chain)
    /// - `DC_LOG_LEVEL` or `RUST_LOG`: filter directive (default: info)
    /// - `DC_CONSOLE_OUTPUT`: enable stdout logs (default: true)
    /// - `DC_JSON_LOGS`: JSON logs (default: true in containers)
    /// - `DC_NETWORK`: network name (default: devnet)
    pub fn from_env() -> Self {
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Same as [`from_env`](Self::from_env) over any key lookup.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let defaults = Self::default();
        let is_container =
            lookup("KUBERNETES_SERVICE_HOST").is_some() || lookup("DOCKER_CONTAINER").is_some();

        Self {
            service_name: lookup("DC_SERVICE_NAME").unwrap_or(defaults.service_name),
            log_level: lookup("DC_LOG_LEVEL")
                .or_else(|| lookup("RUST_LOG"))
                .unwrap_or(defaults.log_level),
            console_output: lookup("DC_CONSOLE_OUTPUT")
                .map(|v| v.to_lowercase() != "false" && v != "0")
                .unwrap_or(defaults.console_output),
            json_logs: lookup("DC_JSON_LOGS")
                .map(|v| v.to_lowercase() == "true" || v == "1")
                .unwrap_or(is_container),
            network: lookup("DC_NETWORK").unwrap_or(defaults.network),
        }
    }
}
