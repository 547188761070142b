//! # Delegate-Chain Node
//!
//! ```text
//! dc-node [--config <path>]
//! ```
//!
//! The config path may also come from `DC_CONFIG`. Logging is configured
//! through `DC_LOG_LEVEL` / `RUST_LOG` and `DC_JSON_LOGS`.

use std::path::PathBuf;

use anyhow::{bail, Context, Result};
use node_runtime::{NodeConfig, NodeRuntime};
use node_telemetry::{init_telemetry, TelemetryConfig};
use tracing::info;

fn config_path() -> Result<Option<PathBuf>> {
    let mut args = std::env::args().skip(1);
    while let Some(arg) = args.next() {
        match arg.as_str() {
            "--config" | "-c" => match args.next() {
                Some(path) => return Ok(Some(PathBuf::from(path))),
                None => bail!("--config needs a path"),
            },
            other => bail!("unknown argument {other:?}"),
        }
    }
    Ok(std::env::var_os("DC_CONFIG").map(PathBuf::from))
}

#[tokio::main]
async fn main() -> Result<()> {
    let _telemetry = init_telemetry(TelemetryConfig::from_env())?;

    let path = config_path()?;
    let config = NodeConfig::load(path.as_deref())
        .with_context(|| format!("cannot load configuration from {path:?}"))?;

    let mut runtime = NodeRuntime::new(config)?;
    runtime.start().await?;

    info!("[node] running, press Ctrl+C to stop");
    tokio::signal::ctrl_c().await?;

    runtime.shutdown().await;
    Ok(())
}
