//! OmniVE devnet node binary.
//!
//! Runs every configured chain in one process, each with its own voting
//! escrow and JSON-RPC server, connected by an in-process message relay.

use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Parser;
use ove_node_lib::{start_rpc_server, Devnet, NodeConfig};
use tracing::info;

/// OmniVE devnet: voting escrow replicated across simulated chains.
#[derive(Parser, Debug)]
#[command(
    name = "ove-node",
    version,
    about = "Multi-chain OmniVE devnet with JSON-RPC per chain"
)]
struct Args {
    /// Config file (TOML); defaults to the user config directory
    #[arg(long)]
    config: Option<PathBuf>,

    /// RPC server bind address
    #[arg(long)]
    rpc_bind: Option<String>,

    /// Seconds between blocks
    #[arg(long)]
    block_time: Option<u64>,

    /// Genesis timestamp (Unix seconds); defaults to now
    #[arg(long)]
    genesis_timestamp: Option<u64>,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long)]
    log_level: Option<String>,

    /// Log output format ("text" or "json")
    #[arg(long, default_value = "text")]
    log_format: String,
}

impl Args {
    /// Load the layered config and apply CLI overrides on top.
    fn into_config(self) -> Result<(NodeConfig, String)> {
        let path = self.config.unwrap_or_else(NodeConfig::default_path);
        let mut config = NodeConfig::load(Some(&path))
            .with_context(|| format!("loading config from {}", path.display()))?;

        if let Some(bind) = self.rpc_bind {
            config.rpc_bind = bind;
        }
        if let Some(secs) = self.block_time {
            config.block_time_secs = secs;
        }
        if self.genesis_timestamp.is_some() {
            config.genesis_timestamp = self.genesis_timestamp;
        }
        if let Some(level) = self.log_level {
            config.log_level = level;
        }
        config.validate().context("invalid configuration")?;

        Ok((config, self.log_format))
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let (config, log_format) = Args::parse().into_config()?;
    init_logging(&config.log_level, &log_format);

    info!("OmniVE devnet v{}", env!("CARGO_PKG_VERSION"));
    info!(
        block_time = config.block_time_secs,
        base_fee = config.relay.base_fee,
        fee_per_byte = config.relay.fee_per_byte,
        gas_price = config.relay.gas_price,
        "relay configured"
    );

    let devnet = Devnet::new(&config).context("building devnet")?;

    let mut handles = Vec::with_capacity(config.chains.len());
    for chain in &config.chains {
        let addr = config.rpc_addr(chain);
        let (bound, handle) = start_rpc_server(&addr, &devnet, chain.id())
            .await
            .with_context(|| format!("starting RPC server for chain {}", chain.chain_id))?;
        info!(chain = chain.chain_id, name = %chain.name, %bound, "RPC server listening");
        handles.push(handle);
    }

    info!("devnet running (Ctrl+C to stop)");

    tokio::select! {
        _ = devnet.run() => {
            info!("devnet loop exited");
        }
        res = tokio::signal::ctrl_c() => {
            res.context("installing Ctrl+C handler")?;
            info!("received Ctrl+C, shutting down...");
        }
    }

    for handle in handles {
        handle.stop().ok();
    }
    info!("RPC servers stopped");
    info!("OmniVE devnet shutdown complete");
    Ok(())
}

/// Initialize tracing subscriber with the given log level and output format.
///
/// Pass `format = "json"` for structured JSON output. Any other value
/// defaults to human-readable text.
fn init_logging(level_str: &str, format: &str) {
    use tracing_subscriber::filter::EnvFilter;
    use tracing_subscriber::fmt;
    use tracing_subscriber::prelude::*;

    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(level_str));

    if format == "json" {
        tracing_subscriber::registry()
            .with(filter)
            .with(fmt::layer().json())
            .init();
    } else {
        tracing_subscriber::registry()
            .with(filter)
            .with(fmt::layer().with_target(true).with_level(true))
            .init();
    }
}
