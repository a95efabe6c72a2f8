//! Devnet configuration.
//!
//! [`NodeConfig`] describes every chain in the devnet, the relay fee
//! schedule, block time, and logging. Values come from, in increasing
//! priority: built-in defaults, an optional TOML file, `OVE_`-prefixed
//! environment variables (`__` separates nested keys, e.g.
//! `OVE_RELAY__BASE_FEE=5000`), and finally CLI flags applied by the binary.

use std::collections::HashSet;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use ove_core::constants::{DEFAULT_BLOCK_TIME_SECS, DEFAULT_RPC_PORT};
use ove_core::error::OveError;
use ove_core::types::ChainId;

/// Environment variable prefix for overrides.
pub const ENV_PREFIX: &str = "OVE";

/// One simulated chain.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChainConfig {
    /// Transport-level chain identifier.
    pub chain_id: u16,
    /// Human-readable name used in logs.
    pub name: String,
    /// Port of this chain's JSON-RPC server.
    pub rpc_port: u16,
    /// Chains whose sync messages this chain accepts.
    #[serde(default)]
    pub trusted_peers: Vec<u16>,
    /// Minimum gas for sync messages to each trusted peer (0 leaves it unset).
    #[serde(default)]
    pub min_dst_gas: u64,
    /// Name of the escrowed voting token.
    #[serde(default = "default_token_name")]
    pub token_name: String,
    #[serde(default = "default_token_symbol")]
    pub token_symbol: String,
}

fn default_token_name() -> String {
    "Vote-escrowed OVE".to_string()
}

fn default_token_symbol() -> String {
    "veOVE".to_string()
}

impl ChainConfig {
    pub fn id(&self) -> ChainId {
        ChainId(self.chain_id)
    }
}

/// Fee schedule of the in-process relay, in native units.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RelayConfig {
    pub base_fee: u64,
    pub fee_per_byte: u64,
    pub gas_price: u64,
}

impl Default for RelayConfig {
    fn default() -> Self {
        Self {
            base_fee: 10_000,
            fee_per_byte: 16,
            gas_price: 1,
        }
    }
}

/// Configuration for a devnet instance.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct NodeConfig {
    /// IP address the RPC servers bind to.
    pub rpc_bind: String,
    /// Seconds between blocks on every chain.
    pub block_time_secs: u64,
    /// Genesis timestamp; `None` uses the wall clock at startup.
    pub genesis_timestamp: Option<u64>,
    pub relay: RelayConfig,
    pub chains: Vec<ChainConfig>,
    /// Log level filter string (e.g. "info", "ove_sync=debug").
    pub log_level: String,
}

impl Default for NodeConfig {
    fn default() -> Self {
        Self {
            rpc_bind: "127.0.0.1".to_string(),
            block_time_secs: DEFAULT_BLOCK_TIME_SECS,
            genesis_timestamp: None,
            relay: RelayConfig::default(),
            chains: vec![
                ChainConfig {
                    chain_id: 101,
                    name: "source".to_string(),
                    rpc_port: DEFAULT_RPC_PORT,
                    trusted_peers: vec![102],
                    min_dst_gas: 21_000,
                    token_name: default_token_name(),
                    token_symbol: default_token_symbol(),
                },
                ChainConfig {
                    chain_id: 102,
                    name: "destination".to_string(),
                    rpc_port: DEFAULT_RPC_PORT + 1,
                    trusted_peers: vec![101],
                    min_dst_gas: 21_000,
                    token_name: default_token_name(),
                    token_symbol: default_token_symbol(),
                },
            ],
            log_level: "info".to_string(),
        }
    }
}

impl NodeConfig {
    /// Default config file location (`<config dir>/ove/devnet.toml`).
    pub fn default_path() -> PathBuf {
        dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("ove")
            .join("devnet.toml")
    }

    /// Load from `path` (if it exists) layered under environment overrides.
    pub fn load(path: Option<&Path>) -> Result<Self, OveError> {
        let mut builder = config::Config::builder();
        if let Some(path) = path {
            builder = builder.add_source(config::File::from(path).required(false));
        }
        let cfg: Self = builder
            .add_source(
                config::Environment::with_prefix(ENV_PREFIX)
                    .prefix_separator("_")
                    .separator("__"),
            )
            .build()
            .and_then(|c| c.try_deserialize())
            .map_err(|e| OveError::Config(e.to_string()))?;
        cfg.validate()?;
        Ok(cfg)
    }

    /// Reject configurations the devnet cannot run.
    pub fn validate(&self) -> Result<(), OveError> {
        if self.chains.is_empty() {
            return Err(OveError::Config("at least one chain is required".into()));
        }
        if self.block_time_secs == 0 {
            return Err(OveError::Config("block_time_secs must be positive".into()));
        }
        let mut ids = HashSet::new();
        let mut ports = HashSet::new();
        for chain in &self.chains {
            if !ids.insert(chain.chain_id) {
                return Err(OveError::Config(format!("duplicate chain id {}", chain.chain_id)));
            }
            if !ports.insert(chain.rpc_port) {
                return Err(OveError::Config(format!("duplicate rpc port {}", chain.rpc_port)));
            }
        }
        for chain in &self.chains {
            if let Some(peer) = chain.trusted_peers.iter().find(|p| !ids.contains(*p)) {
                return Err(OveError::Config(format!(
                    "chain {} trusts unknown chain {peer}",
                    chain.chain_id
                )));
            }
        }
        Ok(())
    }

    pub fn chain(&self, id: ChainId) -> Option<&ChainConfig> {
        self.chains.iter().find(|c| c.id() == id)
    }

    /// Socket address string for `chain`'s RPC server.
    pub fn rpc_addr(&self, chain: &ChainConfig) -> String {
        format!("{}:{}", self.rpc_bind, chain.rpc_port)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn default_is_two_trusting_chains() {
        let cfg = NodeConfig::default();
        cfg.validate().unwrap();
        assert_eq!(cfg.chains.len(), 2);
        assert_eq!(cfg.chains[0].trusted_peers, vec![102]);
        assert_eq!(cfg.chains[1].trusted_peers, vec![101]);
        assert_eq!(cfg.block_time_secs, DEFAULT_BLOCK_TIME_SECS);
    }

    #[test]
    fn rpc_addr_format() {
        let cfg = NodeConfig::default();
        assert_eq!(cfg.rpc_addr(&cfg.chains[0]), format!("127.0.0.1:{DEFAULT_RPC_PORT}"));
    }

    #[test]
    fn default_path_ends_with_devnet_toml() {
        assert!(NodeConfig::default_path().ends_with("ove/devnet.toml"));
    }

    #[test]
    fn lookup_by_chain_id() {
        let cfg = NodeConfig::default();
        assert_eq!(cfg.chain(ChainId(102)).unwrap().name, "destination");
        assert!(cfg.chain(ChainId(7)).is_none());
    }

    #[test]
    fn duplicate_ids_rejected() {
        let mut cfg = NodeConfig::default();
        cfg.chains[1].chain_id = 101;
        assert!(matches!(cfg.validate(), Err(OveError::Config(_))));
    }

    #[test]
    fn unknown_trusted_peer_rejected() {
        let mut cfg = NodeConfig::default();
        cfg.chains[0].trusted_peers.push(999);
        let err = cfg.validate().unwrap_err();
        assert!(err.to_string().contains("999"));
    }

    #[test]
    fn missing_file_falls_back_to_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let cfg = NodeConfig::load(Some(&dir.path().join("absent.toml"))).unwrap();
        assert_eq!(cfg.chains, NodeConfig::default().chains);
    }

    #[test]
    fn toml_file_overrides_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("devnet.toml");
        let mut f = std::fs::File::create(&path).unwrap();
        writeln!(
            f,
            r#"
block_time_secs = 2
log_level = "debug"

[relay]
base_fee = 1

[[chains]]
chain_id = 1
name = "a"
rpc_port = 30001
trusted_peers = [2]
min_dst_gas = 50000
token_name = "Voting-escrowed Mock"
token_symbol = "veMOCK"

[[chains]]
chain_id = 2
name = "b"
rpc_port = 30002
"#
        )
        .unwrap();

        let cfg = NodeConfig::load(Some(&path)).unwrap();
        assert_eq!(cfg.block_time_secs, 2);
        assert_eq!(cfg.log_level, "debug");
        assert_eq!(cfg.relay.base_fee, 1);
        assert_eq!(cfg.relay.fee_per_byte, RelayConfig::default().fee_per_byte);
        assert_eq!(cfg.chains.len(), 2);
        assert_eq!(cfg.chains[0].min_dst_gas, 50_000);
        assert_eq!(cfg.chains[0].token_symbol, "veMOCK");
        assert_eq!(cfg.chains[1].token_name, "Vote-escrowed OVE");
        assert!(cfg.chains[1].trusted_peers.is_empty());
        assert_eq!(cfg.rpc_bind, "127.0.0.1");
    }

    #[test]
    fn invalid_file_reports_config_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("devnet.toml");
        std::fs::write(&path, "block_time_secs = 0\n").unwrap();
        assert!(matches!(NodeConfig::load(Some(&path)), Err(OveError::Config(_))));
    }
}
