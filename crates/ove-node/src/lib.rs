//! # ove-node
//! Devnet composition, relay, and RPC for OmniVE.
//!
//! Composes the ledger and sync crates into a runnable multi-chain devnet:
//! - [`omni::OmniVotingEscrow`]: one chain's escrow plus its sync coordinator and mirrors
//! - [`relay::LocalRelay`]: in-process message transport between chains
//! - [`devnet::Devnet`]: block production and relay delivery loop
//! - [`rpc`]: JSON-RPC server for one chain
//! - [`config::NodeConfig`]: devnet configuration

pub mod config;
pub mod devnet;
pub mod omni;
pub mod relay;
pub mod rpc;

pub use config::NodeConfig;
pub use devnet::Devnet;
pub use omni::OmniVotingEscrow;
pub use relay::{LocalRelay, RelayEndpoint};
pub use rpc::start_rpc_server;
