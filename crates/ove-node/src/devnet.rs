//! Multi-chain devnet runtime.
//!
//! Every configured chain gets its own [`OmniVotingEscrow`] over a
//! [`MemoryAsset`], behind `Arc<RwLock<_>>`, sharing one [`LocalRelay`].
//! [`Devnet::run`] produces a block on every chain each `block_time_secs`
//! and then delivers whatever the relay holds. A chain lock is never held
//! while another chain's lock is taken.

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use parking_lot::RwLock;
use tokio::sync::broadcast;
use tracing::{debug, info, warn};

use ove_core::asset::MemoryAsset;
use ove_core::constants::PT_SYNC;
use ove_core::error::{AssetError, OveError, SyncError};
use ove_core::traits::AssetLedger;
use ove_core::types::{Address, BlockContext, ChainId};
use ove_escrow::VotingEscrow;
use ove_sync::ReceiveOutcome;

use crate::config::{ChainConfig, NodeConfig};
use crate::omni::OmniVotingEscrow;
use crate::relay::{LocalRelay, RelayEndpoint};

/// The escrow type every devnet chain runs.
pub type DevnetEscrow = OmniVotingEscrow<MemoryAsset, RelayEndpoint>;

/// One simulated chain.
pub struct Chain {
    name: String,
    head: BlockContext,
    omni: DevnetEscrow,
}

impl Chain {
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Latest produced block; mutations execute in this block.
    pub fn head(&self) -> BlockContext {
        self.head
    }

    pub fn omni(&self) -> &DevnetEscrow {
        &self.omni
    }

    pub fn omni_mut(&mut self) -> &mut DevnetEscrow {
        &mut self.omni
    }

    /// Mint `amount` to `user` and let the escrow spend all of it.
    pub fn fund(&mut self, user: &Address, amount: u128) -> Result<(), AssetError> {
        let escrow = *self.omni.escrow().address();
        let asset = self.omni.escrow_mut().asset_mut();
        asset.mint(user, amount)?;
        asset.approve(user, &escrow, u128::MAX);
        Ok(())
    }

    fn produce_block(&mut self, block_time: u64) {
        self.head = self.head.advance(1, block_time);
    }
}

/// Result of delivering one relayed message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Delivery {
    pub src: ChainId,
    pub dst: ChainId,
    pub nonce: u64,
    pub outcome: Result<ReceiveOutcome, SyncError>,
}

pub struct Devnet {
    block_time: u64,
    relay: Arc<LocalRelay>,
    chains: BTreeMap<ChainId, Arc<RwLock<Chain>>>,
}

fn now_secs() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or(0)
}

fn build_chain(chain: &ChainConfig, relay: &Arc<LocalRelay>, genesis: &BlockContext) -> Chain {
    let id = chain.id();
    let address = Address::from_label(&format!("ove-escrow-{id}"));
    let escrow = VotingEscrow::new(address, MemoryAsset::new(), genesis)
        .with_metadata(&chain.token_name, &chain.token_symbol);
    let mut omni = OmniVotingEscrow::new(id, escrow, relay.endpoint(id));
    for peer in chain.trusted_peers.iter().copied().map(ChainId) {
        omni.set_trusted_remote(peer, true);
        if chain.min_dst_gas > 0 {
            omni.set_min_dst_gas(peer, PT_SYNC, chain.min_dst_gas);
        }
    }
    info!(chain = %id, name = %chain.name, escrow = %address, "chain initialized");
    Chain {
        name: chain.name.clone(),
        head: *genesis,
        omni,
    }
}

impl Devnet {
    /// Build every chain in `config` at a common genesis block.
    pub fn new(config: &NodeConfig) -> Result<Arc<Self>, OveError> {
        config.validate()?;
        let genesis = BlockContext::new(0, config.genesis_timestamp.unwrap_or_else(now_secs));
        let relay = LocalRelay::new(config.relay);
        let chains = config
            .chains
            .iter()
            .map(|c| (c.id(), Arc::new(RwLock::new(build_chain(c, &relay, &genesis)))))
            .collect();
        Ok(Arc::new(Self {
            block_time: config.block_time_secs,
            relay,
            chains,
        }))
    }

    pub fn block_time(&self) -> u64 {
        self.block_time
    }

    pub fn relay(&self) -> &Arc<LocalRelay> {
        &self.relay
    }

    pub fn chain_ids(&self) -> impl Iterator<Item = ChainId> + '_ {
        self.chains.keys().copied()
    }

    pub fn chain(&self, id: ChainId) -> Result<Arc<RwLock<Chain>>, OveError> {
        self.chains.get(&id).cloned().ok_or(OveError::UnknownChain(id))
    }

    /// Advance every chain by `n` blocks.
    pub fn produce_blocks(&self, n: u64) {
        for chain in self.chains.values() {
            let mut chain = chain.write();
            for _ in 0..n {
                chain.produce_block(self.block_time);
            }
        }
    }

    /// Deliver every queued message, confirming applied ones on their source.
    pub fn pump(&self) -> Vec<Delivery> {
        self.relay
            .drain()
            .into_iter()
            .map(|env| {
                let outcome = match self.chains.get(&env.dst) {
                    Some(dst) => dst.write().omni_mut().receive(env.src, &env.payload),
                    None => Err(SyncError::Transport(format!("no route to chain {}", env.dst))),
                };
                if let Ok(ReceiveOutcome::Applied(conf)) = &outcome {
                    if let Some(src) = self.chains.get(&env.src) {
                        src.write().omni_mut().confirm(env.dst, conf);
                    }
                }
                if let Err(e) = &outcome {
                    warn!(src = %env.src, dst = %env.dst, nonce = env.nonce, error = %e, "delivery failed");
                }
                Delivery {
                    src: env.src,
                    dst: env.dst,
                    nonce: env.nonce,
                    outcome,
                }
            })
            .collect()
    }

    /// One block on every chain, then relay delivery.
    pub fn tick(&self) -> Vec<Delivery> {
        self.produce_blocks(1);
        let deliveries = self.pump();
        if !deliveries.is_empty() {
            debug!(count = deliveries.len(), "relay deliveries");
        }
        deliveries
    }

    /// Log applied syncs as they are confirmed on each destination.
    fn spawn_confirmation_watchers(self: &Arc<Self>) {
        for (id, chain) in &self.chains {
            let id = *id;
            let mut rx = chain.read().omni().mirrors().subscribe();
            tokio::spawn(async move {
                loop {
                    match rx.recv().await {
                        Ok(conf) => info!(
                            chain = %id,
                            src = %conf.src,
                            epoch = conf.epoch,
                            user_epoch = conf.user_epoch,
                            "mirror updated"
                        ),
                        Err(broadcast::error::RecvError::Lagged(n)) => {
                            warn!(chain = %id, skipped = n, "lagged behind on confirmations");
                        }
                        Err(broadcast::error::RecvError::Closed) => break,
                    }
                }
            });
        }
    }

    /// Produce blocks and deliver messages forever.
    pub async fn run(self: &Arc<Self>) {
        self.spawn_confirmation_watchers();
        let mut interval = tokio::time::interval(Duration::from_secs(self.block_time));
        interval.tick().await;
        info!(block_time = self.block_time, chains = self.chains.len(), "devnet running");
        loop {
            interval.tick().await;
            self.tick();
        }
    }
}
