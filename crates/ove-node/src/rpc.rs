//! JSON-RPC server for one devnet chain.
//!
//! Uses jsonrpsee 0.24 to expose the escrow's query and mutating surface
//! as `ove_*` methods. Asset amounts and voting power are `u128` and go
//! over the wire as decimal strings; addresses are `0x`-prefixed hex.
//! Mutations execute in the chain's current head block.

use std::net::SocketAddr;
use std::sync::Arc;

use jsonrpsee::core::async_trait;
use jsonrpsee::proc_macros::rpc;
use jsonrpsee::server::{Server, ServerHandle};
use jsonrpsee::types::ErrorObjectOwned;
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};

use ove_core::error::{OveError, QueryError};
use ove_core::traits::AssetLedger;
use ove_core::types::{Address, ChainId, LockedBalance};
use ove_decay::{LedgerView, Point};
use ove_sync::{Mirror, SyncReceipt};

use crate::devnet::{Chain, Devnet};

/// JSON representation of a decay point.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PointJson {
    pub bias: String,
    pub slope: String,
    pub timestamp: u64,
    pub block: u64,
}

impl From<Point> for PointJson {
    fn from(p: Point) -> Self {
        Self {
            bias: p.bias.to_string(),
            slope: p.slope.to_string(),
            timestamp: p.timestamp,
            block: p.block,
        }
    }
}

/// JSON representation of a lock.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LockJson {
    pub amount: String,
    pub unlock_time: u64,
}

impl From<LockedBalance> for LockJson {
    fn from(l: LockedBalance) -> Self {
        Self {
            amount: l.amount.to_string(),
            unlock_time: l.unlock_time,
        }
    }
}

/// General chain info.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChainInfoJson {
    pub chain_id: u16,
    pub name: String,
    pub block_number: u64,
    pub timestamp: u64,
    /// Escrow contract address.
    pub escrow: String,
    pub token_name: String,
    pub token_symbol: String,
    pub decimals: u8,
    pub epoch: u64,
    pub locked_supply: String,
    /// Chains with a mirror on this chain.
    pub mirrored_sources: Vec<u16>,
}

/// Source-side sync progress toward one destination.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SyncStatusJson {
    pub dst: u16,
    pub epoch_synced: u64,
    pub epoch_confirmed: u64,
    pub user_point_epoch_synced: Option<u64>,
    pub user_point_epoch_confirmed: Option<u64>,
}

/// Result of a dispatched sync.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SyncReceiptJson {
    pub dst: u16,
    pub epoch: u64,
    pub user: Option<String>,
    pub user_epoch: Option<u64>,
    pub message_id: String,
    pub nonce: u64,
    pub fee: String,
    pub refunded: String,
}

impl From<SyncReceipt> for SyncReceiptJson {
    fn from(r: SyncReceipt) -> Self {
        Self {
            dst: r.dst.0,
            epoch: r.epoch,
            user: r.user.map(|(u, _)| u.to_string()),
            user_epoch: r.user.map(|(_, e)| e),
            message_id: hex::encode(r.message_id),
            nonce: r.nonce,
            fee: r.fee.to_string(),
            refunded: r.refunded.to_string(),
        }
    }
}

/// Parse a 0x-prefixed or bare 40-hex-digit address.
fn parse_address(s: &str) -> Result<Address, ErrorObjectOwned> {
    s.parse()
        .map_err(|e| rpc_error(-5, &format!("invalid address: {e}")))
}

/// Parse a decimal u128 amount.
fn parse_amount(s: &str) -> Result<u128, ErrorObjectOwned> {
    s.parse()
        .map_err(|_| rpc_error(-22, &format!("invalid amount: {s}")))
}

fn parse_user(user: Option<String>) -> Result<Option<Address>, ErrorObjectOwned> {
    user.as_deref().map(parse_address).transpose()
}

fn rpc_error(code: i32, msg: &str) -> ErrorObjectOwned {
    ErrorObjectOwned::owned(code, msg.to_string(), None::<()>)
}

fn query_error(e: QueryError) -> ErrorObjectOwned {
    rpc_error(-8, &e.to_string())
}

fn rejected(e: impl std::fmt::Display) -> ErrorObjectOwned {
    rpc_error(-25, &e.to_string())
}

fn mirror_of(chain: &Chain, src: u16) -> Result<&Mirror, ErrorObjectOwned> {
    chain
        .omni()
        .mirror(ChainId(src))
        .ok_or_else(|| rpc_error(-5, &format!("no mirror of chain {src}")))
}

/// The OmniVE JSON-RPC interface.
#[rpc(server)]
pub trait OveRpc {
    /// Returns the chain id, head, and ledger summary.
    #[method(name = "ove_chainInfo")]
    async fn chain_info(&self) -> Result<ChainInfoJson, ErrorObjectOwned>;

    /// Returns the latest global epoch.
    #[method(name = "ove_epoch")]
    async fn epoch(&self) -> Result<u64, ErrorObjectOwned>;

    #[method(name = "ove_userPointEpoch")]
    async fn user_point_epoch(&self, user: String) -> Result<u64, ErrorObjectOwned>;

    #[method(name = "ove_pointHistory")]
    async fn point_history(&self, epoch: u64) -> Result<PointJson, ErrorObjectOwned>;

    #[method(name = "ove_userPointHistory")]
    async fn user_point_history(&self, user: String, epoch: u64) -> Result<PointJson, ErrorObjectOwned>;

    /// Voting power of `user` at `timestamp` (defaults to the head).
    #[method(name = "ove_balanceOf")]
    async fn balance_of(&self, user: String, timestamp: Option<u64>) -> Result<String, ErrorObjectOwned>;

    /// Total voting power at `timestamp` (defaults to the head).
    #[method(name = "ove_totalSupply")]
    async fn total_supply(&self, timestamp: Option<u64>) -> Result<String, ErrorObjectOwned>;

    #[method(name = "ove_balanceOfAt")]
    async fn balance_of_at(&self, user: String, block: u64) -> Result<String, ErrorObjectOwned>;

    #[method(name = "ove_totalSupplyAt")]
    async fn total_supply_at(&self, block: u64) -> Result<String, ErrorObjectOwned>;

    #[method(name = "ove_locked")]
    async fn locked(&self, user: String) -> Result<LockJson, ErrorObjectOwned>;

    #[method(name = "ove_lockedSupply")]
    async fn locked_supply(&self) -> Result<String, ErrorObjectOwned>;

    /// Asset balance of `user` (not voting power).
    #[method(name = "ove_assetBalance")]
    async fn asset_balance(&self, user: String) -> Result<String, ErrorObjectOwned>;

    /// Sync progress toward `dst`, optionally for one user.
    ///
    /// `*_synced` counts what was sent; `*_confirmed` is what `dst` applied.
    #[method(name = "ove_syncStatus")]
    async fn sync_status(&self, dst: u16, user: Option<String>) -> Result<SyncStatusJson, ErrorObjectOwned>;

    #[method(name = "ove_mirrorEpoch")]
    async fn mirror_epoch(&self, src: u16) -> Result<u64, ErrorObjectOwned>;

    #[method(name = "ove_mirrorLocked")]
    async fn mirror_locked(&self, src: u16, user: String) -> Result<LockJson, ErrorObjectOwned>;

    #[method(name = "ove_mirrorBalanceOf")]
    async fn mirror_balance_of(
        &self,
        src: u16,
        user: String,
        timestamp: Option<u64>,
    ) -> Result<String, ErrorObjectOwned>;

    #[method(name = "ove_mirrorTotalSupply")]
    async fn mirror_total_supply(&self, src: u16, timestamp: Option<u64>) -> Result<String, ErrorObjectOwned>;

    /// Historical mirror query; `block` is a source-chain block.
    #[method(name = "ove_mirrorBalanceOfAt")]
    async fn mirror_balance_of_at(&self, src: u16, user: String, block: u64) -> Result<String, ErrorObjectOwned>;

    #[method(name = "ove_mirrorTotalSupplyAt")]
    async fn mirror_total_supply_at(&self, src: u16, block: u64) -> Result<String, ErrorObjectOwned>;

    /// Devnet faucet: mint `amount` to `user` and approve the escrow.
    #[method(name = "ove_fund")]
    async fn fund(&self, user: String, amount: String) -> Result<String, ErrorObjectOwned>;

    #[method(name = "ove_createLockFor")]
    async fn create_lock_for(
        &self,
        payer: String,
        beneficiary: String,
        amount: String,
        unlock_time: u64,
    ) -> Result<LockJson, ErrorObjectOwned>;

    #[method(name = "ove_increaseAmount")]
    async fn increase_amount(&self, owner: String, extra: String) -> Result<LockJson, ErrorObjectOwned>;

    #[method(name = "ove_increaseAmountFor")]
    async fn increase_amount_for(
        &self,
        payer: String,
        owner: String,
        extra: String,
    ) -> Result<LockJson, ErrorObjectOwned>;

    #[method(name = "ove_increaseUnlockTime")]
    async fn increase_unlock_time(&self, owner: String, unlock_time: u64) -> Result<LockJson, ErrorObjectOwned>;

    /// Withdraw an expired lock; returns the amount released.
    #[method(name = "ove_withdraw")]
    async fn withdraw(&self, owner: String) -> Result<String, ErrorObjectOwned>;

    #[method(name = "ove_estimateFee")]
    async fn estimate_fee(&self, dst: u16, user: Option<String>, gas_limit: u64) -> Result<String, ErrorObjectOwned>;

    /// Push the current ledger state (and `user`'s) to `dst`.
    #[method(name = "ove_sync")]
    async fn sync(
        &self,
        dst: u16,
        refund_address: String,
        user: Option<String>,
        gas_limit: u64,
        paid: String,
    ) -> Result<SyncReceiptJson, ErrorObjectOwned>;

    #[method(name = "ove_setMinDstGas")]
    async fn set_min_dst_gas(&self, dst: u16, packet_type: u16, gas: u64) -> Result<bool, ErrorObjectOwned>;

    #[method(name = "ove_setTrustedRemote")]
    async fn set_trusted_remote(&self, src: u16, trusted: bool) -> Result<bool, ErrorObjectOwned>;
}

/// Implementation of the OmniVE JSON-RPC server for one chain.
pub struct RpcServerImpl {
    chain: Arc<RwLock<Chain>>,
}

impl RpcServerImpl {
    pub fn new(devnet: &Devnet, chain_id: ChainId) -> Result<Self, OveError> {
        Ok(Self {
            chain: devnet.chain(chain_id)?,
        })
    }
}

#[async_trait]
impl OveRpcServer for RpcServerImpl {
    async fn chain_info(&self) -> Result<ChainInfoJson, ErrorObjectOwned> {
        let chain = self.chain.read();
        let head = chain.head();
        let escrow = chain.omni().escrow();
        let mut mirrored_sources: Vec<u16> = chain.omni().mirrors().sources().map(|c| c.0).collect();
        mirrored_sources.sort_unstable();
        Ok(ChainInfoJson {
            chain_id: chain.omni().chain_id().0,
            name: chain.name().to_string(),
            block_number: head.number,
            timestamp: head.timestamp,
            escrow: escrow.address().to_string(),
            token_name: escrow.name().to_string(),
            token_symbol: escrow.symbol().to_string(),
            decimals: escrow.decimals(),
            epoch: escrow.epoch(),
            locked_supply: escrow.locked_supply().to_string(),
            mirrored_sources,
        })
    }

    async fn epoch(&self) -> Result<u64, ErrorObjectOwned> {
        Ok(self.chain.read().omni().escrow().epoch())
    }

    async fn user_point_epoch(&self, user: String) -> Result<u64, ErrorObjectOwned> {
        let user = parse_address(&user)?;
        Ok(self.chain.read().omni().escrow().user_point_epoch(&user))
    }

    async fn point_history(&self, epoch: u64) -> Result<PointJson, ErrorObjectOwned> {
        Ok(self.chain.read().omni().escrow().point_history(epoch).into())
    }

    async fn user_point_history(&self, user: String, epoch: u64) -> Result<PointJson, ErrorObjectOwned> {
        let user = parse_address(&user)?;
        Ok(self.chain.read().omni().escrow().user_point_history(&user, epoch).into())
    }

    async fn balance_of(&self, user: String, timestamp: Option<u64>) -> Result<String, ErrorObjectOwned> {
        let user = parse_address(&user)?;
        let chain = self.chain.read();
        let t = timestamp.unwrap_or(chain.head().timestamp);
        Ok(chain.omni().escrow().balance_of(&user, t).to_string())
    }

    async fn total_supply(&self, timestamp: Option<u64>) -> Result<String, ErrorObjectOwned> {
        let chain = self.chain.read();
        let t = timestamp.unwrap_or(chain.head().timestamp);
        Ok(chain.omni().escrow().total_supply(t).to_string())
    }

    async fn balance_of_at(&self, user: String, block: u64) -> Result<String, ErrorObjectOwned> {
        let user = parse_address(&user)?;
        let chain = self.chain.read();
        chain
            .omni()
            .escrow()
            .balance_of_at(&user, block, &chain.head())
            .map(|v| v.to_string())
            .map_err(query_error)
    }

    async fn total_supply_at(&self, block: u64) -> Result<String, ErrorObjectOwned> {
        let chain = self.chain.read();
        chain
            .omni()
            .escrow()
            .total_supply_at(block, &chain.head())
            .map(|v| v.to_string())
            .map_err(query_error)
    }

    async fn locked(&self, user: String) -> Result<LockJson, ErrorObjectOwned> {
        let user = parse_address(&user)?;
        Ok(self.chain.read().omni().escrow().locked(&user).into())
    }

    async fn locked_supply(&self) -> Result<String, ErrorObjectOwned> {
        Ok(self.chain.read().omni().escrow().locked_supply().to_string())
    }

    async fn asset_balance(&self, user: String) -> Result<String, ErrorObjectOwned> {
        let user = parse_address(&user)?;
        Ok(self.chain.read().omni().escrow().asset().balance_of(&user).to_string())
    }

    async fn sync_status(&self, dst: u16, user: Option<String>) -> Result<SyncStatusJson, ErrorObjectOwned> {
        let user = parse_user(user)?;
        let dst = ChainId(dst);
        let chain = self.chain.read();
        let coordinator = chain.omni().coordinator();
        Ok(SyncStatusJson {
            dst: dst.0,
            epoch_synced: coordinator.epoch_synced(dst),
            epoch_confirmed: coordinator.epoch_confirmed(dst),
            user_point_epoch_synced: user.map(|u| coordinator.user_point_epoch_synced(dst, &u)),
            user_point_epoch_confirmed: user.map(|u| coordinator.user_point_epoch_confirmed(dst, &u)),
        })
    }

    async fn mirror_epoch(&self, src: u16) -> Result<u64, ErrorObjectOwned> {
        let chain = self.chain.read();
        Ok(mirror_of(&chain, src)?.epoch())
    }

    async fn mirror_locked(&self, src: u16, user: String) -> Result<LockJson, ErrorObjectOwned> {
        let user = parse_address(&user)?;
        let chain = self.chain.read();
        Ok(mirror_of(&chain, src)?.locked(&user).into())
    }

    async fn mirror_balance_of(
        &self,
        src: u16,
        user: String,
        timestamp: Option<u64>,
    ) -> Result<String, ErrorObjectOwned> {
        let user = parse_address(&user)?;
        let chain = self.chain.read();
        let t = timestamp.unwrap_or(chain.head().timestamp);
        Ok(mirror_of(&chain, src)?.balance_of(&user, t).to_string())
    }

    async fn mirror_total_supply(&self, src: u16, timestamp: Option<u64>) -> Result<String, ErrorObjectOwned> {
        let chain = self.chain.read();
        let t = timestamp.unwrap_or(chain.head().timestamp);
        Ok(mirror_of(&chain, src)?.total_supply(t).to_string())
    }

    async fn mirror_balance_of_at(&self, src: u16, user: String, block: u64) -> Result<String, ErrorObjectOwned> {
        let user = parse_address(&user)?;
        let chain = self.chain.read();
        let mirror = mirror_of(&chain, src)?;
        mirror
            .balance_of_at(&user, block, &mirror.source_head())
            .map(|v| v.to_string())
            .map_err(query_error)
    }

    async fn mirror_total_supply_at(&self, src: u16, block: u64) -> Result<String, ErrorObjectOwned> {
        let chain = self.chain.read();
        let mirror = mirror_of(&chain, src)?;
        mirror
            .total_supply_at(block, &mirror.source_head())
            .map(|v| v.to_string())
            .map_err(query_error)
    }

    async fn fund(&self, user: String, amount: String) -> Result<String, ErrorObjectOwned> {
        let user = parse_address(&user)?;
        let amount = parse_amount(&amount)?;
        let mut chain = self.chain.write();
        chain.fund(&user, amount).map_err(rejected)?;
        Ok(chain.omni().escrow().asset().balance_of(&user).to_string())
    }

    async fn create_lock_for(
        &self,
        payer: String,
        beneficiary: String,
        amount: String,
        unlock_time: u64,
    ) -> Result<LockJson, ErrorObjectOwned> {
        let payer = parse_address(&payer)?;
        let beneficiary = parse_address(&beneficiary)?;
        let amount = parse_amount(&amount)?;
        let mut chain = self.chain.write();
        let head = chain.head();
        chain
            .omni_mut()
            .create_lock_for(&payer, &beneficiary, amount, unlock_time, &head)
            .map(LockJson::from)
            .map_err(rejected)
    }

    async fn increase_amount(&self, owner: String, extra: String) -> Result<LockJson, ErrorObjectOwned> {
        let owner = parse_address(&owner)?;
        let extra = parse_amount(&extra)?;
        let mut chain = self.chain.write();
        let head = chain.head();
        chain
            .omni_mut()
            .increase_amount(&owner, extra, &head)
            .map(LockJson::from)
            .map_err(rejected)
    }

    async fn increase_amount_for(
        &self,
        payer: String,
        owner: String,
        extra: String,
    ) -> Result<LockJson, ErrorObjectOwned> {
        let payer = parse_address(&payer)?;
        let owner = parse_address(&owner)?;
        let extra = parse_amount(&extra)?;
        let mut chain = self.chain.write();
        let head = chain.head();
        chain
            .omni_mut()
            .increase_amount_for(&payer, &owner, extra, &head)
            .map(LockJson::from)
            .map_err(rejected)
    }

    async fn increase_unlock_time(&self, owner: String, unlock_time: u64) -> Result<LockJson, ErrorObjectOwned> {
        let owner = parse_address(&owner)?;
        let mut chain = self.chain.write();
        let head = chain.head();
        chain
            .omni_mut()
            .increase_unlock_time(&owner, unlock_time, &head)
            .map(LockJson::from)
            .map_err(rejected)
    }

    async fn withdraw(&self, owner: String) -> Result<String, ErrorObjectOwned> {
        let owner = parse_address(&owner)?;
        let mut chain = self.chain.write();
        let head = chain.head();
        chain
            .omni_mut()
            .withdraw(&owner, &head)
            .map(|v| v.to_string())
            .map_err(rejected)
    }

    async fn estimate_fee(&self, dst: u16, user: Option<String>, gas_limit: u64) -> Result<String, ErrorObjectOwned> {
        let user = parse_user(user)?;
        let chain = self.chain.read();
        chain
            .omni()
            .estimate_fee(ChainId(dst), user.as_ref(), gas_limit, &chain.head())
            .map(|v| v.to_string())
            .map_err(rejected)
    }

    async fn sync(
        &self,
        dst: u16,
        refund_address: String,
        user: Option<String>,
        gas_limit: u64,
        paid: String,
    ) -> Result<SyncReceiptJson, ErrorObjectOwned> {
        let refund_address = parse_address(&refund_address)?;
        let user = parse_user(user)?;
        let paid = parse_amount(&paid)?;
        let mut chain = self.chain.write();
        let head = chain.head();
        chain
            .omni_mut()
            .sync(ChainId(dst), &refund_address, user.as_ref(), gas_limit, paid, &head)
            .map(SyncReceiptJson::from)
            .map_err(rejected)
    }

    async fn set_min_dst_gas(&self, dst: u16, packet_type: u16, gas: u64) -> Result<bool, ErrorObjectOwned> {
        self.chain.write().omni_mut().set_min_dst_gas(ChainId(dst), packet_type, gas);
        Ok(true)
    }

    async fn set_trusted_remote(&self, src: u16, trusted: bool) -> Result<bool, ErrorObjectOwned> {
        self.chain.write().omni_mut().set_trusted_remote(ChainId(src), trusted);
        Ok(true)
    }
}

/// Start the JSON-RPC server for `chain_id` on `addr`.
///
/// Returns the bound address (useful with port 0) and a handle that can
/// be used to stop the server.
pub async fn start_rpc_server(
    addr: &str,
    devnet: &Devnet,
    chain_id: ChainId,
) -> Result<(SocketAddr, ServerHandle), OveError> {
    let rpc_impl = RpcServerImpl::new(devnet, chain_id)?;
    let server = Server::builder()
        .build(addr)
        .await
        .map_err(|e| OveError::Rpc(format!("RPC server error: {e}")))?;
    let local_addr = server
        .local_addr()
        .map_err(|e| OveError::Rpc(format!("RPC server error: {e}")))?;

    let handle = server.start(rpc_impl.into_rpc());

    Ok((local_addr, handle))
}
