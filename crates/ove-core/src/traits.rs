//! Collaborator interfaces.
//!
//! These traits define the contracts between the ledger and the world it
//! runs in:
//! - [`AssetLedger`]: the fungible asset held in escrow (`MemoryAsset` in
//!   this crate implements it for tests and the devnet)
//! - [`MessageTransport`]: the cross-chain message bus (`ove-node`'s relay
//!   endpoint implements it)

use crate::error::{AssetError, SyncError};
use crate::types::{Address, ChainId};

/// A standard balance-holding token.
///
/// Mutating calls are atomic: on error no balance or allowance changes.
pub trait AssetLedger: Send + Sync {
    /// Balance held by `owner`.
    fn balance_of(&self, owner: &Address) -> u128;

    /// Total minted supply.
    fn total_supply(&self) -> u128;

    /// Amount `spender` may still move out of `owner`'s balance.
    fn allowance(&self, owner: &Address, spender: &Address) -> u128;

    /// Set `spender`'s allowance over `owner`'s balance.
    fn approve(&mut self, owner: &Address, spender: &Address, amount: u128);

    /// Move `amount` from `from` to `to`, authorised by `from` itself.
    fn transfer(&mut self, from: &Address, to: &Address, amount: u128) -> Result<(), AssetError>;

    /// Move `amount` from `from` to `to`, spending `spender`'s allowance.
    fn transfer_from(
        &mut self,
        spender: &Address,
        from: &Address,
        to: &Address,
        amount: u128,
    ) -> Result<(), AssetError>;

    /// Create `amount` new units for `to`.
    fn mint(&mut self, to: &Address, amount: u128) -> Result<(), AssetError>;
}

/// Result of handing a message to the transport.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SendReceipt {
    /// Transport-assigned identifier of the message.
    pub message_id: [u8; 32],
    /// Per-channel sequence number of the message.
    pub nonce: u64,
    /// Native fee charged.
    pub fee: u128,
    /// Native value returned to the refund address.
    pub refunded: u128,
}

/// Cross-chain message transport, seen from one source chain.
///
/// Delivery is asynchronous, at-least-once, and ordered per
/// (source, destination) channel only. The destination-side receive callback
/// is wired by the transport owner, not through this trait.
pub trait MessageTransport: Send + Sync {
    /// Native fee required to deliver `payload` to `dst` with `gas_limit`.
    fn estimate_fee(&self, dst: ChainId, payload: &[u8], gas_limit: u64) -> Result<u128, SyncError>;

    /// Queue `payload` for delivery to `dst`, paying from `value`.
    ///
    /// Any excess over the fee is refunded to `refund_address`. Fails
    /// without side effects if `value` does not cover the fee.
    fn send(
        &self,
        dst: ChainId,
        payload: Vec<u8>,
        refund_address: &Address,
        gas_limit: u64,
        value: u128,
    ) -> Result<SendReceipt, SyncError>;
}
