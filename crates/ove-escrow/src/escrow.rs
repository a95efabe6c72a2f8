//! The voting escrow: custody of the locked asset plus the decaying
//! voting-power ledger derived from it.
//!
//! Each mutation validates against the [`LockBook`], moves the asset, and
//! only then writes the new lock and its checkpoint. Asset failures surface
//! as [`LockError::Asset`] with nothing recorded.

use ove_core::constants::DECIMALS;
use ove_core::error::LockError;
use ove_core::traits::AssetLedger;
use ove_core::types::{Address, BlockContext, LockedBalance};
use ove_decay::{Checkpoints, LedgerView, PointHistory, SlopeSchedule};
use tracing::info;

use crate::checkpoint::{checkpoint, LockChange};
use crate::ledger::{self, LockBook};

/// Lock-based voting-power ledger for one chain.
#[derive(Debug, Clone)]
pub struct VotingEscrow<A: AssetLedger> {
    /// Account holding the escrowed asset.
    address: Address,
    name: String,
    symbol: String,
    asset: A,
    locks: LockBook,
    checkpoints: Checkpoints,
}

impl<A: AssetLedger> VotingEscrow<A> {
    /// Create an escrow at `address`, with its history anchored at `genesis`.
    pub fn new(address: Address, asset: A, genesis: &BlockContext) -> Self {
        Self {
            address,
            name: "Vote-escrowed OVE".to_string(),
            symbol: "veOVE".to_string(),
            asset,
            locks: LockBook::new(),
            checkpoints: Checkpoints::new(genesis),
        }
    }

    /// Rename the escrowed voting token.
    pub fn with_metadata(mut self, name: impl Into<String>, symbol: impl Into<String>) -> Self {
        self.name = name.into();
        self.symbol = symbol.into();
        self
    }

    pub fn address(&self) -> &Address {
        &self.address
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn symbol(&self) -> &str {
        &self.symbol
    }

    /// Voting power shares the asset's base unit.
    pub fn decimals(&self) -> u8 {
        DECIMALS
    }

    pub fn asset(&self) -> &A {
        &self.asset
    }

    /// Mutable access to the underlying asset (minting, approvals).
    pub fn asset_mut(&mut self) -> &mut A {
        &mut self.asset
    }

    pub fn checkpoints(&self) -> &Checkpoints {
        &self.checkpoints
    }

    /// Current lock of `user`.
    pub fn locked(&self, user: &Address) -> LockedBalance {
        self.locks.get(user)
    }

    /// Unlock time of `user`'s lock (0 if none).
    pub fn unlock_time(&self, user: &Address) -> u64 {
        self.locks.get(user).unlock_time
    }

    /// Total asset amount held in escrow.
    pub fn locked_supply(&self) -> u128 {
        self.locks.supply()
    }

    /// Lock `amount` from `payer` until `unlock_time` (rounded down to a
    /// week) on behalf of `beneficiary`.
    ///
    /// `payer` must have approved the escrow for `amount`.
    pub fn create_lock_for(
        &mut self,
        payer: &Address,
        beneficiary: &Address,
        amount: u128,
        unlock_time: u64,
        ctx: &BlockContext,
    ) -> Result<LockedBalance, LockError> {
        let old = self.locks.get(beneficiary);
        let new = ledger::validate_create(&old, amount, unlock_time, ctx.timestamp, self.locks.supply())?;
        self.pull(payer, amount)?;
        self.apply(beneficiary, old, new, ctx);
        info!(
            user = %beneficiary,
            %payer,
            amount,
            unlock_time = new.unlock_time,
            block = ctx.number,
            "lock created"
        );
        Ok(new)
    }

    /// Add `extra` to `owner`'s live lock, paid by `owner`.
    pub fn increase_amount(
        &mut self,
        owner: &Address,
        extra: u128,
        ctx: &BlockContext,
    ) -> Result<LockedBalance, LockError> {
        self.increase_amount_for(owner, owner, extra, ctx)
    }

    /// Add `extra` to `owner`'s live lock, paid by `payer`.
    pub fn increase_amount_for(
        &mut self,
        payer: &Address,
        owner: &Address,
        extra: u128,
        ctx: &BlockContext,
    ) -> Result<LockedBalance, LockError> {
        let old = self.locks.get(owner);
        let new = ledger::validate_increase_amount(&old, extra, ctx.timestamp, self.locks.supply())?;
        self.pull(payer, extra)?;
        self.apply(owner, old, new, ctx);
        info!(user = %owner, %payer, extra, amount = new.amount, block = ctx.number, "lock amount increased");
        Ok(new)
    }

    /// Push `owner`'s unlock time out to `unlock_time` (rounded down to a week).
    pub fn increase_unlock_time(
        &mut self,
        owner: &Address,
        unlock_time: u64,
        ctx: &BlockContext,
    ) -> Result<LockedBalance, LockError> {
        let old = self.locks.get(owner);
        let new = ledger::validate_extend(&old, unlock_time, ctx.timestamp)?;
        self.apply(owner, old, new, ctx);
        info!(
            user = %owner,
            from = old.unlock_time,
            to = new.unlock_time,
            block = ctx.number,
            "lock extended"
        );
        Ok(new)
    }

    /// Release `owner`'s expired lock back to them; returns the amount.
    pub fn withdraw(&mut self, owner: &Address, ctx: &BlockContext) -> Result<u128, LockError> {
        let old = self.locks.get(owner);
        let amount = ledger::validate_withdraw(&old, ctx.timestamp)?;
        self.asset.transfer(&self.address, owner, amount)?;
        self.apply(owner, old, LockedBalance::EMPTY, ctx);
        info!(user = %owner, amount, block = ctx.number, "lock withdrawn");
        Ok(amount)
    }

    fn pull(&mut self, payer: &Address, amount: u128) -> Result<(), LockError> {
        let escrow = self.address;
        self.asset.transfer_from(&escrow, payer, &escrow, amount)?;
        Ok(())
    }

    fn apply(&mut self, user: &Address, old: LockedBalance, new: LockedBalance, ctx: &BlockContext) {
        self.locks.set(user, new);
        checkpoint(
            &mut self.checkpoints,
            Some(LockChange { user, old, new }),
            ctx,
        );
    }
}

impl<A: AssetLedger> LedgerView for VotingEscrow<A> {
    fn global_history(&self) -> &PointHistory {
        self.checkpoints.global()
    }

    fn user_history(&self, user: &Address) -> Option<&PointHistory> {
        self.checkpoints.user(user)
    }

    fn slope_schedule(&self) -> &SlopeSchedule {
        self.checkpoints.schedule()
    }
}
