//! In-memory fungible asset.
//!
//! [`MemoryAsset`] implements [`AssetLedger`] with `HashMap`s and no
//! persistence. It backs the unit tests and every devnet chain.

use std::collections::HashMap;

use tracing::debug;

use crate::error::AssetError;
use crate::traits::AssetLedger;
use crate::types::Address;

/// In-memory token with ERC-20 style allowances.
#[derive(Debug, Clone, Default)]
pub struct MemoryAsset {
    /// Balance per owner.
    balances: HashMap<Address, u128>,
    /// `(owner, spender)` → remaining allowance.
    allowances: HashMap<(Address, Address), u128>,
    /// Sum of all balances.
    supply: u128,
}

impl MemoryAsset {
    /// Create an asset with no holders.
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of addresses holding a non-zero balance.
    pub fn holder_count(&self) -> usize {
        self.balances.values().filter(|b| **b > 0).count()
    }

    fn debit(&mut self, from: &Address, amount: u128) -> Result<(), AssetError> {
        let have = self.balance_of(from);
        if have < amount {
            return Err(AssetError::InsufficientBalance { have, need: amount });
        }
        self.balances.insert(*from, have - amount);
        Ok(())
    }

    fn credit(&mut self, to: &Address, amount: u128) -> Result<(), AssetError> {
        let balance = self
            .balance_of(to)
            .checked_add(amount)
            .ok_or(AssetError::Overflow)?;
        self.balances.insert(*to, balance);
        Ok(())
    }
}

impl AssetLedger for MemoryAsset {
    fn balance_of(&self, owner: &Address) -> u128 {
        self.balances.get(owner).copied().unwrap_or(0)
    }

    fn total_supply(&self) -> u128 {
        self.supply
    }

    fn allowance(&self, owner: &Address, spender: &Address) -> u128 {
        self.allowances.get(&(*owner, *spender)).copied().unwrap_or(0)
    }

    fn approve(&mut self, owner: &Address, spender: &Address, amount: u128) {
        self.allowances.insert((*owner, *spender), amount);
    }

    fn transfer(&mut self, from: &Address, to: &Address, amount: u128) -> Result<(), AssetError> {
        if from == to {
            let have = self.balance_of(from);
            return if have < amount {
                Err(AssetError::InsufficientBalance { have, need: amount })
            } else {
                Ok(())
            };
        }
        // The credit can only overflow if the debit succeeded, so check it first.
        self.balance_of(to)
            .checked_add(amount)
            .ok_or(AssetError::Overflow)?;
        self.debit(from, amount)?;
        self.credit(to, amount)?;
        debug!(%from, %to, amount, "asset transfer");
        Ok(())
    }

    fn transfer_from(
        &mut self,
        spender: &Address,
        from: &Address,
        to: &Address,
        amount: u128,
    ) -> Result<(), AssetError> {
        let allowed = self.allowance(from, spender);
        if allowed < amount {
            return Err(AssetError::InsufficientAllowance {
                have: allowed,
                need: amount,
            });
        }
        self.transfer(from, to, amount)?;
        self.allowances.insert((*from, *spender), allowed - amount);
        Ok(())
    }

    fn mint(&mut self, to: &Address, amount: u128) -> Result<(), AssetError> {
        let supply = self.supply.checked_add(amount).ok_or(AssetError::Overflow)?;
        self.credit(to, amount)?;
        self.supply = supply;
        Ok(())
    }
}
