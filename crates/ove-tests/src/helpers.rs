//! Shared test helpers: a block-by-block chain simulator and tolerant comparisons.

use ove_core::asset::MemoryAsset;
use ove_core::constants::{floor_week, MAXTIME, UNIT, WEEK};
use ove_core::traits::AssetLedger;
use ove_core::types::{Address, BlockContext};
use ove_escrow::VotingEscrow;

/// Default relative tolerance (about two minutes of decay over a week).
pub const TOL: u128 = UNIT * 120 / WEEK as u128;

/// Voting power a lock of `amount` holds with `seconds` remaining.
pub fn power(amount: u128, seconds: u64) -> u128 {
    amount / u128::from(MAXTIME) * u128::from(seconds)
}

/// Assert `a` and `b` agree within `precision` (fraction of `UNIT`)
/// relative to their mean. Two zeros always agree.
#[track_caller]
pub fn assert_approx_eq(a: u128, b: u128, precision: u128) {
    if a == 0 && b == 0 {
        return;
    }
    let sum = a + b;
    let bound = sum / UNIT * precision + sum % UNIT * precision / UNIT;
    assert!(
        a.abs_diff(b) * 2 <= bound,
        "{a} and {b} differ by more than {precision}/{UNIT}"
    );
}

/// A single chain that mines blocks on demand, like a local dev node.
///
/// `sleep` advances the clock for the next block; every `mine` (and every
/// transaction through [`Sim::tx`]) produces one block at least one second
/// after the previous one.
pub struct Sim {
    pub ve: VotingEscrow<MemoryAsset>,
    head: BlockContext,
    pending: u64,
}

impl Sim {
    pub fn new(genesis_timestamp: u64) -> Self {
        let head = BlockContext::new(0, genesis_timestamp);
        let ve = VotingEscrow::new(Address::from_label("escrow"), MemoryAsset::new(), &head);
        Self { ve, head, pending: 0 }
    }

    pub fn head(&self) -> BlockContext {
        self.head
    }

    pub fn now(&self) -> u64 {
        self.head.timestamp
    }

    pub fn sleep(&mut self, seconds: u64) {
        self.pending += seconds;
    }

    pub fn mine(&mut self) -> BlockContext {
        self.head = BlockContext::new(self.head.number + 1, self.head.timestamp + self.pending.max(1));
        self.pending = 0;
        self.head
    }

    /// Mine `n` blocks `interval` seconds apart.
    pub fn mine_every(&mut self, n: u64, interval: u64) {
        for _ in 0..n {
            self.sleep(interval);
            self.mine();
        }
    }

    /// Sleep to the next week boundary and mine a block on it.
    pub fn move_to_week_start(&mut self) {
        let now = self.now();
        self.sleep(floor_week(now) + WEEK - now);
        self.mine();
    }

    /// Execute `f` in a freshly mined block.
    pub fn tx<R>(&mut self, f: impl FnOnce(&mut VotingEscrow<MemoryAsset>, &BlockContext) -> R) -> R {
        let ctx = self.mine();
        f(&mut self.ve, &ctx)
    }

    /// Mint `amount` to `user` and approve the escrow for all of it.
    pub fn fund(&mut self, user: &Address, amount: u128) {
        let escrow = *self.ve.address();
        let asset = self.ve.asset_mut();
        asset.mint(user, amount).unwrap();
        asset.approve(user, &escrow, u128::MAX);
    }
}
