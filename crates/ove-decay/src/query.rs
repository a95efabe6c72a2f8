//! Historical query engine.
//!
//! [`LedgerView`] exposes the raw histories of a ledger; every balance and
//! supply query is a provided method on top of them, so the local escrow and
//! each mirrored remote ledger answer queries with identical code.
//!
//! Past block timestamps are not directly known, so block-number queries
//! estimate the timestamp by interpolating linearly between the two global
//! points that bracket the block (or the last point and the chain head).

use ove_core::error::QueryError;
use ove_core::types::{Address, BlockContext};

use crate::history::{Checkpoints, PointHistory};
use crate::point::Point;
use crate::schedule::SlopeSchedule;

/// Read-only access to a ledger's checkpoint histories.
pub trait LedgerView {
    /// Global point history.
    fn global_history(&self) -> &PointHistory;

    /// History of `user`, if they ever checkpointed.
    fn user_history(&self, user: &Address) -> Option<&PointHistory>;

    /// Pending slope changes.
    fn slope_schedule(&self) -> &SlopeSchedule;

    /// Current global epoch.
    fn epoch(&self) -> u64 {
        self.global_history().last_epoch()
    }

    /// Current epoch of `user`'s history (0 if none).
    fn user_point_epoch(&self, user: &Address) -> u64 {
        self.user_history(user)
            .map(PointHistory::last_epoch)
            .unwrap_or(0)
    }

    /// Global point at `epoch` (empty if unrecorded).
    fn point_history(&self, epoch: u64) -> Point {
        self.global_history()
            .get(epoch)
            .copied()
            .unwrap_or(Point::EMPTY)
    }

    /// `user`'s point at `epoch` (empty if unrecorded).
    fn user_point_history(&self, user: &Address, epoch: u64) -> Point {
        self.user_history(user)
            .and_then(|h| h.get(epoch))
            .copied()
            .unwrap_or(Point::EMPTY)
    }

    /// Voting power of `user` at `timestamp`.
    fn balance_of(&self, user: &Address, timestamp: u64) -> u128 {
        let Some(history) = self.user_history(user) else {
            return 0;
        };
        history
            .find_by_timestamp(timestamp)
            .and_then(|i| history.entry(i))
            .map(|(_, p)| p.value_at(timestamp))
            .unwrap_or(0)
    }

    /// Total voting power at `timestamp`.
    fn total_supply(&self, timestamp: u64) -> u128 {
        let global = self.global_history();
        global
            .find_by_timestamp(timestamp)
            .and_then(|i| global.entry(i))
            .map(|(_, p)| self.slope_schedule().supply_at(p, timestamp))
            .unwrap_or(0)
    }

    /// Estimated timestamp of `block`, with the position of the global point
    /// at or before it.
    ///
    /// Returns `None` when the global history starts after `block`.
    ///
    /// # Errors
    ///
    /// [`QueryError::FutureBlock`] if `block` is beyond `head`.
    fn estimate_timestamp(
        &self,
        block: u64,
        head: &BlockContext,
    ) -> Result<Option<(usize, u64)>, QueryError> {
        if block > head.number {
            return Err(QueryError::FutureBlock {
                block,
                head: head.number,
            });
        }
        let global = self.global_history();
        let Some(index) = global.find_by_block(block) else {
            return Ok(None);
        };
        let Some((_, point)) = global.entry(index) else {
            return Ok(None);
        };
        let (next_block, next_time) = match global.entry(index + 1) {
            Some((_, next)) => (next.block, next.timestamp),
            None => (head.number, head.timestamp),
        };

        let d_block = next_block.saturating_sub(point.block);
        let d_time = next_time.saturating_sub(point.timestamp);
        let mut timestamp = point.timestamp;
        if d_block > 0 {
            // (block - point.block) <= d_block, so the quotient fits in u64.
            let offset =
                (block - point.block) as u128 * d_time as u128 / d_block as u128;
            timestamp += offset as u64;
        }
        Ok(Some((index, timestamp)))
    }

    /// Voting power of `user` at `block`.
    ///
    /// # Errors
    ///
    /// [`QueryError::FutureBlock`] if `block` is beyond `head`.
    fn balance_of_at(
        &self,
        user: &Address,
        block: u64,
        head: &BlockContext,
    ) -> Result<u128, QueryError> {
        let Some((_, block_time)) = self.estimate_timestamp(block, head)? else {
            return Ok(0);
        };
        let Some(history) = self.user_history(user) else {
            return Ok(0);
        };
        Ok(history
            .find_by_block(block)
            .and_then(|i| history.entry(i))
            // Sparse global histories can estimate a time before the user point.
            .map(|(_, p)| p.value_at(block_time.max(p.timestamp)))
            .unwrap_or(0))
    }

    /// Total voting power at `block`.
    ///
    /// # Errors
    ///
    /// [`QueryError::FutureBlock`] if `block` is beyond `head`.
    fn total_supply_at(&self, block: u64, head: &BlockContext) -> Result<u128, QueryError> {
        let Some((index, block_time)) = self.estimate_timestamp(block, head)? else {
            return Ok(0);
        };
        Ok(self
            .global_history()
            .entry(index)
            .map(|(_, p)| self.slope_schedule().supply_at(p, block_time))
            .unwrap_or(0))
    }
}

impl LedgerView for Checkpoints {
    fn global_history(&self) -> &PointHistory {
        self.global()
    }

    fn user_history(&self, user: &Address) -> Option<&PointHistory> {
        self.user(user)
    }

    fn slope_schedule(&self) -> &SlopeSchedule {
        self.schedule()
    }
}
