//! Epoch-indexed point histories.
//!
//! A [`PointHistory`] is an append-only sequence of `(epoch, point)` pairs with
//! strictly increasing epochs. Local histories are dense (every epoch is
//! present); mirrored histories may skip epochs that were never synced. Both
//! share the same lookups, so the query engine serves either.
//!
//! Epoch 0 always denotes the empty state: the global history stores a
//! sentinel there, user histories leave it implicit.

use std::collections::HashMap;

use ove_core::types::{Address, BlockContext};

use crate::point::Point;
use crate::schedule::SlopeSchedule;

/// Append-only point sequence ordered by epoch, block, and timestamp.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PointHistory {
    entries: Vec<(u64, Point)>,
}

impl PointHistory {
    /// Create an empty history.
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a history whose epoch 0 is `sentinel`.
    pub fn with_sentinel(sentinel: Point) -> Self {
        Self {
            entries: vec![(0, sentinel)],
        }
    }

    /// Highest recorded epoch, 0 if nothing has been recorded.
    pub fn last_epoch(&self) -> u64 {
        self.entries.last().map(|(e, _)| *e).unwrap_or(0)
    }

    /// Most recently recorded point.
    pub fn latest(&self) -> Option<&Point> {
        self.entries.last().map(|(_, p)| p)
    }

    /// Append `point` at the next epoch and return that epoch.
    pub fn append(&mut self, point: Point) -> u64 {
        let epoch = self.last_epoch() + 1;
        self.entries.push((epoch, point));
        epoch
    }

    /// Record `point` at `epoch`, which must exceed every recorded epoch.
    ///
    /// Returns `false` and leaves the history untouched otherwise.
    pub fn insert(&mut self, epoch: u64, point: Point) -> bool {
        if !self.entries.is_empty() && epoch <= self.last_epoch() {
            return false;
        }
        self.entries.push((epoch, point));
        true
    }

    /// Point recorded at exactly `epoch`.
    pub fn get(&self, epoch: u64) -> Option<&Point> {
        self.entries
            .binary_search_by_key(&epoch, |(e, _)| *e)
            .ok()
            .map(|i| &self.entries[i].1)
    }

    /// Entry at storage position `index`.
    pub fn entry(&self, index: usize) -> Option<(u64, &Point)> {
        self.entries.get(index).map(|(e, p)| (*e, p))
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (u64, &Point)> {
        self.entries.iter().map(|(e, p)| (*e, p))
    }

    /// Position of the last entry with `block <= target`.
    ///
    /// Several points may share a block; the last one written wins.
    pub fn find_by_block(&self, target: u64) -> Option<usize> {
        self.entries
            .partition_point(|(_, p)| p.block <= target)
            .checked_sub(1)
    }

    /// Position of the last entry with `timestamp <= target`.
    pub fn find_by_timestamp(&self, target: u64) -> Option<usize> {
        self.entries
            .partition_point(|(_, p)| p.timestamp <= target)
            .checked_sub(1)
    }
}

/// The full checkpoint state of one ledger: global and per-user histories
/// plus the slope-change schedule.
///
/// Owned by the local escrow and, separately, by each mirror of a remote
/// ledger.
#[derive(Debug, Clone, Default)]
pub struct Checkpoints {
    global: PointHistory,
    users: HashMap<Address, PointHistory>,
    schedule: SlopeSchedule,
}

impl Checkpoints {
    /// Checkpoints for a fresh ledger, with the epoch-0 sentinel anchored at
    /// `genesis`.
    pub fn new(genesis: &BlockContext) -> Self {
        Self {
            global: PointHistory::with_sentinel(Point::zero_at(genesis)),
            users: HashMap::new(),
            schedule: SlopeSchedule::new(),
        }
    }

    /// Checkpoints with no history at all, filled in later by sync.
    pub fn empty() -> Self {
        Self::default()
    }

    pub fn global(&self) -> &PointHistory {
        &self.global
    }

    pub fn global_mut(&mut self) -> &mut PointHistory {
        &mut self.global
    }

    pub fn user(&self, user: &Address) -> Option<&PointHistory> {
        self.users.get(user)
    }

    /// Mutable history of `user`, created empty on first access.
    pub fn user_mut(&mut self, user: &Address) -> &mut PointHistory {
        self.users.entry(*user).or_default()
    }

    pub fn users(&self) -> impl Iterator<Item = &Address> {
        self.users.keys()
    }

    pub fn schedule(&self) -> &SlopeSchedule {
        &self.schedule
    }

    pub fn schedule_mut(&mut self) -> &mut SlopeSchedule {
        &mut self.schedule
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn pt(block: u64, timestamp: u64) -> Point {
        Point {
            bias: 0,
            slope: 0,
            timestamp,
            block,
        }
    }

    #[test]
    fn append_numbers_from_one_without_sentinel() {
        let mut h = PointHistory::new();
        assert_eq!(h.last_epoch(), 0);
        assert_eq!(h.append(pt(1, 10)), 1);
        assert_eq!(h.append(pt(2, 20)), 2);
        assert_eq!(h.last_epoch(), 2);
        assert_eq!(h.get(1).unwrap().block, 1);
        assert!(h.get(0).is_none());
    }

    #[test]
    fn sentinel_occupies_epoch_zero() {
        let mut h = PointHistory::with_sentinel(pt(5, 50));
        assert_eq!(h.last_epoch(), 0);
        assert_eq!(h.append(pt(6, 60)), 1);
        assert_eq!(h.get(0).unwrap().block, 5);
    }

    #[test]
    fn insert_rejects_non_increasing_epochs() {
        let mut h = PointHistory::new();
        assert!(h.insert(5, pt(1, 1)));
        assert!(!h.insert(5, pt(2, 2)));
        assert!(!h.insert(3, pt(2, 2)));
        assert!(h.insert(9, pt(3, 3)));
        assert_eq!(h.len(), 2);
        assert_eq!(h.get(9).unwrap().block, 3);
        assert!(h.get(7).is_none());
    }

    #[test]
    fn find_by_block_prefers_last_written() {
        let mut h = PointHistory::with_sentinel(pt(10, 100));
        h.append(pt(12, 120));
        h.append(pt(12, 121));
        h.append(pt(15, 150));
        assert_eq!(h.find_by_block(9), None);
        assert_eq!(h.find_by_block(10), Some(0));
        assert_eq!(h.find_by_block(11), Some(0));
        assert_eq!(h.find_by_block(12), Some(2));
        assert_eq!(h.find_by_block(14), Some(2));
        assert_eq!(h.find_by_block(1_000), Some(3));
    }

    #[test]
    fn find_by_timestamp() {
        let mut h = PointHistory::new();
        h.append(pt(1, 100));
        h.append(pt(2, 200));
        assert_eq!(h.find_by_timestamp(99), None);
        assert_eq!(h.find_by_timestamp(150), Some(0));
        assert_eq!(h.find_by_timestamp(200), Some(1));
    }

    #[test]
    fn checkpoints_start_with_sentinel() {
        let cp = Checkpoints::new(&BlockContext::new(7, 700));
        assert_eq!(cp.global().last_epoch(), 0);
        assert_eq!(cp.global().get(0), Some(&Point::zero_at(&BlockContext::new(7, 700))));
        assert!(cp.user(&Address::ZERO).is_none());
        assert!(Checkpoints::empty().global().is_empty());
    }

    #[test]
    fn user_mut_creates_history() {
        let mut cp = Checkpoints::empty();
        let alice = Address::from_label("alice");
        cp.user_mut(&alice).append(pt(1, 1));
        assert_eq!(cp.user(&alice).unwrap().last_epoch(), 1);
        assert_eq!(cp.users().count(), 1);
    }
}
