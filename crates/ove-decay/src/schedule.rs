//! Slope-change schedule.
//!
//! Maps a week-aligned timestamp to the sum of the (negative) slopes of every
//! lock that expires there. When the running global slope crosses that
//! boundary the scheduled delta is subtracted, so the schedule always reflects
//! exactly the locks that are still active.

use std::collections::BTreeMap;

use ove_core::constants::{floor_week, MAX_CHECKPOINT_WEEKS, WEEK};

use crate::point::{elapsed, Point};

/// Future slope deltas keyed by week-aligned timestamp.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SlopeSchedule {
    changes: BTreeMap<u64, i128>,
}

impl SlopeSchedule {
    pub fn new() -> Self {
        Self::default()
    }

    /// Delta scheduled at `timestamp` (zero if none).
    pub fn get(&self, timestamp: u64) -> i128 {
        self.changes.get(&timestamp).copied().unwrap_or(0)
    }

    /// Overwrite the delta at `timestamp`. A zero delta removes the entry.
    pub fn set(&mut self, timestamp: u64, delta: i128) {
        if delta == 0 {
            self.changes.remove(&timestamp);
        } else {
            self.changes.insert(timestamp, delta);
        }
    }

    pub fn len(&self) -> usize {
        self.changes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.changes.is_empty()
    }

    /// Non-zero entries in `(after, until]`, in time order.
    pub fn window(&self, after: u64, until: u64) -> Vec<(u64, i128)> {
        if until <= after {
            return Vec::new();
        }
        self.changes
            .range(after + 1..=until)
            .map(|(t, d)| (*t, *d))
            .collect()
    }

    /// Replace every entry later than `after` with `entries`.
    ///
    /// Entries at or before `after` are ignored; they can no longer affect a
    /// replay that starts from a point anchored after them.
    pub fn replace_after<I>(&mut self, after: u64, entries: I)
    where
        I: IntoIterator<Item = (u64, i128)>,
    {
        self.changes.retain(|t, _| *t <= after);
        for (t, d) in entries {
            if t > after {
                self.set(t, d);
            }
        }
    }

    /// Total value of `point` at `timestamp`, applying scheduled slope changes.
    ///
    /// Read-only counterpart of the checkpoint replay: steps week by week from
    /// the point's timestamp, at most [`MAX_CHECKPOINT_WEEKS`] times.
    pub fn supply_at(&self, point: &Point, timestamp: u64) -> u128 {
        let mut last = *point;
        let mut t_i = floor_week(last.timestamp);
        for _ in 0..MAX_CHECKPOINT_WEEKS {
            t_i += WEEK;
            let d_slope = if t_i > timestamp {
                t_i = timestamp;
                0
            } else {
                self.get(t_i)
            };
            last.bias = last
                .bias
                .saturating_add(last.slope.saturating_mul(elapsed(last.timestamp, t_i)));
            if t_i == timestamp {
                break;
            }
            last.slope -= d_slope;
            last.timestamp = t_i;
        }
        last.bias.max(0) as u128
    }
}
