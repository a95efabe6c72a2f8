//! Linear decay points.
//!
//! A [`Point`] records a voting-power value (`bias`) and its rate of change
//! (`slope`, never positive) at a timestamp and block. Evaluating it later is
//! `max(bias + slope * (t - timestamp), 0)`.

use serde::{Deserialize, Serialize};

use ove_core::constants::MAXTIME;
use ove_core::types::{BlockContext, LockedBalance};

/// A linearly decaying value anchored at a moment in chain history.
#[derive(
    Serialize, Deserialize, Clone, Copy, Debug, PartialEq, Eq, Default,
    bincode::Encode, bincode::Decode,
)]
pub struct Point {
    /// Value at `timestamp`.
    pub bias: i128,
    /// Change per second (`<= 0`).
    pub slope: i128,
    /// Unix timestamp the point is anchored at.
    pub timestamp: u64,
    /// Block number the point is anchored at.
    pub block: u64,
}

/// Per-second decay of a lock holding `amount`.
///
/// `amount / MAXTIME` always fits in `i128` since `u128::MAX / MAXTIME` does.
pub fn lock_slope(amount: u128) -> i128 {
    -((amount / MAXTIME as u128) as i128)
}

/// Signed seconds from `from` to `to`.
pub(crate) fn elapsed(from: u64, to: u64) -> i128 {
    to as i128 - from as i128
}

impl Point {
    /// The point of no voting power, anchored nowhere.
    pub const EMPTY: Self = Self {
        bias: 0,
        slope: 0,
        timestamp: 0,
        block: 0,
    };

    /// A zero-valued point anchored at `ctx`.
    pub fn zero_at(ctx: &BlockContext) -> Self {
        Self {
            bias: 0,
            slope: 0,
            timestamp: ctx.timestamp,
            block: ctx.number,
        }
    }

    /// The voting-power point of `lock` at `ctx`.
    ///
    /// Inactive and expired locks yield a zero point.
    pub fn for_lock(lock: &LockedBalance, ctx: &BlockContext) -> Self {
        if !lock.is_active() || lock.is_expired(ctx.timestamp) {
            return Self::zero_at(ctx);
        }
        let slope = lock_slope(lock.amount);
        let remaining = elapsed(ctx.timestamp, lock.unlock_time);
        Self {
            bias: slope.saturating_mul(remaining).saturating_neg(),
            slope,
            timestamp: ctx.timestamp,
            block: ctx.number,
        }
    }

    /// Unclamped value at `timestamp`.
    pub fn raw_value_at(&self, timestamp: u64) -> i128 {
        self.bias
            .saturating_add(self.slope.saturating_mul(elapsed(self.timestamp, timestamp)))
    }

    /// Value at `timestamp`, clamped at zero.
    pub fn value_at(&self, timestamp: u64) -> u128 {
        self.raw_value_at(timestamp).max(0) as u128
    }

    /// Whether the point carries no value and no decay.
    pub fn is_zero(&self) -> bool {
        self.bias == 0 && self.slope == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ove_core::constants::{UNIT, WEEK};
    use proptest::prelude::*;

    const T0: u64 = 1_000 * WEEK;

    fn ctx(timestamp: u64) -> BlockContext {
        BlockContext::new(100, timestamp)
    }

    #[test]
    fn slope_is_amount_over_maxtime() {
        assert_eq!(lock_slope(MAXTIME as u128 * 3), -3);
        assert_eq!(lock_slope(MAXTIME as u128 - 1), 0);
        assert_eq!(lock_slope(0), 0);
    }

    #[test]
    fn lock_point_reaches_zero_at_unlock() {
        let lock = LockedBalance::new(1_000 * UNIT, T0 + WEEK);
        let p = Point::for_lock(&lock, &ctx(T0));
        assert!(p.bias > 0);
        assert!(p.slope < 0);
        assert_eq!(p.raw_value_at(T0 + WEEK), 0);
        assert_eq!(p.value_at(T0 + WEEK), 0);
        assert_eq!(p.value_at(T0 + 2 * WEEK), 0);
    }

    #[test]
    fn one_week_lock_value() {
        // 1000 tokens for one week: bias = (1000e18 / MAXTIME) * WEEK.
        let amount = 1_000 * UNIT;
        let lock = LockedBalance::new(amount, T0 + WEEK);
        let p = Point::for_lock(&lock, &ctx(T0));
        assert_eq!(p.value_at(T0), amount / MAXTIME as u128 * WEEK as u128);
    }

    #[test]
    fn inactive_and_expired_locks_are_zero() {
        assert!(Point::for_lock(&LockedBalance::EMPTY, &ctx(T0)).is_zero());
        let expired = LockedBalance::new(UNIT, T0);
        let p = Point::for_lock(&expired, &ctx(T0));
        assert!(p.is_zero());
        assert_eq!(p.timestamp, T0);
        assert_eq!(p.block, 100);
    }

    #[test]
    fn value_clamps_at_zero() {
        let p = Point {
            bias: 10,
            slope: -1,
            timestamp: 0,
            block: 0,
        };
        assert_eq!(p.value_at(5), 5);
        assert_eq!(p.value_at(10), 0);
        assert_eq!(p.value_at(1_000), 0);
        assert_eq!(p.raw_value_at(20), -10);
    }

    proptest! {
        #[test]
        fn value_decreases_linearly(
            amount in 1u128..1_000_000_000 * UNIT,
            weeks in 1u64..104,
            a in 0u64..WEEK,
            b in 0u64..WEEK,
        ) {
            let lock = LockedBalance::new(amount, T0 + weeks * WEEK);
            let p = Point::for_lock(&lock, &ctx(T0));
            let (lo, hi) = if a <= b { (a, b) } else { (b, a) };
            prop_assert!(p.value_at(T0 + lo) >= p.value_at(T0 + hi));
            // Exact linearity: value drops by |slope| per second.
            let drop = p.raw_value_at(T0 + lo) - p.raw_value_at(T0 + hi);
            prop_assert_eq!(drop, -p.slope * (hi - lo) as i128);
        }

        #[test]
        fn value_is_clamped_raw_value(
            bias in -1_000_000i128..1_000_000,
            slope in -1_000i128..=0,
            t in 0u64..10_000_000,
        ) {
            let p = Point { bias, slope, timestamp: 0, block: 0 };
            let raw = bias + slope * t as i128;
            prop_assert_eq!(p.value_at(t), raw.max(0) as u128);
        }
    }
}
