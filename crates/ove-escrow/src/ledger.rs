//! Lock ledger: per-user locked balances and the lock state machine.
//!
//! Every transition is validated here before the escrow touches the asset or
//! the checkpoint histories, so a rejected call leaves no trace.
//!
//! ```text
//!  (none) --create--> Active --increase amount / extend--> Active
//!                        |
//!                    unlock_time passes
//!                        v
//!                     Expired --withdraw--> (none)
//! ```

use std::collections::HashMap;

use ove_core::constants::{floor_week, MAXTIME};
use ove_core::error::LockError;
use ove_core::types::{Address, LockedBalance};

/// Locked balances of every user plus the total held in escrow.
#[derive(Debug, Clone, Default)]
pub struct LockBook {
    locks: HashMap<Address, LockedBalance>,
    supply: u128,
}

impl LockBook {
    pub fn new() -> Self {
        Self::default()
    }

    /// Current lock of `user` ([`LockedBalance::EMPTY`] if none).
    pub fn get(&self, user: &Address) -> LockedBalance {
        self.locks.get(user).copied().unwrap_or(LockedBalance::EMPTY)
    }

    /// Total amount locked across all users.
    pub fn supply(&self) -> u128 {
        self.supply
    }

    /// Number of users with a recorded position.
    pub fn len(&self) -> usize {
        self.locks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.locks.is_empty()
    }

    /// Store `lock` for `user`, adjusting the locked supply.
    ///
    /// Callers validate first; the supply cannot overflow because every
    /// increase was checked by [`check_amount`].
    pub(crate) fn set(&mut self, user: &Address, lock: LockedBalance) {
        let old = self.get(user);
        self.supply = self.supply - old.amount + lock.amount;
        if lock.is_active() {
            self.locks.insert(*user, lock);
        } else {
            self.locks.remove(user);
        }
    }
}

/// Ensure `extra` can be added to `current` and to the locked `supply`
/// without leaving the signed range used by the decay math.
pub fn check_amount(current: u128, extra: u128, supply: u128) -> Result<u128, LockError> {
    let amount = current.checked_add(extra).ok_or(LockError::AmountOverflow)?;
    let total = supply.checked_add(extra).ok_or(LockError::AmountOverflow)?;
    if total > i128::MAX as u128 {
        return Err(LockError::AmountOverflow);
    }
    Ok(amount)
}

/// Round `unlock_time` down to a week and check it lies in `(now, now + MAXTIME]`.
fn aligned_unlock_time(unlock_time: u64, now: u64) -> Result<u64, LockError> {
    let aligned = floor_week(unlock_time);
    if aligned <= now {
        return Err(LockError::UnlockTimeInPast { unlock_time: aligned });
    }
    let max = now.saturating_add(MAXTIME);
    if aligned > max {
        return Err(LockError::UnlockTimeTooFar {
            unlock_time: aligned,
            max,
        });
    }
    Ok(aligned)
}

fn require_live(lock: &LockedBalance, now: u64) -> Result<(), LockError> {
    if !lock.is_active() {
        return Err(LockError::InvalidLockState("no existing lock found"));
    }
    if lock.is_expired(now) {
        return Err(LockError::ExpiredLock {
            unlock_time: lock.unlock_time,
        });
    }
    Ok(())
}

/// Validate opening a lock; returns the lock to record.
pub fn validate_create(
    existing: &LockedBalance,
    amount: u128,
    unlock_time: u64,
    now: u64,
    supply: u128,
) -> Result<LockedBalance, LockError> {
    if amount == 0 {
        return Err(LockError::ZeroAmount);
    }
    if existing.is_active() {
        return Err(LockError::InvalidLockState("withdraw old tokens first"));
    }
    let unlock_time = aligned_unlock_time(unlock_time, now)?;
    let amount = check_amount(0, amount, supply)?;
    Ok(LockedBalance {
        amount,
        unlock_time,
    })
}

/// Validate topping up a live lock; returns the lock to record.
pub fn validate_increase_amount(
    lock: &LockedBalance,
    extra: u128,
    now: u64,
    supply: u128,
) -> Result<LockedBalance, LockError> {
    if extra == 0 {
        return Err(LockError::ZeroAmount);
    }
    require_live(lock, now)?;
    Ok(LockedBalance {
        amount: check_amount(lock.amount, extra, supply)?,
        unlock_time: lock.unlock_time,
    })
}

/// Validate extending a live lock; returns the lock to record.
///
/// The new unlock time is rounded down to a week and must land strictly
/// after the current one.
pub fn validate_extend(
    lock: &LockedBalance,
    unlock_time: u64,
    now: u64,
) -> Result<LockedBalance, LockError> {
    require_live(lock, now)?;
    if floor_week(unlock_time) <= lock.unlock_time {
        return Err(LockError::TooEarly("can only increase lock duration"));
    }
    Ok(LockedBalance {
        amount: lock.amount,
        unlock_time: aligned_unlock_time(unlock_time, now)?,
    })
}

/// Validate withdrawing an expired lock; returns the amount released.
pub fn validate_withdraw(lock: &LockedBalance, now: u64) -> Result<u128, LockError> {
    if !lock.is_active() {
        return Err(LockError::InvalidLockState("nothing to withdraw"));
    }
    if !lock.is_expired(now) {
        return Err(LockError::TooEarly("the lock did not expire"));
    }
    Ok(lock.amount)
}

#[cfg(test)]
mod tests {
    use super::*;
    use ove_core::constants::{UNIT, WEEK};

    const NOW: u64 = 2_500 * WEEK + 1_234;

    fn live(amount: u128) -> LockedBalance {
        LockedBalance::new(amount, NOW + 4 * WEEK)
    }

    // ------------------------------------------------------------------
    // create
    // ------------------------------------------------------------------

    #[test]
    fn create_rounds_unlock_time_down() {
        let lock = validate_create(&LockedBalance::EMPTY, UNIT, NOW + WEEK, NOW, 0).unwrap();
        assert_eq!(lock.unlock_time, floor_week(NOW + WEEK));
        assert_eq!(lock.unlock_time % WEEK, 0);
        assert_eq!(lock.amount, UNIT);
    }

    #[test]
    fn create_rejects_zero_amount() {
        let err = validate_create(&LockedBalance::EMPTY, 0, NOW + WEEK, NOW, 0).unwrap_err();
        assert_eq!(err, LockError::ZeroAmount);
    }

    #[test]
    fn create_rejects_existing_lock() {
        let err = validate_create(&live(UNIT), UNIT, NOW + WEEK, NOW, UNIT).unwrap_err();
        assert!(matches!(err, LockError::InvalidLockState(_)));
    }

    #[test]
    fn create_rejects_lock_rounding_into_past() {
        // Less than a week ahead rounds down to the current week start.
        let err = validate_create(&LockedBalance::EMPTY, UNIT, NOW + 60, NOW, 0).unwrap_err();
        assert!(matches!(err, LockError::UnlockTimeInPast { .. }));
    }

    #[test]
    fn create_accepts_maxtime_and_rejects_beyond() {
        assert!(validate_create(&LockedBalance::EMPTY, UNIT, NOW + MAXTIME, NOW, 0).is_ok());
        let err =
            validate_create(&LockedBalance::EMPTY, UNIT, NOW + MAXTIME + WEEK, NOW, 0).unwrap_err();
        assert!(matches!(err, LockError::UnlockTimeTooFar { .. }));
    }

    #[test]
    fn create_rejects_signed_overflow() {
        let err = validate_create(&LockedBalance::EMPTY, u128::MAX, NOW + WEEK, NOW, 0).unwrap_err();
        assert_eq!(err, LockError::AmountOverflow);
    }

    // ------------------------------------------------------------------
    // increase / extend / withdraw
    // ------------------------------------------------------------------

    #[test]
    fn increase_amount_keeps_unlock_time() {
        let lock = live(UNIT);
        let next = validate_increase_amount(&lock, 2 * UNIT, NOW, UNIT).unwrap();
        assert_eq!(next.amount, 3 * UNIT);
        assert_eq!(next.unlock_time, lock.unlock_time);
    }

    #[test]
    fn increase_amount_requires_live_lock() {
        let err = validate_increase_amount(&LockedBalance::EMPTY, UNIT, NOW, 0).unwrap_err();
        assert!(matches!(err, LockError::InvalidLockState(_)));

        let lock = live(UNIT);
        let err = validate_increase_amount(&lock, UNIT, lock.unlock_time, UNIT).unwrap_err();
        assert!(matches!(err, LockError::ExpiredLock { .. }));

        assert_eq!(
            validate_increase_amount(&lock, 0, NOW, UNIT).unwrap_err(),
            LockError::ZeroAmount
        );
    }

    #[test]
    fn extend_must_move_a_full_week() {
        let lock = live(UNIT);
        let err = validate_extend(&lock, lock.unlock_time + WEEK - 1, NOW).unwrap_err();
        assert!(matches!(err, LockError::TooEarly(_)));
        let next = validate_extend(&lock, lock.unlock_time + WEEK, NOW).unwrap();
        assert_eq!(next.unlock_time, lock.unlock_time + WEEK);
        assert_eq!(next.amount, UNIT);
    }

    #[test]
    fn extend_is_bounded_by_maxtime() {
        let lock = live(UNIT);
        let err = validate_extend(&lock, NOW + MAXTIME + WEEK, NOW).unwrap_err();
        assert!(matches!(err, LockError::UnlockTimeTooFar { .. }));
    }

    #[test]
    fn withdraw_only_after_expiry() {
        let lock = live(UNIT);
        assert!(matches!(
            validate_withdraw(&lock, NOW).unwrap_err(),
            LockError::TooEarly(_)
        ));
        assert_eq!(validate_withdraw(&lock, lock.unlock_time).unwrap(), UNIT);
        assert!(matches!(
            validate_withdraw(&LockedBalance::EMPTY, NOW).unwrap_err(),
            LockError::InvalidLockState(_)
        ));
    }

    // ------------------------------------------------------------------
    // LockBook
    // ------------------------------------------------------------------

    #[test]
    fn book_tracks_supply() {
        let alice = Address::from_label("alice");
        let bob = Address::from_label("bob");
        let mut book = LockBook::new();
        book.set(&alice, live(UNIT));
        book.set(&bob, live(2 * UNIT));
        assert_eq!(book.supply(), 3 * UNIT);
        book.set(&alice, live(5 * UNIT));
        assert_eq!(book.supply(), 7 * UNIT);
        book.set(&bob, LockedBalance::EMPTY);
        assert_eq!(book.supply(), 5 * UNIT);
        assert_eq!(book.len(), 1);
        assert_eq!(book.get(&bob), LockedBalance::EMPTY);
    }
}
