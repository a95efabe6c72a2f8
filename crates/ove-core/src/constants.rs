//! Protocol constants. All asset amounts are in base units (1 token = 10^18 units).

/// One whole token in base units.
pub const UNIT: u128 = 1_000_000_000_000_000_000;

/// Decimal places of the asset and of escrowed voting power.
pub const DECIMALS: u8 = 18;

pub const HOUR: u64 = 3_600;
pub const DAY: u64 = 86_400;

/// Lock alignment and checkpoint replay granularity.
pub const WEEK: u64 = 7 * DAY;

/// Longest permitted lock duration.
pub const MAXTIME: u64 = 2 * 365 * DAY;

/// Upper bound on week steps replayed by a single checkpoint or supply query.
///
/// Every lock ends at most `MAXTIME` after it was last checkpointed, so after
/// this many steps the schedule holds no further changes.
///
/// # Examples
///
/// ```
/// use ove_core::constants::{MAX_CHECKPOINT_WEEKS, MAXTIME, WEEK};
/// assert_eq!(MAX_CHECKPOINT_WEEKS, 105);
/// assert!(MAX_CHECKPOINT_WEEKS * WEEK > MAXTIME);
/// ```
pub const MAX_CHECKPOINT_WEEKS: u64 = MAXTIME / WEEK + 1;

/// Fixed-point scale for the blocks-per-second estimate used while replaying.
pub const MULTIPLIER: u128 = 1_000_000_000_000_000_000;

/// Packet type of a ledger sync message.
pub const PT_SYNC: u16 = 0;

/// Four-byte prefix on every encoded sync payload.
pub const MAGIC_BYTES: [u8; 4] = [0x4F, 0x56, 0x45, 0x31]; // "OVE1"

/// Maximum encoded sync payload size in bytes.
pub const MAX_PAYLOAD_SIZE: usize = 16 * 1024;

pub const DEFAULT_RPC_PORT: u16 = 19_545;
pub const DEFAULT_BLOCK_TIME_SECS: u64 = 12;

/// Round a timestamp down to the start of its week.
///
/// # Examples
///
/// ```
/// use ove_core::constants::{floor_week, WEEK};
/// assert_eq!(floor_week(WEEK * 3 + 17), WEEK * 3);
/// assert_eq!(floor_week(WEEK * 3), WEEK * 3);
/// ```
pub const fn floor_week(timestamp: u64) -> u64 {
    timestamp / WEEK * WEEK
}
