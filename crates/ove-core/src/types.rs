//! Core ledger types: accounts, chain identifiers, block context, locks.
//!
//! Timestamps are Unix seconds, block numbers are host-chain heights, and
//! asset amounts are `u128` base units.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::constants::floor_week;
use crate::error::ParseAddressError;

/// A 20-byte account address.
#[derive(
    Serialize, Deserialize, Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Default,
    bincode::Encode, bincode::Decode,
)]
pub struct Address(pub [u8; 20]);

impl Address {
    /// The zero address.
    pub const ZERO: Self = Self([0u8; 20]);

    /// Deterministic address derived from a human-readable label.
    ///
    /// Used for devnet accounts and test fixtures: the first 20 bytes of
    /// `BLAKE3(label)`.
    pub fn from_label(label: &str) -> Self {
        let hash = blake3::hash(label.as_bytes());
        let mut bytes = [0u8; 20];
        bytes.copy_from_slice(&hash.as_bytes()[..20]);
        Self(bytes)
    }

    /// Return the underlying bytes.
    pub fn as_bytes(&self) -> &[u8; 20] {
        &self.0
    }

    pub fn is_zero(&self) -> bool {
        self.0 == [0u8; 20]
    }
}

impl fmt::Display for Address {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "0x{}", hex::encode(self.0))
    }
}

impl FromStr for Address {
    type Err = ParseAddressError;

    /// Parse a 40-character hex string, with or without a `0x` prefix.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let digits = s.strip_prefix("0x").unwrap_or(s);
        if digits.len() != 40 {
            return Err(ParseAddressError::InvalidLength(digits.len()));
        }
        let bytes = hex::decode(digits).map_err(|_| ParseAddressError::InvalidHex)?;
        let mut out = [0u8; 20];
        out.copy_from_slice(&bytes);
        Ok(Self(out))
    }
}

impl From<[u8; 20]> for Address {
    fn from(bytes: [u8; 20]) -> Self {
        Self(bytes)
    }
}

/// Identifier of a chain reachable through the message transport.
#[derive(
    Serialize, Deserialize, Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Default,
    bincode::Encode, bincode::Decode,
)]
pub struct ChainId(pub u16);

impl fmt::Display for ChainId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// The host chain's current block, as seen by the executing transaction.
#[derive(
    Serialize, Deserialize, Clone, Copy, Debug, PartialEq, Eq, Default,
    bincode::Encode, bincode::Decode,
)]
pub struct BlockContext {
    /// Block height.
    pub number: u64,
    /// Block timestamp (Unix seconds).
    pub timestamp: u64,
}

impl BlockContext {
    pub fn new(number: u64, timestamp: u64) -> Self {
        Self { number, timestamp }
    }

    /// The context `blocks` blocks later, each `block_time` seconds apart.
    pub fn advance(&self, blocks: u64, block_time: u64) -> Self {
        Self {
            number: self.number + blocks,
            timestamp: self.timestamp + blocks * block_time,
        }
    }
}

/// A user's locked position.
///
/// `amount == 0` denotes "no active lock". `unlock_time` is always
/// week-aligned.
#[derive(
    Serialize, Deserialize, Clone, Copy, Debug, PartialEq, Eq, Default,
    bincode::Encode, bincode::Decode,
)]
pub struct LockedBalance {
    /// Locked asset amount in base units.
    pub amount: u128,
    /// Week-aligned unlock timestamp.
    pub unlock_time: u64,
}

impl LockedBalance {
    /// The empty position.
    pub const EMPTY: Self = Self {
        amount: 0,
        unlock_time: 0,
    };

    /// Create a position, rounding `unlock_time` down to a week boundary.
    pub fn new(amount: u128, unlock_time: u64) -> Self {
        Self {
            amount,
            unlock_time: floor_week(unlock_time),
        }
    }

    pub fn is_active(&self) -> bool {
        self.amount > 0
    }

    /// Whether the lock has reached its unlock time at `now`.
    pub fn is_expired(&self, now: u64) -> bool {
        self.unlock_time <= now
    }
}
