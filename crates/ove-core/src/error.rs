//! Error types for the OmniVE ledger and sync protocol.
use thiserror::Error;

use crate::types::ChainId;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ParseAddressError {
    #[error("address must be 40 hex digits, got {0}")] InvalidLength(usize),
    #[error("invalid hex in address")] InvalidHex,
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum AssetError {
    #[error("insufficient balance: have {have}, need {need}")] InsufficientBalance { have: u128, need: u128 },
    #[error("insufficient allowance: have {have}, need {need}")] InsufficientAllowance { have: u128, need: u128 },
    #[error("asset balance overflow")] Overflow,
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum LockError {
    #[error("invalid lock state: {0}")] InvalidLockState(&'static str),
    #[error("amount must be non-zero")] ZeroAmount,
    #[error("too early: {0}")] TooEarly(&'static str),
    #[error("lock expired at {unlock_time}")] ExpiredLock { unlock_time: u64 },
    #[error("unlock time {unlock_time} is not in the future")] UnlockTimeInPast { unlock_time: u64 },
    #[error("unlock time {unlock_time} exceeds maximum {max}")] UnlockTimeTooFar { unlock_time: u64, max: u64 },
    #[error("locked amount overflow")] AmountOverflow,
    #[error("asset transfer failed: {0}")] Asset(#[from] AssetError),
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum QueryError {
    #[error("block {block} is beyond the current head {head}")] FutureBlock { block: u64, head: u64 },
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum SyncError {
    #[error("insufficient fee: paid {paid}, required {required}")] InsufficientFee { paid: u128, required: u128 },
    #[error("gas limit {gas_limit} below minimum {min} for chain {dst}")] GasBelowMinimum { dst: ChainId, gas_limit: u64, min: u64 },
    #[error("minimum destination gas not set for chain {dst}, packet type {packet_type}")] MinGasNotSet { dst: ChainId, packet_type: u16 },
    #[error("untrusted source chain {0}")] UntrustedSource(ChainId),
    #[error("invalid payload: {0}")] InvalidPayload(String),
    #[error("transport: {0}")] Transport(String),
}

#[derive(Error, Debug)]
pub enum OveError {
    #[error(transparent)] Lock(#[from] LockError),
    #[error(transparent)] Asset(#[from] AssetError),
    #[error(transparent)] Query(#[from] QueryError),
    #[error(transparent)] Sync(#[from] SyncError),
    #[error(transparent)] Address(#[from] ParseAddressError),
    #[error("unknown chain: {0}")] UnknownChain(ChainId),
    #[error("config: {0}")] Config(String),
    #[error("rpc: {0}")] Rpc(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn messages_carry_context() {
        let err = SyncError::InsufficientFee { paid: 1, required: 2 };
        assert_eq!(err.to_string(), "insufficient fee: paid 1, required 2");

        let err = LockError::TooEarly("unlock time can only increase");
        assert!(err.to_string().contains("unlock time can only increase"));
    }

    #[test]
    fn umbrella_converts_transparently() {
        let err: OveError = QueryError::FutureBlock { block: 9, head: 3 }.into();
        assert_eq!(err.to_string(), "block 9 is beyond the current head 3");

        let err: OveError = LockError::from(AssetError::Overflow).into();
        assert!(matches!(err, OveError::Lock(LockError::Asset(AssetError::Overflow))));
    }
}
