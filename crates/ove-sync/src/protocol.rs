//! Wire format of ledger sync messages.
//!
//! All payloads are MAGIC_BYTES prefix + bincode body, bounded by
//! [`MAX_PAYLOAD_SIZE`]. A message carries the source's latest global point,
//! optionally one user's latest point and lock, the source head, and the
//! pending slope changes the destination needs to replay supply forward.

use serde::{Deserialize, Serialize};

use ove_core::constants::{
    floor_week, MAGIC_BYTES, MAXTIME, MAX_CHECKPOINT_WEEKS, MAX_PAYLOAD_SIZE, PT_SYNC, WEEK,
};
use ove_core::error::SyncError;
use ove_core::traits::AssetLedger;
use ove_core::types::{Address, BlockContext, ChainId, LockedBalance};
use ove_decay::{LedgerView, Point};
use ove_escrow::VotingEscrow;

/// One user's state at a given user epoch.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, bincode::Encode, bincode::Decode)]
pub struct UserSnapshot {
    pub user: Address,
    pub epoch: u64,
    pub point: Point,
    pub locked: LockedBalance,
}

/// A snapshot of the source ledger sent to one destination.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, bincode::Encode, bincode::Decode)]
pub struct SyncMessage {
    /// Always [`PT_SYNC`].
    pub packet_type: u16,
    /// Source global epoch of `point`.
    pub epoch: u64,
    /// Source global point at `epoch`.
    pub point: Point,
    pub user: Option<UserSnapshot>,
    /// Source chain head when the message was built.
    pub source_head: BlockContext,
    /// Scheduled slope changes after `floor_week(point.timestamp)`.
    pub slope_changes: Vec<(u64, i128)>,
}

impl SyncMessage {
    /// Snapshot `escrow`'s current state, including `user`'s if given.
    pub fn snapshot<A: AssetLedger>(
        escrow: &VotingEscrow<A>,
        user: Option<&Address>,
        head: &BlockContext,
    ) -> Self {
        let epoch = escrow.epoch();
        let point = escrow.point_history(epoch);
        let from = floor_week(point.timestamp);
        let slope_changes = escrow.slope_schedule().window(from, from + MAXTIME + WEEK);
        let user = user.map(|u| {
            let user_epoch = escrow.user_point_epoch(u);
            UserSnapshot {
                user: *u,
                epoch: user_epoch,
                point: escrow.user_point_history(u, user_epoch),
                locked: escrow.locked(u),
            }
        });
        Self {
            packet_type: PT_SYNC,
            epoch,
            point,
            user,
            source_head: *head,
            slope_changes,
        }
    }

    /// Check structural constraints before encoding or after decoding.
    pub fn validate(&self) -> Result<(), SyncError> {
        if self.packet_type != PT_SYNC {
            return Err(invalid(format!("unknown packet type {}", self.packet_type)));
        }
        check_point(&self.point)?;
        if let Some(u) = &self.user {
            check_point(&u.point)?;
        }
        if self.slope_changes.len() > MAX_CHECKPOINT_WEEKS as usize {
            return Err(invalid(format!(
                "{} slope changes exceed {MAX_CHECKPOINT_WEEKS}",
                self.slope_changes.len()
            )));
        }
        let mut prev = floor_week(self.point.timestamp);
        for (t, _) in &self.slope_changes {
            if *t <= prev || *t % WEEK != 0 {
                return Err(invalid(format!("slope change at {t} out of order or unaligned")));
            }
            prev = *t;
        }
        Ok(())
    }

    /// Encode as MAGIC_BYTES + bincode payload.
    pub fn encode(&self) -> Result<Vec<u8>, SyncError> {
        self.validate()?;
        let payload = bincode::encode_to_vec(self, wire_config())
            .map_err(|e| invalid(format!("encode error: {e}")))?;
        let total_size = MAGIC_BYTES.len() + payload.len();
        if total_size > MAX_PAYLOAD_SIZE {
            return Err(invalid(format!("payload of {total_size} bytes too large")));
        }
        let mut buf = Vec::with_capacity(total_size);
        buf.extend_from_slice(&MAGIC_BYTES);
        buf.extend_from_slice(&payload);
        Ok(buf)
    }

    /// Decode from MAGIC_BYTES + bincode payload.
    pub fn decode(data: &[u8]) -> Result<Self, SyncError> {
        if data.len() > MAX_PAYLOAD_SIZE {
            return Err(invalid(format!("payload of {} bytes too large", data.len())));
        }
        if data.len() < MAGIC_BYTES.len() || data[..MAGIC_BYTES.len()] != MAGIC_BYTES {
            return Err(invalid("bad magic".to_string()));
        }
        let (msg, _): (Self, usize) =
            bincode::decode_from_slice(&data[MAGIC_BYTES.len()..], wire_config())
                .map_err(|e| invalid(format!("decode error: {e}")))?;
        msg.validate()?;
        Ok(msg)
    }
}

/// Completion signal emitted on the destination after a sync is applied.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SyncConfirmation {
    /// Chain the state came from.
    pub src: ChainId,
    /// Source global epoch now mirrored.
    pub epoch: u64,
    /// User whose state was applied, if any.
    pub user: Option<Address>,
    /// Source user epoch now mirrored (0 without a user).
    pub user_epoch: u64,
}

/// Decoding never claims more memory than a payload may occupy, whatever
/// length prefixes the bytes carry.
fn wire_config() -> impl bincode::config::Config {
    bincode::config::standard().with_limit::<MAX_PAYLOAD_SIZE>()
}

fn invalid(msg: String) -> SyncError {
    SyncError::InvalidPayload(msg)
}

fn check_point(point: &Point) -> Result<(), SyncError> {
    if point.bias < 0 || point.slope > 0 {
        return Err(invalid(format!(
            "point out of range: bias {} slope {}",
            point.bias, point.slope
        )));
    }
    Ok(())
}
