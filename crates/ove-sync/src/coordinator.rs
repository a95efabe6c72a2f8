//! Source-side sync coordinator.
//!
//! Admits, prices, and dispatches [`SyncMessage`]s through a
//! [`MessageTransport`], and tracks two views per destination:
//!
//! - *intended*: the newest epochs handed to the transport, advanced
//!   optimistically on every successful dispatch;
//! - *confirmed*: the newest epochs the destination reported as applied.
//!
//! Both views only move forward. Delivery may fail or reorder after
//! dispatch, so the intended view can run ahead of the confirmed one.

use std::collections::HashMap;

use ove_core::constants::PT_SYNC;
use ove_core::error::SyncError;
use ove_core::traits::MessageTransport;
use ove_core::types::{Address, ChainId};
use tracing::{debug, info};

use crate::protocol::SyncMessage;

/// Outcome of a dispatched sync.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SyncReceipt {
    pub dst: ChainId,
    /// Source global epoch sent.
    pub epoch: u64,
    /// User and user epoch sent, if any.
    pub user: Option<(Address, u64)>,
    pub message_id: [u8; 32],
    pub nonce: u64,
    pub fee: u128,
    pub refunded: u128,
}

/// Per-destination sync bookkeeping for one source ledger.
#[derive(Debug, Clone, Default)]
pub struct SyncCoordinator {
    min_dst_gas: HashMap<(ChainId, u16), u64>,
    epoch_synced: HashMap<ChainId, u64>,
    user_epoch_synced: HashMap<(ChainId, Address), u64>,
    epoch_confirmed: HashMap<ChainId, u64>,
    user_epoch_confirmed: HashMap<(ChainId, Address), u64>,
}

fn advance<K: std::hash::Hash + Eq>(map: &mut HashMap<K, u64>, key: K, epoch: u64) {
    let entry = map.entry(key).or_insert(0);
    *entry = (*entry).max(epoch);
}

impl SyncCoordinator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the minimum gas limit accepted for `packet_type` messages to `dst`.
    pub fn set_min_dst_gas(&mut self, dst: ChainId, packet_type: u16, gas: u64) {
        self.min_dst_gas.insert((dst, packet_type), gas);
        info!(%dst, packet_type, gas, "min destination gas set");
    }

    pub fn min_dst_gas(&self, dst: ChainId, packet_type: u16) -> Option<u64> {
        self.min_dst_gas.get(&(dst, packet_type)).copied()
    }

    /// Last global epoch dispatched to `dst`.
    pub fn epoch_synced(&self, dst: ChainId) -> u64 {
        self.epoch_synced.get(&dst).copied().unwrap_or(0)
    }

    /// Last epoch of `user` dispatched to `dst`.
    pub fn user_point_epoch_synced(&self, dst: ChainId, user: &Address) -> u64 {
        self.user_epoch_synced.get(&(dst, *user)).copied().unwrap_or(0)
    }

    /// Last global epoch `dst` confirmed as applied.
    pub fn epoch_confirmed(&self, dst: ChainId) -> u64 {
        self.epoch_confirmed.get(&dst).copied().unwrap_or(0)
    }

    /// Last epoch of `user` that `dst` confirmed as applied.
    pub fn user_point_epoch_confirmed(&self, dst: ChainId, user: &Address) -> u64 {
        self.user_epoch_confirmed.get(&(dst, *user)).copied().unwrap_or(0)
    }

    /// Fee the transport charges to deliver `message` to `dst`.
    pub fn estimate_fee<T: MessageTransport + ?Sized>(
        &self,
        transport: &T,
        dst: ChainId,
        message: &SyncMessage,
        gas_limit: u64,
    ) -> Result<u128, SyncError> {
        let payload = message.encode()?;
        transport.estimate_fee(dst, &payload, gas_limit)
    }

    /// Dispatch `message` to `dst`, paying `paid` with any excess refunded
    /// to `refund_address`.
    ///
    /// Checks run in order: gas admission, payload encoding, fee. Nothing is
    /// recorded unless the transport accepts the message.
    pub fn sync<T: MessageTransport + ?Sized>(
        &mut self,
        transport: &T,
        dst: ChainId,
        message: &SyncMessage,
        refund_address: &Address,
        gas_limit: u64,
        paid: u128,
    ) -> Result<SyncReceipt, SyncError> {
        let min = self.min_dst_gas(dst, PT_SYNC).ok_or(SyncError::MinGasNotSet {
            dst,
            packet_type: PT_SYNC,
        })?;
        if gas_limit < min {
            return Err(SyncError::GasBelowMinimum { dst, gas_limit, min });
        }

        let payload = message.encode()?;
        let fee = transport.estimate_fee(dst, &payload, gas_limit)?;
        if paid < fee {
            return Err(SyncError::InsufficientFee {
                paid,
                required: fee,
            });
        }
        let size = payload.len();
        let sent = transport.send(dst, payload, refund_address, gas_limit, paid)?;

        advance(&mut self.epoch_synced, dst, message.epoch);
        let user = message.user.as_ref().map(|u| {
            advance(&mut self.user_epoch_synced, (dst, u.user), u.epoch);
            (u.user, u.epoch)
        });
        info!(
            %dst,
            epoch = message.epoch,
            user = ?user.map(|(u, _)| u.to_string()),
            nonce = sent.nonce,
            fee = sent.fee,
            size,
            "sync dispatched"
        );
        Ok(SyncReceipt {
            dst,
            epoch: message.epoch,
            user,
            message_id: sent.message_id,
            nonce: sent.nonce,
            fee: sent.fee,
            refunded: sent.refunded,
        })
    }

    /// Record that `dst` applied state up to `epoch` (and `user_epoch` for
    /// `user`). Older reports are ignored.
    pub fn confirm(&mut self, dst: ChainId, epoch: u64, user: Option<&Address>, user_epoch: u64) {
        advance(&mut self.epoch_confirmed, dst, epoch);
        if let Some(u) = user {
            advance(&mut self.user_epoch_confirmed, (dst, *u), user_epoch);
        }
        debug!(%dst, epoch, user_epoch, "sync confirmed");
    }
}
