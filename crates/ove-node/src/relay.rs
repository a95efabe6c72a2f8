//! In-process message relay connecting the devnet chains.
//!
//! [`LocalRelay`] is the shared bus: every chain holds a [`RelayEndpoint`]
//! that implements [`MessageTransport`] for its own outbound traffic. Sent
//! payloads wait in one FIFO queue per (source, destination) channel until
//! the devnet drains them, so ordering holds within a channel but not across
//! channels.

use std::collections::{BTreeMap, HashMap, HashSet, VecDeque};
use std::sync::Arc;

use parking_lot::Mutex;
use tracing::{debug, warn};

use ove_core::error::SyncError;
use ove_core::traits::{MessageTransport, SendReceipt};
use ove_core::types::{Address, ChainId};

use crate::config::RelayConfig;

/// A message in flight.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Envelope {
    pub src: ChainId,
    pub dst: ChainId,
    pub nonce: u64,
    pub message_id: [u8; 32],
    pub gas_limit: u64,
    pub payload: Vec<u8>,
}

#[derive(Debug, Default)]
struct RelayState {
    // BTreeMap keeps drain order deterministic across channels.
    queues: BTreeMap<(ChainId, ChainId), VecDeque<Envelope>>,
    nonces: HashMap<(ChainId, ChainId), u64>,
    refunds: HashMap<Address, u128>,
    fees_collected: u128,
}

/// Shared relay between every chain in a devnet.
#[derive(Debug)]
pub struct LocalRelay {
    fees: RelayConfig,
    routes: Mutex<HashSet<ChainId>>,
    state: Mutex<RelayState>,
}

impl LocalRelay {
    pub fn new(fees: RelayConfig) -> Arc<Self> {
        Arc::new(Self {
            fees,
            routes: Mutex::new(HashSet::new()),
            state: Mutex::new(RelayState::default()),
        })
    }

    /// Register `chain` and return its outbound endpoint.
    pub fn endpoint(self: &Arc<Self>, chain: ChainId) -> RelayEndpoint {
        self.routes.lock().insert(chain);
        RelayEndpoint {
            src: chain,
            relay: Arc::clone(self),
        }
    }

    /// Fee for a payload of `len` bytes with `gas_limit`.
    pub fn quote(&self, len: usize, gas_limit: u64) -> u128 {
        u128::from(self.fees.base_fee)
            + u128::from(self.fees.fee_per_byte) * len as u128
            + u128::from(self.fees.gas_price) * u128::from(gas_limit)
    }

    fn has_route(&self, chain: ChainId) -> bool {
        self.routes.lock().contains(&chain)
    }

    fn enqueue(
        &self,
        src: ChainId,
        dst: ChainId,
        payload: Vec<u8>,
        refund_address: &Address,
        gas_limit: u64,
        value: u128,
    ) -> Result<SendReceipt, SyncError> {
        if !self.has_route(dst) {
            return Err(SyncError::Transport(format!("no route to chain {dst}")));
        }
        let fee = self.quote(payload.len(), gas_limit);
        if value < fee {
            return Err(SyncError::InsufficientFee {
                paid: value,
                required: fee,
            });
        }
        let refunded = value - fee;

        let mut state = self.state.lock();
        let nonce = {
            let n = state.nonces.entry((src, dst)).or_insert(0);
            *n += 1;
            *n
        };
        let message_id = message_id(src, dst, nonce, &payload);
        if refunded > 0 {
            *state.refunds.entry(*refund_address).or_insert(0) += refunded;
        }
        state.fees_collected += fee;
        debug!(
            %src,
            %dst,
            nonce,
            size = payload.len(),
            fee,
            refunded,
            "message queued"
        );
        state.queues.entry((src, dst)).or_default().push_back(Envelope {
            src,
            dst,
            nonce,
            message_id,
            gas_limit,
            payload,
        });
        Ok(SendReceipt {
            message_id,
            nonce,
            fee,
            refunded,
        })
    }

    /// Messages waiting on the `src` to `dst` channel.
    pub fn pending(&self, src: ChainId, dst: ChainId) -> usize {
        self.state.lock().queues.get(&(src, dst)).map_or(0, VecDeque::len)
    }

    pub fn total_pending(&self) -> usize {
        self.state.lock().queues.values().map(VecDeque::len).sum()
    }

    /// Pop the oldest message on one channel.
    pub fn take(&self, src: ChainId, dst: ChainId) -> Option<Envelope> {
        self.state.lock().queues.get_mut(&(src, dst))?.pop_front()
    }

    /// Pop every queued message, each channel in send order.
    pub fn drain(&self) -> Vec<Envelope> {
        let mut state = self.state.lock();
        state.queues.values_mut().flat_map(|q| q.drain(..)).collect()
    }

    /// Put an envelope back at the head of its channel for redelivery.
    pub fn requeue(&self, envelope: Envelope) {
        warn!(
            src = %envelope.src,
            dst = %envelope.dst,
            nonce = envelope.nonce,
            "message requeued"
        );
        self.state
            .lock()
            .queues
            .entry((envelope.src, envelope.dst))
            .or_default()
            .push_front(envelope);
    }

    /// Total value refunded to `address` so far.
    pub fn refunded(&self, address: &Address) -> u128 {
        self.state.lock().refunds.get(address).copied().unwrap_or(0)
    }

    pub fn fees_collected(&self) -> u128 {
        self.state.lock().fees_collected
    }
}

fn message_id(src: ChainId, dst: ChainId, nonce: u64, payload: &[u8]) -> [u8; 32] {
    let mut hasher = blake3::Hasher::new();
    hasher.update(&src.0.to_le_bytes());
    hasher.update(&dst.0.to_le_bytes());
    hasher.update(&nonce.to_le_bytes());
    hasher.update(payload);
    *hasher.finalize().as_bytes()
}

/// One chain's view of the relay.
#[derive(Debug, Clone)]
pub struct RelayEndpoint {
    src: ChainId,
    relay: Arc<LocalRelay>,
}

impl RelayEndpoint {
    pub fn src(&self) -> ChainId {
        self.src
    }

    pub fn relay(&self) -> &Arc<LocalRelay> {
        &self.relay
    }
}

impl MessageTransport for RelayEndpoint {
    fn estimate_fee(&self, dst: ChainId, payload: &[u8], gas_limit: u64) -> Result<u128, SyncError> {
        if !self.relay.has_route(dst) {
            return Err(SyncError::Transport(format!("no route to chain {dst}")));
        }
        Ok(self.relay.quote(payload.len(), gas_limit))
    }

    fn send(
        &self,
        dst: ChainId,
        payload: Vec<u8>,
        refund_address: &Address,
        gas_limit: u64,
        value: u128,
    ) -> Result<SendReceipt, SyncError> {
        self.relay
            .enqueue(self.src, dst, payload, refund_address, gas_limit, value)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const A: ChainId = ChainId(1);
    const B: ChainId = ChainId(2);
    const C: ChainId = ChainId(3);

    fn fees() -> RelayConfig {
        RelayConfig {
            base_fee: 100,
            fee_per_byte: 2,
            gas_price: 1,
        }
    }

    fn refund() -> Address {
        Address::from_label("refund")
    }

    #[test]
    fn quote_is_linear() {
        let relay = LocalRelay::new(fees());
        assert_eq!(relay.quote(0, 0), 100);
        assert_eq!(relay.quote(10, 1_000), 100 + 20 + 1_000);
    }

    #[test]
    fn estimate_matches_send_fee() {
        let relay = LocalRelay::new(fees());
        let a = relay.endpoint(A);
        relay.endpoint(B);
        let fee = a.estimate_fee(B, b"hello", 500).unwrap();
        let receipt = a.send(B, b"hello".to_vec(), &refund(), 500, fee + 7).unwrap();
        assert_eq!(receipt.fee, fee);
        assert_eq!(receipt.refunded, 7);
        assert_eq!(relay.refunded(&refund()), 7);
        assert_eq!(relay.fees_collected(), fee);
    }

    #[test]
    fn underpaid_send_has_no_side_effects() {
        let relay = LocalRelay::new(fees());
        let a = relay.endpoint(A);
        relay.endpoint(B);
        let err = a.send(B, vec![0; 4], &refund(), 0, 107).unwrap_err();
        assert_eq!(err, SyncError::InsufficientFee { paid: 107, required: 108 });
        assert_eq!(relay.total_pending(), 0);
        assert_eq!(relay.fees_collected(), 0);
        assert_eq!(relay.refunded(&refund()), 0);
    }

    #[test]
    fn unknown_destination_rejected() {
        let relay = LocalRelay::new(fees());
        let a = relay.endpoint(A);
        assert!(matches!(a.estimate_fee(C, &[], 0), Err(SyncError::Transport(_))));
        assert!(matches!(
            a.send(C, vec![], &refund(), 0, 1_000),
            Err(SyncError::Transport(_))
        ));
    }

    #[test]
    fn channels_are_fifo_with_independent_nonces() {
        let relay = LocalRelay::new(fees());
        let a = relay.endpoint(A);
        let b = relay.endpoint(B);
        relay.endpoint(C);
        for i in 0..3u8 {
            a.send(B, vec![i], &refund(), 0, 1_000).unwrap();
        }
        a.send(C, vec![9], &refund(), 0, 1_000).unwrap();
        b.send(A, vec![8], &refund(), 0, 1_000).unwrap();

        assert_eq!(relay.pending(A, B), 3);
        assert_eq!(relay.pending(A, C), 1);
        let first = relay.take(A, B).unwrap();
        assert_eq!((first.nonce, first.payload.clone()), (1, vec![0]));
        assert_eq!(relay.take(A, C).unwrap().nonce, 1);

        let rest = relay.drain();
        let ab: Vec<_> = rest.iter().filter(|e| e.dst == B).map(|e| e.nonce).collect();
        assert_eq!(ab, vec![2, 3]);
        assert_eq!(rest.len(), 3);
        assert_eq!(relay.total_pending(), 0);
    }

    #[test]
    fn requeued_envelope_is_delivered_first() {
        let relay = LocalRelay::new(fees());
        let a = relay.endpoint(A);
        relay.endpoint(B);
        a.send(B, vec![1], &refund(), 0, 1_000).unwrap();
        a.send(B, vec![2], &refund(), 0, 1_000).unwrap();
        let first = relay.take(A, B).unwrap();
        relay.requeue(first.clone());
        assert_eq!(relay.take(A, B).unwrap(), first);
    }

    #[test]
    fn message_ids_are_distinct_per_nonce() {
        let relay = LocalRelay::new(fees());
        let a = relay.endpoint(A);
        relay.endpoint(B);
        let r1 = a.send(B, vec![1], &refund(), 0, 1_000).unwrap();
        let r2 = a.send(B, vec![1], &refund(), 0, 1_000).unwrap();
        assert_ne!(r1.message_id, r2.message_id);
    }
}
