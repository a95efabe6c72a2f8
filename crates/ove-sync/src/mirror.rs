//! Destination-side mirrors of remote ledgers.
//!
//! A [`Mirror`] holds the sparse history of one source chain as delivered
//! by sync messages, and answers the same queries as the source through
//! [`LedgerView`]. Block numbers in a mirror are source-chain blocks.
//!
//! Application is idempotent: a message whose global epoch is not newer
//! than the last one applied from that source is discarded as stale.
//! Duplicates, replays and reordering from at-least-once delivery all land
//! there.

use std::collections::{HashMap, HashSet};

use ove_core::constants::floor_week;
use ove_core::error::SyncError;
use ove_core::types::{Address, BlockContext, ChainId, LockedBalance};
use ove_decay::{Checkpoints, LedgerView, PointHistory, SlopeSchedule};
use tokio::sync::broadcast;
use tracing::{debug, info, warn};

use crate::protocol::{SyncConfirmation, SyncMessage};

/// Default capacity of the confirmation broadcast channel.
pub const CONFIRMATION_CHANNEL_CAPACITY: usize = 256;

/// What happened to a delivered sync message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReceiveOutcome {
    /// The message advanced the mirror.
    Applied(SyncConfirmation),
    /// The mirror already holds `stored >= incoming`; nothing changed.
    Stale {
        src: ChainId,
        incoming: u64,
        stored: u64,
    },
}

/// Mirrored state of one source chain.
#[derive(Debug, Clone)]
pub struct Mirror {
    src: ChainId,
    checkpoints: Checkpoints,
    locked: HashMap<Address, LockedBalance>,
    source_head: BlockContext,
}

impl Mirror {
    pub fn new(src: ChainId) -> Self {
        Self {
            src,
            checkpoints: Checkpoints::empty(),
            locked: HashMap::new(),
            source_head: BlockContext::default(),
        }
    }

    pub fn src(&self) -> ChainId {
        self.src
    }

    /// Mirrored lock of `user`.
    pub fn locked(&self, user: &Address) -> LockedBalance {
        self.locked.get(user).copied().unwrap_or(LockedBalance::EMPTY)
    }

    /// Source head as of the newest applied message.
    pub fn source_head(&self) -> BlockContext {
        self.source_head
    }

    /// Apply `msg` unless it is stale.
    pub fn apply(&mut self, msg: &SyncMessage) -> ReceiveOutcome {
        let stored = self.epoch();
        if msg.epoch <= stored {
            return ReceiveOutcome::Stale {
                src: self.src,
                incoming: msg.epoch,
                stored,
            };
        }

        self.checkpoints.global_mut().insert(msg.epoch, msg.point);
        self.checkpoints
            .schedule_mut()
            .replace_after(floor_week(msg.point.timestamp), msg.slope_changes.iter().copied());
        if msg.source_head.number >= self.source_head.number {
            self.source_head = msg.source_head;
        }

        let mut user = None;
        let mut user_epoch = 0;
        if let Some(u) = &msg.user {
            if self.checkpoints.user_mut(&u.user).insert(u.epoch, u.point) {
                if u.locked.is_active() {
                    self.locked.insert(u.user, u.locked);
                } else {
                    self.locked.remove(&u.user);
                }
                user = Some(u.user);
                user_epoch = u.epoch;
            } else {
                debug!(src = %self.src, user = %u.user, epoch = u.epoch, "stale user point skipped");
            }
        }

        ReceiveOutcome::Applied(SyncConfirmation {
            src: self.src,
            epoch: msg.epoch,
            user,
            user_epoch,
        })
    }
}

impl LedgerView for Mirror {
    fn global_history(&self) -> &PointHistory {
        self.checkpoints.global()
    }

    fn user_history(&self, user: &Address) -> Option<&PointHistory> {
        self.checkpoints.user(user)
    }

    fn slope_schedule(&self) -> &SlopeSchedule {
        self.checkpoints.schedule()
    }
}

/// All mirrors on one destination chain, plus the trusted-source list.
#[derive(Debug)]
pub struct MirrorSet {
    trusted: HashSet<ChainId>,
    mirrors: HashMap<ChainId, Mirror>,
    confirmations: broadcast::Sender<SyncConfirmation>,
}

impl Default for MirrorSet {
    fn default() -> Self {
        Self::new()
    }
}

impl MirrorSet {
    pub fn new() -> Self {
        let (confirmations, _) = broadcast::channel(CONFIRMATION_CHANNEL_CAPACITY);
        Self {
            trusted: HashSet::new(),
            mirrors: HashMap::new(),
            confirmations,
        }
    }

    /// Allow or stop accepting messages from `src`.
    pub fn set_trusted_remote(&mut self, src: ChainId, trusted: bool) {
        if trusted {
            self.trusted.insert(src);
        } else {
            self.trusted.remove(&src);
        }
        info!(%src, trusted, "trusted remote updated");
    }

    pub fn is_trusted(&self, src: ChainId) -> bool {
        self.trusted.contains(&src)
    }

    /// Mirror of `src`, if anything was ever applied from it.
    pub fn mirror(&self, src: ChainId) -> Option<&Mirror> {
        self.mirrors.get(&src)
    }

    pub fn sources(&self) -> impl Iterator<Item = ChainId> + '_ {
        self.mirrors.keys().copied()
    }

    /// Receive confirmations of applied syncs.
    pub fn subscribe(&self) -> broadcast::Receiver<SyncConfirmation> {
        self.confirmations.subscribe()
    }

    /// Handle a payload delivered from `src`.
    ///
    /// Errors are reserved for untrusted sources and malformed payloads;
    /// stale messages are an ordinary [`ReceiveOutcome::Stale`].
    pub fn receive(&mut self, src: ChainId, payload: &[u8]) -> Result<ReceiveOutcome, SyncError> {
        if !self.is_trusted(src) {
            warn!(%src, "delivery from untrusted source rejected");
            return Err(SyncError::UntrustedSource(src));
        }
        let msg = SyncMessage::decode(payload).inspect_err(|e| {
            warn!(%src, error = %e, "undecodable sync payload rejected");
        })?;

        let mirror = self.mirrors.entry(src).or_insert_with(|| Mirror::new(src));
        let outcome = mirror.apply(&msg);
        match &outcome {
            ReceiveOutcome::Applied(conf) => {
                info!(
                    %src,
                    epoch = conf.epoch,
                    user = ?conf.user.map(|u| u.to_string()),
                    user_epoch = conf.user_epoch,
                    "sync applied"
                );
                // No subscribers is fine.
                let _ = self.confirmations.send(conf.clone());
            }
            ReceiveOutcome::Stale { incoming, stored, .. } => {
                debug!(%src, incoming, stored, "stale sync discarded");
            }
        }
        Ok(outcome)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ove_core::asset::MemoryAsset;
    use ove_core::constants::{UNIT, WEEK};
    use ove_core::traits::AssetLedger;
    use ove_escrow::VotingEscrow;
    use proptest::prelude::*;

    const SRC: ChainId = ChainId(101);
    const T0: u64 = 2_600 * WEEK;

    struct Source {
        ve: VotingEscrow<MemoryAsset>,
        ctx: BlockContext,
    }

    fn alice() -> Address {
        Address::from_label("alice")
    }

    fn bob() -> Address {
        Address::from_label("bob")
    }

    impl Source {
        fn new() -> Self {
            let escrow = Address::from_label("escrow");
            let mut asset = MemoryAsset::new();
            for u in [alice(), bob()] {
                asset.mint(&u, 1_000 * UNIT).unwrap();
                asset.approve(&u, &escrow, u128::MAX);
            }
            let ctx = BlockContext::new(1, T0);
            Self {
                ve: VotingEscrow::new(escrow, asset, &ctx),
                ctx,
            }
        }

        fn tick(&mut self, blocks: u64) {
            self.ctx = self.ctx.advance(blocks, 12);
        }

        fn lock(&mut self, user: Address, weeks: u64) {
            self.tick(1);
            let unlock = self.ctx.timestamp + weeks * WEEK;
            self.ve.create_lock_for(&user, &user, 100 * UNIT, unlock, &self.ctx).unwrap();
        }

        fn payload(&self, user: Option<&Address>) -> Vec<u8> {
            SyncMessage::snapshot(&self.ve, user, &self.ctx).encode().unwrap()
        }
    }

    fn trusted_set() -> MirrorSet {
        let mut set = MirrorSet::new();
        set.set_trusted_remote(SRC, true);
        set
    }

    #[test]
    fn untrusted_source_rejected() {
        let src = Source::new();
        let mut set = MirrorSet::new();
        let err = set.receive(SRC, &src.payload(None)).unwrap_err();
        assert_eq!(err, SyncError::UntrustedSource(SRC));
        assert!(set.mirror(SRC).is_none());
    }

    #[test]
    fn garbage_payload_rejected() {
        let mut set = trusted_set();
        assert!(matches!(set.receive(SRC, b"nope"), Err(SyncError::InvalidPayload(_))));
    }

    #[test]
    fn applied_sync_matches_source_queries() {
        let mut src = Source::new();
        src.lock(alice(), 10);
        src.lock(bob(), 4);
        let mut set = trusted_set();
        let mut rx = set.subscribe();

        let outcome = set.receive(SRC, &src.payload(Some(&alice()))).unwrap();
        let conf = SyncConfirmation {
            src: SRC,
            epoch: src.ve.epoch(),
            user: Some(alice()),
            user_epoch: 1,
        };
        assert_eq!(outcome, ReceiveOutcome::Applied(conf.clone()));
        assert_eq!(rx.try_recv().unwrap(), conf);

        let m = set.mirror(SRC).unwrap();
        assert_eq!(m.locked(&alice()), src.ve.locked(&alice()));
        assert_eq!(m.source_head(), src.ctx);
        for offset in [0, 3 * WEEK, 5 * WEEK, 9 * WEEK, 20 * WEEK] {
            let t = src.ctx.timestamp + offset;
            assert_eq!(m.total_supply(t), src.ve.total_supply(t), "offset {offset}");
            assert_eq!(m.balance_of(&alice(), t), src.ve.balance_of(&alice(), t));
        }
        // Bob was never synced.
        assert_eq!(m.balance_of(&bob(), src.ctx.timestamp), 0);
    }

    #[test]
    fn duplicate_delivery_is_stale() {
        let mut src = Source::new();
        src.lock(alice(), 10);
        let payload = src.payload(Some(&alice()));
        let mut set = trusted_set();
        set.receive(SRC, &payload).unwrap();
        let epoch = src.ve.epoch();
        assert_eq!(
            set.receive(SRC, &payload).unwrap(),
            ReceiveOutcome::Stale {
                src: SRC,
                incoming: epoch,
                stored: epoch
            }
        );
        assert_eq!(set.mirror(SRC).unwrap().epoch(), epoch);
    }

    #[test]
    fn older_epoch_after_newer_is_discarded() {
        let mut src = Source::new();
        src.lock(alice(), 10);
        let old = src.payload(Some(&alice()));
        src.lock(bob(), 10);
        src.tick(5);
        src.ve.increase_amount(&alice(), UNIT, &src.ctx).unwrap();
        let new = src.payload(Some(&alice()));

        let mut set = trusted_set();
        set.receive(SRC, &new).unwrap();
        let stored = set.mirror(SRC).unwrap().epoch();
        assert!(matches!(set.receive(SRC, &old).unwrap(), ReceiveOutcome::Stale { .. }));
        let m = set.mirror(SRC).unwrap();
        assert_eq!(m.epoch(), stored);
        assert_eq!(m.user_point_epoch(&alice()), 2);
        assert_eq!(m.locked(&alice()).amount, 101 * UNIT);
    }

    #[test]
    fn global_only_sync_leaves_users_untouched() {
        let mut src = Source::new();
        src.lock(alice(), 10);
        let mut set = trusted_set();
        set.receive(SRC, &src.payload(Some(&alice()))).unwrap();
        src.lock(bob(), 10);
        let outcome = set.receive(SRC, &src.payload(None)).unwrap();
        match outcome {
            ReceiveOutcome::Applied(conf) => {
                assert_eq!(conf.user, None);
                assert_eq!(conf.user_epoch, 0);
            }
            other => panic!("unexpected {other:?}"),
        }
        let m = set.mirror(SRC).unwrap();
        assert_eq!(m.user_point_epoch(&alice()), 1);
        assert_eq!(m.total_supply(src.ctx.timestamp), src.ve.total_supply(src.ctx.timestamp));
    }

    #[test]
    fn historical_block_queries_use_source_blocks() {
        let mut src = Source::new();
        src.lock(alice(), 10);
        let block = src.ctx.number;
        let mut set = trusted_set();
        set.receive(SRC, &src.payload(Some(&alice()))).unwrap();
        let m = set.mirror(SRC).unwrap();
        let head = m.source_head();
        assert_eq!(
            m.balance_of_at(&alice(), block, &head).unwrap(),
            src.ve.balance_of_at(&alice(), block, &src.ctx).unwrap()
        );
        assert_eq!(m.total_supply_at(block - 1, &head).unwrap(), 0);
    }

    #[test]
    fn revoking_trust_blocks_further_messages() {
        let mut src = Source::new();
        src.lock(alice(), 10);
        let mut set = trusted_set();
        set.set_trusted_remote(SRC, false);
        assert!(set.receive(SRC, &src.payload(None)).is_err());
        assert!(!set.is_trusted(SRC));
    }

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(48))]

        #[test]
        fn any_delivery_order_converges(
            order in Just((0..6usize).collect::<Vec<_>>()).prop_shuffle(),
            dupes in proptest::collection::vec(0usize..6, 0..6),
        ) {
            let mut src = Source::new();
            let mut payloads = Vec::new();
            src.lock(alice(), 20);
            payloads.push(src.payload(Some(&alice())));
            for _ in 1..6 {
                src.tick(10);
                src.ve.increase_amount(&alice(), UNIT, &src.ctx).unwrap();
                payloads.push(src.payload(Some(&alice())));
            }

            let mut set = trusted_set();
            for i in order.iter().chain(dupes.iter()) {
                set.receive(SRC, &payloads[*i]).unwrap();
            }
            let m = set.mirror(SRC).unwrap();
            prop_assert_eq!(m.epoch(), src.ve.epoch());
            prop_assert_eq!(m.user_point_epoch(&alice()), 6);
            prop_assert_eq!(m.locked(&alice()), src.ve.locked(&alice()));
            let t = src.ctx.timestamp + WEEK;
            prop_assert_eq!(m.total_supply(t), src.ve.total_supply(t));
        }
    }
}
