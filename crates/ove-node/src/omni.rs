//! Omnichain voting escrow: a local ledger plus its sync endpoints.
//!
//! [`OmniVotingEscrow`] owns one chain's [`VotingEscrow`], the source-side
//! [`SyncCoordinator`] for pushing that ledger to other chains, and the
//! [`MirrorSet`] holding what other chains pushed here.

use ove_core::error::{LockError, SyncError};
use ove_core::traits::{AssetLedger, MessageTransport};
use ove_core::types::{Address, BlockContext, ChainId, LockedBalance};
use ove_escrow::VotingEscrow;
use ove_sync::{Mirror, MirrorSet, ReceiveOutcome, SyncConfirmation, SyncCoordinator, SyncMessage, SyncReceipt};

pub struct OmniVotingEscrow<A: AssetLedger, T: MessageTransport> {
    chain_id: ChainId,
    escrow: VotingEscrow<A>,
    coordinator: SyncCoordinator,
    mirrors: MirrorSet,
    transport: T,
}

impl<A: AssetLedger, T: MessageTransport> OmniVotingEscrow<A, T> {
    pub fn new(chain_id: ChainId, escrow: VotingEscrow<A>, transport: T) -> Self {
        Self {
            chain_id,
            escrow,
            coordinator: SyncCoordinator::new(),
            mirrors: MirrorSet::new(),
            transport,
        }
    }

    pub fn chain_id(&self) -> ChainId {
        self.chain_id
    }

    pub fn escrow(&self) -> &VotingEscrow<A> {
        &self.escrow
    }

    pub fn escrow_mut(&mut self) -> &mut VotingEscrow<A> {
        &mut self.escrow
    }

    pub fn coordinator(&self) -> &SyncCoordinator {
        &self.coordinator
    }

    pub fn mirrors(&self) -> &MirrorSet {
        &self.mirrors
    }

    pub fn transport(&self) -> &T {
        &self.transport
    }

    /// Mirror of `src`'s ledger, if anything has been received from it.
    pub fn mirror(&self, src: ChainId) -> Option<&Mirror> {
        self.mirrors.mirror(src)
    }

    // --- lock surface ---------------------------------------------------

    pub fn create_lock_for(
        &mut self,
        payer: &Address,
        beneficiary: &Address,
        amount: u128,
        unlock_time: u64,
        ctx: &BlockContext,
    ) -> Result<LockedBalance, LockError> {
        self.escrow.create_lock_for(payer, beneficiary, amount, unlock_time, ctx)
    }

    pub fn increase_amount(
        &mut self,
        owner: &Address,
        extra: u128,
        ctx: &BlockContext,
    ) -> Result<LockedBalance, LockError> {
        self.escrow.increase_amount(owner, extra, ctx)
    }

    pub fn increase_amount_for(
        &mut self,
        payer: &Address,
        owner: &Address,
        extra: u128,
        ctx: &BlockContext,
    ) -> Result<LockedBalance, LockError> {
        self.escrow.increase_amount_for(payer, owner, extra, ctx)
    }

    pub fn increase_unlock_time(
        &mut self,
        owner: &Address,
        unlock_time: u64,
        ctx: &BlockContext,
    ) -> Result<LockedBalance, LockError> {
        self.escrow.increase_unlock_time(owner, unlock_time, ctx)
    }

    pub fn withdraw(&mut self, owner: &Address, ctx: &BlockContext) -> Result<u128, LockError> {
        self.escrow.withdraw(owner, ctx)
    }

    // --- sync surface ---------------------------------------------------

    pub fn set_min_dst_gas(&mut self, dst: ChainId, packet_type: u16, gas: u64) {
        self.coordinator.set_min_dst_gas(dst, packet_type, gas);
    }

    pub fn set_trusted_remote(&mut self, src: ChainId, trusted: bool) {
        self.mirrors.set_trusted_remote(src, trusted);
    }

    /// Fee to push the current state (and `user`'s, if given) to `dst`.
    pub fn estimate_fee(
        &self,
        dst: ChainId,
        user: Option<&Address>,
        gas_limit: u64,
        head: &BlockContext,
    ) -> Result<u128, SyncError> {
        let msg = SyncMessage::snapshot(&self.escrow, user, head);
        self.coordinator.estimate_fee(&self.transport, dst, &msg, gas_limit)
    }

    /// Push the current state (and `user`'s, if given) to `dst`.
    ///
    /// Always sends the latest state; retrying after a lost delivery resends
    /// whatever the ledger holds at that moment.
    ///
    /// The synced epochs advance as soon as the message is sent. A message
    /// whose global epoch the destination already holds is discarded whole,
    /// user state included, so a user-only resync without a new global
    /// checkpoint never lands. Only the confirmed view
    /// ([`SyncCoordinator::epoch_confirmed`],
    /// [`SyncCoordinator::user_point_epoch_confirmed`]) reflects what the
    /// destination actually holds.
    pub fn sync(
        &mut self,
        dst: ChainId,
        refund_address: &Address,
        user: Option<&Address>,
        gas_limit: u64,
        paid: u128,
        head: &BlockContext,
    ) -> Result<SyncReceipt, SyncError> {
        let msg = SyncMessage::snapshot(&self.escrow, user, head);
        self.coordinator
            .sync(&self.transport, dst, &msg, refund_address, gas_limit, paid)
    }

    /// Handle a payload the transport delivered from `src`.
    pub fn receive(&mut self, src: ChainId, payload: &[u8]) -> Result<ReceiveOutcome, SyncError> {
        self.mirrors.receive(src, payload)
    }

    /// Record `dst`'s report that it applied `confirmation`.
    pub fn confirm(&mut self, dst: ChainId, confirmation: &SyncConfirmation) {
        self.coordinator.confirm(
            dst,
            confirmation.epoch,
            confirmation.user.as_ref(),
            confirmation.user_epoch,
        );
    }
}
