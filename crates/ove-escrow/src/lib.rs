//! # ove-escrow
//!
//! Voting escrow for OmniVE: users lock an asset until a week-aligned unlock
//! time and receive voting power that decays linearly to zero by then.
//!
//! - [`ledger`] validates the lock state machine.
//! - The checkpoint engine (crate-private) extends the global and per-user
//!   histories on every mutation.
//! - [`VotingEscrow`] composes both with the asset collaborator and serves
//!   queries through [`ove_decay::LedgerView`].

mod checkpoint;
pub mod escrow;
pub mod ledger;

pub use escrow::VotingEscrow;
pub use ledger::LockBook;
