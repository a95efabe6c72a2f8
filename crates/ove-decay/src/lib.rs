//! # ove-decay
//! Linear vote-escrow decay and historical queries.
//!
//! All calculations use integer arithmetic only for determinism.
//!
//! - **Points**: a `(bias, slope)` pair anchored at a timestamp and block;
//!   its value decays linearly and clamps at zero.
//! - **Histories**: append-only, epoch-indexed point sequences searchable by
//!   block number or timestamp.
//! - **Slope schedule**: week-aligned future slope deltas, one per lock expiry,
//!   replayed week by week to evaluate total supply.
//! - **Queries**: [`LedgerView`] answers current and historical balance and
//!   supply queries over any set of histories (local ledger or mirror).

pub mod history;
pub mod point;
pub mod query;
pub mod schedule;

pub use history::{Checkpoints, PointHistory};
pub use point::{lock_slope, Point};
pub use query::LedgerView;
pub use schedule::SlopeSchedule;
