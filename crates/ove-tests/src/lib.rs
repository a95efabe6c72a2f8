//! End-to-end test suite for OmniVE.
//!
//! Integration tests drive the ledger through multi-week lock lifecycles
//! with hourly blocks, and push ledgers across the devnet relay under
//! duplicated, reordered, and underpaid deliveries.

pub mod helpers;
