//! # ove-core
//! Foundation types, errors, and collaborator traits for the OmniVE ledger.

pub mod asset;
pub mod constants;
pub mod error;
pub mod traits;
pub mod types;
