//! # ove-sync
//!
//! Replicates a voting-escrow ledger onto other chains.
//!
//! - [`protocol`]: the `SyncMessage` wire format (MAGIC + bincode).
//! - [`coordinator`]: source-side admission, fee checks, dispatch, and the
//!   intended / confirmed epoch views.
//! - [`mirror`]: destination-side mirrors with monotonic epoch application.

pub mod coordinator;
pub mod mirror;
pub mod protocol;

pub use coordinator::{SyncCoordinator, SyncReceipt};
pub use mirror::{Mirror, MirrorSet, ReceiveOutcome};
pub use protocol::{SyncConfirmation, SyncMessage, UserSnapshot};
