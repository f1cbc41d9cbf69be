//! Pure data logic: no I/O happens in this crate.

pub mod cooccurrence;
pub mod media;
pub mod reconcile;

pub use cooccurrence::aggregate;
pub use media::{classify, pending_media, plan_media, MediaPlan};
pub use reconcile::{merge, reconcile, validate_batch, Reconciliation};
