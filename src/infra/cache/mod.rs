//! Local content cache: durable index, on-demand store, reconciliation.

pub mod index;
pub mod reconcile;
pub mod store;

pub use index::{CacheEntryRecord, CacheIndex, IndexError};
pub use reconcile::{CycleReport, ReconcileConfig, Reconciler};
pub use store::{CacheError, ContentCache};
