//! Reconciles poll snapshots against the census store: identity resolution,
//! session lifecycle, pruning and rollups, applied one cycle at a time.

mod cycle;
mod interner;
mod lease;
mod prune;
mod reconcile;
mod resolver;
mod rollup;
mod settings;

pub use cycle::{apply_cycle, CycleReport};
pub use interner::Interner;
pub use lease::CycleLease;
pub use prune::{prune, PruneReport};
pub use reconcile::{reconcile, Labels, Transition};
pub use resolver::{is_generic_name, Resolution, Resolved, Resolver};
pub use rollup::{backfill, refresh_recent, trailing_days, BACKFILL_FLAG};
pub use settings::ReconcileSettings;

/// A fresh identifier for one continuous match instance.
pub fn new_epoch() -> String {
    uuid::Uuid::new_v4().to_string()
}
