// Generic entity reconciler: snapshots, bounded logs and merge policies

mod engine;
mod entity;
mod log;

pub use engine::{FieldSet, IdExtractor, MergeStrategy, Policy, Reconciler, ReconcilerBuilder};
pub use entity::{Outcome, Snapshot, SnapshotChange};
pub use log::BoundedLog;

#[cfg(test)]
mod tests;
