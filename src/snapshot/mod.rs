//! Schema Snapshot Module
//!
//! Everything between raw catalog rows and a stored, comparable snapshot:
//! - normalization of catalog rows into the canonical model
//! - relationship derivation from foreign keys
//! - diffing two snapshots
//! - the snapshot store

pub mod diff;
pub mod normalize;
pub mod relationships;
pub mod store;

pub use diff::{DiffEngine, DiffReport};
pub use normalize::{NormalizeError, Normalizer};
pub use store::{SnapshotMetadata, SnapshotStore};
