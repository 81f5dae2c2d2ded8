//! State management for planrelay.
//!
//! This module persists reconciliation targets and provides the storage
//! helpers (atomic local files, S3 objects) reused by cost baselines,
//! secrets and the delivery ledger.

mod local;
mod s3;
mod store;
mod types;

pub use local::{LocalTargetStore, STATE_DIR, read_json, write_atomic, write_json, write_private};
pub use s3::S3Objects;
pub use store::TargetStore;
pub use types::{ReconciliationTarget, STATE_VERSION, TargetKind, TargetState};
