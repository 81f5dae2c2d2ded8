//! Shared secret management.
//!
//! The webhook signing secret is owned by [`SecretSynchronizer`] and handed
//! to the reconciler as a value, never looked up by it.

mod store;
mod synchronizer;

pub use store::{InMemorySecretStore, LocalSecretStore, S3SecretStore, SecretStore, validate_name};
pub use synchronizer::{
    DEFAULT_READ_TIMEOUT_SECS, SECRET_BYTES, SecretOrigin, SecretRecord, SecretSynchronizer, generate_secret,
};
