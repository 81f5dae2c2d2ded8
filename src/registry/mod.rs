//! Webhook registry access.
//!
//! The registry is the system of record for which webhook registrations
//! exist. The reconciler reads it before every write.

mod api;
mod github;
mod types;

pub use api::WebhookRegistry;
pub use github::{GITHUB_API_URL, GitHubHookRegistry, TOKEN_ENV};
pub use types::{DEFAULT_CONTENT_TYPE, OwnerScope, RegisteredHook, WebhookSpec};
