// ============================================================================
// Strict linting - Dangerous or non-idiomatic practices are forbidden
// ============================================================================

#![deny(unsafe_code)]                 // Unsafe code is forbidden
#![warn(missing_docs)]                // All public items must be documented
#![deny(non_camel_case_types)]        // Types must follow CamelCase convention

// Additional strictness
#![warn(unused_imports)]              // Unused imports
#![warn(unused_variables)]            // Unused variables
#![deny(unused_must_use)]             // Must handle Result and Option explicitly
#![deny(non_snake_case)]              // Variables and functions must be snake_case
#![deny(non_upper_case_globals)]      // Constants must be UPPER_CASE
#![deny(nonstandard_style)]           // Non-standard code style is forbidden
#![forbid(unsafe_op_in_unsafe_fn)]    // Unsafe ops in unsafe fns are forbidden

// Clippy lints (warnings only)
#![warn(clippy::all)]                 // All standard Clippy lints
#![warn(clippy::pedantic)]            // Very strict Clippy lints
#![warn(clippy::nursery)]             // Experimental lints
#![warn(clippy::unwrap_used)]         // unwrap() warning
#![warn(clippy::expect_used)]         // expect() warning
#![warn(clippy::panic)]               // panic!() warning
#![warn(clippy::print_stdout)]        // println!() warning
#![warn(clippy::todo)]                // TODO warning
#![warn(clippy::unimplemented)]       // unimplemented!() warning
#![warn(clippy::unwrap_in_result)]    // unwrap() in Result warning
#![warn(clippy::redundant_clone)]     // Useless clones warning
#![warn(clippy::too_many_arguments)]  // Limit function arguments
#![warn(clippy::cognitive_complexity)] // Limit cognitive complexity

// Safety and robustness lints
#![deny(overflowing_literals)]        // Overflowing literals are forbidden
#![deny(arithmetic_overflow)]         // Arithmetic overflow is forbidden

// ============================================================================
// Crate Documentation
// ============================================================================

//! # planrelay
//!
//! Plan change summaries, cost deltas and notifications for pull-request
//! driven infrastructure workflows, plus idempotent webhook reconciliation.
//!
//! ## Overview
//!
//! Two independent subsystems live in this crate:
//!
//! - A **notify pipeline** that reads a plan in whichever representation is
//!   available, derives change counts through a cascade of extraction
//!   strategies, prices the change against a recorded baseline, and posts
//!   exactly one message per run.
//! - A **reconciler** that keeps a webhook registration and its signing
//!   secret converged with the declared configuration, no matter how many
//!   times it is run.
//!
//! ## Modules
//!
//! - [`plan`]: Artifact loading, change extraction, breakdown and risk findings
//! - [`cost`]: Estimator client, baselines and deltas
//! - [`notify`]: Message composition, dispatch and the delivery ledger
//! - [`pipeline`]: Stage orchestration for one run
//! - [`registry`]: Webhook registry client
//! - [`secrets`]: Secret stores and the synchronizer
//! - [`reconciler`]: Convergence state machine with bounded retries
//! - [`state`]: Local and S3 persistence helpers
//! - [`config`]: Configuration parsing and validation
//! - [`cli`]: Command-line interface
//!
//! ## Example
//!
//! ```yaml
//! notification:
//!   reference_url_template: "https://github.com/{repo}/pull/{pr}"
//!
//! estimator:
//!   endpoint: https://pricing.example.com/estimate
//!   baseline:
//!     backend: s3
//!     bucket: planrelay-state
//!
//! reconcile:
//!   owner: acme/infra
//!   webhook:
//!     url: https://atlantis.acme.dev/events
//! ```

// ============================================================================
// Modules
// ============================================================================

pub mod cli;
pub mod config;
pub mod cost;
pub mod error;
pub mod notify;
pub mod pipeline;
pub mod plan;
pub mod reconciler;
pub mod registry;
pub mod secrets;
pub mod state;

// ============================================================================
// Re-exports
// ============================================================================

pub use cli::{Cli, Commands, OutputFormatter};
pub use config::{ConfigParser, ConfigValidator, RelayConfig};
pub use cost::{CostDelta, CostDeltaEstimator, CostEstimator};
pub use error::{RelayError, Result};
pub use notify::{NotificationComposer, NotificationDispatcher, NotificationMessage, RunMetadata};
pub use pipeline::{PlanPipeline, RunReport, RunStatus};
pub use plan::{ChangeSetExtractor, ChangeSummary, PlanArtifact, PlanArtifactLoader};
pub use reconciler::{ReconciliationResult, ResourceReconciler, RetryPolicy};
pub use registry::{GitHubHookRegistry, WebhookRegistry};
pub use secrets::{SecretRecord, SecretStore, SecretSynchronizer};
pub use state::{LocalTargetStore, ReconciliationTarget, TargetStore};
