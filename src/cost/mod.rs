//! Cost impact estimation.
//!
//! Optional stage that prices the plan through an external estimator and
//! compares the result with the baseline recorded for the same target.

mod baseline;
mod delta;
mod estimator;

pub use baseline::{BaselineStore, LocalBaselineStore, S3BaselineStore, baseline_key};
pub use delta::{CostDelta, CostDeltaEstimator, CostOutcome, round_cents};
pub use estimator::{
    CostEstimate, CostEstimator, DEFAULT_TIMEOUT_SECS, ESTIMATOR_KEY_ENV, HttpCostEstimator, LineItem,
};
