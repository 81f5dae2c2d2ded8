//! Cost delta computation.
//!
//! Cost enrichment is best-effort: every failure collapses into
//! [`CostOutcome::Unavailable`] with a reason, never an error.

use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{debug, info, warn};

use crate::plan::PlanArtifact;

use super::baseline::BaselineStore;
use super::estimator::{CostEstimate, CostEstimator};

/// Current cost and its change against the recorded baseline.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct CostDelta {
    /// Current monthly cost.
    pub current_monthly: f64,
    /// Baseline monthly cost, if one was recorded.
    pub previous_monthly: Option<f64>,
    /// `current - previous`, if a baseline exists.
    pub delta: Option<f64>,
}

impl CostDelta {
    /// Computes a delta, rounding every amount to cents.
    #[must_use]
    pub fn between(current: &CostEstimate, previous: Option<&CostEstimate>) -> Self {
        let current_monthly = round_cents(current.current_monthly);
        let previous_monthly = previous.map(|p| round_cents(p.current_monthly));
        Self {
            current_monthly,
            previous_monthly,
            delta: previous_monthly.map(|p| round_cents(current_monthly - p)),
        }
    }
}

/// Result of the cost stage.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum CostOutcome {
    /// Estimation succeeded.
    Estimated(CostDelta),
    /// Estimation was skipped or failed.
    Unavailable {
        /// Why there is no estimate.
        reason: String,
    },
}

impl CostOutcome {
    /// Returns the delta, if estimation succeeded.
    #[must_use]
    pub const fn delta(&self) -> Option<&CostDelta> {
        match self {
            Self::Estimated(delta) => Some(delta),
            Self::Unavailable { .. } => None,
        }
    }

    fn unavailable(reason: impl Into<String>) -> Self {
        Self::Unavailable {
            reason: reason.into(),
        }
    }
}

/// Rounds a monetary amount to cents.
#[must_use]
pub fn round_cents(amount: f64) -> f64 {
    (amount * 100.0).round() / 100.0
}

/// Invokes the estimator and diffs against the stored baseline.
pub struct CostDeltaEstimator {
    estimator: Arc<dyn CostEstimator>,
    baseline: Option<Arc<dyn BaselineStore>>,
    record_baseline: bool,
}

impl std::fmt::Debug for CostDeltaEstimator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CostDeltaEstimator")
            .field("baseline", &self.baseline.as_ref().map(|b| b.backend_type()))
            .field("record_baseline", &self.record_baseline)
            .finish_non_exhaustive()
    }
}

impl CostDeltaEstimator {
    /// Creates an estimator without baseline comparison.
    #[must_use]
    pub fn new(estimator: Arc<dyn CostEstimator>) -> Self {
        Self {
            estimator,
            baseline: None,
            record_baseline: false,
        }
    }

    /// Compares against baselines from `store`.
    #[must_use]
    pub fn with_baseline(mut self, store: Arc<dyn BaselineStore>) -> Self {
        self.baseline = Some(store);
        self
    }

    /// Replaces the baseline with each new estimate.
    #[must_use]
    pub const fn with_record_baseline(mut self, record: bool) -> Self {
        self.record_baseline = record;
        self
    }

    /// Estimates the plan and computes the delta for `target`.
    pub async fn estimate(&self, artifact: &PlanArtifact, target: &str) -> CostOutcome {
        let Some(input) = artifact.estimator_input() else {
            return CostOutcome::unavailable("plan has no representation to estimate");
        };

        let current = match self.estimator.estimate(input).await {
            Ok(estimate) => estimate,
            Err(e) => {
                warn!("Cost estimate unavailable: {e}");
                return CostOutcome::unavailable(e.to_string());
            }
        };

        let previous = match &self.baseline {
            Some(store) => match store.load(target).await {
                Ok(previous) => previous,
                Err(e) => {
                    warn!("Ignoring unreadable baseline for '{target}': {e}");
                    None
                }
            },
            None => None,
        };

        let delta = CostDelta::between(&current, previous.as_ref());
        info!(
            current = delta.current_monthly,
            previous = ?delta.previous_monthly,
            delta = ?delta.delta,
            "Cost estimate computed"
        );

        if self.record_baseline
            && let Some(store) = &self.baseline
        {
            if let Err(e) = store.save(target, &current).await {
                warn!("Failed to record baseline for '{target}': {e}");
            } else {
                debug!("Baseline for '{target}' replaced");
            }
        }

        CostOutcome::Estimated(delta)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::{EstimatorError, Result};
    use async_trait::async_trait;
    use std::collections::HashMap;
    use std::sync::Mutex;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct FixedEstimator(Option<f64>);

    #[async_trait]
    impl CostEstimator for FixedEstimator {
        async fn estimate(&self, _plan_input: &str) -> Result<CostEstimate> {
            self.0
                .map(|current_monthly| CostEstimate {
                    current_monthly,
                    line_items: Vec::new(),
                })
                .ok_or_else(|| {
                    EstimatorError::Unreachable {
                        message: String::from("connection refused"),
                    }
                    .into()
                })
        }
    }

    #[derive(Default)]
    struct MemoryBaselines {
        entries: Mutex<HashMap<String, CostEstimate>>,
        saves: AtomicUsize,
    }

    #[async_trait]
    impl BaselineStore for MemoryBaselines {
        async fn load(&self, target: &str) -> Result<Option<CostEstimate>> {
            Ok(self.entries.lock().expect("lock").get(target).cloned())
        }

        async fn save(&self, target: &str, estimate: &CostEstimate) -> Result<()> {
            self.saves.fetch_add(1, Ordering::SeqCst);
            self.entries
                .lock()
                .expect("lock")
                .insert(target.to_string(), estimate.clone());
            Ok(())
        }

        fn backend_type(&self) -> &'static str {
            "memory"
        }
    }

    fn plan() -> PlanArtifact {
        PlanArtifact::from_parts(None, Some(String::from("Plan: 1 to add, 0 to change, 0 to destroy.")))
    }

    #[test]
    fn test_delta_rounds_to_cents() {
        let current = CostEstimate {
            current_monthly: 10.004,
            line_items: Vec::new(),
        };
        let previous = CostEstimate {
            current_monthly: 7.5,
            line_items: Vec::new(),
        };
        let delta = CostDelta::between(&current, Some(&previous));
        assert_eq!(delta.previous_monthly, Some(7.5));
        assert_eq!(delta.current_monthly, 10.0);
        assert_eq!(delta.delta, Some(2.5));
    }

    #[tokio::test]
    async fn test_without_baseline_only_current() {
        let estimator = CostDeltaEstimator::new(Arc::new(FixedEstimator(Some(12.0))));
        let outcome = estimator.estimate(&plan(), "acme/infra").await;
        let delta = outcome.delta().expect("estimated");
        assert!((delta.current_monthly - 12.0).abs() < f64::EPSILON);
        assert!(delta.delta.is_none());
    }

    #[tokio::test]
    async fn test_failure_is_unavailable() {
        let estimator = CostDeltaEstimator::new(Arc::new(FixedEstimator(None)));
        let outcome = estimator.estimate(&plan(), "acme/infra").await;
        assert!(matches!(outcome, CostOutcome::Unavailable { .. }));
    }

    #[tokio::test]
    async fn test_records_and_diffs_baseline() {
        let baselines = Arc::new(MemoryBaselines::default());

        let first = CostDeltaEstimator::new(Arc::new(FixedEstimator(Some(100.0))))
            .with_baseline(baselines.clone())
            .with_record_baseline(true);
        let outcome = first.estimate(&plan(), "acme/infra").await;
        assert!(outcome.delta().is_some_and(|d| d.delta.is_none()));

        let second = CostDeltaEstimator::new(Arc::new(FixedEstimator(Some(125.5))))
            .with_baseline(baselines.clone());
        let outcome = second.estimate(&plan(), "acme/infra").await;
        let delta = outcome.delta().expect("estimated");
        assert_eq!(delta.previous_monthly, Some(100.0));
        assert_eq!(delta.delta, Some(25.5));
        assert_eq!(baselines.saves.load(Ordering::SeqCst), 1);
    }
}
