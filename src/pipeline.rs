//! Plan notification pipeline.
//!
//! Runs the stages for one plan: load, extract and estimate concurrently,
//! compose, then dispatch once. Only an unreadable artifact aborts the run;
//! every other stage degrades its output and records a warning.

use serde::Serialize;
use std::sync::Arc;
use tracing::{debug, info, warn};

use crate::config::RelayConfig;
use crate::cost::{CostDeltaEstimator, CostOutcome, HttpCostEstimator};
use crate::error::Result;
use crate::notify::{
    DeliveryLedger, DispatchOutcome, NotificationComposer, NotificationDispatcher, NotificationMessage,
    RunMetadata,
};
use crate::plan::{
    ChangeSetExtractor, ChangeSummary, PlanArtifact, PlanArtifactLoader, PlanSource, RiskReport,
    evaluate_risks,
};

/// Completion status of a run.
#[derive(Debug, Clone, Copy, Serialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum RunStatus {
    /// Every stage produced its full output.
    Success,
    /// The run completed with degraded output.
    PartialSuccess,
}

/// Offline analysis of one plan.
#[derive(Debug, Clone, Serialize)]
pub struct PlanAnalysis {
    /// Change counts.
    pub summary: ChangeSummary,
    /// Risk findings.
    pub risks: RiskReport,
    /// Fingerprint of the artifact.
    pub fingerprint: String,
}

impl PlanAnalysis {
    /// Analyzes an artifact without any network access.
    #[must_use]
    pub fn of(extractor: &ChangeSetExtractor, artifact: &PlanArtifact) -> Self {
        Self {
            summary: extractor.extract(artifact),
            risks: evaluate_risks(artifact),
            fingerprint: artifact.fingerprint().to_string(),
        }
    }
}

/// Everything a run produced.
#[derive(Debug, Clone, Serialize)]
pub struct RunReport {
    /// Overall status.
    pub status: RunStatus,
    /// Plan analysis.
    pub analysis: PlanAnalysis,
    /// Cost stage result.
    pub cost: CostOutcome,
    /// The composed message.
    pub message: NotificationMessage,
    /// Delivery result.
    pub dispatch: DispatchOutcome,
    /// Degraded-output warnings.
    pub warnings: Vec<String>,
}

/// The plan notification pipeline.
#[derive(Debug, Default)]
pub struct PlanPipeline {
    loader: PlanArtifactLoader,
    extractor: ChangeSetExtractor,
    cost: Option<CostDeltaEstimator>,
    composer: NotificationComposer,
    dispatcher: Option<NotificationDispatcher>,
    ledger: Option<DeliveryLedger>,
}

impl PlanPipeline {
    /// Creates a pipeline with no estimator, dispatcher or ledger.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Builds the pipeline from configuration.
    ///
    /// The cost stage is enabled only when both an estimator endpoint and
    /// its credential are present.
    ///
    /// # Errors
    ///
    /// Returns an error if an HTTP client or a baseline store cannot be built.
    pub async fn from_config(config: &RelayConfig, estimator_key: Option<String>) -> Result<Self> {
        let mut pipeline = Self::new().with_composer(NotificationComposer::new(
            config.notification.reference_url_template.clone(),
        ));

        match (&config.estimator.endpoint, estimator_key) {
            (Some(endpoint), Some(api_key)) => {
                let estimator =
                    HttpCostEstimator::new(endpoint, &api_key, config.estimator.timeout_secs)?;
                let mut cost = CostDeltaEstimator::new(Arc::new(estimator))
                    .with_record_baseline(config.estimator.record_baseline);
                if let Some(storage) = &config.estimator.baseline {
                    cost = cost.with_baseline(storage.baseline_store().await?);
                }
                pipeline = pipeline.with_cost(cost);
            }
            (Some(_), None) => {
                warn!("Estimator endpoint configured without a credential; cost stage disabled");
            }
            (None, _) => debug!("No estimator endpoint configured; cost stage disabled"),
        }

        if let Some(url) = &config.notification.webhook_url {
            pipeline = pipeline.with_dispatcher(NotificationDispatcher::new(
                url,
                config.notification.timeout_secs,
            )?);
        } else {
            warn!("No notification URL configured; the message will not be delivered");
        }

        if let Some(path) = &config.delivery.ledger_path {
            let retention = chrono::Duration::days(i64::from(config.delivery.retention_days));
            pipeline = pipeline.with_ledger(DeliveryLedger::new(path).with_retention(retention));
        }

        Ok(pipeline)
    }

    /// Sets the extractor.
    #[must_use]
    pub fn with_extractor(mut self, extractor: ChangeSetExtractor) -> Self {
        self.extractor = extractor;
        self
    }

    /// Enables cost estimation.
    #[must_use]
    pub fn with_cost(mut self, cost: CostDeltaEstimator) -> Self {
        self.cost = Some(cost);
        self
    }

    /// Sets the composer.
    #[must_use]
    pub fn with_composer(mut self, composer: NotificationComposer) -> Self {
        self.composer = composer;
        self
    }

    /// Enables delivery.
    #[must_use]
    pub fn with_dispatcher(mut self, dispatcher: NotificationDispatcher) -> Self {
        self.dispatcher = Some(dispatcher);
        self
    }

    /// Enables the delivery ledger.
    #[must_use]
    pub fn with_ledger(mut self, ledger: DeliveryLedger) -> Self {
        self.ledger = Some(ledger);
        self
    }

    /// Loads the plan and runs every stage.
    ///
    /// # Errors
    ///
    /// Returns an error only if no plan representation could be read.
    pub async fn run(&self, source: &PlanSource, metadata: &RunMetadata) -> Result<RunReport> {
        let artifact = self.loader.load(source).await?;
        Ok(self.run_artifact(&artifact, metadata).await)
    }

    /// Runs every stage on an already loaded plan.
    pub async fn run_artifact(&self, artifact: &PlanArtifact, metadata: &RunMetadata) -> RunReport {
        info!(
            correlation_id = %metadata.correlation_id,
            fingerprint = %artifact.fingerprint(),
            "Starting plan pipeline"
        );

        let target = metadata.cost_target();
        let (analysis, cost) = tokio::join!(
            async { PlanAnalysis::of(&self.extractor, artifact) },
            self.estimate(artifact, &target)
        );

        let mut warnings = Vec::new();
        let mut status = RunStatus::Success;

        if let Some(diagnostic) = &analysis.summary.diagnostic {
            warn!("Change counts unavailable: {}", diagnostic.message);
            warnings.push(format!("change counts unavailable: {}", diagnostic.message));
            status = RunStatus::PartialSuccess;
        }
        if let CostOutcome::Unavailable { reason } = &cost
            && self.cost.is_some()
        {
            warnings.push(format!("cost estimate unavailable: {reason}"));
        }

        let message = self
            .composer
            .compose(&analysis.summary, cost.delta(), &analysis.risks, metadata);

        let dispatch = self.deliver(&message, artifact, metadata).await;
        if let DispatchOutcome::Warning { reason } = &dispatch {
            warnings.push(format!("notification not delivered: {reason}"));
            status = RunStatus::PartialSuccess;
        }

        info!(status = ?status, warnings = warnings.len(), "Plan pipeline finished");

        RunReport {
            status,
            analysis,
            cost,
            message,
            dispatch,
            warnings,
        }
    }

    async fn estimate(&self, artifact: &PlanArtifact, target: &str) -> CostOutcome {
        match &self.cost {
            Some(cost) => cost.estimate(artifact, target).await,
            None => CostOutcome::Unavailable {
                reason: String::from("no estimator configured"),
            },
        }
    }

    async fn deliver(
        &self,
        message: &NotificationMessage,
        artifact: &PlanArtifact,
        metadata: &RunMetadata,
    ) -> DispatchOutcome {
        let Some(dispatcher) = &self.dispatcher else {
            return DispatchOutcome::Skipped {
                reason: String::from("no notification endpoint configured"),
            };
        };

        if let Some(ledger) = &self.ledger {
            let key = DeliveryLedger::key(&metadata.correlation_id, artifact.fingerprint());
            match ledger.claim(&key).await {
                Ok(true) => {}
                Ok(false) => {
                    info!("Notification for this run was already sent; skipping");
                    return DispatchOutcome::Skipped {
                        reason: String::from("already delivered for this run"),
                    };
                }
                Err(e) => warn!("Delivery ledger unavailable, dispatching anyway: {e}"),
            }
        }

        dispatcher.dispatch(message).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cli::RunArgs;
    use crate::cost::{CostEstimate, CostEstimator};
    use crate::error::{EstimatorError, RelayError};
    use async_trait::async_trait;
    use std::sync::Arc;
    use tempfile::TempDir;
    use wiremock::matchers::method;
    use wiremock::{Mock, MockServer, ResponseTemplate};

    struct DownEstimator;

    #[async_trait]
    impl CostEstimator for DownEstimator {
        async fn estimate(&self, _plan_input: &str) -> Result<CostEstimate> {
            Err(RelayError::Estimator(EstimatorError::Timeout { timeout_secs: 30 }))
        }
    }

    fn metadata() -> RunMetadata {
        RunMetadata {
            source_identity: Some(String::from("acme/infra")),
            change_request: Some(String::from("7")),
            commit: None,
            project: None,
            correlation_id: String::from("run-7"),
        }
    }

    fn plan() -> PlanArtifact {
        PlanArtifact::from_parts(None, Some(String::from("Plan: 3 to add, 2 to change, 1 to destroy")))
    }

    #[tokio::test]
    async fn test_run_without_dispatcher_is_skipped() {
        let report = PlanPipeline::new().run_artifact(&plan(), &metadata()).await;
        assert_eq!(report.status, RunStatus::Success);
        assert_eq!(report.analysis.summary.counts(), (3, 2, 1));
        assert!(matches!(report.dispatch, DispatchOutcome::Skipped { .. }));
        assert_eq!(report.message.summary_line, "Plan: 3 to add, 2 to change, 1 to destroy");
    }

    #[tokio::test]
    async fn test_estimator_failure_does_not_block_delivery() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(200))
            .expect(1)
            .mount(&server)
            .await;

        let pipeline = PlanPipeline::new()
            .with_cost(CostDeltaEstimator::new(Arc::new(DownEstimator)))
            .with_dispatcher(NotificationDispatcher::new(&server.uri(), 5).expect("client"));

        let report = pipeline.run_artifact(&plan(), &metadata()).await;
        assert_eq!(report.status, RunStatus::Success);
        assert!(report.dispatch.is_delivered());
        assert!(report.message.cost_line.is_none());
        assert_eq!(report.warnings.len(), 1);
    }

    #[tokio::test]
    async fn test_dispatch_failure_is_partial_success() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(500))
            .expect(1)
            .mount(&server)
            .await;

        let pipeline = PlanPipeline::new()
            .with_dispatcher(NotificationDispatcher::new(&server.uri(), 5).expect("client"));
        let report = pipeline.run_artifact(&plan(), &metadata()).await;
        assert_eq!(report.status, RunStatus::PartialSuccess);
        assert!(report.dispatch.is_warning());
    }

    #[tokio::test]
    async fn test_degenerate_extraction_still_notifies() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(200))
            .expect(1)
            .mount(&server)
            .await;

        let pipeline = PlanPipeline::new()
            .with_dispatcher(NotificationDispatcher::new(&server.uri(), 5).expect("client"));
        let artifact = PlanArtifact::from_parts(None, Some(String::from("Error: state lock held")));
        let report = pipeline.run_artifact(&artifact, &metadata()).await;

        assert_eq!(report.status, RunStatus::PartialSuccess);
        assert!(report.dispatch.is_delivered());
        assert_eq!(report.message.summary_line, "Plan: change counts unavailable");
    }

    #[tokio::test]
    async fn test_ledger_prevents_second_delivery() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(200))
            .expect(1)
            .mount(&server)
            .await;

        let temp = TempDir::new().expect("temp dir");
        let pipeline = PlanPipeline::new()
            .with_dispatcher(NotificationDispatcher::new(&server.uri(), 5).expect("client"))
            .with_ledger(DeliveryLedger::new(temp.path().join("deliveries.json")));

        let first = pipeline.run_artifact(&plan(), &metadata()).await;
        let second = pipeline.run_artifact(&plan(), &metadata()).await;
        assert!(first.dispatch.is_delivered());
        assert!(matches!(second.dispatch, DispatchOutcome::Skipped { .. }));
    }

    #[tokio::test]
    async fn test_delivered_report_serializes() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(200))
            .mount(&server)
            .await;

        let pipeline = PlanPipeline::new()
            .with_dispatcher(NotificationDispatcher::new(&server.uri(), 5).expect("client"));
        let report = pipeline.run_artifact(&plan(), &metadata()).await;

        let json = serde_json::to_value(&report).expect("serialize");
        assert_eq!(json["status"], "success");
        assert_eq!(json["dispatch"]["outcome"], "delivered");
        assert_eq!(json["dispatch"]["status"], 200);
    }

    #[tokio::test]
    async fn test_workflow_rerun_posts_once() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(200))
            .expect(1)
            .mount(&server)
            .await;

        let temp = TempDir::new().expect("temp dir");
        let pipeline = PlanPipeline::new()
            .with_dispatcher(NotificationDispatcher::new(&server.uri(), 5).expect("client"))
            .with_ledger(DeliveryLedger::new(temp.path().join("deliveries.json")));

        let run = RunArgs {
            repo: Some(String::from("acme/infra")),
            pr: Some(String::from("7")),
            commit: Some(String::from("abc123")),
            ..RunArgs::default()
        };
        let first = pipeline.run_artifact(&plan(), &run.metadata(|_| None)).await;
        let second = pipeline.run_artifact(&plan(), &run.metadata(|_| None)).await;
        assert!(first.dispatch.is_delivered());
        assert!(matches!(second.dispatch, DispatchOutcome::Skipped { .. }));
    }

    #[tokio::test]
    async fn test_estimator_without_credential_is_disabled() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(200))
            .expect(0)
            .mount(&server)
            .await;

        let mut config = RelayConfig::default();
        config.estimator.endpoint = Some(server.uri());

        let pipeline = PlanPipeline::from_config(&config, None).await.expect("pipeline");
        assert!(pipeline.cost.is_none());

        let report = pipeline.run_artifact(&plan(), &metadata()).await;
        assert!(matches!(report.cost, CostOutcome::Unavailable { .. }));
        assert!(report.warnings.is_empty());

        let enabled = PlanPipeline::from_config(&config, Some(String::from("key")))
            .await
            .expect("pipeline");
        assert!(enabled.cost.is_some());
    }

    #[tokio::test]
    async fn test_run_loads_from_disk() {
        let temp = TempDir::new().expect("temp dir");
        let text_path = temp.path().join("plan.txt");
        std::fs::write(&text_path, "Plan: 1 to add, 0 to change, 0 to destroy.").expect("write");

        let report = PlanPipeline::new()
            .run(&PlanSource::new(None, Some(text_path)), &metadata())
            .await
            .expect("run");
        assert_eq!(report.analysis.summary.counts(), (1, 0, 0));
    }
}
