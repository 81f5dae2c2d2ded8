//! Cost estimator client.
//!
//! The estimator receives the same plan input the extractor used and answers
//! with a monthly total plus optional per-project line items. Amounts may be
//! JSON numbers or decimal strings.

use async_trait::async_trait;
use reqwest::{Client, header};
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::{debug, trace};

use crate::error::{EstimatorError, RelayError, Result, snippet};

/// Environment variable holding the estimator credential.
pub const ESTIMATOR_KEY_ENV: &str = "INFRACOST_API_KEY";

/// Default estimator timeout in seconds.
pub const DEFAULT_TIMEOUT_SECS: u64 = 30;

/// One priced component of an estimate.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct LineItem {
    /// Component name.
    pub name: String,
    /// Monthly cost of the component.
    pub monthly_cost: f64,
}

/// A cost estimate; also the shape persisted as a baseline.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct CostEstimate {
    /// Total monthly cost.
    pub current_monthly: f64,
    /// Per-component costs.
    #[serde(default)]
    pub line_items: Vec<LineItem>,
}

/// Something that can price a plan.
#[async_trait]
pub trait CostEstimator: Send + Sync {
    /// Estimates the monthly cost of the plan input.
    async fn estimate(&self, plan_input: &str) -> Result<CostEstimate>;
}

/// Amount encoded as a number or a decimal string.
#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum Amount {
    Number(f64),
    Text(String),
}

impl Amount {
    fn value(&self) -> Option<f64> {
        match self {
            Self::Number(n) => Some(*n),
            Self::Text(s) => s.trim().parse().ok(),
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct EstimateResponse {
    #[serde(alias = "currentMonthly", alias = "current_monthly")]
    total_monthly_cost: Option<Amount>,
    #[serde(default)]
    line_items: Vec<LineItemResponse>,
    #[serde(default)]
    projects: Vec<ProjectResponse>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct LineItemResponse {
    name: String,
    #[serde(alias = "monthly_cost")]
    monthly_cost: Option<Amount>,
}

#[derive(Debug, Deserialize)]
struct ProjectResponse {
    #[serde(default)]
    name: Option<String>,
    #[serde(default)]
    breakdown: Option<ProjectBreakdown>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ProjectBreakdown {
    total_monthly_cost: Option<Amount>,
}

impl EstimateResponse {
    fn into_estimate(self) -> std::result::Result<CostEstimate, String> {
        let current_monthly = self
            .total_monthly_cost
            .as_ref()
            .and_then(Amount::value)
            .ok_or_else(|| String::from("missing or non-numeric total monthly cost"))?;

        if !current_monthly.is_finite() || current_monthly < 0.0 {
            return Err(format!("implausible total monthly cost {current_monthly}"));
        }

        let mut line_items: Vec<LineItem> = self
            .line_items
            .into_iter()
            .filter_map(|item| {
                let cost = item.monthly_cost.as_ref().and_then(Amount::value)?;
                Some(LineItem {
                    name: item.name,
                    monthly_cost: cost,
                })
            })
            .collect();

        line_items.extend(self.projects.into_iter().filter_map(|project| {
            let cost = project.breakdown?.total_monthly_cost?.value()?;
            Some(LineItem {
                name: project.name.unwrap_or_else(|| String::from("unknown")),
                monthly_cost: cost,
            })
        }));

        Ok(CostEstimate {
            current_monthly,
            line_items,
        })
    }
}

/// HTTP estimator client.
#[derive(Debug, Clone)]
pub struct HttpCostEstimator {
    /// HTTP client.
    client: Client,
    /// Estimation endpoint.
    endpoint: String,
    /// API key.
    api_key: String,
    /// Timeout in seconds, kept for error reporting.
    timeout_secs: u64,
}

impl HttpCostEstimator {
    /// Creates a new estimator client.
    ///
    /// # Errors
    ///
    /// Returns an error if the HTTP client cannot be created.
    pub fn new(endpoint: &str, api_key: &str, timeout_secs: u64) -> Result<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(timeout_secs))
            .build()
            .map_err(|e| {
                RelayError::Estimator(EstimatorError::Unreachable {
                    message: format!("Failed to create HTTP client: {e}"),
                })
            })?;

        Ok(Self {
            client,
            endpoint: endpoint.to_string(),
            api_key: api_key.to_string(),
            timeout_secs,
        })
    }
}

#[async_trait]
impl CostEstimator for HttpCostEstimator {
    async fn estimate(&self, plan_input: &str) -> Result<CostEstimate> {
        debug!("Requesting cost estimate from {}", self.endpoint);

        let response = self
            .client
            .post(&self.endpoint)
            .header(header::CONTENT_TYPE, "application/json")
            .header("X-Api-Key", &self.api_key)
            .body(plan_input.to_string())
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    EstimatorError::Timeout {
                        timeout_secs: self.timeout_secs,
                    }
                } else {
                    EstimatorError::Unreachable {
                        message: e.to_string(),
                    }
                }
            })?;

        let status = response.status();

        if status.as_u16() == 401 || status.as_u16() == 403 {
            return Err(EstimatorError::Unauthorized {
                status: status.as_u16(),
            }
            .into());
        }

        let body = response.text().await.map_err(|e| EstimatorError::Unreachable {
            message: format!("Failed to read response: {e}"),
        })?;
        trace!("Estimator response: {}", snippet(&body));

        if !status.is_success() {
            return Err(EstimatorError::Rejected {
                status: status.as_u16(),
                snippet: snippet(&body),
            }
            .into());
        }

        let parsed: EstimateResponse =
            serde_json::from_str(&body).map_err(|e| EstimatorError::MalformedResponse {
                message: e.to_string(),
                snippet: snippet(&body),
            })?;

        parsed.into_estimate().map_err(|message| {
            EstimatorError::MalformedResponse {
                message,
                snippet: snippet(&body),
            }
            .into()
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{header as header_matcher, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    async fn estimator(server: &MockServer) -> HttpCostEstimator {
        HttpCostEstimator::new(&format!("{}/estimate", server.uri()), "ico-test", 5)
            .expect("client")
    }

    #[tokio::test]
    async fn test_parses_string_totals_and_projects() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/estimate"))
            .and(header_matcher("X-Api-Key", "ico-test"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "totalMonthlyCost": "123.45",
                "currency": "USD",
                "projects": [
                    {"name": "network", "breakdown": {"totalMonthlyCost": "100.00"}},
                    {"name": "storage", "breakdown": {"totalMonthlyCost": "23.45"}}
                ]
            })))
            .expect(1)
            .mount(&server)
            .await;

        let estimate = estimator(&server).await.estimate("{}").await.expect("estimate");
        assert!((estimate.current_monthly - 123.45).abs() < f64::EPSILON);
        assert_eq!(estimate.line_items.len(), 2);
        assert_eq!(estimate.line_items[0].name, "network");
    }

    #[tokio::test]
    async fn test_unauthorized_is_classified() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(403))
            .mount(&server)
            .await;

        let err = estimator(&server).await.estimate("{}").await.expect_err("should fail");
        assert!(matches!(
            err,
            RelayError::Estimator(EstimatorError::Unauthorized { status: 403 })
        ));
    }

    #[tokio::test]
    async fn test_malformed_body_keeps_snippet() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(200).set_body_string("<html>gateway</html>"))
            .mount(&server)
            .await;

        let err = estimator(&server).await.estimate("{}").await.expect_err("should fail");
        match err {
            RelayError::Estimator(EstimatorError::MalformedResponse { snippet, .. }) => {
                assert_eq!(snippet, "<html>gateway</html>");
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[tokio::test]
    async fn test_missing_total_is_malformed() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({"currency": "USD"})))
            .mount(&server)
            .await;

        let err = estimator(&server).await.estimate("{}").await.expect_err("should fail");
        assert!(matches!(
            err,
            RelayError::Estimator(EstimatorError::MalformedResponse { .. })
        ));
    }
}
