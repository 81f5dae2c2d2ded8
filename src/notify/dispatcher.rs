//! Notification delivery.
//!
//! One POST of `{"text": ...}` per run, bounded by a timeout. There is no
//! retry: a duplicate notification is worse than a missed one, and every
//! failure is reported as a warning outcome instead of an error.

use reqwest::{Client, header};
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::{info, warn};

use crate::error::{DispatchError, snippet};

use super::composer::NotificationMessage;

/// Default transport timeout in seconds.
pub const DEFAULT_TIMEOUT_SECS: u64 = 30;

/// What happened to the notification.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum DispatchOutcome {
    /// The transport accepted the message.
    Delivered {
        /// HTTP status returned.
        status: u16,
    },
    /// Delivery failed; the run continues.
    Warning {
        /// Failure description.
        reason: String,
    },
    /// Delivery was intentionally not attempted.
    Skipped {
        /// Why dispatch was skipped.
        reason: String,
    },
}

impl DispatchOutcome {
    /// Returns true if the message reached the transport.
    #[must_use]
    pub const fn is_delivered(&self) -> bool {
        matches!(self, Self::Delivered { .. })
    }

    /// Returns true if delivery failed.
    #[must_use]
    pub const fn is_warning(&self) -> bool {
        matches!(self, Self::Warning { .. })
    }
}

#[derive(Serialize)]
struct Payload<'a> {
    text: &'a str,
}

/// Posts messages to one transport endpoint.
#[derive(Debug, Clone)]
pub struct NotificationDispatcher {
    client: Client,
    url: String,
    timeout_secs: u64,
}

impl NotificationDispatcher {
    /// Creates a dispatcher for `url`.
    ///
    /// # Errors
    ///
    /// Returns an error if the HTTP client cannot be created.
    pub fn new(url: &str, timeout_secs: u64) -> Result<Self, DispatchError> {
        let client = Client::builder()
            .timeout(Duration::from_secs(timeout_secs))
            .build()
            .map_err(|e| DispatchError::Unreachable {
                message: format!("Failed to create HTTP client: {e}"),
            })?;

        Ok(Self {
            client,
            url: url.to_string(),
            timeout_secs,
        })
    }

    /// Delivers the message exactly once. Never fails.
    pub async fn dispatch(&self, message: &NotificationMessage) -> DispatchOutcome {
        match self.send(message).await {
            Ok(status) => {
                info!(status, "Notification delivered");
                DispatchOutcome::Delivered { status }
            }
            Err(e) => {
                warn!("Notification not delivered: {e}");
                DispatchOutcome::Warning {
                    reason: e.to_string(),
                }
            }
        }
    }

    async fn send(&self, message: &NotificationMessage) -> Result<u16, DispatchError> {
        let text = message.to_text();
        let response = self
            .client
            .post(&self.url)
            .header(header::CONTENT_TYPE, "application/json")
            .json(&Payload { text: &text })
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    DispatchError::Timeout {
                        timeout_secs: self.timeout_secs,
                    }
                } else {
                    DispatchError::Unreachable {
                        message: e.to_string(),
                    }
                }
            })?;

        let status = response.status();
        if status.is_success() {
            return Ok(status.as_u16());
        }

        let body = response.text().await.unwrap_or_default();
        Err(DispatchError::Rejected {
            status: status.as_u16(),
            snippet: snippet(&body),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{body_partial_json, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn message() -> NotificationMessage {
        NotificationMessage {
            title: String::from("Plan acme/infra #42"),
            summary_line: String::from("Plan: 3 to add, 2 to change, 1 to destroy"),
            cost_line: None,
            reference_link: String::from("https://github.com/acme/infra/pull/42"),
            details: Vec::new(),
            correlation_id: String::from("run-1"),
        }
    }

    #[test]
    fn test_outcome_serializes_with_http_status() {
        let delivered = DispatchOutcome::Delivered { status: 204 };
        let json = serde_json::to_value(&delivered).expect("serialize");
        assert_eq!(json, serde_json::json!({"outcome": "delivered", "status": 204}));

        let back: DispatchOutcome = serde_json::from_value(json).expect("deserialize");
        assert_eq!(back, delivered);

        let skipped = serde_json::to_value(DispatchOutcome::Skipped {
            reason: String::from("no endpoint"),
        })
        .expect("serialize");
        assert_eq!(skipped["outcome"], "skipped");
    }

    #[tokio::test]
    async fn test_delivers_text_payload() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/hook"))
            .and(body_partial_json(serde_json::json!({"text": message().to_text()})))
            .respond_with(ResponseTemplate::new(200).set_body_string("ok"))
            .expect(1)
            .mount(&server)
            .await;

        let dispatcher =
            NotificationDispatcher::new(&format!("{}/hook", server.uri()), 5).expect("client");
        let outcome = dispatcher.dispatch(&message()).await;
        assert_eq!(outcome, DispatchOutcome::Delivered { status: 200 });
    }

    #[tokio::test]
    async fn test_rejection_is_a_warning() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(404).set_body_string("no_service"))
            .expect(1)
            .mount(&server)
            .await;

        let dispatcher = NotificationDispatcher::new(&server.uri(), 5).expect("client");
        let outcome = dispatcher.dispatch(&message()).await;
        match outcome {
            DispatchOutcome::Warning { reason } => assert!(reason.contains("no_service")),
            other => panic!("unexpected outcome: {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_timeout_is_a_warning_without_retry() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(200).set_delay(Duration::from_secs(5)))
            .expect(1)
            .mount(&server)
            .await;

        let dispatcher = NotificationDispatcher::new(&server.uri(), 1).expect("client");
        let outcome = dispatcher.dispatch(&message()).await;
        assert!(outcome.is_warning());
        assert!(!outcome.is_delivered());
    }

    #[tokio::test]
    async fn test_unreachable_is_a_warning() {
        let dispatcher = NotificationDispatcher::new("http://127.0.0.1:9/hook", 1).expect("client");
        let outcome = dispatcher.dispatch(&message()).await;
        assert!(outcome.is_warning());
    }
}
