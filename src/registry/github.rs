//! GitHub webhook registry client.
//!
//! Talks to the REST hooks endpoints of a repository or organization.
//! Each call is a single attempt; retry policy belongs to the reconciler.

use async_trait::async_trait;
use reqwest::{Client, Method, Response, header};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::time::Duration;
use tracing::{debug, trace};

use crate::error::{RegistryError, RelayError, Result, snippet};

use super::api::WebhookRegistry;
use super::types::{DEFAULT_CONTENT_TYPE, OwnerScope, RegisteredHook, WebhookSpec};

/// Public GitHub API base URL.
pub const GITHUB_API_URL: &str = "https://api.github.com";

/// Environment variable holding the registry token.
pub const TOKEN_ENV: &str = "GITHUB_TOKEN";

/// Default request timeout in seconds.
const DEFAULT_TIMEOUT_SECS: u64 = 30;

/// Page size used when listing.
const PER_PAGE: usize = 100;

/// Fallback wait when the registry rate limits without saying for how long.
const DEFAULT_RETRY_AFTER_SECS: u64 = 60;

/// GitHub hooks API client.
#[derive(Debug, Clone)]
pub struct GitHubHookRegistry {
    /// HTTP client.
    client: Client,
    /// API base URL without trailing slash.
    api_url: String,
    /// Bearer token.
    token: String,
}

#[derive(Debug, Deserialize)]
struct HookResponse {
    id: u64,
    #[serde(default = "default_active")]
    active: bool,
    #[serde(default)]
    events: Vec<String>,
    #[serde(default)]
    config: HookConfigResponse,
}

const fn default_active() -> bool {
    true
}

#[derive(Debug, Default, Deserialize)]
struct HookConfigResponse {
    url: Option<String>,
    content_type: Option<String>,
    secret: Option<String>,
}

impl From<HookResponse> for RegisteredHook {
    fn from(hook: HookResponse) -> Self {
        Self {
            id: hook.id.to_string(),
            url: hook.config.url.unwrap_or_default(),
            active: hook.active,
            events: hook.events.into_iter().collect::<BTreeSet<_>>(),
            content_type: hook
                .config
                .content_type
                .unwrap_or_else(|| String::from(DEFAULT_CONTENT_TYPE)),
            secret_configured: hook.config.secret.is_some_and(|s| !s.is_empty()),
        }
    }
}

#[derive(Debug, Serialize)]
struct HookRequest<'a> {
    #[serde(skip_serializing_if = "Option::is_none")]
    name: Option<&'static str>,
    active: bool,
    events: Vec<&'a str>,
    config: HookConfigRequest<'a>,
}

#[derive(Debug, Serialize)]
struct HookConfigRequest<'a> {
    url: &'a str,
    content_type: &'a str,
    insecure_ssl: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    secret: Option<&'a str>,
}

impl<'a> HookRequest<'a> {
    fn from_spec(spec: &'a WebhookSpec, name: Option<&'static str>) -> Self {
        Self {
            name,
            active: spec.active,
            events: spec.events.iter().map(String::as_str).collect(),
            config: HookConfigRequest {
                url: &spec.url,
                content_type: &spec.content_type,
                insecure_ssl: "0",
                secret: spec.secret.as_deref(),
            },
        }
    }
}

impl GitHubHookRegistry {
    /// Creates a new client.
    ///
    /// # Errors
    ///
    /// Returns an error if the HTTP client cannot be created.
    pub fn new(api_url: &str, token: &str) -> Result<Self> {
        Self::with_timeout(api_url, token, DEFAULT_TIMEOUT_SECS)
    }

    /// Creates a client with a custom timeout.
    ///
    /// # Errors
    ///
    /// Returns an error if the HTTP client cannot be created.
    pub fn with_timeout(api_url: &str, token: &str, timeout_secs: u64) -> Result<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(timeout_secs))
            .user_agent(concat!("planrelay/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|e| RegistryError::network(format!("Failed to create HTTP client: {e}")))?;

        Ok(Self {
            client,
            api_url: api_url.trim_end_matches('/').to_string(),
            token: token.to_string(),
        })
    }

    /// Sends one request and classifies the response status.
    async fn send<B: Serialize + Sync>(&self, method: Method, path: &str, body: Option<&B>) -> Result<Response> {
        let url = format!("{}{path}", self.api_url);
        trace!("{method} {url}");

        let mut request = self
            .client
            .request(method, &url)
            .header(header::ACCEPT, "application/vnd.github+json")
            .header(header::AUTHORIZATION, format!("Bearer {}", self.token))
            .header("X-GitHub-Api-Version", "2022-11-28");
        if let Some(body) = body {
            request = request.json(body);
        }

        let response = request
            .send()
            .await
            .map_err(|e| RegistryError::network(format!("Request failed: {e}")))?;

        classify(response).await
    }
}

/// Maps error statuses to [`RegistryError`]s, passing successes through.
async fn classify(response: Response) -> Result<Response> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }

    let code = status.as_u16();
    let retry_after = header_u64(&response, "retry-after");
    let rate_exhausted = header_u64(&response, "x-ratelimit-remaining") == Some(0);
    let body = response.text().await.unwrap_or_default();

    let err = match code {
        429 => RegistryError::RateLimited {
            retry_after_secs: retry_after.unwrap_or(DEFAULT_RETRY_AFTER_SECS),
        },
        403 if rate_exhausted || retry_after.is_some() => RegistryError::RateLimited {
            retry_after_secs: retry_after.unwrap_or(DEFAULT_RETRY_AFTER_SECS),
        },
        401 | 403 => RegistryError::AuthenticationFailed {
            status: code,
            message: snippet(&body),
        },
        422 if body.to_lowercase().contains("already exists") => RegistryError::AlreadyExists {
            message: snippet(&body),
        },
        500..=599 => RegistryError::ServerError {
            status: code,
            snippet: snippet(&body),
        },
        _ => RegistryError::RequestFailed {
            status: code,
            snippet: snippet(&body),
        },
    };

    Err(RelayError::Registry(err))
}

fn header_u64(response: &Response, name: &str) -> Option<u64> {
    response
        .headers()
        .get(name)
        .and_then(|v| v.to_str().ok())
        .and_then(|s| s.trim().parse().ok())
}

#[async_trait]
impl WebhookRegistry for GitHubHookRegistry {
    async fn list(&self, owner: &OwnerScope) -> Result<Vec<RegisteredHook>> {
        let mut hooks = Vec::new();

        for page in 1.. {
            let path = format!("{}?per_page={PER_PAGE}&page={page}", owner.hooks_path());
            let response = self.send::<()>(Method::GET, &path, None).await?;
            let batch: Vec<HookResponse> = response.json().await.map_err(|e| {
                RelayError::Registry(RegistryError::InvalidResponse {
                    message: format!("Failed to parse hook list: {e}"),
                })
            })?;

            let done = batch.len() < PER_PAGE;
            hooks.extend(batch.into_iter().map(RegisteredHook::from));
            if done {
                break;
            }
        }

        debug!("Listed {} registrations for {owner}", hooks.len());
        Ok(hooks)
    }

    async fn create(&self, owner: &OwnerScope, spec: &WebhookSpec) -> Result<String> {
        let body = HookRequest::from_spec(spec, Some("web"));
        let response = self.send(Method::POST, &owner.hooks_path(), Some(&body)).await?;
        let hook: HookResponse = response.json().await.map_err(|e| {
            RelayError::Registry(RegistryError::InvalidResponse {
                message: format!("Failed to parse created hook: {e}"),
            })
        })?;

        debug!("Created registration {} for {}", hook.id, spec.url);
        Ok(hook.id.to_string())
    }

    async fn update(&self, owner: &OwnerScope, id: &str, spec: &WebhookSpec) -> Result<()> {
        let body = HookRequest::from_spec(spec, None);
        let path = format!("{}/{id}", owner.hooks_path());
        self.send(Method::PATCH, &path, Some(&body)).await?;

        debug!("Replaced registration {id} for {}", spec.url);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BTreeMap;
    use wiremock::matchers::{body_partial_json, header as header_matcher, method, path, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn owner() -> OwnerScope {
        OwnerScope::Repository {
            owner: String::from("acme"),
            name: String::from("infra"),
        }
    }

    fn spec() -> WebhookSpec {
        let desired: BTreeMap<String, serde_json::Value> = serde_json::from_value(serde_json::json!({
            "url": "https://x/events",
            "events": ["pull_request", "push"]
        }))
        .expect("map");
        WebhookSpec::from_desired_state(&desired, Some(String::from("s3cret"))).expect("spec")
    }

    #[tokio::test]
    async fn test_list_maps_hooks() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/repos/acme/infra/hooks"))
            .and(query_param("page", "1"))
            .and(header_matcher("authorization", "Bearer ghp_test"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!([
                {"id": 7, "active": true, "events": ["push", "pull_request"],
                 "config": {"url": "https://x/events", "content_type": "json", "secret": "********"}}
            ])))
            .mount(&server)
            .await;

        let registry = GitHubHookRegistry::new(&server.uri(), "ghp_test").expect("client");
        let hooks = registry.list(&owner()).await.expect("list");

        assert_eq!(hooks.len(), 1);
        assert_eq!(hooks[0].id, "7");
        assert!(hooks[0].secret_configured);
        assert!(spec().drift(&hooks[0]).is_empty());
    }

    #[tokio::test]
    async fn test_create_sends_full_spec() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/repos/acme/infra/hooks"))
            .and(body_partial_json(serde_json::json!({
                "name": "web",
                "active": true,
                "config": {"url": "https://x/events", "secret": "s3cret"}
            })))
            .respond_with(ResponseTemplate::new(201).set_body_json(serde_json::json!({"id": 99})))
            .expect(1)
            .mount(&server)
            .await;

        let registry = GitHubHookRegistry::new(&server.uri(), "ghp_test").expect("client");
        let id = registry.create(&owner(), &spec()).await.expect("create");
        assert_eq!(id, "99");
    }

    #[tokio::test]
    async fn test_status_classification() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/repos/acme/infra/hooks"))
            .respond_with(ResponseTemplate::new(401).set_body_string("Bad credentials"))
            .mount(&server)
            .await;
        Mock::given(method("POST"))
            .and(path("/repos/acme/infra/hooks"))
            .respond_with(
                ResponseTemplate::new(422).set_body_string(r#"{"message":"Hook already exists on this repository"}"#),
            )
            .mount(&server)
            .await;
        Mock::given(method("PATCH"))
            .respond_with(
                ResponseTemplate::new(403)
                    .insert_header("x-ratelimit-remaining", "0")
                    .insert_header("retry-after", "3"),
            )
            .mount(&server)
            .await;

        let registry = GitHubHookRegistry::new(&server.uri(), "ghp_test").expect("client");

        let err = registry.list(&owner()).await.expect_err("list should fail");
        assert!(err.is_auth_failure());

        let err = registry.create(&owner(), &spec()).await.expect_err("create should fail");
        assert!(matches!(err, RelayError::Registry(RegistryError::AlreadyExists { .. })));

        let err = registry.update(&owner(), "7", &spec()).await.expect_err("update should fail");
        assert!(err.is_retryable());
        assert_eq!(err.retry_delay_secs(), Some(3));
    }
}
