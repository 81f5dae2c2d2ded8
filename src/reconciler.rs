//! Reconciler for webhook registrations.
//!
//! Converges one desired registration against the registry with an explicit
//! state machine:
//!
//! - `NotFound -> Creating -> Converged`
//! - `Found -> Converged` when nothing drifted
//! - `Found -> Drifted -> Updating -> Converged`
//!
//! The registry is re-listed before every write, so concurrent runs never
//! rely on cached state. A create rejected as "already exists" means another
//! run won the race; the reconciler re-lists once and continues from `Found`.

use serde::Serialize;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, error, info, warn};

use crate::error::{ReconcileError, RegistryError, RelayError, Result};
use crate::registry::{OwnerScope, RegisteredHook, WebhookRegistry, WebhookSpec};
use crate::secrets::{SecretOrigin, SecretRecord};
use crate::state::{ReconciliationTarget, TargetKind, TargetStore};

/// Retry policy for transient registry failures.
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    /// Total attempts, including the first.
    pub max_attempts: u32,
    /// Delay before the first retry.
    pub base_delay: Duration,
    /// Upper bound for any delay, including server-provided ones.
    pub max_delay: Duration,
    /// Fraction of the delay added or removed at random.
    pub jitter_factor: f64,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            base_delay: Duration::from_millis(500),
            max_delay: Duration::from_secs(8),
            jitter_factor: 0.1,
        }
    }
}

impl RetryPolicy {
    /// Creates the default policy with a different attempt budget.
    #[must_use]
    pub fn with_max_attempts(max_attempts: u32) -> Self {
        Self {
            max_attempts: max_attempts.max(1),
            ..Self::default()
        }
    }

    /// Delay before retrying after the 0-indexed `attempt`.
    ///
    /// A server-provided hint replaces the exponential delay. Either way the
    /// result never exceeds `max_delay`.
    #[must_use]
    pub fn delay_for(&self, attempt: u32, hint_secs: Option<u64>) -> Duration {
        let base = hint_secs.map_or_else(
            || {
                let factor = 2u32.saturating_pow(attempt);
                let jitter = (rand::random::<f64>() * 2.0 - 1.0) * self.jitter_factor;
                self.base_delay.saturating_mul(factor).mul_f64((1.0 + jitter).max(0.0))
            },
            Duration::from_secs,
        );
        base.min(self.max_delay)
    }
}

/// What the reconciler did.
#[derive(Debug, Clone, Copy, Serialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum ReconcileAction {
    /// A registration was created.
    Created,
    /// A drifted registration was replaced.
    Updated,
    /// The registration already matched.
    Unchanged,
}

/// Convergence states.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConvergenceState {
    /// No registration has the desired URL.
    NotFound,
    /// A registration with the desired URL exists.
    Found(RegisteredHook),
    /// The registration differs in the listed fields.
    Drifted {
        /// The registration.
        hook: RegisteredHook,
        /// Fields that differ.
        fields: Vec<&'static str>,
    },
    /// A create call is due.
    Creating,
    /// A full-replace update of `id` is due.
    Updating {
        /// Registration id.
        id: String,
    },
    /// Terminal: actual state matches desired state.
    Converged {
        /// Registration id.
        id: String,
        /// What was done to get here.
        action: ReconcileAction,
    },
}

/// Result of a reconciliation run.
#[derive(Debug, Clone, Serialize)]
pub struct ReconciliationResult {
    /// Target name.
    pub target: String,
    /// Registration id.
    pub external_id: String,
    /// What was done.
    pub action: ReconcileAction,
    /// Fields that had drifted.
    pub drifted: Vec<String>,
    /// Whether a concurrent create was detected.
    pub raced: bool,
}

/// Reconciler for webhook registrations.
pub struct ResourceReconciler {
    /// Registry client.
    registry: Arc<dyn WebhookRegistry>,
    /// Scope whose registrations are managed.
    owner: OwnerScope,
    /// Signing secret, handed over by the synchronizer.
    secret: Option<String>,
    /// The secret was generated in this run, so no registration carries it yet.
    secret_rotated: bool,
    /// Where converged targets are recorded.
    target_store: Option<Arc<dyn TargetStore>>,
    /// Retry policy.
    retry: RetryPolicy,
}

impl std::fmt::Debug for ResourceReconciler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ResourceReconciler")
            .field("owner", &self.owner)
            .field("secret", &self.secret.as_ref().map(|_| "<redacted>"))
            .field("secret_rotated", &self.secret_rotated)
            .field("target_store", &self.target_store.as_ref().map(|s| s.backend_type()))
            .field("retry", &self.retry)
            .finish()
    }
}

impl ResourceReconciler {
    /// Creates a reconciler for registrations under `owner`.
    #[must_use]
    pub fn new(registry: Arc<dyn WebhookRegistry>, owner: OwnerScope) -> Self {
        Self {
            registry,
            owner,
            secret: None,
            secret_rotated: false,
            target_store: None,
            retry: RetryPolicy::default(),
        }
    }

    /// Sets the signing secret every registration must carry.
    ///
    /// The registry never reveals a configured secret, so a freshly
    /// generated one is pushed to an existing registration unconditionally.
    #[must_use]
    pub fn with_secret(mut self, secret: &SecretRecord) -> Self {
        self.secret = Some(secret.current_value.clone());
        self.secret_rotated = secret.origin == SecretOrigin::Generated;
        self
    }

    /// Records converged targets in `store`.
    #[must_use]
    pub fn with_target_store(mut self, store: Arc<dyn TargetStore>) -> Self {
        self.target_store = Some(store);
        self
    }

    /// Sets the retry policy.
    #[must_use]
    pub fn with_retry_policy(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    /// Converges `target` and records the registration id on it.
    ///
    /// # Errors
    ///
    /// Returns an error on authentication failure, on an invalid desired
    /// state, once transient failures exhaust the retry budget, or if the
    /// registry refuses a request.
    pub async fn reconcile(&self, target: &mut ReconciliationTarget) -> Result<ReconciliationResult> {
        if target.kind != TargetKind::Webhook {
            return Err(ReconcileError::InvalidDesiredState {
                kind: target.kind.to_string(),
                reason: String::from("only webhook targets are reconciled against the registry"),
            }
            .into());
        }

        let spec = WebhookSpec::from_desired_state(&target.desired_state, self.secret.clone())?;
        info!("Reconciling webhook '{}' ({}) under {}", target.name, spec.url, self.owner);

        let mut state = self.observe(&spec, target.external_id.as_deref()).await?;
        let mut drifted = Vec::new();
        let mut raced = false;

        loop {
            debug!(state = ?state_name(&state), "Reconciler transition");
            state = match state {
                ConvergenceState::NotFound => ConvergenceState::Creating,
                ConvergenceState::Found(hook) => {
                    let mut fields = spec.drift(&hook);
                    if self.secret_rotated && !fields.contains(&"secret") {
                        fields.push("secret");
                    }
                    if fields.is_empty() {
                        ConvergenceState::Converged {
                            id: hook.id,
                            action: ReconcileAction::Unchanged,
                        }
                    } else {
                        ConvergenceState::Drifted { hook, fields }
                    }
                }
                ConvergenceState::Drifted { hook, fields } => {
                    info!("Registration {} drifted in: {}", hook.id, fields.join(", "));
                    drifted = fields.iter().map(ToString::to_string).collect();
                    ConvergenceState::Updating { id: hook.id }
                }
                ConvergenceState::Creating => match self.create(&spec).await {
                    Ok(id) => ConvergenceState::Converged {
                        id,
                        action: ReconcileAction::Created,
                    },
                    Err(RelayError::Registry(RegistryError::AlreadyExists { message })) if !raced => {
                        warn!("Create raced with another run ({message}); re-listing");
                        raced = true;
                        match self.observe(&spec, target.external_id.as_deref()).await? {
                            ConvergenceState::NotFound => {
                                return Err(ReconcileError::LostRace { url: spec.url.clone() }.into());
                            }
                            found => found,
                        }
                    }
                    Err(e) => return Err(e),
                },
                ConvergenceState::Updating { id } => {
                    self.update(&id, &spec).await?;
                    ConvergenceState::Converged {
                        id,
                        action: ReconcileAction::Updated,
                    }
                }
                ConvergenceState::Converged { id, action } => {
                    info!("Webhook '{}' converged: {action:?} (id {id})", target.name);
                    target.desired_state = spec.to_desired_state();
                    target.record_converged(id.clone());
                    if let Some(store) = &self.target_store {
                        store.save(target).await?;
                    }
                    return Ok(ReconciliationResult {
                        target: target.name.clone(),
                        external_id: id,
                        action,
                        drifted,
                        raced,
                    });
                }
            };
        }
    }

    /// Lists the registry and locates the registration for `spec.url`.
    async fn observe(&self, spec: &WebhookSpec, recorded_id: Option<&str>) -> Result<ConvergenceState> {
        let hooks = self
            .with_retry("list registrations", || self.registry.list(&self.owner))
            .await?;

        let mut matches: Vec<RegisteredHook> = hooks.into_iter().filter(|h| h.url == spec.url).collect();
        if matches.len() > 1 {
            warn!(
                "{} registrations share {}; preferring the recorded or oldest one",
                matches.len(),
                spec.url
            );
        }

        let chosen = recorded_id
            .and_then(|id| matches.iter().position(|h| h.id == id))
            .or_else(|| {
                matches
                    .iter()
                    .enumerate()
                    .min_by(|(_, a), (_, b)| compare_ids(&a.id, &b.id))
                    .map(|(i, _)| i)
            });

        Ok(match chosen {
            Some(i) => ConvergenceState::Found(matches.swap_remove(i)),
            None => ConvergenceState::NotFound,
        })
    }

    async fn create(&self, spec: &WebhookSpec) -> Result<String> {
        self.with_retry("create registration", || self.registry.create(&self.owner, spec))
            .await
    }

    async fn update(&self, id: &str, spec: &WebhookSpec) -> Result<()> {
        self.with_retry("update registration", || self.registry.update(&self.owner, id, spec))
            .await
    }

    /// Runs `call` under the retry policy.
    ///
    /// Authentication failures abort immediately; transient failures are
    /// retried; anything else is returned to the caller unchanged.
    async fn with_retry<T, F, Fut>(&self, operation: &str, call: F) -> Result<T>
    where
        F: Fn() -> Fut,
        Fut: std::future::Future<Output = Result<T>>,
    {
        let mut attempt = 0;
        loop {
            match call().await {
                Ok(value) => return Ok(value),
                Err(e) if e.is_auth_failure() => {
                    error!("Registry rejected credentials while trying to {operation}: {e}");
                    return Err(ReconcileError::AuthenticationFailed {
                        reason: format!("{e}. Check that GITHUB_TOKEN is valid and has admin:repo_hook scope"),
                    }
                    .into());
                }
                Err(e) if e.is_retryable() => {
                    attempt += 1;
                    if attempt >= self.retry.max_attempts {
                        error!("Giving up on {operation} after {attempt} attempts: {e}");
                        return Err(ReconcileError::MaxRetriesExceeded {
                            attempts: attempt,
                            operation: operation.to_string(),
                            last_error: e.to_string(),
                        }
                        .into());
                    }
                    let delay = self.retry.delay_for(attempt - 1, e.retry_delay_secs());
                    warn!(
                        "Attempt {attempt}/{} to {operation} failed: {e}; retrying in {delay:?}",
                        self.retry.max_attempts
                    );
                    tokio::time::sleep(delay).await;
                }
                Err(RelayError::Registry(RegistryError::RequestFailed { status, snippet })) => {
                    return Err(ReconcileError::Refused {
                        operation: operation.to_string(),
                        reason: format!("{status}: {snippet}"),
                    }
                    .into());
                }
                Err(e) => return Err(e),
            }
        }
    }
}

/// Orders registration ids numerically when possible.
fn compare_ids(a: &str, b: &str) -> std::cmp::Ordering {
    match (a.parse::<u64>(), b.parse::<u64>()) {
        (Ok(x), Ok(y)) => x.cmp(&y),
        _ => a.cmp(b),
    }
}

const fn state_name(state: &ConvergenceState) -> &'static str {
    match state {
        ConvergenceState::NotFound => "not_found",
        ConvergenceState::Found(_) => "found",
        ConvergenceState::Drifted { .. } => "drifted",
        ConvergenceState::Creating => "creating",
        ConvergenceState::Updating { .. } => "updating",
        ConvergenceState::Converged { .. } => "converged",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::secrets::{InMemorySecretStore, SecretSynchronizer};
    use crate::state::LocalTargetStore;
    use async_trait::async_trait;
    use chrono::Utc;
    use serde_json::json;
    use std::collections::{BTreeMap, VecDeque};
    use std::sync::Mutex;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use tempfile::TempDir;

    /// In-memory registry that counts calls and can inject failures.
    #[derive(Default)]
    struct FakeRegistry {
        hooks: Mutex<Vec<RegisteredHook>>,
        failures: Mutex<VecDeque<RelayError>>,
        race_on_create: bool,
        next_id: AtomicUsize,
        lists: AtomicUsize,
        creates: AtomicUsize,
        updates: AtomicUsize,
    }

    impl FakeRegistry {
        fn with_hooks(hooks: Vec<RegisteredHook>) -> Self {
            Self {
                hooks: Mutex::new(hooks),
                next_id: AtomicUsize::new(100),
                ..Self::default()
            }
        }

        fn fail_next(&self, err: RelayError) {
            self.failures.lock().expect("lock").push_back(err);
        }

        fn injected(&self) -> Result<()> {
            self.failures.lock().expect("lock").pop_front().map_or(Ok(()), Err)
        }

        fn insert(&self, spec: &WebhookSpec) -> String {
            let id = self.next_id.fetch_add(1, Ordering::SeqCst).to_string();
            self.hooks.lock().expect("lock").push(hook(&id, spec));
            id
        }
    }

    fn hook(id: &str, spec: &WebhookSpec) -> RegisteredHook {
        RegisteredHook {
            id: id.to_string(),
            url: spec.url.clone(),
            active: spec.active,
            events: spec.events.clone(),
            content_type: spec.content_type.clone(),
            secret_configured: spec.secret.is_some(),
        }
    }

    #[async_trait]
    impl WebhookRegistry for FakeRegistry {
        async fn list(&self, _owner: &OwnerScope) -> Result<Vec<RegisteredHook>> {
            self.lists.fetch_add(1, Ordering::SeqCst);
            self.injected()?;
            Ok(self.hooks.lock().expect("lock").clone())
        }

        async fn create(&self, _owner: &OwnerScope, spec: &WebhookSpec) -> Result<String> {
            self.creates.fetch_add(1, Ordering::SeqCst);
            self.injected()?;
            if self.race_on_create {
                // Another run created it first.
                self.insert(spec);
                return Err(RelayError::Registry(RegistryError::AlreadyExists {
                    message: String::from("Hook already exists on this repository"),
                }));
            }
            Ok(self.insert(spec))
        }

        async fn update(&self, _owner: &OwnerScope, id: &str, spec: &WebhookSpec) -> Result<()> {
            self.updates.fetch_add(1, Ordering::SeqCst);
            self.injected()?;
            let mut hooks = self.hooks.lock().expect("lock");
            if let Some(existing) = hooks.iter_mut().find(|h| h.id == id) {
                *existing = hook(id, spec);
            }
            Ok(())
        }
    }

    fn owner() -> OwnerScope {
        OwnerScope::Repository {
            owner: String::from("acme"),
            name: String::from("infra"),
        }
    }

    fn target() -> ReconciliationTarget {
        let desired: BTreeMap<String, serde_json::Value> = serde_json::from_value(json!({
            "url": "https://x/events",
            "active": true,
            "events": ["A", "B"]
        }))
        .expect("map");
        ReconciliationTarget::new("atlantis", TargetKind::Webhook, desired)
    }

    fn secret(value: &str) -> SecretRecord {
        SecretRecord {
            name: String::from("webhook-secret"),
            current_value: value.to_string(),
            last_synced_at: Utc::now(),
            origin: SecretOrigin::Reused,
        }
    }

    fn fast_retry() -> RetryPolicy {
        RetryPolicy {
            max_attempts: 3,
            base_delay: Duration::ZERO,
            max_delay: Duration::ZERO,
            jitter_factor: 0.0,
        }
    }

    fn reconciler(registry: &Arc<FakeRegistry>) -> ResourceReconciler {
        ResourceReconciler::new(registry.clone(), owner()).with_retry_policy(fast_retry())
    }

    #[tokio::test]
    async fn test_empty_registry_creates_once_then_is_idempotent() {
        let registry = Arc::new(FakeRegistry::with_hooks(Vec::new()));
        let reconciler = reconciler(&registry);
        let mut target = target();

        let first = reconciler.reconcile(&mut target).await.expect("reconcile");
        assert_eq!(first.action, ReconcileAction::Created);
        assert_eq!(target.external_id.as_deref(), Some(first.external_id.as_str()));
        assert_eq!(registry.creates.load(Ordering::SeqCst), 1);

        let second = reconciler.reconcile(&mut target).await.expect("reconcile");
        assert_eq!(second.action, ReconcileAction::Unchanged);
        assert_eq!(second.external_id, first.external_id);
        assert_eq!(registry.creates.load(Ordering::SeqCst), 1);
        assert_eq!(registry.updates.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_drift_triggers_single_full_update() {
        let spec = WebhookSpec::from_desired_state(&target().desired_state, None).expect("spec");
        let mut stale = hook("7", &spec);
        stale.active = false;
        stale.events = ["A"].iter().map(ToString::to_string).collect();

        let registry = Arc::new(FakeRegistry::with_hooks(vec![stale]));
        let reconciler = reconciler(&registry);
        let mut target = target();

        let result = reconciler.reconcile(&mut target).await.expect("reconcile");
        assert_eq!(result.action, ReconcileAction::Updated);
        assert_eq!(result.external_id, "7");
        assert_eq!(result.drifted, vec!["active", "events"]);
        assert_eq!(registry.updates.load(Ordering::SeqCst), 1);
        assert_eq!(registry.creates.load(Ordering::SeqCst), 0);

        let again = reconciler.reconcile(&mut target).await.expect("reconcile");
        assert_eq!(again.action, ReconcileAction::Unchanged);
        assert_eq!(registry.updates.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_missing_secret_on_registration_is_drift() {
        let spec = WebhookSpec::from_desired_state(&target().desired_state, None).expect("spec");
        let registry = Arc::new(FakeRegistry::with_hooks(vec![hook("7", &spec)]));
        let reconciler = reconciler(&registry).with_secret(&secret("shared"));

        let result = reconciler.reconcile(&mut target()).await.expect("reconcile");
        assert_eq!(result.action, ReconcileAction::Updated);
        assert_eq!(result.drifted, vec!["secret"]);
    }

    #[tokio::test]
    async fn test_generated_secret_is_pushed_to_existing_registration() {
        let spec = WebhookSpec::from_desired_state(&target().desired_state, Some(String::from("lost")))
            .expect("spec");
        let registry = Arc::new(FakeRegistry::with_hooks(vec![hook("7", &spec)]));

        // The store lost the value, so the synchronizer generates a new one.
        let store = Arc::new(InMemorySecretStore::new());
        let generated = SecretSynchronizer::new(store)
            .ensure("webhook-secret")
            .await
            .expect("ensure");
        assert_eq!(generated.origin, SecretOrigin::Generated);

        let result = reconciler(&registry)
            .with_secret(&generated)
            .reconcile(&mut target())
            .await
            .expect("reconcile");
        assert_eq!(result.action, ReconcileAction::Updated);
        assert_eq!(result.external_id, "7");
        assert_eq!(result.drifted, vec!["secret"]);
        assert_eq!(registry.updates.load(Ordering::SeqCst), 1);
        assert_eq!(registry.creates.load(Ordering::SeqCst), 0);

        let reused = reconciler(&registry)
            .with_secret(&secret("lost"))
            .reconcile(&mut target())
            .await
            .expect("reconcile");
        assert_eq!(reused.action, ReconcileAction::Unchanged);
        assert_eq!(registry.updates.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_create_race_is_success() {
        let registry = Arc::new(FakeRegistry {
            race_on_create: true,
            next_id: AtomicUsize::new(200),
            ..FakeRegistry::default()
        });
        let reconciler = reconciler(&registry);
        let mut target = target();

        let result = reconciler.reconcile(&mut target).await.expect("reconcile");
        assert!(result.raced);
        assert_eq!(result.action, ReconcileAction::Unchanged);
        assert_eq!(result.external_id, "200");
        assert_eq!(registry.lists.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_auth_failure_is_fatal_without_retry() {
        let registry = Arc::new(FakeRegistry::default());
        registry.fail_next(RelayError::Registry(RegistryError::AuthenticationFailed {
            status: 401,
            message: String::from("Bad credentials"),
        }));

        let err = reconciler(&registry)
            .reconcile(&mut target())
            .await
            .expect_err("should fail");
        assert!(matches!(
            err,
            RelayError::Reconcile(ReconcileError::AuthenticationFailed { .. })
        ));
        assert_eq!(registry.lists.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_transient_failures_are_retried() {
        let registry = Arc::new(FakeRegistry::with_hooks(Vec::new()));
        registry.fail_next(RelayError::Registry(RegistryError::network("connection reset")));
        registry.fail_next(RelayError::Registry(RegistryError::RateLimited { retry_after_secs: 60 }));

        let result = reconciler(&registry)
            .reconcile(&mut target())
            .await
            .expect("reconcile");
        assert_eq!(result.action, ReconcileAction::Created);
        assert_eq!(registry.lists.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_retries_are_bounded() {
        let registry = Arc::new(FakeRegistry::default());
        for _ in 0..5 {
            registry.fail_next(RelayError::Registry(RegistryError::ServerError {
                status: 502,
                snippet: String::from("bad gateway"),
            }));
        }

        let err = reconciler(&registry)
            .reconcile(&mut target())
            .await
            .expect_err("should fail");
        assert!(matches!(
            err,
            RelayError::Reconcile(ReconcileError::MaxRetriesExceeded { attempts: 3, .. })
        ));
        assert_eq!(registry.lists.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_duplicate_urls_prefer_recorded_id() {
        let spec = WebhookSpec::from_desired_state(&target().desired_state, None).expect("spec");
        let registry = Arc::new(FakeRegistry::with_hooks(vec![hook("12", &spec), hook("9", &spec)]));

        let mut recorded = target();
        recorded.external_id = Some(String::from("12"));
        let result = reconciler(&registry).reconcile(&mut recorded).await.expect("reconcile");
        assert_eq!(result.external_id, "12");

        let result = reconciler(&registry).reconcile(&mut target()).await.expect("reconcile");
        assert_eq!(result.external_id, "9");
    }

    #[tokio::test]
    async fn test_converged_target_is_persisted() {
        let temp = TempDir::new().expect("temp dir");
        let store = Arc::new(LocalTargetStore::with_base_dir(temp.path()));
        let registry = Arc::new(FakeRegistry::with_hooks(Vec::new()));

        let result = reconciler(&registry)
            .with_target_store(store.clone())
            .reconcile(&mut target())
            .await
            .expect("reconcile");

        let saved = store.load("atlantis").await.expect("load").expect("saved");
        assert_eq!(saved.external_id, Some(result.external_id));
        assert!(saved.last_converged_at.is_some());
    }

    #[tokio::test]
    async fn test_secret_targets_are_rejected() {
        let registry = Arc::new(FakeRegistry::default());
        let mut target = ReconciliationTarget::new("secret", TargetKind::Secret, BTreeMap::new());
        let err = reconciler(&registry).reconcile(&mut target).await.expect_err("should fail");
        assert!(matches!(
            err,
            RelayError::Reconcile(ReconcileError::InvalidDesiredState { .. })
        ));
    }

    #[test]
    fn test_delay_is_capped() {
        let policy = RetryPolicy::default();
        assert_eq!(policy.delay_for(0, Some(60)), Duration::from_secs(8));
        assert!(policy.delay_for(10, None) <= Duration::from_secs(8));
        assert!(policy.delay_for(0, None) <= Duration::from_millis(550));
    }
}
