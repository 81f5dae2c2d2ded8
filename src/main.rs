//! planrelay CLI entrypoint.
//!
//! This is the main entrypoint for the planrelay command-line tool.

use std::path::Path;
use std::process::ExitCode;
use std::sync::Arc;
use std::time::Duration;

use planrelay::cli::{Cli, Commands, LogFormat, OutputFormatter, PlanArgs, RunArgs};
use planrelay::config::{ConfigParser, ConfigValidator, ReconcileConfig, RelayConfig};
use planrelay::error::{ConfigError, RelayError, Result};
use planrelay::pipeline::{PlanAnalysis, PlanPipeline};
use planrelay::plan::{ChangeSetExtractor, PlanArtifactLoader};
use planrelay::reconciler::{ResourceReconciler, RetryPolicy};
use planrelay::registry::{GitHubHookRegistry, OwnerScope};
use planrelay::secrets::{SecretRecord, SecretSynchronizer};
use planrelay::state::{LocalTargetStore, TargetStore};

use clap::Parser;
use tracing::{debug, info, warn};
use tracing_subscriber::EnvFilter;

/// Main entrypoint.
fn main() -> ExitCode {
    let cli = Cli::parse();

    // Initialize logging
    init_logging(cli.verbose, cli.log_format);

    // Run async runtime
    let runtime = match tokio::runtime::Runtime::new() {
        Ok(rt) => rt,
        Err(e) => {
            eprintln!("Failed to create async runtime: {e}");
            return ExitCode::FAILURE;
        }
    };

    match runtime.block_on(run(cli)) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("Error: {e}");
            ExitCode::FAILURE
        }
    }
}

/// Initializes the logging system. Logs go to stderr so command output on
/// stdout stays machine-readable.
fn init_logging(verbose: bool, format: LogFormat) {
    let filter = if verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"))
    };

    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr);

    match format {
        LogFormat::Text => builder.init(),
        LogFormat::Json => builder.json().init(),
    }
}

/// Main async entry point.
async fn run(cli: Cli) -> Result<()> {
    let formatter = OutputFormatter::new(cli.output);
    let config_path = cli.config.as_deref();

    match cli.command {
        Commands::Notify { plan, run } => cmd_notify(config_path, &plan, &run, &formatter).await,
        Commands::Summarize { plan } => cmd_summarize(&plan, &formatter).await,
        Commands::Reconcile { max_attempts } => {
            cmd_reconcile(config_path, max_attempts, &formatter).await
        }
        Commands::Secret => cmd_secret(config_path, &formatter).await,
        Commands::Validate { warnings } => cmd_validate(config_path, warnings, &formatter),
    }
}

/// Run the full notification pipeline for one plan.
async fn cmd_notify(
    config_path: Option<&Path>,
    plan: &PlanArgs,
    run: &RunArgs,
    formatter: &OutputFormatter,
) -> Result<()> {
    let config = load_config(config_path)?;
    let pipeline = PlanPipeline::from_config(&config, ConfigParser::estimator_api_key()).await?;
    let metadata = run.metadata(|name| std::env::var(name).ok());

    info!(correlation_id = %metadata.correlation_id, "Starting notify run");
    let report = pipeline.run(&plan.source(), &metadata).await?;

    println!("{}", formatter.format_run_report(&report));
    Ok(())
}

/// Analyze a plan without network access.
async fn cmd_summarize(plan: &PlanArgs, formatter: &OutputFormatter) -> Result<()> {
    let artifact = PlanArtifactLoader::new().load(&plan.source()).await?;
    let analysis = PlanAnalysis::of(&ChangeSetExtractor::new(), &artifact);

    println!("{}", formatter.format_analysis(&analysis));
    Ok(())
}

/// Synchronize the secret, then converge the webhook registration.
async fn cmd_reconcile(
    config_path: Option<&Path>,
    max_attempts: Option<u32>,
    formatter: &OutputFormatter,
) -> Result<()> {
    let config = load_config(config_path)?;
    let reconcile = reconcile_section(&config)?;
    let owner: OwnerScope = reconcile
        .owner
        .parse()
        .map_err(|reason: String| RelayError::Config(ConfigError::validation(reason, "reconcile.owner")))?;

    // The secret must be settled before the registration that carries it.
    let secret = sync_secret(reconcile).await?;

    let token = ConfigParser::github_token()?;
    let registry = Arc::new(GitHubHookRegistry::new(&reconcile.api_url, &token)?);
    let store: Arc<dyn TargetStore> = Arc::new(LocalTargetStore::with_base_dir(&reconcile.state_path));

    let mut target = reconcile.webhook.to_target();
    if let Some(previous) = store.load(&target.name).await? {
        debug!("Found recorded registration {:?} for '{}'", previous.external_id, target.name);
        target.external_id = previous.external_id;
        target.last_converged_at = previous.last_converged_at;
    }

    let policy = RetryPolicy::with_max_attempts(max_attempts.unwrap_or(reconcile.max_attempts));
    let reconciler = ResourceReconciler::new(registry, owner)
        .with_secret(&secret)
        .with_target_store(store)
        .with_retry_policy(policy);

    let result = reconciler.reconcile(&mut target).await?;

    println!("{}", formatter.format_reconciliation(&result, &secret));
    Ok(())
}

/// Ensure the signing secret exists.
async fn cmd_secret(config_path: Option<&Path>, formatter: &OutputFormatter) -> Result<()> {
    let config = load_config(config_path)?;
    let secret = sync_secret(reconcile_section(&config)?).await?;

    println!("{}", formatter.format_secret(&secret));
    Ok(())
}

/// Validate configuration.
fn cmd_validate(
    config_path: Option<&Path>,
    show_warnings: bool,
    formatter: &OutputFormatter,
) -> Result<()> {
    let parser = parser_for(config_path);
    parser.load_dotenv()?;
    let config = parser.load(config_path)?;

    let validator = ConfigValidator::new();
    let result = validator.check(&config);
    println!("{}", formatter.format_validation(&result, show_warnings));

    validator.validate(&config).map(|_| ())
}

// ============================================================================
// Helper Functions
// ============================================================================

/// Creates a parser rooted next to the configuration file.
fn parser_for(config_path: Option<&Path>) -> ConfigParser {
    let base = config_path
        .and_then(Path::parent)
        .filter(|p| !p.as_os_str().is_empty())
        .unwrap_or_else(|| Path::new("."));
    ConfigParser::new().with_base_path(base)
}

/// Loads and validates the configuration.
fn load_config(config_path: Option<&Path>) -> Result<RelayConfig> {
    let parser = parser_for(config_path);
    parser.load_dotenv()?;
    let config = parser.load(config_path)?;

    let result = ConfigValidator::new().validate(&config)?;
    for warning in &result.warnings {
        warn!("{warning}");
    }

    Ok(config)
}

/// Returns the reconcile section or a configuration error.
fn reconcile_section(config: &RelayConfig) -> Result<&ReconcileConfig> {
    config.reconcile.as_ref().ok_or_else(|| {
        RelayError::Config(ConfigError::validation("No reconcile section configured", "reconcile"))
    })
}

/// Runs the secret synchronizer for the configured secret.
async fn sync_secret(reconcile: &ReconcileConfig) -> Result<SecretRecord> {
    let store = reconcile.secret.store.secret_store().await?;
    SecretSynchronizer::new(store)
        .with_read_timeout(Duration::from_secs(reconcile.secret.timeout_secs))
        .ensure(&reconcile.secret.name)
        .await
}
