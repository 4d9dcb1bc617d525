//! Scenario runner.
//!
//! Provisions one stack for the whole run, executes named scenarios against
//! it one after another, and tears the stack down before reporting. A
//! scenario fails by panicking, so scenario bodies read like ordinary test
//! functions with `assert!` and `expect`.

use crate::config::{ConfigError, HarnessConfig, TimePolicy};
use crate::fixtures::{SessionClient, SessionError};
use crate::random::FixtureGenerator;
use crate::stack::{select_provisioner, StackError};
use std::any::Any;
use std::future::Future;
use std::pin::Pin;
use std::process::ExitCode;
use std::sync::Arc;
use std::time::Instant;
use thiserror::Error;
use tracing::{error, info, warn};
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;

/// Default log filter when `RUST_LOG` is unset.
const DEFAULT_LOG_FILTER: &str = "scheduler_harness=info,api_tests=info";

/// Fatal setup errors. Scenario failures are reported in [`RunReport`].
#[derive(Debug, Error)]
pub enum RunnerError {
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Stack provisioning failed: {0}")]
    Stack(#[from] StackError),

    #[error("Failed to build runtime: {0}")]
    Runtime(#[from] std::io::Error),
}

type ScenarioFuture = Pin<Box<dyn Future<Output = ()> + Send + 'static>>;
type ScenarioFn = Box<dyn Fn(ScenarioContext) -> ScenarioFuture + Send + Sync>;

/// A named scenario.
pub struct Scenario {
    name: &'static str,
    run: ScenarioFn,
}

impl std::fmt::Debug for Scenario {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Scenario").field("name", &self.name).finish()
    }
}

impl Scenario {
    pub fn new<F, Fut>(name: &'static str, run: F) -> Self
    where
        F: Fn(ScenarioContext) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = ()> + Send + 'static,
    {
        Self {
            name,
            run: Box::new(move |context| Box::pin(run(context))),
        }
    }

    pub fn name(&self) -> &'static str {
        self.name
    }
}

/// What a scenario gets to work with.
#[derive(Debug, Clone)]
pub struct ScenarioContext {
    base_url: Arc<str>,
    time_policy: TimePolicy,
    generator: Arc<FixtureGenerator>,
}

impl ScenarioContext {
    pub fn new(base_url: &str, time_policy: TimePolicy, generator: FixtureGenerator) -> Self {
        Self {
            base_url: Arc::from(base_url),
            time_policy,
            generator: Arc::new(generator),
        }
    }

    /// Base URL of the service, including the `/v1` prefix.
    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// Expected `time` normalization for this run.
    pub fn time_policy(&self) -> TimePolicy {
        self.time_policy
    }

    /// Child generator for values a scenario draws itself.
    pub fn generator(&self) -> FixtureGenerator {
        self.generator.fork()
    }

    /// Register and log in a fresh user whose activity client follows the
    /// run's time policy.
    pub async fn session(&self) -> Result<SessionClient, SessionError> {
        let mut session =
            SessionClient::new(self.base_url.to_string(), self.generator.fork()).await?;
        session.activity = session.activity.with_time_policy(self.time_policy);
        Ok(session)
    }
}

/// Outcome of a run.
#[derive(Debug, Default)]
pub struct RunReport {
    pub passed: Vec<&'static str>,
    pub failed: Vec<(&'static str, String)>,
    pub teardown_failed: bool,
}

impl RunReport {
    pub fn success(&self) -> bool {
        self.failed.is_empty() && !self.teardown_failed
    }

    pub fn exit_code(&self) -> ExitCode {
        if self.success() {
            ExitCode::SUCCESS
        } else {
            ExitCode::FAILURE
        }
    }
}

/// Install the fmt subscriber. Safe to call more than once.
pub fn init_tracing() {
    let _ = tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| DEFAULT_LOG_FILTER.into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .try_init();
}

/// Name filter taken from the first positional command-line argument.
///
/// Flags that `cargo test` forwards (`--nocapture` and friends) are ignored.
pub fn filter_from_args(args: impl IntoIterator<Item = String>) -> Option<String> {
    args.into_iter().skip(1).find(|arg| !arg.starts_with('-'))
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(message) = payload.downcast_ref::<&str>() {
        (*message).to_string()
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message.clone()
    } else {
        "scenario panicked".to_string()
    }
}

/// Run `scenarios` one by one against an already provisioned service.
///
/// Each scenario runs in its own task so a panic is captured and recorded
/// instead of ending the run.
pub async fn run_all(
    context: &ScenarioContext,
    scenarios: Vec<Scenario>,
    filter: Option<&str>,
) -> RunReport {
    let mut report = RunReport::default();

    for scenario in scenarios {
        if filter.is_some_and(|f| !scenario.name.contains(f)) {
            continue;
        }

        let start = Instant::now();
        let outcome = tokio::spawn((scenario.run)(context.clone())).await;
        let elapsed_ms = start.elapsed().as_millis() as u64;

        match outcome {
            Ok(()) => {
                info!(scenario = scenario.name, elapsed_ms, "Scenario passed");
                report.passed.push(scenario.name);
            }
            Err(join_error) => {
                let message = if join_error.is_panic() {
                    panic_message(join_error.into_panic().as_ref())
                } else {
                    join_error.to_string()
                };
                error!(scenario = scenario.name, elapsed_ms, failure = %message, "Scenario failed");
                report.failed.push((scenario.name, message));
            }
        }
    }

    report
}

/// Provision, run, tear down.
pub async fn execute(
    config: &HarnessConfig,
    scenarios: Vec<Scenario>,
    filter: Option<&str>,
) -> Result<RunReport, RunnerError> {
    let provisioner = select_provisioner(config);
    info!(mode = provisioner.name(), "Provisioning stack");

    let stack = provisioner.provision(config).await?;
    stack.publish_environment();

    let generator = FixtureGenerator::from_optional_seed(config.fixture_seed);
    let context = ScenarioContext::new(stack.base_url(), config.time_policy, generator);

    let mut report = run_all(&context, scenarios, filter).await;

    if let Err(e) = stack.teardown().await {
        error!(error = %e, "Stack teardown failed");
        report.teardown_failed = true;
    }

    info!(
        passed = report.passed.len(),
        failed = report.failed.len(),
        "Run complete"
    );
    for (name, message) in &report.failed {
        warn!(scenario = name, failure = %message, "Failed scenario");
    }

    Ok(report)
}

/// Entry point for a `harness = false` test target.
pub fn run_main(scenarios: Vec<Scenario>) -> ExitCode {
    init_tracing();
    let filter = filter_from_args(std::env::args());

    let result = HarnessConfig::from_env()
        .map_err(RunnerError::from)
        .and_then(|config| {
            let runtime = tokio::runtime::Builder::new_current_thread()
                .enable_all()
                .build()?;
            runtime.block_on(execute(&config, scenarios, filter.as_deref()))
        });

    match result {
        Ok(report) => report.exit_code(),
        Err(e) => {
            error!(error = %e, "Run aborted");
            ExitCode::FAILURE
        }
    }
}
