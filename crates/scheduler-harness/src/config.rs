//! Harness configuration.
//!
//! Configuration is loaded from environment variables. The same variables are
//! read whether the service is provisioned in containers or supplied
//! externally, so client code discovers the service uniformly.

use std::collections::HashMap;
use std::env;
use std::fmt;
use std::time::Duration;
use thiserror::Error;

/// Default base URL of an externally running service.
pub const DEFAULT_BASE_URL: &str = "http://localhost:8080/v1";

/// Default service image repository.
pub const DEFAULT_SERVER_IMAGE: &str = "t1mon1106/scheduler";

/// Default service image tag.
pub const DEFAULT_SERVER_TAG: &str = "main";

/// Default readiness probe budget in seconds.
pub const DEFAULT_READINESS_TIMEOUT_SECS: u64 = 120;

/// Environment variable names.
pub mod env_keys {
    pub const IS_CONTAINERS: &str = "IS_CONTAINERS";
    pub const BASE_URL: &str = "BASE_URL";
    pub const SERVER_TAG: &str = "SERVER_TAG";
    pub const SERVER_IMAGE: &str = "SERVER_IMAGE";
    // Written for downstream consumers once the stores are up; never read
    // back by the harness.
    pub const DATABASE_PORT: &str = "DATABASE_PORT";
    pub const CACHE_HOST: &str = "CACHE_HOST";
    pub const CACHE_PORT: &str = "CACHE_PORT";
    pub const FIXTURE_SEED: &str = "FIXTURE_SEED";
    pub const READINESS_TIMEOUT_SECS: &str = "READINESS_TIMEOUT_SECS";
    pub const TIME_POLICY: &str = "TIME_POLICY";
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Invalid value for {name}: {message}")]
    InvalidValue { name: &'static str, message: String },
}

/// How the service stores the client-supplied `time` value.
///
/// Observed deployments convert minutes to seconds; other revisions store the
/// value unchanged. Selected with `TIME_POLICY`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum TimePolicy {
    /// Stored value equals the submitted value.
    Verbatim,

    /// Stored value is the submitted value multiplied by 60.
    #[default]
    MinutesToSeconds,
}

impl TimePolicy {
    /// Expected `time` in a response for a submitted `time`.
    ///
    /// Saturates at `i64::MAX`.
    pub fn expected(&self, submitted: i64) -> i64 {
        match self {
            TimePolicy::Verbatim => submitted,
            TimePolicy::MinutesToSeconds => submitted.saturating_mul(60),
        }
    }

    /// Value to submit so that the service stores `stored` again.
    pub fn submitted_for(&self, stored: i64) -> i64 {
        match self {
            TimePolicy::Verbatim => stored,
            TimePolicy::MinutesToSeconds => stored / 60,
        }
    }

    fn parse(value: &str) -> Result<Self, ConfigError> {
        match value.trim().to_ascii_lowercase().as_str() {
            "verbatim" => Ok(TimePolicy::Verbatim),
            "minutes-to-seconds" => Ok(TimePolicy::MinutesToSeconds),
            other => Err(ConfigError::InvalidValue {
                name: env_keys::TIME_POLICY,
                message: format!(
                    "expected 'verbatim' or 'minutes-to-seconds', got '{}'",
                    other
                ),
            }),
        }
    }
}

/// Harness configuration.
#[derive(Debug, Clone)]
pub struct HarnessConfig {
    /// Provision the relational store, cache store and service in containers.
    pub containers_enabled: bool,

    /// Base URL of the service, including the `/v1` prefix.
    pub base_url: String,

    /// Service image repository.
    pub server_image: String,

    /// Service image tag.
    pub server_tag: String,

    /// Seed for random fixtures. A fresh seed is drawn when absent.
    pub fixture_seed: Option<u64>,

    /// Total budget for the readiness probe.
    pub readiness_timeout: Duration,

    /// Expected `time` normalization.
    pub time_policy: TimePolicy,
}

impl HarnessConfig {
    /// Load configuration from environment variables.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_vars(&env::vars().collect())
    }

    /// Load configuration from a HashMap (for testing).
    pub fn from_vars(vars: &HashMap<String, String>) -> Result<Self, ConfigError> {
        let containers_enabled = vars
            .get(env_keys::IS_CONTAINERS)
            .map(|v| v == "true")
            .unwrap_or(false);

        let base_url = vars
            .get(env_keys::BASE_URL)
            .cloned()
            .unwrap_or_else(|| DEFAULT_BASE_URL.to_string());

        let server_image = vars
            .get(env_keys::SERVER_IMAGE)
            .cloned()
            .unwrap_or_else(|| DEFAULT_SERVER_IMAGE.to_string());

        let server_tag = vars
            .get(env_keys::SERVER_TAG)
            .cloned()
            .unwrap_or_else(|| DEFAULT_SERVER_TAG.to_string());

        let fixture_seed = parse_optional::<u64>(vars, env_keys::FIXTURE_SEED)?;

        let readiness_secs = parse_optional::<u64>(vars, env_keys::READINESS_TIMEOUT_SECS)?
            .unwrap_or(DEFAULT_READINESS_TIMEOUT_SECS);
        if readiness_secs == 0 {
            return Err(ConfigError::InvalidValue {
                name: env_keys::READINESS_TIMEOUT_SECS,
                message: "must be greater than 0".to_string(),
            });
        }

        let time_policy = match vars.get(env_keys::TIME_POLICY) {
            Some(value) => TimePolicy::parse(value)?,
            None => TimePolicy::default(),
        };

        Ok(Self {
            containers_enabled,
            base_url,
            server_image,
            server_tag,
            fixture_seed,
            readiness_timeout: Duration::from_secs(readiness_secs),
            time_policy,
        })
    }
}

fn parse_optional<T>(
    vars: &HashMap<String, String>,
    name: &'static str,
) -> Result<Option<T>, ConfigError>
where
    T: std::str::FromStr,
    T::Err: fmt::Display,
{
    match vars.get(name) {
        Some(value) => value
            .trim()
            .parse::<T>()
            .map(Some)
            .map_err(|e| ConfigError::InvalidValue {
                name,
                message: format!("'{}': {}", value, e),
            }),
        None => Ok(None),
    }
}

/// Publish a resolved value into the process environment.
///
/// Consumers that only read the environment (client code under test, tools
/// started by scenarios) see the same values the fixtures resolved. Must only
/// be called while no other thread may read the environment; the runner does
/// it once, after provisioning and before the first scenario.
pub(crate) fn publish(name: &str, value: impl AsRef<str>) {
    tracing::debug!(variable = name, "Publishing resolved value to environment");
    env::set_var(name, value.as_ref());
}
