//! Test stack provisioning.
//!
//! A run talks to either an externally managed deployment or a stack of
//! containers started by the harness: a relational store, a cache store and
//! the service under test, all attached to one run-scoped network. The mode
//! is chosen once at startup from `IS_CONTAINERS`.

pub mod dependencies;
pub mod network;
pub mod service;

use crate::config::{env_keys, publish, HarnessConfig};
use crate::readiness::{ReadinessError, ReadinessProbe};
use async_trait::async_trait;
use dependencies::{start_cache, start_database};
use network::NetworkTopology;
use service::start_service;
use testcontainers::{ContainerAsync, GenericImage, TestcontainersError};
use thiserror::Error;
use tracing::{error, info, instrument, warn};

/// Stack provisioning errors.
#[derive(Debug, Error)]
pub enum StackError {
    #[error("Failed to start {name} container: {source}")]
    ContainerStart {
        name: &'static str,
        #[source]
        source: TestcontainersError,
    },

    #[error("Failed to resolve {name} host port: {source}")]
    PortResolution {
        name: &'static str,
        #[source]
        source: TestcontainersError,
    },

    #[error("Failed to remove {name} container: {source}")]
    ContainerRemoval {
        name: &'static str,
        #[source]
        source: TestcontainersError,
    },

    #[error("Service readiness failed: {0}")]
    Readiness(#[from] ReadinessError),
}

/// Containers owned by a containerized run.
///
/// Field order is the teardown order: the service goes first, then the
/// stores it depends on.
struct ProvisionedContainers {
    service: ContainerAsync<GenericImage>,
    cache: ContainerAsync<GenericImage>,
    database: ContainerAsync<GenericImage>,
    topology: NetworkTopology,
}

/// A provisioned stack, ready for scenarios.
pub struct TestStack {
    base_url: String,
    environment: Vec<(&'static str, String)>,
    containers: Option<ProvisionedContainers>,
}

impl std::fmt::Debug for TestStack {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TestStack")
            .field("base_url", &self.base_url)
            .field("environment", &self.environment)
            .field(
                "network",
                &self.containers.as_ref().map(|c| c.topology.name()),
            )
            .finish()
    }
}

impl TestStack {
    /// Stack backed by an external deployment. Nothing to tear down.
    pub fn external(base_url: impl Into<String>) -> Self {
        let base_url = base_url.into();
        Self {
            environment: vec![(env_keys::BASE_URL, base_url.clone())],
            base_url,
            containers: None,
        }
    }

    /// Base URL of the service, including the `/v1` prefix.
    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// Resolved connection values for consumers that read the environment.
    pub fn environment(&self) -> &[(&'static str, String)] {
        &self.environment
    }

    /// Write [`TestStack::environment`] into the process environment.
    ///
    /// Call once, after provisioning and before any scenario runs.
    pub fn publish_environment(&self) {
        for (name, value) in &self.environment {
            publish(name, value);
        }
    }

    /// Whether the harness owns the containers behind this stack.
    pub fn is_containerized(&self) -> bool {
        self.containers.is_some()
    }

    /// Remove the stack's containers: service, then cache, then database.
    ///
    /// Every container is removed even if an earlier removal fails; the
    /// first failure is returned.
    #[instrument(skip_all, fields(base_url = %self.base_url))]
    pub async fn teardown(self) -> Result<(), StackError> {
        let Some(containers) = self.containers else {
            info!("External stack, nothing to tear down");
            return Ok(());
        };

        let ProvisionedContainers {
            service,
            cache,
            database,
            topology,
        } = containers;

        let mut first_error = None;
        for (name, container) in [("service", service), ("cache", cache), ("database", database)] {
            if let Err(source) = container.rm().await {
                error!(container = name, error = %source, "Container removal failed");
                first_error.get_or_insert(StackError::ContainerRemoval { name, source });
            }
        }

        info!(network = %topology.name(), "Stack torn down");
        first_error.map_or(Ok(()), Err)
    }
}

/// Strategy for obtaining a stack.
#[async_trait]
pub trait Provisioner: Send + Sync {
    /// Short name for logs.
    fn name(&self) -> &'static str;

    /// Bring up (or locate) the stack and wait until the service is ready.
    async fn provision(&self, config: &HarnessConfig) -> Result<TestStack, StackError>;
}

/// Uses the deployment at `BASE_URL`.
#[derive(Debug, Default)]
pub struct ExternalProvisioner;

#[async_trait]
impl Provisioner for ExternalProvisioner {
    fn name(&self) -> &'static str {
        "external"
    }

    async fn provision(&self, config: &HarnessConfig) -> Result<TestStack, StackError> {
        info!(base_url = %config.base_url, "Using external stack");
        ReadinessProbe::new(&config.base_url, config.readiness_timeout)?
            .wait()
            .await?;
        Ok(TestStack::external(config.base_url.clone()))
    }
}

/// Starts the stores and the service as containers on one network.
#[derive(Debug)]
pub struct ContainerProvisioner {
    topology: NetworkTopology,
}

impl ContainerProvisioner {
    pub fn new(topology: NetworkTopology) -> Self {
        Self { topology }
    }

    pub fn topology(&self) -> &NetworkTopology {
        &self.topology
    }
}

/// Best-effort removal of containers started before a later step failed.
async fn discard(containers: Vec<(&'static str, ContainerAsync<GenericImage>)>) {
    for (name, container) in containers {
        if let Err(e) = container.rm().await {
            warn!(container = name, error = %e, "Failed to remove container after startup failure");
        }
    }
}

#[async_trait]
impl Provisioner for ContainerProvisioner {
    fn name(&self) -> &'static str {
        "containers"
    }

    #[instrument(skip_all, fields(network = %self.topology.name()))]
    async fn provision(&self, config: &HarnessConfig) -> Result<TestStack, StackError> {
        let topology = &self.topology;

        let (database, database_endpoint) = start_database(topology).await?;

        let (cache, cache_endpoint) = match start_cache(topology).await {
            Ok(started) => started,
            Err(e) => {
                discard(vec![("database", database)]).await;
                return Err(e);
            }
        };

        let (service, base_url) =
            match start_service(topology, config, &database_endpoint, &cache_endpoint).await {
                Ok(started) => started,
                Err(e) => {
                    discard(vec![("cache", cache), ("database", database)]).await;
                    return Err(e);
                }
            };

        info!(%base_url, "Container stack ready");

        let mut environment = database_endpoint.environment();
        environment.extend(cache_endpoint.environment());
        environment.push((env_keys::BASE_URL, base_url.clone()));

        Ok(TestStack {
            base_url,
            environment,
            containers: Some(ProvisionedContainers {
                service,
                cache,
                database,
                topology: topology.clone(),
            }),
        })
    }
}

/// Pick the provisioning strategy for this run.
pub fn select_provisioner(config: &HarnessConfig) -> Box<dyn Provisioner> {
    if config.containers_enabled {
        Box::new(ContainerProvisioner::new(NetworkTopology::create()))
    } else {
        Box::new(ExternalProvisioner)
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use std::time::Duration;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn config_with(pairs: &[(&str, &str)]) -> HarnessConfig {
        let vars: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        HarnessConfig::from_vars(&vars).unwrap()
    }

    #[test]
    fn test_select_provisioner_follows_flag() {
        assert_eq!(select_provisioner(&config_with(&[])).name(), "external");
        assert_eq!(
            select_provisioner(&config_with(&[("IS_CONTAINERS", "false")])).name(),
            "external"
        );
        assert_eq!(
            select_provisioner(&config_with(&[("IS_CONTAINERS", "true")])).name(),
            "containers"
        );
    }

    #[tokio::test]
    async fn test_external_provisioner_waits_for_health() {
        let mock_server = MockServer::start().await;

        Mock::given(method("GET"))
            .and(path("/v1/healthz"))
            .respond_with(ResponseTemplate::new(200))
            .expect(1..)
            .mount(&mock_server)
            .await;

        let base_url = format!("{}/v1", mock_server.uri());
        let config = config_with(&[("BASE_URL", base_url.as_str())]);

        let stack = ExternalProvisioner.provision(&config).await.unwrap();

        assert_eq!(stack.base_url(), base_url);
        assert!(!stack.is_containerized());
        stack.teardown().await.unwrap();
    }

    #[tokio::test]
    async fn test_external_provisioner_fails_when_service_unhealthy() {
        let mock_server = MockServer::start().await;

        Mock::given(method("GET"))
            .and(path("/v1/healthz"))
            .respond_with(ResponseTemplate::new(500))
            .mount(&mock_server)
            .await;

        let mut config = config_with(&[]);
        config.base_url = format!("{}/v1", mock_server.uri());
        config.readiness_timeout = Duration::from_millis(200);

        let err = ExternalProvisioner.provision(&config).await.unwrap_err();
        assert!(matches!(
            err,
            StackError::Readiness(ReadinessError::TimedOut { .. })
        ));
    }

    #[test]
    fn test_external_stack_environment_is_base_url_only() {
        let stack = TestStack::external("http://localhost:8080/v1");
        assert_eq!(
            stack.environment().to_vec(),
            vec![("BASE_URL", "http://localhost:8080/v1".to_string())]
        );
    }

    #[test]
    #[serial_test::serial]
    fn test_publish_environment_writes_resolved_values() {
        let stack = TestStack::external("http://127.0.0.1:18000/v1");
        stack.publish_environment();

        assert_eq!(
            std::env::var("BASE_URL").unwrap(),
            "http://127.0.0.1:18000/v1"
        );
        std::env::remove_var("BASE_URL");
    }

    #[test]
    fn test_external_stack_debug_has_no_network() {
        let stack = TestStack::external("http://localhost:8080/v1");
        let debug_output = format!("{:?}", stack);
        assert!(debug_output.contains("http://localhost:8080/v1"));
        assert!(debug_output.contains("None"));
    }
}
