//! Relational store and cache store fixtures.
//!
//! Each fixture starts a container on the run's network and binds its internal
//! port to the identical host port. The host-side connection parameters are
//! returned as environment pairs for the stack to publish once it is up.

use crate::config::env_keys;
use crate::stack::network::NetworkTopology;
use crate::stack::StackError;
use std::time::Duration;
use testcontainers::core::{IntoContainerPort, WaitFor};
use testcontainers::runners::AsyncRunner;
use testcontainers::{ContainerAsync, GenericImage, ImageExt};
use tracing::{info, instrument};

/// Relational store image.
pub const DATABASE_IMAGE: (&str, &str) = ("postgres", "16-alpine");

/// Cache store image.
pub const CACHE_IMAGE: (&str, &str) = ("redis", "8.2.1-alpine");

/// Relational store port, inside the network and on the host.
pub const DATABASE_PORT: u16 = 5432;

/// Cache store port, inside the network and on the host.
pub const CACHE_PORT: u16 = 6379;

/// Relational store credentials and database name.
pub const DATABASE_USER: &str = "postgres";
pub const DATABASE_PASSWORD: &str = "postgres";
pub const DATABASE_NAME: &str = "postgres";

/// Startup budget for a dependency container.
const STARTUP_TIMEOUT: Duration = Duration::from_secs(60);

/// Connection contract for the relational store.
#[derive(Clone, PartialEq, Eq)]
pub struct DatabaseEndpoint {
    /// Hostname on the run's network.
    pub alias: String,
    /// Port on the run's network.
    pub port: u16,
    /// Port published on the Docker host.
    pub host_port: u16,
    pub user: String,
    pub password: String,
    pub name: String,
}

impl std::fmt::Debug for DatabaseEndpoint {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DatabaseEndpoint")
            .field("alias", &self.alias)
            .field("port", &self.port)
            .field("host_port", &self.host_port)
            .field("user", &self.user)
            .field("password", &"[REDACTED]")
            .field("name", &self.name)
            .finish()
    }
}

impl DatabaseEndpoint {
    /// `DATABASE_PORT` as seen from the test process.
    pub fn environment(&self) -> Vec<(&'static str, String)> {
        vec![(env_keys::DATABASE_PORT, self.host_port.to_string())]
    }
}

/// Connection contract for the cache store.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CacheEndpoint {
    /// Hostname on the run's network.
    pub alias: String,
    /// Port on the run's network.
    pub port: u16,
    /// Docker host as seen from the test process.
    pub host: String,
    /// Port published on the Docker host.
    pub host_port: u16,
}

impl CacheEndpoint {
    /// `CACHE_HOST` and `CACHE_PORT` as seen from the test process.
    pub fn environment(&self) -> Vec<(&'static str, String)> {
        vec![
            (env_keys::CACHE_HOST, self.host.clone()),
            (env_keys::CACHE_PORT, self.host_port.to_string()),
        ]
    }
}

/// Container request for the relational store.
pub fn database_request(topology: &NetworkTopology) -> testcontainers::ContainerRequest<GenericImage> {
    let (name, tag) = DATABASE_IMAGE;
    GenericImage::new(name, tag)
        .with_exposed_port(DATABASE_PORT.tcp())
        .with_wait_for(WaitFor::message_on_stderr(
            "database system is ready to accept connections",
        ))
        .with_wait_for(WaitFor::message_on_stdout(
            "database system is ready to accept connections",
        ))
        .with_env_var("POSTGRES_USER", DATABASE_USER)
        .with_env_var("POSTGRES_PASSWORD", DATABASE_PASSWORD)
        .with_env_var("POSTGRES_DB", DATABASE_NAME)
        .with_network(topology.name())
        .with_container_name(topology.alias("postgres"))
        .with_mapped_port(DATABASE_PORT, DATABASE_PORT.tcp())
        .with_startup_timeout(STARTUP_TIMEOUT)
}

/// Container request for the cache store.
pub fn cache_request(topology: &NetworkTopology) -> testcontainers::ContainerRequest<GenericImage> {
    let (name, tag) = CACHE_IMAGE;
    GenericImage::new(name, tag)
        .with_exposed_port(CACHE_PORT.tcp())
        .with_wait_for(WaitFor::message_on_stdout("Ready to accept connections"))
        .with_network(topology.name())
        .with_container_name(topology.alias("redis"))
        .with_mapped_port(CACHE_PORT, CACHE_PORT.tcp())
        .with_startup_timeout(STARTUP_TIMEOUT)
}

/// Start the relational store.
#[instrument(skip_all, fields(network = %topology.name()))]
pub async fn start_database(
    topology: &NetworkTopology,
) -> Result<(ContainerAsync<GenericImage>, DatabaseEndpoint), StackError> {
    let container = database_request(topology)
        .start()
        .await
        .map_err(|source| StackError::ContainerStart {
            name: "database",
            source,
        })?;

    let host_port = container
        .get_host_port_ipv4(DATABASE_PORT.tcp())
        .await
        .map_err(|source| StackError::PortResolution {
            name: "database",
            source,
        })?;

    info!(container_id = %container.id(), host_port, "Database container started");

    let endpoint = DatabaseEndpoint {
        alias: topology.alias("postgres"),
        port: DATABASE_PORT,
        host_port,
        user: DATABASE_USER.to_string(),
        password: DATABASE_PASSWORD.to_string(),
        name: DATABASE_NAME.to_string(),
    };

    Ok((container, endpoint))
}

/// Start the cache store.
#[instrument(skip_all, fields(network = %topology.name()))]
pub async fn start_cache(
    topology: &NetworkTopology,
) -> Result<(ContainerAsync<GenericImage>, CacheEndpoint), StackError> {
    let container = cache_request(topology)
        .start()
        .await
        .map_err(|source| StackError::ContainerStart {
            name: "cache",
            source,
        })?;

    let host = container
        .get_host()
        .await
        .map_err(|source| StackError::PortResolution {
            name: "cache",
            source,
        })?
        .to_string();

    let host_port = container
        .get_host_port_ipv4(CACHE_PORT.tcp())
        .await
        .map_err(|source| StackError::PortResolution {
            name: "cache",
            source,
        })?;

    info!(container_id = %container.id(), %host, host_port, "Cache container started");

    let endpoint = CacheEndpoint {
        alias: topology.alias("redis"),
        port: CACHE_PORT,
        host,
        host_port,
    };

    Ok((container, endpoint))
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;

    #[test]
    fn test_database_request_binds_identical_port_on_run_network() {
        let topology = NetworkTopology::with_run_id("t1");
        let request = database_request(&topology);

        assert_eq!(request.network().as_deref(), Some("scheduler-e2e-t1"));
        assert_eq!(request.container_name().as_deref(), Some("postgres-t1"));

        let ports = request.ports().expect("ports should be mapped");
        assert_eq!(ports.len(), 1);
        let mapping = ports.first().expect("one mapping");
        assert_eq!(mapping.host_port(), DATABASE_PORT);
        assert_eq!(mapping.container_port(), DATABASE_PORT.tcp());
    }

    #[test]
    fn test_cache_request_uses_redis_alias() {
        let topology = NetworkTopology::with_run_id("t1");
        let request = cache_request(&topology);

        assert_eq!(request.container_name().as_deref(), Some("redis-t1"));
        let mapping = request
            .ports()
            .and_then(|ports| ports.first())
            .expect("ports should be mapped");
        assert_eq!(mapping.host_port(), CACHE_PORT);
    }

    #[test]
    fn test_endpoints_expose_host_side_environment() {
        let database = DatabaseEndpoint {
            alias: "postgres-t1".to_string(),
            port: DATABASE_PORT,
            host_port: 55432,
            user: DATABASE_USER.to_string(),
            password: DATABASE_PASSWORD.to_string(),
            name: DATABASE_NAME.to_string(),
        };
        let cache = CacheEndpoint {
            alias: "redis-t1".to_string(),
            port: CACHE_PORT,
            host: "127.0.0.1".to_string(),
            host_port: 56379,
        };

        assert_eq!(database.environment(), vec![("DATABASE_PORT", "55432".to_string())]);
        assert_eq!(
            cache.environment(),
            vec![
                ("CACHE_HOST", "127.0.0.1".to_string()),
                ("CACHE_PORT", "56379".to_string()),
            ]
        );
    }

    #[test]
    fn test_database_endpoint_debug_redacts_password() {
        let endpoint = DatabaseEndpoint {
            alias: "postgres-t1".to_string(),
            port: DATABASE_PORT,
            host_port: DATABASE_PORT,
            user: DATABASE_USER.to_string(),
            password: "hunter2".to_string(),
            name: DATABASE_NAME.to_string(),
        };

        let debug_output = format!("{:?}", endpoint);
        assert!(!debug_output.contains("hunter2"));
        assert!(debug_output.contains("postgres-t1"));
    }
}
