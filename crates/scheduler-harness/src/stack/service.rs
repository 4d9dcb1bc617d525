//! Service-under-test fixture.

use crate::config::HarnessConfig;
use crate::readiness::ReadinessProbe;
use crate::stack::dependencies::{CacheEndpoint, DatabaseEndpoint};
use crate::stack::network::NetworkTopology;
use crate::stack::StackError;
use testcontainers::core::IntoContainerPort;
use testcontainers::runners::AsyncRunner;
use testcontainers::{ContainerAsync, ContainerRequest, GenericImage, ImageExt};
use tracing::{error, info, instrument};

/// Port the service listens on, inside the network and on the host.
pub const SERVICE_PORT: u16 = 8000;

/// Log verbosity passed to the service.
pub const SERVICE_LOG_LEVEL: &str = "debug";

/// Pre-shared token signing secret (32 bytes).
const SIGNING_KEY: &str = "RANDOM WORDS WINTER MACINTOSH PC";

/// Environment for the service container.
///
/// Stores are addressed by their alias and in-network port; the signing
/// secret is fixed so tokens stay valid for the whole run.
pub fn service_env(
    database: &DatabaseEndpoint,
    cache: &CacheEndpoint,
) -> Vec<(&'static str, String)> {
    vec![
        ("PORT", SERVICE_PORT.to_string()),
        ("RUST_LOG", SERVICE_LOG_LEVEL.to_string()),
        ("PASETO_KEY", SIGNING_KEY.to_string()),
        ("DATABASE_HOST", database.alias.clone()),
        ("DATABASE_PORT", database.port.to_string()),
        ("DATABASE_USER", database.user.clone()),
        ("DATABASE_PASSWORD", database.password.clone()),
        ("DATABASE_DB", database.name.clone()),
        ("CACHE_HOST", cache.alias.clone()),
        ("CACHE_PORT", cache.port.to_string()),
    ]
}

/// Container request for the service, wired to its dependencies by alias.
pub fn service_request(
    topology: &NetworkTopology,
    config: &HarnessConfig,
    database: &DatabaseEndpoint,
    cache: &CacheEndpoint,
) -> ContainerRequest<GenericImage> {
    let request = GenericImage::new(config.server_image.as_str(), config.server_tag.as_str())
        .with_exposed_port(SERVICE_PORT.tcp())
        .with_network(topology.name())
        .with_container_name(topology.alias("scheduler"))
        .with_mapped_port(SERVICE_PORT, SERVICE_PORT.tcp());

    service_env(database, cache)
        .into_iter()
        .fold(request, |request, (key, value)| request.with_env_var(key, value))
}

/// Start the service and block until its health probe passes.
///
/// A probe that never succeeds removes the container and fails the run.
#[instrument(skip_all, fields(image = %config.server_image, tag = %config.server_tag))]
pub async fn start_service(
    topology: &NetworkTopology,
    config: &HarnessConfig,
    database: &DatabaseEndpoint,
    cache: &CacheEndpoint,
) -> Result<(ContainerAsync<GenericImage>, String), StackError> {
    let container = service_request(topology, config, database, cache)
        .start()
        .await
        .map_err(|source| StackError::ContainerStart {
            name: "service",
            source,
        })?;

    let host = container
        .get_host()
        .await
        .map_err(|source| StackError::PortResolution {
            name: "service",
            source,
        })?;
    let host_port = container
        .get_host_port_ipv4(SERVICE_PORT.tcp())
        .await
        .map_err(|source| StackError::PortResolution {
            name: "service",
            source,
        })?;

    let base_url = format!("http://{}:{}/v1", host, host_port);
    info!(container_id = %container.id(), %base_url, "Service container started");

    let probe = ReadinessProbe::new(&base_url, config.readiness_timeout)?;
    if let Err(e) = probe.wait().await {
        error!(error = %e, "Service never became ready");
        if let Err(rm_error) = container.rm().await {
            error!(error = %rm_error, "Failed to remove unready service container");
        }
        return Err(e.into());
    }

    Ok((container, base_url))
}
