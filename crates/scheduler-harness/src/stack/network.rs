//! Shared virtual network for one test run.

use uuid::Uuid;

/// Prefix of every network created by the harness.
const NETWORK_PREFIX: &str = "scheduler-e2e";

/// Handle to the run's network.
///
/// Created once per run and passed explicitly to every container fixture.
/// Containers join it under `alias(service)`, which is also their DNS name
/// on the network, so the service reaches its stores by alias rather than by
/// address. The Docker network is created when the first container attaches
/// and removed once the last container attached to it is gone.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NetworkTopology {
    run_id: String,
}

impl NetworkTopology {
    /// Create a topology with a fresh run id.
    pub fn create() -> Self {
        let run_id = Uuid::new_v4().simple().to_string();
        Self::with_run_id(run_id.get(..8).unwrap_or(&run_id))
    }

    /// Create a topology for a known run id.
    pub fn with_run_id(run_id: impl Into<String>) -> Self {
        Self {
            run_id: run_id.into(),
        }
    }

    /// Run id shared by the network and every alias on it.
    pub fn run_id(&self) -> &str {
        &self.run_id
    }

    /// Docker network name.
    pub fn name(&self) -> String {
        format!("{}-{}", NETWORK_PREFIX, self.run_id)
    }

    /// Network alias (and container name) for a service on this network.
    pub fn alias(&self, service: &str) -> String {
        format!("{}-{}", service, self.run_id)
    }
}
