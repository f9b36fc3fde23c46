//! Orchestrator port for reading and updating service replica counts
//!
//! The control loop depends on the [`Orchestrator`] trait; production wires
//! it to Docker Swarm. When the engine is unreachable at startup (or the
//! `DOCKER_UNAVAILABLE` flag is set) the adapter runs in monitoring-only
//! mode: reads report a single replica and scale requests are logged but not
//! executed.

pub mod docker;

pub use docker::{DockerClient, DockerError};

use std::sync::Arc;

use async_trait::async_trait;
use thiserror::Error;
use tracing::{debug, error, info, warn};

use crate::config::ScalerConfig;

/// Errors that can occur against the orchestrator
#[derive(Error, Debug)]
pub enum OrchestratorError {
    #[error(transparent)]
    Docker(#[from] DockerError),
}

/// Result of a scale request
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScaleOutcome {
    /// The orchestrator accepted the update
    Applied,
    /// Monitoring-only mode: the action was logged, nothing changed
    Simulated,
}

/// Service-management operations the control loop needs
#[async_trait]
pub trait Orchestrator: Send + Sync {
    /// Current replica count of a service
    async fn replicas(&self, service: &str) -> Result<u32, OrchestratorError>;

    /// Request a new replica count for a service
    async fn scale(&self, service: &str, target: u32) -> Result<ScaleOutcome, OrchestratorError>;

    /// Whether real actuations are possible
    fn available(&self) -> bool;
}

/// Docker Swarm implementation of the orchestrator port
pub struct SwarmOrchestrator {
    client: Arc<DockerClient>,
    available: bool,
}

impl SwarmOrchestrator {
    /// Build the adapter, probing the engine once at startup
    ///
    /// An explicit `DOCKER_UNAVAILABLE` flag or a failed ping drops into
    /// monitoring-only mode instead of failing startup.
    pub async fn connect(config: &ScalerConfig) -> Self {
        let client = Arc::new(DockerClient::new(&config.docker_host));

        if config.docker_unavailable {
            info!("Docker explicitly marked as unavailable - running in monitoring-only mode");
            return Self {
                client,
                available: false,
            };
        }

        match client.ping().await {
            Ok(()) => {
                info!("Connected to Docker at {}", config.docker_host);
                Self {
                    client,
                    available: true,
                }
            }
            Err(e) => {
                warn!("Docker access not available: {}", e);
                info!("Running in monitoring-only mode");
                Self {
                    client,
                    available: false,
                }
            }
        }
    }

    /// The underlying engine client, for container stats collection
    ///
    /// None in monitoring-only mode, where no containers can be listed.
    pub fn stats_client(&self) -> Option<Arc<DockerClient>> {
        self.available.then(|| self.client.clone())
    }
}

#[async_trait]
impl Orchestrator for SwarmOrchestrator {
    async fn replicas(&self, service: &str) -> Result<u32, OrchestratorError> {
        if !self.available {
            debug!("Docker not available, simulating 1 replica for {}", service);
            return Ok(1);
        }
        Ok(self.client.service_replicas(service).await?)
    }

    async fn scale(&self, service: &str, target: u32) -> Result<ScaleOutcome, OrchestratorError> {
        if !self.available {
            info!(
                "Would scale {} to {} replicas (Docker not available)",
                service, target
            );
            return Ok(ScaleOutcome::Simulated);
        }

        let current = self.client.service_replicas(service).await?;
        if current == target {
            return Ok(ScaleOutcome::Applied);
        }

        info!("Scaling {} from {} to {} replicas", service, current, target);

        match self.client.update_replicas(service, target).await {
            Ok(()) => Ok(ScaleOutcome::Applied),
            Err(e) => {
                error!("Error scaling {}: {}", service, e);
                Err(e.into())
            }
        }
    }

    fn available(&self) -> bool {
        self.available
    }
}
