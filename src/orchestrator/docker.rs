//! Docker Engine API client for Swarm services and container statistics
//!
//! Talks to the engine over HTTP (`DOCKER_HOST`). Service replica reads and
//! updates drive actuation; one-shot container stats snapshots feed the
//! application-tier CPU and memory percentages.

use std::time::Duration;

use reqwest::Client;
use serde::Deserialize;
use serde_json::Value;
use thiserror::Error;

/// Engine API version prefix, matching the original deployment target
pub const DOCKER_API_VERSION: &str = "v1.41";

/// Timeout for engine API requests, in seconds
pub const DOCKER_TIMEOUT_SECS: u64 = 10;

/// Label the Swarm engine stamps on a service's containers
const SERVICE_LABEL: &str = "com.docker.swarm.service.name";

/// Errors that can occur against the engine API
#[derive(Error, Debug)]
pub enum DockerError {
    #[error("Docker request failed: {0}")]
    Request(#[from] reqwest::Error),

    #[error("Docker returned {status}: {message}")]
    Status { status: u16, message: String },

    #[error("Malformed Docker response: {0}")]
    Malformed(String),
}

/// One-shot statistics snapshot for a container
///
/// Field layout mirrors the engine's stats JSON; absent sections read as
/// zeroed, which makes a first-snapshot CPU percentage come out as 0.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ContainerStats {
    #[serde(default)]
    pub cpu_stats: CpuStats,
    #[serde(default)]
    pub precpu_stats: CpuStats,
    #[serde(default)]
    pub memory_stats: MemoryStats,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct CpuStats {
    #[serde(default)]
    pub cpu_usage: CpuUsage,
    #[serde(default)]
    pub system_cpu_usage: u64,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct CpuUsage {
    #[serde(default)]
    pub total_usage: u64,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct MemoryStats {
    #[serde(default)]
    pub usage: u64,
    #[serde(default)]
    pub limit: u64,
}

#[derive(Debug, Deserialize)]
struct ContainerSummary {
    #[serde(rename = "Id")]
    id: String,
}

/// Container CPU usage as a percentage of system CPU over the snapshot delta
///
/// Zero when the system delta is not positive, which is the case for the
/// first snapshot of a container's lifetime.
pub fn cpu_percent(stats: &ContainerStats) -> f64 {
    let cpu_delta = stats
        .cpu_stats
        .cpu_usage
        .total_usage
        .saturating_sub(stats.precpu_stats.cpu_usage.total_usage);
    let system_delta = stats
        .cpu_stats
        .system_cpu_usage
        .saturating_sub(stats.precpu_stats.system_cpu_usage);

    if system_delta > 0 {
        (cpu_delta as f64 / system_delta as f64) * 100.0
    } else {
        0.0
    }
}

/// Container memory usage as a percentage of its limit
pub fn memory_percent(stats: &ContainerStats) -> f64 {
    if stats.memory_stats.limit > 0 {
        (stats.memory_stats.usage as f64 / stats.memory_stats.limit as f64) * 100.0
    } else {
        0.0
    }
}

/// Mean CPU and memory percentages across a set of container snapshots
pub fn average_usage(stats: &[ContainerStats]) -> (f64, f64) {
    if stats.is_empty() {
        return (0.0, 0.0);
    }
    let n = stats.len() as f64;
    let total_cpu: f64 = stats.iter().map(cpu_percent).sum();
    let total_memory: f64 = stats.iter().map(memory_percent).sum();
    (total_cpu / n, total_memory / n)
}

/// HTTP client for the Docker Engine API
pub struct DockerClient {
    http: Client,
    base_url: String,
}

impl DockerClient {
    pub fn new(docker_host: &str) -> Self {
        let http = Client::builder()
            .timeout(Duration::from_secs(DOCKER_TIMEOUT_SECS))
            .build()
            .expect("Failed to create HTTP client");

        // DOCKER_HOST is conventionally written as tcp://host:port
        let base_url = docker_host
            .trim_end_matches('/')
            .replacen("tcp://", "http://", 1);

        Self { http, base_url }
    }

    fn url(&self, path: &str) -> String {
        format!("{}/{}/{}", self.base_url, DOCKER_API_VERSION, path)
    }

    /// Probe engine reachability
    pub async fn ping(&self) -> Result<(), DockerError> {
        let response = self
            .http
            .get(format!("{}/_ping", self.base_url))
            .send()
            .await?;
        check_status(response).await?;
        Ok(())
    }

    /// Current replica count of a Swarm service
    pub async fn service_replicas(&self, service: &str) -> Result<u32, DockerError> {
        let spec = self.inspect_service(service).await?;
        replicas_from_inspect(&spec)
    }

    /// Update a service's replica count, preserving the rest of its spec
    pub async fn update_replicas(&self, service: &str, target: u32) -> Result<(), DockerError> {
        let inspect = self.inspect_service(service).await?;

        let id = inspect
            .get("ID")
            .and_then(Value::as_str)
            .ok_or_else(|| DockerError::Malformed("service inspect missing ID".to_string()))?
            .to_string();
        let version = inspect
            .pointer("/Version/Index")
            .and_then(Value::as_u64)
            .ok_or_else(|| DockerError::Malformed("service inspect missing Version".to_string()))?;

        let mut spec = inspect
            .get("Spec")
            .cloned()
            .ok_or_else(|| DockerError::Malformed("service inspect missing Spec".to_string()))?;
        if !spec.is_object() {
            return Err(DockerError::Malformed(
                "service spec is not an object".to_string(),
            ));
        }
        spec["Mode"] = serde_json::json!({ "Replicated": { "Replicas": target } });

        let response = self
            .http
            .post(self.url(&format!("services/{}/update", id)))
            .query(&[("version", version.to_string())])
            .json(&spec)
            .send()
            .await?;
        check_status(response).await?;
        Ok(())
    }

    /// One-shot stats snapshots for every container of a Swarm service
    pub async fn service_container_stats(
        &self,
        service: &str,
    ) -> Result<Vec<ContainerStats>, DockerError> {
        let filters =
            serde_json::json!({ "label": [format!("{}={}", SERVICE_LABEL, service)] }).to_string();

        let response = self
            .http
            .get(self.url("containers/json"))
            .query(&[("filters", filters)])
            .send()
            .await?;
        let containers: Vec<ContainerSummary> = check_status(response).await?.json().await?;

        let snapshots = containers
            .iter()
            .map(|c| self.container_stats(&c.id))
            .collect::<Vec<_>>();
        let results = futures::future::join_all(snapshots).await;

        // A single container failing to report does not fail the tier
        Ok(results
            .into_iter()
            .filter_map(|r| match r {
                Ok(stats) => Some(stats),
                Err(e) => {
                    tracing::warn!("Error getting container stats: {}", e);
                    None
                }
            })
            .collect())
    }

    async fn container_stats(&self, id: &str) -> Result<ContainerStats, DockerError> {
        let response = self
            .http
            .get(self.url(&format!("containers/{}/stats", id)))
            .query(&[("stream", "false")])
            .send()
            .await?;
        Ok(check_status(response).await?.json().await?)
    }

    async fn inspect_service(&self, service: &str) -> Result<Value, DockerError> {
        let response = self
            .http
            .get(self.url(&format!("services/{}", service)))
            .send()
            .await?;
        Ok(check_status(response).await?.json().await?)
    }
}

/// Extract the replica count from a service inspect document
pub fn replicas_from_inspect(inspect: &Value) -> Result<u32, DockerError> {
    inspect
        .pointer("/Spec/Mode/Replicated/Replicas")
        .and_then(Value::as_u64)
        .map(|n| n as u32)
        .ok_or_else(|| {
            DockerError::Malformed("service is not in replicated mode".to_string())
        })
}

async fn check_status(response: reqwest::Response) -> Result<reqwest::Response, DockerError> {
    if response.status().is_success() {
        Ok(response)
    } else {
        let status = response.status().as_u16();
        let message = response.text().await.unwrap_or_default();
        Err(DockerError::Status { status, message })
    }
}
