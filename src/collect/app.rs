//! Application-tier metric collection
//!
//! Probes the detailed health endpoint and averages CPU/memory percentages
//! across the tier's containers. The probe's wall-clock time is the
//! response-time sample.

use std::sync::Arc;
use std::time::{Duration, Instant};

use reqwest::Client;
use serde_json::Value;
use tracing::warn;

use super::{AppMetrics, CollectError};
use crate::orchestrator::docker::{average_usage, DockerClient, DOCKER_TIMEOUT_SECS};

pub struct AppCollector {
    http: Client,
    health_url: String,
    service_name: String,
    /// None in monitoring-only mode; container stats then read as zero
    docker: Option<Arc<DockerClient>>,
}

impl AppCollector {
    pub fn new(health_url: &str, service_name: &str, docker: Option<Arc<DockerClient>>) -> Self {
        let http = Client::builder()
            .timeout(Duration::from_secs(DOCKER_TIMEOUT_SECS))
            .build()
            .expect("Failed to create HTTP client");

        Self {
            http,
            health_url: health_url.to_string(),
            service_name: service_name.to_string(),
            docker,
        }
    }

    /// Collect the current application-tier snapshot
    ///
    /// A failed health probe fails the whole collection; failed container
    /// stats only zero the CPU and memory signals.
    pub async fn collect(&self) -> Result<AppMetrics, CollectError> {
        let start = Instant::now();
        let response = self.http.get(&self.health_url).send().await?;
        let response_time = start.elapsed().as_secs_f64() * 1000.0;

        if !response.status().is_success() {
            return Err(CollectError::Malformed(format!(
                "health endpoint returned {}",
                response.status()
            )));
        }

        let health: Value = response.json().await?;
        let healthy = health.get("status").and_then(Value::as_str) == Some("healthy");

        let (cpu_usage, memory_usage) = match &self.docker {
            Some(docker) => match docker.service_container_stats(&self.service_name).await {
                Ok(stats) => average_usage(&stats),
                Err(e) => {
                    warn!("Error collecting container stats: {}", e);
                    (0.0, 0.0)
                }
            },
            None => (0.0, 0.0),
        };

        Ok(AppMetrics {
            cpu_usage,
            memory_usage,
            response_time,
            error_rate: 0.0,
            healthy,
        })
    }
}
