//! Metric collection from the managed tiers
//!
//! The control loop reads tier snapshots through the [`MetricSource`] trait;
//! production wires it to the application health endpoint, container stats,
//! PostgreSQL, and Redis. Database and cache collection run in one of two
//! modes: `simulated` estimates load from the application replica count (the
//! conservative default), `direct` queries the collaborators.

pub mod app;
pub mod cache;
pub mod database;

pub use app::AppCollector;
pub use cache::CacheCollector;
pub use database::DatabaseCollector;

use async_trait::async_trait;
use thiserror::Error;

/// Timeout for database and cache queries, in seconds
pub const QUERY_TIMEOUT_SECS: u64 = 5;

/// Errors raised while collecting metrics
#[derive(Error, Debug)]
pub enum CollectError {
    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Database query failed: {0}")]
    Database(#[from] tokio_postgres::Error),

    #[error("Cache query failed: {0}")]
    Cache(#[from] redis::RedisError),

    #[error("Timed out after {0}s")]
    Timeout(u64),

    #[error("Malformed response: {0}")]
    Malformed(String),
}

/// Current application-tier sample
///
/// Missing signals read as zero; `healthy` reflects the detailed health
/// endpoint's status field.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct AppMetrics {
    pub cpu_usage: f64,
    pub memory_usage: f64,
    /// Wall-clock time of the health probe, in milliseconds
    pub response_time: f64,
    pub error_rate: f64,
    pub healthy: bool,
}

impl Default for AppMetrics {
    fn default() -> Self {
        Self {
            cpu_usage: 0.0,
            memory_usage: 0.0,
            response_time: 0.0,
            error_rate: 0.0,
            healthy: false,
        }
    }
}

/// Current database-tier sample
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct DatabaseMetrics {
    pub connections: u64,
    /// Active connections as a percentage of max_connections
    pub connection_utilization: f64,
    pub query_time_ms: f64,
}

/// Current cache-tier sample
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct CacheMetrics {
    pub memory_percent: f64,
    pub memory_bytes: u64,
    pub hit_rate: f64,
    pub connected_clients: u64,
    pub total_keys: u64,
}

/// Source of per-tier metric snapshots
///
/// The control loop depends only on this trait; tests substitute scripted
/// sources.
#[async_trait]
pub trait MetricSource: Send + Sync {
    async fn app_metrics(&self) -> Result<AppMetrics, CollectError>;

    /// `api_replicas` feeds the simulated estimates
    async fn database_metrics(&self, api_replicas: u32) -> Result<DatabaseMetrics, CollectError>;

    async fn cache_metrics(&self, api_replicas: u32) -> Result<CacheMetrics, CollectError>;
}

/// Production metric source combining the three tier collectors
pub struct TierCollectors {
    pub app: AppCollector,
    pub database: DatabaseCollector,
    pub cache: CacheCollector,
}

#[async_trait]
impl MetricSource for TierCollectors {
    async fn app_metrics(&self) -> Result<AppMetrics, CollectError> {
        self.app.collect().await
    }

    async fn database_metrics(&self, api_replicas: u32) -> Result<DatabaseMetrics, CollectError> {
        self.database.collect(api_replicas).await
    }

    async fn cache_metrics(&self, api_replicas: u32) -> Result<CacheMetrics, CollectError> {
        self.cache.collect(api_replicas).await
    }
}
