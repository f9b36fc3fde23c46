//! Database-tier metric collection
//!
//! Simulated mode estimates connection pressure from the application replica
//! count; direct mode queries PostgreSQL for active connections, the
//! configured maximum, and a round-trip latency sample.

use std::time::{Duration, Instant};

use tokio::time::timeout;
use tokio_postgres::NoTls;
use tracing::warn;

use super::{CollectError, DatabaseMetrics, QUERY_TIMEOUT_SECS};
use crate::config::{CollectionMode, ScalerConfig};

/// Assumed connections opened by each application replica (simulated mode)
const CONNECTIONS_PER_REPLICA: u64 = 50;

/// Assumed connection ceiling (simulated mode)
const ASSUMED_MAX_CONNECTIONS: f64 = 1000.0;

pub struct DatabaseCollector {
    mode: CollectionMode,
    conn_string: String,
}

impl DatabaseCollector {
    pub fn from_config(config: &ScalerConfig) -> Self {
        let conn_string = format!(
            "host={} port=5432 dbname={} user={} password={}",
            config.postgres_host, config.postgres_db, config.postgres_user, config.postgres_password
        );
        Self {
            mode: config.collection_mode,
            conn_string,
        }
    }

    pub async fn collect(&self, api_replicas: u32) -> Result<DatabaseMetrics, CollectError> {
        match self.mode {
            CollectionMode::Simulated => Ok(simulated_database_metrics(api_replicas)),
            CollectionMode::Direct => {
                timeout(Duration::from_secs(QUERY_TIMEOUT_SECS), self.query())
                    .await
                    .map_err(|_| CollectError::Timeout(QUERY_TIMEOUT_SECS))?
            }
        }
    }

    async fn query(&self) -> Result<DatabaseMetrics, CollectError> {
        let (client, connection) = tokio_postgres::connect(&self.conn_string, NoTls).await?;
        let driver = tokio::spawn(async move {
            if let Err(e) = connection.await {
                warn!("PostgreSQL connection error: {}", e);
            }
        });

        let result = async {
            let active: i64 = client
                .query_one(
                    "SELECT count(*) FROM pg_stat_activity WHERE state = 'active'",
                    &[],
                )
                .await?
                .get(0);

            let max_setting: String = client
                .query_one(
                    "SELECT setting FROM pg_settings WHERE name = 'max_connections'",
                    &[],
                )
                .await?
                .get(0);
            let max_connections = max_setting.parse::<f64>().unwrap_or(0.0);

            let start = Instant::now();
            client.query_one("SELECT 1", &[]).await?;
            let query_time_ms = start.elapsed().as_secs_f64() * 1000.0;

            let connections = active.max(0) as u64;
            Ok(DatabaseMetrics {
                connections,
                connection_utilization: connection_utilization(connections, max_connections),
                query_time_ms,
            })
        }
        .await;

        driver.abort();
        result
    }
}

/// Active connections as a percentage of the configured maximum
pub fn connection_utilization(active: u64, max_connections: f64) -> f64 {
    if max_connections > 0.0 {
        (active as f64 / max_connections) * 100.0
    } else {
        0.0
    }
}

/// Estimate connection pressure from the application replica count
pub fn simulated_database_metrics(api_replicas: u32) -> DatabaseMetrics {
    let connections = api_replicas as u64 * CONNECTIONS_PER_REPLICA;
    DatabaseMetrics {
        connections,
        connection_utilization: ((connections as f64 / ASSUMED_MAX_CONNECTIONS) * 100.0)
            .min(100.0),
        query_time_ms: 0.0,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_simulated_metrics_scale_with_replicas() {
        let metrics = simulated_database_metrics(4);
        assert_eq!(metrics.connections, 200);
        assert_eq!(metrics.connection_utilization, 20.0);
    }

    #[test]
    fn test_simulated_utilization_caps_at_hundred() {
        let metrics = simulated_database_metrics(30);
        assert_eq!(metrics.connections, 1500);
        assert_eq!(metrics.connection_utilization, 100.0);
    }

    #[test]
    fn test_simulated_crosses_scale_up_threshold_at_17_replicas() {
        // 17 * 50 = 850 connections = 85% of the assumed 1000-connection cap
        assert!(simulated_database_metrics(17).connection_utilization > 80.0);
        assert!(simulated_database_metrics(16).connection_utilization <= 80.0);
    }

    #[test]
    fn test_connection_utilization() {
        assert_eq!(connection_utilization(250, 1000.0), 25.0);
        assert_eq!(connection_utilization(0, 1000.0), 0.0);
    }

    #[test]
    fn test_connection_utilization_unknown_max() {
        assert_eq!(connection_utilization(250, 0.0), 0.0);
    }
}
