//! Cache-tier metric collection
//!
//! Simulated mode estimates memory pressure from the application replica
//! count; direct mode reads Redis `INFO` for memory, clients, keyspace size,
//! and hit rate.

use std::time::Duration;

use tokio::time::timeout;
use tracing::warn;

use super::{CacheMetrics, CollectError, QUERY_TIMEOUT_SECS};
use crate::config::{CollectionMode, ScalerConfig};

/// Assumed memory percentage added by each application replica (simulated mode)
const MEMORY_PERCENT_PER_REPLICA: f64 = 10.0;

/// Ceiling of the simulated memory estimate
const SIMULATED_MEMORY_CAP: f64 = 80.0;

/// Hit rate reported in simulated mode
const SIMULATED_HIT_RATE: f64 = 85.0;

pub struct CacheCollector {
    mode: CollectionMode,
    redis_url: String,
}

impl CacheCollector {
    pub fn from_config(config: &ScalerConfig) -> Self {
        Self {
            mode: config.collection_mode,
            redis_url: format!("redis://{}:6379", config.redis_host),
        }
    }

    pub async fn collect(&self, api_replicas: u32) -> Result<CacheMetrics, CollectError> {
        match self.mode {
            CollectionMode::Simulated => Ok(simulated_cache_metrics(api_replicas)),
            CollectionMode::Direct => {
                timeout(Duration::from_secs(QUERY_TIMEOUT_SECS), self.query())
                    .await
                    .map_err(|_| CollectError::Timeout(QUERY_TIMEOUT_SECS))?
            }
        }
    }

    async fn query(&self) -> Result<CacheMetrics, CollectError> {
        let client = redis::Client::open(self.redis_url.as_str())?;
        let mut conn = client.get_async_connection().await?;
        let info: String = redis::cmd("INFO").query_async(&mut conn).await?;
        Ok(parse_redis_info(&info))
    }
}

/// Estimate cache memory pressure from the application replica count
pub fn simulated_cache_metrics(api_replicas: u32) -> CacheMetrics {
    CacheMetrics {
        memory_percent: (api_replicas as f64 * MEMORY_PERCENT_PER_REPLICA)
            .min(SIMULATED_MEMORY_CAP),
        memory_bytes: 0,
        hit_rate: SIMULATED_HIT_RATE,
        connected_clients: 0,
        total_keys: 0,
    }
}

/// Parse a Redis `INFO` dump into a cache snapshot
///
/// Memory percentage is computed against `maxmemory` and reads as 0 when the
/// cache is unbounded; hit rate is 0 when no lookups have happened yet.
pub fn parse_redis_info(info: &str) -> CacheMetrics {
    let mut used_memory = 0u64;
    let mut maxmemory = 0u64;
    let mut connected_clients = 0u64;
    let mut keyspace_hits = 0u64;
    let mut keyspace_misses = 0u64;
    let mut total_keys = 0u64;

    for line in info.lines() {
        let line = line.trim();
        if let Some((key, value)) = line.split_once(':') {
            match key {
                "used_memory" => used_memory = value.trim().parse().unwrap_or(0),
                "maxmemory" => maxmemory = value.trim().parse().unwrap_or(0),
                "connected_clients" => connected_clients = value.trim().parse().unwrap_or(0),
                "keyspace_hits" => keyspace_hits = value.trim().parse().unwrap_or(0),
                "keyspace_misses" => keyspace_misses = value.trim().parse().unwrap_or(0),
                _ if key.starts_with("db") && value.contains("keys=") => {
                    total_keys += keyspace_entry_keys(value).unwrap_or_else(|| {
                        warn!("Unparseable keyspace entry: {}", line);
                        0
                    });
                }
                _ => {}
            }
        }
    }

    let total_lookups = keyspace_hits + keyspace_misses;
    let hit_rate = if total_lookups > 0 {
        (keyspace_hits as f64 / total_lookups as f64) * 100.0
    } else {
        0.0
    };

    let memory_percent = if maxmemory > 0 {
        (used_memory as f64 / maxmemory as f64) * 100.0
    } else {
        0.0
    };

    CacheMetrics {
        memory_percent,
        memory_bytes: used_memory,
        hit_rate,
        connected_clients,
        total_keys,
    }
}

/// Extract the key count from a "keys=N,expires=M,avg_ttl=T" keyspace entry
fn keyspace_entry_keys(entry: &str) -> Option<u64> {
    entry
        .split(',')
        .find_map(|part| part.strip_prefix("keys="))
        .and_then(|n| n.parse().ok())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_simulated_metrics_scale_with_replicas() {
        assert_eq!(simulated_cache_metrics(3).memory_percent, 30.0);
        assert_eq!(simulated_cache_metrics(3).hit_rate, 85.0);
    }

    #[test]
    fn test_simulated_memory_caps_at_eighty() {
        // The estimate never crosses the scale-up threshold on its own
        assert_eq!(simulated_cache_metrics(20).memory_percent, 80.0);
    }

    #[test]
    fn test_parse_redis_info() {
        let info = "\
# Memory\r\n\
used_memory:524288\r\n\
maxmemory:1048576\r\n\
# Clients\r\n\
connected_clients:7\r\n\
# Stats\r\n\
keyspace_hits:90\r\n\
keyspace_misses:10\r\n\
# Keyspace\r\n\
db0:keys=120,expires=5,avg_ttl=0\r\n\
db1:keys=30,expires=0,avg_ttl=0\r\n";

        let metrics = parse_redis_info(info);
        assert_eq!(metrics.memory_bytes, 524288);
        assert_eq!(metrics.memory_percent, 50.0);
        assert_eq!(metrics.connected_clients, 7);
        assert_eq!(metrics.hit_rate, 90.0);
        assert_eq!(metrics.total_keys, 150);
    }

    #[test]
    fn test_parse_redis_info_no_lookups() {
        let info = "used_memory:100\r\nkeyspace_hits:0\r\nkeyspace_misses:0\r\n";
        assert_eq!(parse_redis_info(info).hit_rate, 0.0);
    }

    #[test]
    fn test_parse_redis_info_unbounded_memory_reads_zero_percent() {
        let info = "used_memory:524288\r\nmaxmemory:0\r\n";
        let metrics = parse_redis_info(info);
        assert_eq!(metrics.memory_bytes, 524288);
        assert_eq!(metrics.memory_percent, 0.0);
    }

    #[test]
    fn test_keyspace_entry_keys() {
        assert_eq!(keyspace_entry_keys("keys=42,expires=0,avg_ttl=0"), Some(42));
        assert_eq!(keyspace_entry_keys("expires=0"), None);
    }
}
