//! Environment-driven configuration for the autoscaler
//!
//! All options are read from environment variables with defaults. The snapshot
//! is immutable after startup; malformed values fall back to their defaults
//! with a warning, while structural violations (min > max, zero intervals)
//! are fatal.

use std::fmt;
use std::str::FromStr;
use std::time::Duration;

use thiserror::Error;
use tracing::warn;

/// Errors that make the configuration unusable at startup
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Invalid replica bounds for {service}: min {min} > max {max}")]
    InvalidBounds {
        service: String,
        min: u32,
        max: u32,
    },

    #[error("Replica bounds for {0} must be positive")]
    ZeroBounds(String),

    #[error("{0} must be positive")]
    ZeroInterval(&'static str),
}

/// The closed set of scaling algorithms
///
/// Unknown values collapse to `Linear` at config-load time so a typo in the
/// environment never fails a tick.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ScalingAlgorithm {
    #[default]
    Linear,
    Exponential,
    Predictive,
}

impl ScalingAlgorithm {
    pub fn from_name(name: &str) -> Self {
        match name.trim().to_ascii_lowercase().as_str() {
            "exponential" => Self::Exponential,
            "predictive" => Self::Predictive,
            "linear" => Self::Linear,
            other => {
                if !other.is_empty() {
                    warn!("Unknown scaling algorithm '{}', using linear", other);
                }
                Self::Linear
            }
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Linear => "linear",
            Self::Exponential => "exponential",
            Self::Predictive => "predictive",
        }
    }
}

impl fmt::Display for ScalingAlgorithm {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// How database and cache metrics are obtained
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum CollectionMode {
    /// Estimate from the application tier's replica count
    #[default]
    Simulated,
    /// Query PostgreSQL and Redis directly
    Direct,
}

impl CollectionMode {
    pub fn from_name(name: &str) -> Self {
        match name.trim().to_ascii_lowercase().as_str() {
            "direct" => Self::Direct,
            "simulated" => Self::Simulated,
            other => {
                if !other.is_empty() {
                    warn!("Unknown collection mode '{}', using simulated", other);
                }
                Self::Simulated
            }
        }
    }
}

/// Role of a managed service tier
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ServiceRole {
    Application,
    Database,
    Cache,
}

/// Static per-service configuration
#[derive(Debug, Clone)]
pub struct ServiceSpec {
    /// Swarm service name, used as the opaque orchestrator identifier
    pub name: String,
    pub min_replicas: u32,
    pub max_replicas: u32,
    pub role: ServiceRole,
}

impl ServiceSpec {
    /// Clamp a target replica count into this service's bounds
    pub fn clamp(&self, target: u32) -> u32 {
        target.clamp(self.min_replicas, self.max_replicas)
    }
}

/// Immutable configuration snapshot for the autoscaler
#[derive(Debug, Clone)]
pub struct ScalerConfig {
    // Timing (seconds)
    pub check_interval_secs: u64,
    pub cooldown_period_secs: u64,

    // Application tier bounds
    pub min_replicas: u32,
    pub max_replicas: u32,

    // Database and cache tier caps (no automatic scale-down, min is 1)
    pub postgres_max_replicas: u32,
    pub redis_max_replicas: u32,

    // Linear algorithm thresholds
    pub cpu_scale_up_threshold: f64,
    pub cpu_scale_down_threshold: f64,
    pub memory_scale_up_threshold: f64,
    pub memory_scale_down_threshold: f64,
    pub response_time_scale_up_threshold: f64,
    pub response_time_scale_down_threshold: f64,

    // Exponential algorithm thresholds
    pub scale_up_threshold: f64,
    pub scale_down_threshold: f64,

    // Declared for the exposed gauge; the loop does not act on it yet
    pub error_rate_scale_up_threshold: f64,

    // Tier-specific scale-up thresholds
    pub postgres_connection_scale_up_threshold: f64,
    pub redis_scale_up_memory: f64,

    pub algorithm: ScalingAlgorithm,
    pub prediction_samples: usize,
    pub prediction_window_secs: u64,

    // Managed service names (Swarm stack format)
    pub api_service_name: String,
    pub postgres_service_name: String,
    pub redis_service_name: String,

    // Collaborator endpoints
    pub api_health_url: String,
    pub docker_host: String,

    // Observability surfaces
    pub metrics_port: u16,
    pub health_port: u16,
    pub metrics_enabled: bool,

    // Database / cache collection
    pub collection_mode: CollectionMode,
    pub postgres_host: String,
    pub postgres_db: String,
    pub postgres_user: String,
    pub postgres_password: String,
    pub redis_host: String,

    /// Explicitly marks the orchestrator unavailable (monitoring-only mode)
    pub docker_unavailable: bool,
}

impl Default for ScalerConfig {
    fn default() -> Self {
        Self {
            check_interval_secs: 30,
            cooldown_period_secs: 120,
            min_replicas: 2,
            max_replicas: 10,
            postgres_max_replicas: 3,
            redis_max_replicas: 2,
            cpu_scale_up_threshold: 70.0,
            cpu_scale_down_threshold: 20.0,
            memory_scale_up_threshold: 80.0,
            memory_scale_down_threshold: 40.0,
            response_time_scale_up_threshold: 1000.0,
            response_time_scale_down_threshold: 200.0,
            scale_up_threshold: 80.0,
            scale_down_threshold: 30.0,
            error_rate_scale_up_threshold: 5.0,
            postgres_connection_scale_up_threshold: 80.0,
            redis_scale_up_memory: 80.0,
            algorithm: ScalingAlgorithm::Linear,
            prediction_samples: 10,
            prediction_window_secs: 300,
            api_service_name: "scalable-backend-production_api".to_string(),
            postgres_service_name: "scalable-backend-production_postgres".to_string(),
            redis_service_name: "scalable-backend-production_redis".to_string(),
            api_health_url: "http://api:3000/api/health/detailed".to_string(),
            docker_host: "http://localhost:2375".to_string(),
            metrics_port: 8090,
            health_port: 8080,
            metrics_enabled: true,
            collection_mode: CollectionMode::Simulated,
            postgres_host: "postgres".to_string(),
            postgres_db: "scalable_backend".to_string(),
            postgres_user: "postgres".to_string(),
            postgres_password: "postgres_password".to_string(),
            redis_host: "redis".to_string(),
            docker_unavailable: false,
        }
    }
}

impl ScalerConfig {
    /// Load configuration from the process environment
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Load configuration through an injected lookup
    ///
    /// The indirection keeps tests from mutating process-wide environment
    /// state.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let defaults = Self::default();

        let config = Self {
            check_interval_secs: parse_var(&lookup, "CHECK_INTERVAL", defaults.check_interval_secs),
            cooldown_period_secs: parse_var(
                &lookup,
                "COOLDOWN_PERIOD",
                defaults.cooldown_period_secs,
            ),
            min_replicas: parse_var(&lookup, "MIN_REPLICAS", defaults.min_replicas),
            max_replicas: parse_var(&lookup, "MAX_REPLICAS", defaults.max_replicas),
            postgres_max_replicas: parse_var(
                &lookup,
                "POSTGRES_MAX_REPLICAS",
                defaults.postgres_max_replicas,
            ),
            redis_max_replicas: parse_var(
                &lookup,
                "REDIS_MAX_REPLICAS",
                defaults.redis_max_replicas,
            ),
            cpu_scale_up_threshold: parse_var(
                &lookup,
                "CPU_SCALE_UP_THRESHOLD",
                defaults.cpu_scale_up_threshold,
            ),
            cpu_scale_down_threshold: parse_var(
                &lookup,
                "CPU_SCALE_DOWN_THRESHOLD",
                defaults.cpu_scale_down_threshold,
            ),
            memory_scale_up_threshold: parse_var(
                &lookup,
                "MEMORY_SCALE_UP_THRESHOLD",
                defaults.memory_scale_up_threshold,
            ),
            memory_scale_down_threshold: parse_var(
                &lookup,
                "MEMORY_SCALE_DOWN_THRESHOLD",
                defaults.memory_scale_down_threshold,
            ),
            response_time_scale_up_threshold: parse_var(
                &lookup,
                "RESPONSE_TIME_SCALE_UP_THRESHOLD",
                defaults.response_time_scale_up_threshold,
            ),
            response_time_scale_down_threshold: parse_var(
                &lookup,
                "RESPONSE_TIME_SCALE_DOWN_THRESHOLD",
                defaults.response_time_scale_down_threshold,
            ),
            scale_up_threshold: parse_var(
                &lookup,
                "SCALE_UP_THRESHOLD",
                defaults.scale_up_threshold,
            ),
            scale_down_threshold: parse_var(
                &lookup,
                "SCALE_DOWN_THRESHOLD",
                defaults.scale_down_threshold,
            ),
            error_rate_scale_up_threshold: parse_var(
                &lookup,
                "ERROR_RATE_SCALE_UP_THRESHOLD",
                defaults.error_rate_scale_up_threshold,
            ),
            postgres_connection_scale_up_threshold: parse_var(
                &lookup,
                "POSTGRES_CONNECTION_SCALE_UP_THRESHOLD",
                defaults.postgres_connection_scale_up_threshold,
            ),
            redis_scale_up_memory: parse_var(
                &lookup,
                "REDIS_SCALE_UP_MEMORY",
                defaults.redis_scale_up_memory,
            ),
            algorithm: lookup("SCALING_ALGORITHM")
                .map(|v| ScalingAlgorithm::from_name(&v))
                .unwrap_or(defaults.algorithm),
            prediction_samples: parse_var(
                &lookup,
                "PREDICTION_SAMPLES",
                defaults.prediction_samples,
            ),
            prediction_window_secs: parse_var(
                &lookup,
                "PREDICTION_WINDOW",
                defaults.prediction_window_secs,
            ),
            api_service_name: string_var(&lookup, "API_SERVICE_NAME", defaults.api_service_name),
            postgres_service_name: string_var(
                &lookup,
                "POSTGRES_SERVICE_NAME",
                defaults.postgres_service_name,
            ),
            redis_service_name: string_var(
                &lookup,
                "REDIS_SERVICE_NAME",
                defaults.redis_service_name,
            ),
            api_health_url: string_var(&lookup, "API_HEALTH_URL", defaults.api_health_url),
            docker_host: string_var(&lookup, "DOCKER_HOST", defaults.docker_host),
            metrics_port: parse_var(&lookup, "METRICS_PORT", defaults.metrics_port),
            health_port: parse_var(&lookup, "HEALTH_PORT", defaults.health_port),
            metrics_enabled: bool_var(&lookup, "METRICS_ENABLED", defaults.metrics_enabled),
            collection_mode: lookup("COLLECTION_MODE")
                .map(|v| CollectionMode::from_name(&v))
                .unwrap_or(defaults.collection_mode),
            postgres_host: string_var(&lookup, "POSTGRES_HOST", defaults.postgres_host),
            postgres_db: string_var(&lookup, "POSTGRES_DB", defaults.postgres_db),
            postgres_user: string_var(&lookup, "POSTGRES_USER", defaults.postgres_user),
            postgres_password: string_var(&lookup, "POSTGRES_PASSWORD", defaults.postgres_password),
            redis_host: string_var(&lookup, "REDIS_HOST", defaults.redis_host),
            docker_unavailable: lookup("DOCKER_UNAVAILABLE")
                .map(|v| !v.trim().is_empty())
                .unwrap_or(false),
        };

        config.validate()?;
        Ok(config)
    }

    /// Structural validation; violations are fatal at startup
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.check_interval_secs == 0 {
            return Err(ConfigError::ZeroInterval("CHECK_INTERVAL"));
        }
        if self.prediction_samples == 0 {
            return Err(ConfigError::ZeroInterval("PREDICTION_SAMPLES"));
        }
        for spec in self.services() {
            if spec.min_replicas == 0 || spec.max_replicas == 0 {
                return Err(ConfigError::ZeroBounds(spec.name));
            }
            if spec.min_replicas > spec.max_replicas {
                return Err(ConfigError::InvalidBounds {
                    service: spec.name,
                    min: spec.min_replicas,
                    max: spec.max_replicas,
                });
            }
        }
        Ok(())
    }

    /// The three managed tiers, in actuation order
    pub fn services(&self) -> Vec<ServiceSpec> {
        vec![
            ServiceSpec {
                name: self.api_service_name.clone(),
                min_replicas: self.min_replicas,
                max_replicas: self.max_replicas,
                role: ServiceRole::Application,
            },
            ServiceSpec {
                name: self.postgres_service_name.clone(),
                min_replicas: 1,
                max_replicas: self.postgres_max_replicas,
                role: ServiceRole::Database,
            },
            ServiceSpec {
                name: self.redis_service_name.clone(),
                min_replicas: 1,
                max_replicas: self.redis_max_replicas,
                role: ServiceRole::Cache,
            },
        ]
    }

    pub fn check_interval(&self) -> Duration {
        Duration::from_secs(self.check_interval_secs)
    }

    pub fn cooldown_period(&self) -> Duration {
        Duration::from_secs(self.cooldown_period_secs)
    }
}

fn string_var(lookup: &impl Fn(&str) -> Option<String>, key: &str, default: String) -> String {
    match lookup(key) {
        Some(value) if !value.trim().is_empty() => value,
        _ => default,
    }
}

fn parse_var<T>(lookup: &impl Fn(&str) -> Option<String>, key: &str, default: T) -> T
where
    T: FromStr + fmt::Display + Copy,
{
    match lookup(key) {
        Some(raw) => match raw.trim().parse::<T>() {
            Ok(value) => value,
            Err(_) => {
                warn!("Invalid value '{}' for {}, using default {}", raw, key, default);
                default
            }
        },
        None => default,
    }
}

fn bool_var(lookup: &impl Fn(&str) -> Option<String>, key: &str, default: bool) -> bool {
    match lookup(key) {
        Some(raw) => match raw.trim().to_ascii_lowercase().as_str() {
            "1" | "true" | "yes" | "on" => true,
            "0" | "false" | "no" | "off" => false,
            other => {
                warn!("Invalid value '{}' for {}, using default {}", other, key, default);
                default
            }
        },
        None => default,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup_from<'a>(map: &'a HashMap<&'a str, &'a str>) -> impl Fn(&str) -> Option<String> + 'a {
        move |key| map.get(key).map(|v| v.to_string())
    }

    #[test]
    fn test_defaults() {
        let config = ScalerConfig::from_lookup(|_| None).unwrap();

        assert_eq!(config.check_interval_secs, 30);
        assert_eq!(config.cooldown_period_secs, 120);
        assert_eq!(config.min_replicas, 2);
        assert_eq!(config.max_replicas, 10);
        assert_eq!(config.postgres_max_replicas, 3);
        assert_eq!(config.redis_max_replicas, 2);
        assert_eq!(config.cpu_scale_up_threshold, 70.0);
        assert_eq!(config.cpu_scale_down_threshold, 20.0);
        assert_eq!(config.memory_scale_up_threshold, 80.0);
        assert_eq!(config.memory_scale_down_threshold, 40.0);
        assert_eq!(config.response_time_scale_up_threshold, 1000.0);
        assert_eq!(config.response_time_scale_down_threshold, 200.0);
        assert_eq!(config.algorithm, ScalingAlgorithm::Linear);
        assert_eq!(config.prediction_samples, 10);
        assert_eq!(config.metrics_port, 8090);
        assert_eq!(config.health_port, 8080);
        assert!(config.metrics_enabled);
        assert_eq!(config.collection_mode, CollectionMode::Simulated);
        assert!(!config.docker_unavailable);
    }

    #[test]
    fn test_env_overrides() {
        let map = HashMap::from([
            ("CHECK_INTERVAL", "10"),
            ("COOLDOWN_PERIOD", "60"),
            ("MAX_REPLICAS", "20"),
            ("SCALING_ALGORITHM", "exponential"),
            ("COLLECTION_MODE", "direct"),
            ("METRICS_ENABLED", "false"),
            ("DOCKER_UNAVAILABLE", "1"),
        ]);
        let config = ScalerConfig::from_lookup(lookup_from(&map)).unwrap();

        assert_eq!(config.check_interval_secs, 10);
        assert_eq!(config.cooldown_period_secs, 60);
        assert_eq!(config.max_replicas, 20);
        assert_eq!(config.algorithm, ScalingAlgorithm::Exponential);
        assert_eq!(config.collection_mode, CollectionMode::Direct);
        assert!(!config.metrics_enabled);
        assert!(config.docker_unavailable);
    }

    #[test]
    fn test_unknown_algorithm_falls_back_to_linear() {
        let map = HashMap::from([("SCALING_ALGORITHM", "quantum")]);
        let config = ScalerConfig::from_lookup(lookup_from(&map)).unwrap();
        assert_eq!(config.algorithm, ScalingAlgorithm::Linear);
    }

    #[test]
    fn test_malformed_numeric_falls_back_to_default() {
        let map = HashMap::from([("MAX_REPLICAS", "lots"), ("CHECK_INTERVAL", "")]);
        let config = ScalerConfig::from_lookup(lookup_from(&map)).unwrap();
        assert_eq!(config.max_replicas, 10);
        assert_eq!(config.check_interval_secs, 30);
    }

    #[test]
    fn test_min_above_max_is_fatal() {
        let map = HashMap::from([("MIN_REPLICAS", "8"), ("MAX_REPLICAS", "4")]);
        let result = ScalerConfig::from_lookup(lookup_from(&map));
        assert!(matches!(result, Err(ConfigError::InvalidBounds { .. })));
    }

    #[test]
    fn test_zero_interval_is_fatal() {
        let map = HashMap::from([("CHECK_INTERVAL", "0")]);
        let result = ScalerConfig::from_lookup(lookup_from(&map));
        assert!(matches!(result, Err(ConfigError::ZeroInterval(_))));
    }

    #[test]
    fn test_service_specs_in_actuation_order() {
        let config = ScalerConfig::from_lookup(|_| None).unwrap();
        let services = config.services();

        assert_eq!(services.len(), 3);
        assert_eq!(services[0].role, ServiceRole::Application);
        assert_eq!(services[0].min_replicas, 2);
        assert_eq!(services[0].max_replicas, 10);
        assert_eq!(services[1].role, ServiceRole::Database);
        assert_eq!(services[1].min_replicas, 1);
        assert_eq!(services[1].max_replicas, 3);
        assert_eq!(services[2].role, ServiceRole::Cache);
        assert_eq!(services[2].max_replicas, 2);
    }

    #[test]
    fn test_spec_clamp() {
        let spec = ServiceSpec {
            name: "api".to_string(),
            min_replicas: 2,
            max_replicas: 10,
            role: ServiceRole::Application,
        };
        assert_eq!(spec.clamp(1), 2);
        assert_eq!(spec.clamp(5), 5);
        assert_eq!(spec.clamp(15), 10);
    }

    #[test]
    fn test_algorithm_names() {
        assert_eq!(ScalingAlgorithm::from_name("Predictive"), ScalingAlgorithm::Predictive);
        assert_eq!(ScalingAlgorithm::from_name("EXPONENTIAL"), ScalingAlgorithm::Exponential);
        assert_eq!(ScalingAlgorithm::Linear.as_str(), "linear");
    }
}
