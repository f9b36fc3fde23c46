//! Scaling decision engine
//!
//! Pure functions mapping the current metric snapshot and replica count to a
//! target replica count. Three algorithms for the application tier plus
//! independent scale-up-only rules for the database and cache tiers. Every
//! result is clamped into the service's replica bounds.

use crate::collect::{AppMetrics, CacheMetrics, DatabaseMetrics};
use crate::config::{ScalerConfig, ScalingAlgorithm, ServiceSpec};
use crate::scaler::history::{MetricHistory, MetricKind, Trend};

/// Decide the target replica count for the application tier
pub fn decide(
    config: &ScalerConfig,
    metrics: &AppMetrics,
    current_replicas: u32,
    spec: &ServiceSpec,
    history: &MetricHistory,
) -> u32 {
    let target = match config.algorithm {
        ScalingAlgorithm::Linear => linear_decision(config, metrics, current_replicas, spec),
        ScalingAlgorithm::Exponential => {
            exponential_decision(config, metrics, current_replicas, spec)
        }
        ScalingAlgorithm::Predictive => {
            predictive_decision(metrics, current_replicas, spec, history)
        }
    };
    spec.clamp(target)
}

/// Threshold scaling: one replica at a time
///
/// Scale up when any pressure signal exceeds its threshold; scale down only
/// when every signal is below its floor. Up takes precedence.
fn linear_decision(
    config: &ScalerConfig,
    metrics: &AppMetrics,
    current_replicas: u32,
    spec: &ServiceSpec,
) -> u32 {
    let scale_up = metrics.cpu_usage > config.cpu_scale_up_threshold
        || metrics.memory_usage > config.memory_scale_up_threshold
        || metrics.response_time > config.response_time_scale_up_threshold;

    let scale_down = metrics.cpu_usage < config.cpu_scale_down_threshold
        && metrics.memory_usage < config.memory_scale_down_threshold
        && metrics.response_time < config.response_time_scale_down_threshold;

    if scale_up && current_replicas < spec.max_replicas {
        current_replicas + 1
    } else if scale_down && current_replicas > spec.min_replicas {
        current_replicas - 1
    } else {
        current_replicas
    }
}

/// Multiplicative scaling for rapid response to high load
///
/// Factor 2.0 above 90% utilization, 1.5 above the scale-up threshold, 0.7
/// below the scale-down threshold. The fractional target is floored.
fn exponential_decision(
    config: &ScalerConfig,
    metrics: &AppMetrics,
    current_replicas: u32,
    spec: &ServiceSpec,
) -> u32 {
    let max_usage = metrics.cpu_usage.max(metrics.memory_usage);

    let scale_factor = if max_usage > 90.0 {
        2.0
    } else if max_usage > config.scale_up_threshold {
        1.5
    } else if max_usage < config.scale_down_threshold {
        0.7
    } else {
        return current_replicas;
    };

    let target = (current_replicas as f64 * scale_factor) as u32;
    spec.clamp(target)
}

/// Trend-based proactive scaling
///
/// Adds a replica before thresholds are breached when cpu or memory is
/// trending up and already past 60%; removes one when both trend down below
/// 40%.
fn predictive_decision(
    metrics: &AppMetrics,
    current_replicas: u32,
    spec: &ServiceSpec,
    history: &MetricHistory,
) -> u32 {
    let cpu_trend = history.trend(&spec.name, MetricKind::CpuUsagePercent);
    let memory_trend = history.trend(&spec.name, MetricKind::MemoryUsagePercent);

    let rising = cpu_trend == Trend::Increasing || memory_trend == Trend::Increasing;
    let falling = cpu_trend == Trend::Decreasing && memory_trend == Trend::Decreasing;

    if rising && (metrics.cpu_usage > 60.0 || metrics.memory_usage > 60.0) {
        (current_replicas + 1).min(spec.max_replicas)
    } else if falling && metrics.cpu_usage < 40.0 && metrics.memory_usage < 40.0 {
        current_replicas.saturating_sub(1).max(spec.min_replicas)
    } else {
        current_replicas
    }
}

/// Database tier rule: add one read replica under connection pressure
///
/// Never scales down automatically; replica removal incurs rebalancing cost
/// and is left to the operator.
pub fn database_decision(
    config: &ScalerConfig,
    metrics: &DatabaseMetrics,
    current_replicas: u32,
) -> Option<u32> {
    if metrics.connection_utilization > config.postgres_connection_scale_up_threshold
        && current_replicas < config.postgres_max_replicas
    {
        Some(current_replicas + 1)
    } else {
        None
    }
}

/// Cache tier rule: add one instance under memory pressure
///
/// Never scales down automatically.
pub fn cache_decision(
    config: &ScalerConfig,
    metrics: &CacheMetrics,
    current_replicas: u32,
) -> Option<u32> {
    if metrics.memory_percent > config.redis_scale_up_memory
        && current_replicas < config.redis_max_replicas
    {
        Some(current_replicas + 1)
    } else {
        None
    }
}
