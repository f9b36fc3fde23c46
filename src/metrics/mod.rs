//! Prometheus metric registry for the scaler
//!
//! Gauges mirror the most recent tick's observations; the decision counter is
//! labeled by service and direction. The exposition server reads the registry,
//! the control loop writes it.

use prometheus::{Encoder, Gauge, IntCounterVec, IntGauge, Opts, Registry, TextEncoder};

/// Direction of a scaling actuation
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScaleDirection {
    Up,
    Down,
}

impl ScaleDirection {
    pub fn of(current: u32, target: u32) -> Self {
        if target > current {
            Self::Up
        } else {
            Self::Down
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Up => "up",
            Self::Down => "down",
        }
    }
}

/// All exposed series, registered against a single registry
pub struct ScalerMetrics {
    registry: Registry,

    pub api_replicas: IntGauge,
    pub postgres_replicas: IntGauge,
    pub redis_replicas: IntGauge,

    pub cpu_usage: Gauge,
    pub memory_usage: Gauge,
    pub response_time: Gauge,
    pub error_rate: Gauge,

    scaling_decisions: IntCounterVec,
}

impl ScalerMetrics {
    pub fn new() -> Result<Self, prometheus::Error> {
        let registry = Registry::new();

        let api_replicas =
            IntGauge::new("api_replicas_current", "Current number of API replicas")?;
        let postgres_replicas = IntGauge::new(
            "postgres_replicas_current",
            "Current number of PostgreSQL replicas",
        )?;
        let redis_replicas =
            IntGauge::new("redis_replicas_current", "Current number of Redis replicas")?;
        let cpu_usage = Gauge::new("api_cpu_usage_percent", "API CPU usage percentage")?;
        let memory_usage = Gauge::new("api_memory_usage_percent", "API memory usage percentage")?;
        let response_time =
            Gauge::new("api_response_time_ms", "API response time in milliseconds")?;
        let error_rate = Gauge::new("api_error_rate_percent", "API error rate percentage")?;
        let scaling_decisions = IntCounterVec::new(
            Opts::new("scaling_decisions_total", "Total scaling decisions"),
            &["service", "direction"],
        )?;

        registry.register(Box::new(api_replicas.clone()))?;
        registry.register(Box::new(postgres_replicas.clone()))?;
        registry.register(Box::new(redis_replicas.clone()))?;
        registry.register(Box::new(cpu_usage.clone()))?;
        registry.register(Box::new(memory_usage.clone()))?;
        registry.register(Box::new(response_time.clone()))?;
        registry.register(Box::new(error_rate.clone()))?;
        registry.register(Box::new(scaling_decisions.clone()))?;

        Ok(Self {
            registry,
            api_replicas,
            postgres_replicas,
            redis_replicas,
            cpu_usage,
            memory_usage,
            response_time,
            error_rate,
            scaling_decisions,
        })
    }

    /// Count a scaling actuation for a service
    pub fn record_decision(&self, service: &str, direction: ScaleDirection) {
        self.scaling_decisions
            .with_label_values(&[service, direction.as_str()])
            .inc();
    }

    /// Total recorded decisions for a service and direction
    pub fn decisions(&self, service: &str, direction: ScaleDirection) -> u64 {
        self.scaling_decisions
            .with_label_values(&[service, direction.as_str()])
            .get()
    }

    /// Render the registry in the Prometheus text exposition format
    pub fn render(&self) -> String {
        let encoder = TextEncoder::new();
        let mut buffer = Vec::new();
        if let Err(e) = encoder.encode(&self.registry.gather(), &mut buffer) {
            tracing::error!("Failed to encode metrics: {}", e);
            return String::new();
        }
        String::from_utf8(buffer).unwrap_or_default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_direction_of() {
        assert_eq!(ScaleDirection::of(3, 4), ScaleDirection::Up);
        assert_eq!(ScaleDirection::of(4, 3), ScaleDirection::Down);
        assert_eq!(ScaleDirection::of(3, 4).as_str(), "up");
    }

    #[test]
    fn test_gauges_render_in_exposition() {
        let metrics = ScalerMetrics::new().unwrap();
        metrics.api_replicas.set(3);
        metrics.cpu_usage.set(42.5);

        let output = metrics.render();
        assert!(output.contains("api_replicas_current 3"));
        assert!(output.contains("api_cpu_usage_percent 42.5"));
        assert!(output.contains("postgres_replicas_current 0"));
        assert!(output.contains("redis_replicas_current 0"));
        assert!(output.contains("api_response_time_ms 0"));
        assert!(output.contains("api_error_rate_percent 0"));
    }

    #[test]
    fn test_decision_counter_is_monotonic() {
        let metrics = ScalerMetrics::new().unwrap();
        assert_eq!(metrics.decisions("api", ScaleDirection::Up), 0);

        metrics.record_decision("api", ScaleDirection::Up);
        metrics.record_decision("api", ScaleDirection::Up);
        metrics.record_decision("api", ScaleDirection::Down);

        assert_eq!(metrics.decisions("api", ScaleDirection::Up), 2);
        assert_eq!(metrics.decisions("api", ScaleDirection::Down), 1);

        let output = metrics.render();
        let up_line = output
            .lines()
            .find(|line| {
                line.starts_with("scaling_decisions_total")
                    && line.contains(r#"service="api""#)
                    && line.contains(r#"direction="up""#)
            })
            .expect("up counter series rendered");
        assert!(up_line.ends_with(" 2"));
    }
}
