//! Deterministic scaling scenarios with literal inputs and expected targets

use std::time::Duration;

use chrono::{TimeDelta, Utc};

use swarmscale::collect::AppMetrics;
use swarmscale::config::{ScalerConfig, ScalingAlgorithm, ServiceRole, ServiceSpec};
use swarmscale::scaler::{decide, CooldownLedger, MetricHistory, MetricKind};

fn app_spec() -> ServiceSpec {
    ServiceSpec {
        name: "api".to_string(),
        min_replicas: 2,
        max_replicas: 10,
        role: ServiceRole::Application,
    }
}

fn config(algorithm: ScalingAlgorithm) -> ScalerConfig {
    ScalerConfig {
        algorithm,
        api_service_name: "api".to_string(),
        ..ScalerConfig::default()
    }
}

fn sample(cpu: f64, memory: f64, response_time: f64) -> AppMetrics {
    AppMetrics {
        cpu_usage: cpu,
        memory_usage: memory,
        response_time,
        error_rate: 0.0,
        healthy: true,
    }
}

#[test]
fn scenario_linear_scale_up() {
    let target = decide(
        &config(ScalingAlgorithm::Linear),
        &sample(85.0, 50.0, 300.0),
        3,
        &app_spec(),
        &MetricHistory::new(10),
    );
    assert_eq!(target, 4);
}

#[test]
fn scenario_linear_scale_down_blocked_by_memory() {
    let target = decide(
        &config(ScalingAlgorithm::Linear),
        &sample(10.0, 50.0, 100.0),
        5,
        &app_spec(),
        &MetricHistory::new(10),
    );
    assert_eq!(target, 5);
}

#[test]
fn scenario_exponential_critical_load() {
    let target = decide(
        &config(ScalingAlgorithm::Exponential),
        &sample(95.0, 50.0, 0.0),
        4,
        &app_spec(),
        &MetricHistory::new(10),
    );
    assert_eq!(target, 8);
}

#[test]
fn scenario_exponential_fractional_floor() {
    let target = decide(
        &config(ScalingAlgorithm::Exponential),
        &sample(85.0, 50.0, 0.0),
        3,
        &app_spec(),
        &MetricHistory::new(10),
    );
    assert_eq!(target, 4);
}

#[test]
fn scenario_predictive_proactive_scale_up() {
    let mut history = MetricHistory::new(10);
    let base = Utc::now();
    for (i, cpu) in [50.0, 55.0, 62.0, 68.0, 72.0].iter().enumerate() {
        history.append_at(
            "api",
            MetricKind::CpuUsagePercent,
            *cpu,
            base + TimeDelta::seconds(i as i64),
        );
    }

    let target = decide(
        &config(ScalingAlgorithm::Predictive),
        &sample(72.0, 65.0, 0.0),
        4,
        &app_spec(),
        &history,
    );
    assert_eq!(target, 5);
}

#[test]
fn scenario_cooldown_gate() {
    let mut ledger = CooldownLedger::new(Duration::from_secs(120));
    let t0 = Utc::now();

    // Actuation at t=0 succeeds and stamps the ledger
    assert!(ledger.can_scale("api", t0));
    ledger.record("api", t0);

    // At t=60s load still demands a scale-up, but the window is closed
    assert!(!ledger.can_scale("api", t0 + TimeDelta::seconds(60)));

    // At t=121s actuation is permitted again
    assert!(ledger.can_scale("api", t0 + TimeDelta::seconds(121)));
}
