//! The autoscaling control loop
//!
//! Runs one monitoring cycle per check interval. Each cycle walks the three
//! managed tiers in a fixed order (application, database, cache) and runs the
//! per-tier pipeline: collect, record history, publish gauges, gate on
//! cooldown, decide, actuate. A failure in one tier never aborts the others,
//! and a failed actuation leaves the cooldown untouched so the next tick
//! retries.

use std::sync::Arc;
use std::time::Instant;

use chrono::Utc;
use tokio::sync::watch;
use tokio::time::MissedTickBehavior;
use tracing::{error, info, warn};

use crate::collect::{AppMetrics, CacheMetrics, DatabaseMetrics, MetricSource};
use crate::config::{ScalerConfig, ServiceRole, ServiceSpec};
use crate::metrics::{ScaleDirection, ScalerMetrics};
use crate::orchestrator::{Orchestrator, OrchestratorError, ScaleOutcome};
use crate::scaler::cooldown::CooldownLedger;
use crate::scaler::engine;
use crate::scaler::history::{MetricHistory, MetricKind};

/// The control loop worker
///
/// Owns all mutable scaler state (history, cooldown ledger); the registry is
/// shared read-only with the exposition server.
pub struct AutoScaler {
    config: ScalerConfig,
    orchestrator: Arc<dyn Orchestrator>,
    source: Arc<dyn MetricSource>,
    metrics: Arc<ScalerMetrics>,

    app_spec: ServiceSpec,
    database_spec: ServiceSpec,
    cache_spec: ServiceSpec,

    history: MetricHistory,
    cooldowns: CooldownLedger,

    /// Application replica count from the most recent read, feeding the
    /// simulated database and cache estimates
    last_api_replicas: u32,
}

impl AutoScaler {
    pub fn new(
        config: ScalerConfig,
        orchestrator: Arc<dyn Orchestrator>,
        source: Arc<dyn MetricSource>,
        metrics: Arc<ScalerMetrics>,
    ) -> Self {
        let mut services = config.services().into_iter();
        let app_spec = services.next().expect("application tier spec");
        let database_spec = services.next().expect("database tier spec");
        let cache_spec = services.next().expect("cache tier spec");
        debug_assert_eq!(app_spec.role, ServiceRole::Application);

        info!("Scale up threshold: {}%", config.scale_up_threshold);
        info!("Scale down threshold: {}%", config.scale_down_threshold);
        info!("Min replicas: {}", config.min_replicas);
        info!("Max replicas: {}", config.max_replicas);

        let history = MetricHistory::new(config.prediction_samples);
        let cooldowns = CooldownLedger::new(config.cooldown_period());

        Self {
            config,
            orchestrator,
            source,
            metrics,
            app_spec,
            database_spec,
            cache_spec,
            history,
            cooldowns,
            last_api_replicas: 0,
        }
    }

    /// Run monitoring cycles until the shutdown signal flips
    ///
    /// Cycles are strictly sequential; if one overruns the check interval the
    /// overdue tick is dropped rather than queued. An in-flight cycle always
    /// completes before shutdown.
    pub async fn run(mut self, mut shutdown: watch::Receiver<bool>) {
        let period = self.config.check_interval();
        let mut interval = tokio::time::interval_at(tokio::time::Instant::now() + period, period);
        interval.set_missed_tick_behavior(MissedTickBehavior::Skip);

        info!(
            "AutoScaler running: algorithm={}, interval={}s, cooldown={}s",
            self.config.algorithm, self.config.check_interval_secs, self.config.cooldown_period_secs
        );

        loop {
            tokio::select! {
                _ = interval.tick() => {
                    let started = Instant::now();
                    self.run_tick().await;
                    let elapsed = started.elapsed();
                    if elapsed > period {
                        warn!(
                            "Monitoring cycle took {:.1}s, longer than the {}s interval; dropping missed tick",
                            elapsed.as_secs_f64(),
                            self.config.check_interval_secs
                        );
                    }
                }
                _ = shutdown.changed() => {
                    if *shutdown.borrow() {
                        info!("Shutting down AutoScaler");
                        break;
                    }
                }
            }
        }
    }

    /// One monitoring and scaling cycle across all three tiers
    pub async fn run_tick(&mut self) {
        info!("Running monitoring cycle");

        if let Err(e) = self.scale_application_tier().await {
            error!("Error in API scaling: {}", e);
        }
        if let Err(e) = self.scale_database_tier().await {
            error!("Error in PostgreSQL scaling: {}", e);
        }
        if let Err(e) = self.scale_cache_tier().await {
            error!("Error in Redis scaling: {}", e);
        }
    }

    async fn scale_application_tier(&mut self) -> Result<(), OrchestratorError> {
        let service = self.app_spec.name.clone();
        let current = self.orchestrator.replicas(&service).await?;
        self.last_api_replicas = current;

        let metrics = match self.source.app_metrics().await {
            Ok(metrics) => metrics,
            Err(e) => {
                error!("Error collecting API metrics: {}", e);
                // Zero-filled sample keeps history aligned in time, but a
                // failed collection never drives an actuation
                let zeroed = AppMetrics::default();
                self.record_app_sample(&service, &zeroed);
                self.publish_app_gauges(&zeroed, current);
                return Ok(());
            }
        };

        info!(
            "API Metrics - CPU: {:.1}%, Memory: {:.1}%, Response Time: {:.1}ms, Current Replicas: {}",
            metrics.cpu_usage, metrics.memory_usage, metrics.response_time, current
        );

        self.record_app_sample(&service, &metrics);
        self.publish_app_gauges(&metrics, current);

        if !self.cooldowns.can_scale(&service, Utc::now()) {
            info!("API scaling in cooldown period");
            return Ok(());
        }

        let target = engine::decide(&self.config, &metrics, current, &self.app_spec, &self.history);
        if target == current {
            info!("API scaling: no action needed (current: {})", current);
            return Ok(());
        }

        if self.actuate(&service, current, target).await? {
            info!("API scaled to {} replicas (was {})", target, current);
        }
        Ok(())
    }

    async fn scale_database_tier(&mut self) -> Result<(), OrchestratorError> {
        let service = self.database_spec.name.clone();
        let current = self.orchestrator.replicas(&service).await?;
        self.metrics.postgres_replicas.set(current as i64);

        let metrics = match self.source.database_metrics(self.last_api_replicas).await {
            Ok(metrics) => metrics,
            Err(e) => {
                error!("Error collecting PostgreSQL metrics: {}", e);
                // Zero-filled sample keeps history aligned in time, but a
                // failed collection never drives an actuation
                self.record_database_sample(&service, &DatabaseMetrics::default());
                return Ok(());
            }
        };
        self.record_database_sample(&service, &metrics);

        if !self.cooldowns.can_scale(&service, Utc::now()) {
            return Ok(());
        }

        if let Some(target) = engine::database_decision(&self.config, &metrics, current) {
            if self.actuate(&service, current, target).await? {
                info!("PostgreSQL scaled to {} replicas", target);
            }
        }
        Ok(())
    }

    async fn scale_cache_tier(&mut self) -> Result<(), OrchestratorError> {
        let service = self.cache_spec.name.clone();
        let current = self.orchestrator.replicas(&service).await?;
        self.metrics.redis_replicas.set(current as i64);

        let metrics = match self.source.cache_metrics(self.last_api_replicas).await {
            Ok(metrics) => metrics,
            Err(e) => {
                error!("Error collecting Redis metrics: {}", e);
                self.record_cache_sample(&service, &CacheMetrics::default());
                return Ok(());
            }
        };
        self.record_cache_sample(&service, &metrics);

        if !self.cooldowns.can_scale(&service, Utc::now()) {
            return Ok(());
        }

        if let Some(target) = engine::cache_decision(&self.config, &metrics, current) {
            if self.actuate(&service, current, target).await? {
                info!("Redis scaled to {} replicas", target);
            }
        }
        Ok(())
    }

    /// Issue a scale request; stamp cooldown and count only an applied change
    ///
    /// Returns whether the actuation was applied. Simulated outcomes
    /// (monitoring-only mode) advance nothing so a later real orchestrator
    /// starts with a clean ledger.
    async fn actuate(
        &mut self,
        service: &str,
        current: u32,
        target: u32,
    ) -> Result<bool, OrchestratorError> {
        match self.orchestrator.scale(service, target).await? {
            ScaleOutcome::Applied => {
                self.cooldowns.record(service, Utc::now());
                self.metrics
                    .record_decision(service, ScaleDirection::of(current, target));
                Ok(true)
            }
            ScaleOutcome::Simulated => Ok(false),
        }
    }

    fn record_app_sample(&mut self, service: &str, metrics: &AppMetrics) {
        self.history
            .append(service, MetricKind::CpuUsagePercent, metrics.cpu_usage);
        self.history
            .append(service, MetricKind::MemoryUsagePercent, metrics.memory_usage);
        self.history
            .append(service, MetricKind::ResponseTimeMs, metrics.response_time);
    }

    fn record_database_sample(&mut self, service: &str, metrics: &DatabaseMetrics) {
        self.history.append(
            service,
            MetricKind::ConnectionUtilizationPercent,
            metrics.connection_utilization,
        );
        self.history
            .append(service, MetricKind::ResponseTimeMs, metrics.query_time_ms);
    }

    fn record_cache_sample(&mut self, service: &str, metrics: &CacheMetrics) {
        self.history
            .append(service, MetricKind::CacheMemoryPercent, metrics.memory_percent);
    }

    fn publish_app_gauges(&self, metrics: &AppMetrics, current: u32) {
        self.metrics.api_replicas.set(current as i64);
        self.metrics.cpu_usage.set(metrics.cpu_usage);
        self.metrics.memory_usage.set(metrics.memory_usage);
        self.metrics.response_time.set(metrics.response_time);
        // Declared in the data model; not computed by the loop yet
        self.metrics.error_rate.set(0.0);
    }

    pub fn history(&self) -> &MetricHistory {
        &self.history
    }

    pub fn cooldowns(&self) -> &CooldownLedger {
        &self.cooldowns
    }
}
