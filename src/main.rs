use std::process;
use std::sync::Arc;
use std::time::Duration;

use clap::{ArgAction, Parser};
use tokio::sync::watch;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

use swarmscale::collect::{AppCollector, CacheCollector, DatabaseCollector, TierCollectors};
use swarmscale::config::ScalerConfig;
use swarmscale::metrics::ScalerMetrics;
use swarmscale::orchestrator::{Orchestrator, SwarmOrchestrator};
use swarmscale::scaler::AutoScaler;
use swarmscale::server::{self, ScalerStatus, BIND_ATTEMPTS, BIND_INITIAL_DELAY};

#[derive(Parser, Debug)]
#[command(name = "swarmscale")]
#[command(about = "Autoscaling control loop for Docker Swarm backend services")]
#[command(version)]
struct Cli {
    /// Enable verbose logging output (-v, -vv)
    #[arg(short, long, action = ArgAction::Count)]
    verbose: u8,

    /// Path to a .env file with configuration overrides
    #[arg(long, value_name = "FILE")]
    env_file: Option<std::path::PathBuf>,
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    // -v overrides LOG_LEVEL; RUST_LOG overrides both
    let default_filter = match cli.verbose {
        0 => std::env::var("LOG_LEVEL")
            .map(|l| l.to_ascii_lowercase())
            .unwrap_or_else(|_| "info".to_string()),
        1 => "debug".to_string(),
        _ => "trace".to_string(),
    };

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_filter)),
        )
        .init();

    if let Some(ref env_file) = cli.env_file {
        if let Err(e) = dotenvy::from_path(env_file) {
            error!("Failed to load env file {}: {}", env_file.display(), e);
            process::exit(1);
        }
    }

    // Configuration errors are the only fatal startup condition
    let config = match ScalerConfig::from_env() {
        Ok(config) => config,
        Err(e) => {
            error!("Invalid configuration: {}", e);
            process::exit(1);
        }
    };

    if let Err(e) = run(config).await {
        error!("{}", e);
        process::exit(1);
    }
}

async fn run(config: ScalerConfig) -> anyhow::Result<()> {
    info!("Starting AutoScaler");

    let orchestrator = Arc::new(SwarmOrchestrator::connect(&config).await);
    let metrics = Arc::new(ScalerMetrics::new()?);

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let mut server_handles = Vec::new();

    // Observability surfaces are best-effort: binding retries in the
    // background and never blocks the control loop
    if config.metrics_enabled {
        let addr = format!("0.0.0.0:{}", config.metrics_port);
        let router = server::metrics_router(metrics.clone());
        let shutdown = shutdown_rx.clone();
        server_handles.push(tokio::spawn(async move {
            match server::bind_with_backoff(&addr, BIND_ATTEMPTS, BIND_INITIAL_DELAY).await {
                Some(listener) => server::serve("Metrics", listener, router, shutdown).await,
                None => warn!("AutoScaler running without Prometheus metrics"),
            }
        }));
    } else {
        info!("Prometheus metrics disabled");
    }

    let status = ScalerStatus {
        services_monitored: config.services().into_iter().map(|s| s.name).collect(),
        scaling_algorithm: config.algorithm.as_str().to_string(),
        docker_available: orchestrator.available(),
        metrics_port: config.metrics_port,
    };
    let health_addr = format!("0.0.0.0:{}", config.health_port);
    let health_router = server::health_router(status);
    let health_shutdown = shutdown_rx.clone();
    server_handles.push(tokio::spawn(async move {
        match server::bind_with_backoff(&health_addr, BIND_ATTEMPTS, BIND_INITIAL_DELAY).await {
            Some(listener) => {
                server::serve("Health check", listener, health_router, health_shutdown).await
            }
            None => warn!("Failed to start health check server after all retries"),
        }
    }));

    let collectors = TierCollectors {
        app: AppCollector::new(
            &config.api_health_url,
            &config.api_service_name,
            orchestrator.stats_client(),
        ),
        database: DatabaseCollector::from_config(&config),
        cache: CacheCollector::from_config(&config),
    };

    let scaler = AutoScaler::new(
        config,
        orchestrator.clone(),
        Arc::new(collectors),
        metrics.clone(),
    );
    let loop_handle = tokio::spawn(scaler.run(shutdown_rx));

    info!("AutoScaler fully initialized and running");

    wait_for_shutdown_signal().await;
    info!("Shutting down AutoScaler");
    let _ = shutdown_tx.send(true);

    // The loop finishes its in-flight tick; servers drain within a bounded
    // grace period
    let _ = loop_handle.await;
    let _ = tokio::time::timeout(
        Duration::from_secs(2),
        futures::future::join_all(server_handles),
    )
    .await;

    Ok(())
}

async fn wait_for_shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            error!("Failed to listen for ctrl-c: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        use tokio::signal::unix::{signal, SignalKind};
        match signal(SignalKind::terminate()) {
            Ok(mut stream) => {
                stream.recv().await;
            }
            Err(e) => {
                error!("Failed to listen for SIGTERM: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {}
        _ = terminate => {}
    }
}
