use anyhow::{Context, Result};
use aws_config::{BehaviorVersion, Region};
use frame_processor::config::{Config, ServiceConfig};
use frame_processor::health::{start_health_server, ReadinessFlag};
use frame_processor::{
    sqs, FfmpegExtractor, IntakeLoop, IntakeSettings, OrchestratorSettings, ProcessingOrchestrator,
    S3BlobStore, SqsNotifier, SqsQueue, WorkerMetrics,
};
use std::sync::Arc;
use tokio::signal;
use tokio_util::sync::CancellationToken;
use tracing::{error, info};
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

#[tokio::main]
async fn main() -> Result<()> {
    // Load configuration
    let config = Config::load().context("Failed to load configuration")?;

    // Initialize logging
    init_tracing(&config.service);

    info!(
        service = %config.service.name,
        input_queue = %config.queue.input_url,
        output_queue = %config.queue.output_url,
        output_bucket = %config.storage.output_bucket,
        "Starting frame processor"
    );

    // Metric handles must be created after the recorder is installed
    init_metrics(&config.service)?;
    let metrics = WorkerMetrics::new();

    let sdk_config = aws_config::defaults(BehaviorVersion::latest())
        .region(Region::new(config.aws.region.clone()))
        .load()
        .await;

    // Initialize components
    let store = Arc::new(S3BlobStore::new(
        &sdk_config,
        &config.aws,
        &config.storage,
        metrics.clone(),
    ));
    let sqs_client = sqs::build_client(&sdk_config, &config.aws);
    let queue = Arc::new(SqsQueue::new(sqs_client.clone(), &config.queue, metrics.clone()));
    let notifier = Arc::new(SqsNotifier::new(sqs_client, metrics.clone()));
    let extractor = Arc::new(FfmpegExtractor::new(&config.extractor));

    tokio::fs::create_dir_all(&config.extractor.work_dir)
        .await
        .with_context(|| {
            format!(
                "Failed to create work directory {}",
                config.extractor.work_dir.display()
            )
        })?;

    let orchestrator = Arc::new(ProcessingOrchestrator::new(
        store,
        notifier,
        extractor,
        OrchestratorSettings {
            output_bucket: config.storage.output_bucket.clone(),
            notification_destination: config.queue.output_url.clone(),
            work_dir: config.extractor.work_dir.clone(),
        },
        metrics.clone(),
    ));

    let intake = IntakeLoop::new(
        queue,
        orchestrator,
        IntakeSettings::from_config(&config),
        metrics,
    );

    let shutdown = CancellationToken::new();
    let readiness = ReadinessFlag::default();

    // Spawn health server task
    let health_config = config.health.clone();
    let health_readiness = readiness.clone();
    let health_shutdown = shutdown.clone();
    let health_handle = tokio::spawn(async move {
        if let Err(e) = start_health_server(health_readiness, &health_config, health_shutdown).await {
            error!(error = %e, "Health server error");
        }
    });

    // Spawn intake loop task
    let intake_handle = tokio::spawn(intake.run(shutdown.clone()));
    readiness.set(true);

    info!("Frame processor started successfully");

    // Wait for shutdown signal
    shutdown_signal().await;

    info!("Shutting down frame processor");
    readiness.set(false);
    shutdown.cancel();

    if let Err(e) = intake_handle.await {
        error!(error = %e, "Intake loop task failed");
    }
    if let Err(e) = health_handle.await {
        error!(error = %e, "Health server task failed");
    }

    info!("Frame processor stopped");

    Ok(())
}

/// Initialize tracing/logging
fn init_tracing(service: &ServiceConfig) {
    let env_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&service.log_level));

    let registry = tracing_subscriber::registry().with(env_filter);

    if service.log_format.eq_ignore_ascii_case("pretty") {
        registry.with(fmt::layer().pretty()).init();
    } else {
        registry.with(fmt::layer().json()).init();
    }
}

/// Initialize Prometheus metrics exporter
fn init_metrics(service: &ServiceConfig) -> Result<()> {
    let builder = metrics_exporter_prometheus::PrometheusBuilder::new();

    builder
        .with_http_listener(([0, 0, 0, 0], service.metrics_port))
        .add_global_label("service", service.name.clone())
        .install()
        .context("Failed to install Prometheus metrics exporter")?;

    WorkerMetrics::describe();

    info!(port = service.metrics_port, "Prometheus metrics exporter started");

    Ok(())
}

/// Wait for shutdown signal (SIGINT or SIGTERM)
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            error!(error = %e, "Failed to listen for Ctrl+C");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                error!(error = %e, "Failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            info!("Received Ctrl+C signal");
        }
        _ = terminate => {
            info!("Received SIGTERM signal");
        }
    }
}
