//! Transcoding worker binary.

use std::sync::Arc;

use tokio::sync::watch;
use tracing::{error, info, warn};

use vcomp_registry::{JobRepository, RegistryClient};
use vcomp_worker::{init_tracing, metrics, spawn_sweepers, JobPipeline, Scheduler, WorkerConfig};

#[tokio::main]
async fn main() {
    // Install rustls crypto provider (required for TLS/HTTPS)
    let _ = rustls::crypto::ring::default_provider().install_default();

    dotenvy::dotenv().ok();
    init_tracing();

    info!("Starting vcomp-worker");

    let config = WorkerConfig::from_env();
    info!("Worker config: {:?}", config);

    if let Some(addr) = config.metrics_addr {
        match metrics::init_metrics(addr) {
            Ok(()) => info!(%addr, "Metrics exporter listening"),
            Err(e) => warn!("Metrics exporter disabled: {}", e),
        }
    }

    let client = match RegistryClient::from_env() {
        Ok(c) => c,
        Err(e) => {
            error!("Failed to create registry client: {}", e);
            std::process::exit(1);
        }
    };

    if let Err(e) = client.ping().await {
        warn!("Registry not reachable yet: {}", e);
    }

    let pipeline = match JobPipeline::from_config(&config, Arc::new(JobRepository::new(client))) {
        Ok(p) => p,
        Err(e) => {
            error!("Failed to create job pipeline: {}", e);
            std::process::exit(1);
        }
    };

    if let Err(e) = pipeline.layout().ensure_roots().await {
        error!("Failed to prepare storage roots: {}", e);
        std::process::exit(1);
    }

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let sweepers = spawn_sweepers(
        pipeline.layout(),
        &config.cleanup,
        pipeline.in_flight(),
        &shutdown_rx,
    );

    let scheduler = Scheduler::new(config.poll_interval);
    info!(worker_id = scheduler.worker_id(), "Worker ready");
    let scheduler = tokio::spawn(scheduler.run(Arc::new(pipeline), shutdown_rx));

    wait_for_shutdown().await;
    info!("Received shutdown signal");
    let _ = shutdown_tx.send(true);

    if let Err(e) = scheduler.await {
        error!("Scheduler task failed: {}", e);
    }
    for result in futures::future::join_all(sweepers).await {
        if let Err(e) = result {
            error!("Sweeper task failed: {}", e);
        }
    }

    info!("Worker shutdown complete");
}

#[cfg(unix)]
async fn wait_for_shutdown() {
    use tokio::signal::unix::{signal, SignalKind};

    let mut terminate = match signal(SignalKind::terminate()) {
        Ok(s) => s,
        Err(e) => {
            warn!("SIGTERM handler unavailable: {}", e);
            tokio::signal::ctrl_c().await.ok();
            return;
        }
    };

    tokio::select! {
        _ = tokio::signal::ctrl_c() => {}
        _ = terminate.recv() => {}
    }
}

#[cfg(not(unix))]
async fn wait_for_shutdown() {
    tokio::signal::ctrl_c().await.ok();
}
