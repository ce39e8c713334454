//! Minos — the Olympus judge worker.
//!
//! Dequeues submissions, compiles and runs each against its problem's
//! test data inside a disposable sandbox, and reports a verdict together
//! with progress updates.

mod config;
mod consumer;
mod language;
mod metrics;
mod orchestrator;
mod progress;
mod sandbox;
mod testdata;
mod verdict;
mod workspace;

use std::sync::Arc;

use anyhow::Result;
use tokio_util::sync::CancellationToken;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use crate::config::{host_mount_table, Config};
use crate::consumer::QueueConsumer;
use crate::metrics::MetricsServer;
use crate::orchestrator::Orchestrator;
use crate::sandbox::SandboxExecutor;
use crate::testdata::TestDataProvider;
use crate::workspace::WorkspaceManager;

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "minos=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    tracing::info!("Starting Minos judge worker");

    let config = Config::from_env();

    let aws_config = aws_config::defaults(aws_config::BehaviorVersion::latest())
        .region(aws_sdk_s3::config::Region::new(config.aws_region.clone()))
        .load()
        .await;
    let sqs = aws_sdk_sqs::Client::new(&aws_config);
    let s3 = aws_sdk_s3::Client::new(&aws_config);

    tracing::info!("Connecting to Redis...");
    let redis_client = redis::Client::open(config.redis_url())?;
    let redis_conn = redis_client.get_connection_manager().await?;
    tracing::info!("Redis connected");

    let consume_queue_url = QueueConsumer::queue_url(&sqs, &config.consume_queue_name).await?;
    let produce_queue_url = QueueConsumer::queue_url(&sqs, &config.produce_queue_name).await?;

    let workspace = WorkspaceManager::new(config.storage.temp_dir.clone());
    let testdata = TestDataProvider::new(
        config.storage.problem_dir.clone(),
        config.s3_bucket_name.clone(),
        s3,
    );
    let sandbox = SandboxExecutor::new(
        config.execution.stderr_cap_bytes,
        config.execution.kill_grace_sec,
        config.execution.run_grace_sec as u64,
    );
    let mount_table = host_mount_table(&config.storage);
    let orchestrator = Arc::new(Orchestrator::new(
        workspace,
        testdata,
        sandbox,
        mount_table,
        config.execution.compile_timeout_sec as u64,
    ));

    let consumer = Arc::new(QueueConsumer::new(
        sqs,
        consume_queue_url,
        produce_queue_url,
        orchestrator,
        redis_conn,
        config.execution.max_source_bytes,
    ));

    let shutdown = CancellationToken::new();
    let shutdown_signal = shutdown.clone();
    tokio::spawn(async move {
        let ctrl_c = async {
            tokio::signal::ctrl_c()
                .await
                .expect("failed to install Ctrl+C handler");
        };

        #[cfg(unix)]
        let terminate = async {
            tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
                .expect("failed to install SIGTERM handler")
                .recv()
                .await;
        };
        #[cfg(not(unix))]
        let terminate = std::future::pending::<()>();

        tokio::select! {
            _ = ctrl_c => {},
            _ = terminate => {},
        }

        tracing::info!("shutdown signal received, cancelling in-flight submissions");
        shutdown_signal.cancel();
    });

    let metrics_port = config.metrics_port;
    tokio::spawn(async move {
        if let Err(e) = MetricsServer::run(metrics_port).await {
            tracing::error!(error = %e, "metrics server error");
        }
    });

    tracing::info!(workers = config.worker_threads, "minos ready, consuming submissions");
    let handles = consumer.spawn_workers(config.worker_threads, shutdown);
    for handle in handles {
        let _ = handle.await;
    }

    tracing::info!("minos shutdown complete");
    Ok(())
}
