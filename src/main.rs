//! Deadline worker binary.
//!
//! Connects to PostgreSQL, wires the Postgres-backed stores into the
//! window-closing handlers, and polls for due cycles until Ctrl+C or
//! SIGTERM. Configuration is read from `COBUY__*` environment variables.

use std::sync::Arc;

use sqlx::postgres::PgPoolOptions;
use tokio::signal;
use tokio::sync::watch;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

use cobuy::adapters::{PostgresCycleStore, PostgresGroupDirectory, PostgresSuspensionStore};
use cobuy::application::{
    CloseCollectingHandler, ClosePaymentWindowHandler, DeadlineWorker, DeadlineWorkerConfig,
};
use cobuy::config::AppConfig;
use cobuy::ports::{CycleStore, GroupDirectory, SuspensionStore};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    init_logging();

    let config = AppConfig::load()?;
    config.validate()?;

    let pool = PgPoolOptions::new()
        .min_connections(config.database.min_connections)
        .max_connections(config.database.max_connections)
        .acquire_timeout(config.database.acquire_timeout())
        .connect(&config.database.url)
        .await?;
    info!("Database connected");

    if config.database.run_migrations {
        sqlx::migrate!("./migrations").run(&pool).await?;
        info!("Migrations applied");
    }

    let cycle_store: Arc<dyn CycleStore> = Arc::new(PostgresCycleStore::new(pool.clone()));
    let suspension_store: Arc<dyn SuspensionStore> =
        Arc::new(PostgresSuspensionStore::new(pool.clone()));
    let group_directory: Arc<dyn GroupDirectory> = Arc::new(PostgresGroupDirectory::new(pool));

    let close_collecting = CloseCollectingHandler::new(
        Arc::clone(&cycle_store),
        Arc::clone(&group_directory),
        config.cycles.clone(),
    );
    let close_payment_window = ClosePaymentWindowHandler::new(
        Arc::clone(&cycle_store),
        Arc::clone(&suspension_store),
        Arc::clone(&group_directory),
        config.cycles.clone(),
    );

    let worker_config = DeadlineWorkerConfig::default()
        .with_poll_interval(config.worker.poll_interval())
        .with_batch_size(config.worker.batch_size);
    let worker = DeadlineWorker::with_config(
        cycle_store,
        close_collecting,
        close_payment_window,
        worker_config,
    );

    info!(
        "Deadline worker running (poll every {}s, batch size {}). Press Ctrl+C to stop.",
        config.worker.poll_interval_secs, config.worker.batch_size
    );

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let worker_handle = tokio::spawn(async move {
        worker.run(shutdown_rx).await;
    });

    shutdown_signal().await;
    info!("Shutting down...");

    let _ = shutdown_tx.send(true);
    if let Err(e) = worker_handle.await {
        error!("Worker task failed: {}", e);
    }

    info!("Shutdown complete");
    Ok(())
}

fn init_logging() {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("info,cobuy=debug,sqlx=warn"));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(true)
        .with_thread_ids(false)
        .with_file(false)
        .with_line_number(false)
        .init();
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            error!("Failed to install Ctrl+C handler: {}", e);
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut stream) => {
                stream.recv().await;
            }
            Err(e) => error!("Failed to install SIGTERM handler: {}", e),
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
}
