use std::sync::Arc;

use axum::{routing::get, Router};
use metrics_exporter_prometheus::PrometheusBuilder;
use sticker_print_worker::{
    app_state::AppState,
    config::AppConfig,
    db::{self, JobStore, PgJobStore},
    routes,
    services::{
        feed::JobFeed,
        listener::WorkerPool,
        pipeline::{PipelineSettings, PrintPipeline},
        printer::{LpSubmitter, PrintDispatcher},
        reaper::Reaper,
        storage::ObjectStorage,
    },
};
use tokio::sync::mpsc;
use tower_http::trace::TraceLayer;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() {
    // Initialize structured logging
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .json()
        .init();

    tracing::info!("Starting sticker print worker");

    let config = AppConfig::from_env().expect("Failed to load configuration");

    let prometheus_handle = PrometheusBuilder::new()
        .install_recorder()
        .expect("Failed to install Prometheus metrics recorder");
    let prometheus_handle = Arc::new(prometheus_handle);
    describe_metrics();

    tracing::info!("Connecting to PostgreSQL");
    let db_pool = db::init_pool(&config.database_url)
        .await
        .expect("Failed to connect to database");

    tracing::info!("Running database migrations");
    db::run_migrations(&db_pool)
        .await
        .expect("Failed to run database migrations");

    tracing::info!(bucket = %config.storage_bucket, "Initializing object storage client");
    let storage = ObjectStorage::new(
        &config.storage_bucket,
        &config.storage_endpoint,
        &config.storage_region,
        &config.storage_access_key,
        &config.storage_secret_key,
    )
    .expect("Failed to initialize object storage client");

    std::fs::create_dir_all(&config.output_dir).expect("Failed to create output directory");

    let store: Arc<dyn JobStore> = Arc::new(PgJobStore::new(db_pool.clone()));
    let dispatcher = Arc::new(PrintDispatcher::new(
        Arc::new(LpSubmitter::new(&config.print_command)),
        config.dispatch_timeout(),
    ));
    let pipeline = Arc::new(PrintPipeline::new(
        store.clone(),
        Arc::new(storage),
        dispatcher,
        PipelineSettings::from_config(&config),
    ));

    let (sender, receiver) = mpsc::channel(config.queue_capacity);

    let pool_task = tokio::spawn(WorkerPool::new(pipeline, config.worker_concurrency).run(receiver));

    let feed = JobFeed::new(
        db_pool.clone(),
        store.clone(),
        &config.feed_channel,
        config.backlog_limit,
        sender.clone(),
    );
    let feed_task = tokio::spawn(async move {
        if let Err(e) = feed.run().await {
            tracing::error!(error = %e, "Job feed stopped");
        }
    });

    let reaper = Reaper::new(store, config.claim_timeout(), config.max_attempts, sender);
    let reaper_task = tokio::spawn(reaper.run(config.reaper_interval()));

    let app = Router::new()
        .route("/health", get(routes::health::health_check))
        .route("/api/v1/jobs/{job_id}", get(routes::jobs::get_job_status))
        .with_state(AppState::new(db_pool))
        .route(
            "/metrics",
            get(routes::metrics::prometheus_metrics).with_state(prometheus_handle),
        )
        .layer(TraceLayer::new_for_http());

    let listener = tokio::net::TcpListener::bind(&config.bind_addr)
        .await
        .expect("Failed to bind to address");

    tracing::info!(
        bind_addr = %config.bind_addr,
        printer = %config.printer_name,
        concurrency = config.worker_concurrency,
        "Worker ready"
    );

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .expect("Status server failed");

    tracing::info!("Shutting down, finishing in-flight jobs");
    // Dropping the feed and reaper drops the last senders, which lets the
    // pool drain and return.
    feed_task.abort();
    reaper_task.abort();
    let _ = feed_task.await;
    let _ = reaper_task.await;
    if let Err(e) = pool_task.await {
        tracing::error!(error = %e, "Worker pool task failed");
    }
    tracing::info!("Worker stopped");
}

fn describe_metrics() {
    metrics::describe_counter!(
        "sticker_jobs_received_total",
        "Pending print jobs received from the insert feed"
    );
    metrics::describe_counter!("sticker_jobs_printed_total", "Jobs sent to a printer");
    metrics::describe_counter!(
        "sticker_jobs_failed_total",
        "Jobs marked failed, labelled by pipeline stage"
    );
    metrics::describe_counter!(
        "sticker_jobs_requeued_total",
        "Stale processing jobs returned to pending"
    );
    metrics::describe_histogram!(
        "sticker_render_seconds",
        "Time to preprocess, dither, composite and encode a sticker"
    );
    metrics::describe_histogram!(
        "sticker_dispatch_seconds",
        "Time spent in the print command per job"
    );
    metrics::describe_gauge!("sticker_jobs_in_flight", "Jobs currently being processed");
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!(error = %e, "Failed to listen for shutdown signal");
        std::future::pending::<()>().await;
    }
}
