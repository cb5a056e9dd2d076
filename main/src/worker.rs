use ingestion_pipeline::processor::run_worker_pool;
use tracing::info;

#[path = "bootstrap.rs"]
mod bootstrap;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    bootstrap::init_tracing();

    let collaborators = bootstrap::build().await?;
    let concurrency = collaborators.config.worker_concurrency;

    info!(concurrency, "starting ingestion worker pool");
    run_worker_pool(collaborators.processor, collaborators.job_queue, concurrency).await;

    Ok(())
}
