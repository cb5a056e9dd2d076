use api_router::{api_routes_v1, api_state::ApiState};
use axum::Router;
use ingestion_pipeline::processor::run_worker_pool;
use tracing::{error, info};

#[path = "bootstrap.rs"]
mod bootstrap;

/// Combined single-process entry point: runs the HTTP API and the
/// ingestion worker pool side by side, sharing one `PgPool` and one set
/// of collaborators. `server`/`worker` exist as separate binaries for
/// deployments that want to scale API and worker capacity independently;
/// this one is for development and small deployments.
#[tokio::main(flavor = "multi_thread", worker_threads = 4)]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    bootstrap::init_tracing();

    let collaborators = bootstrap::build().await?;
    let http_port = collaborators.config.http_port;
    let worker_concurrency = collaborators.config.worker_concurrency;

    let worker_handle = tokio::spawn(run_worker_pool(
        collaborators.processor,
        collaborators.job_queue,
        worker_concurrency,
    ));

    let api_state = ApiState {
        documents: collaborators.documents,
        workspaces: collaborators.workspaces,
        ingestion: collaborators.ingestion,
        orchestrator: collaborators.orchestrator,
        pool: collaborators.pool,
        config: collaborators.config,
    };

    let app = Router::new().merge(api_routes_v1(&api_state)).with_state(api_state);

    info!("starting combined server+worker listening on 0.0.0.0:{}", http_port);
    let serve_address = format!("0.0.0.0:{http_port}");
    let listener = tokio::net::TcpListener::bind(serve_address).await?;

    tokio::select! {
        result = axum::serve(listener, app) => {
            result?;
        }
        result = worker_handle => {
            if let Err(e) = result {
                error!(error = %e, "worker pool task panicked");
            }
        }
    }

    Ok(())
}
