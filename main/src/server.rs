use api_router::{api_routes_v1, api_state::ApiState};
use axum::Router;
use tracing::info;

#[path = "bootstrap.rs"]
mod bootstrap;

#[tokio::main(flavor = "multi_thread", worker_threads = 2)]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    bootstrap::init_tracing();

    let collaborators = bootstrap::build().await?;
    let http_port = collaborators.config.http_port;

    let api_state = ApiState {
        documents: collaborators.documents,
        workspaces: collaborators.workspaces,
        ingestion: collaborators.ingestion,
        orchestrator: collaborators.orchestrator,
        pool: collaborators.pool,
        config: collaborators.config,
    };

    let app = Router::new().merge(api_routes_v1(&api_state)).with_state(api_state);

    info!("starting server listening on 0.0.0.0:{}", http_port);
    let serve_address = format!("0.0.0.0:{http_port}");
    let listener = tokio::net::TcpListener::bind(serve_address).await?;
    axum::serve(listener, app).await?;

    Ok(())
}
