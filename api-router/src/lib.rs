use api_state::ApiState;
use axum::{
    extract::{DefaultBodyLimit, FromRef},
    middleware::from_fn,
    routing::{get, post},
    Router,
};
use middleware_actor::inject_actor;
use routes::{
    documents::{ingest_document, list_documents},
    liveness::live,
    query::answer_query,
    readiness::ready,
};

pub mod api_state;
pub mod error;
mod middleware_actor;
mod routes;

/// Router for API functionality, version 1.
pub fn api_routes_v1<S>(app_state: &ApiState) -> Router<S>
where
    S: Clone + Send + Sync + 'static,
    ApiState: FromRef<S>,
{
    // Public, unauthenticated endpoints (for k8s/systemd probes).
    let public = Router::new()
        .route("/readyz", get(ready))
        .route("/healthz", get(live));

    // Workspace-scoped endpoints; the actor is trusted from headers since
    // identity/JWT issuance is out of scope (§6).
    let protected = Router::new()
        .route(
            "/v1/workspaces/{workspace_id}/documents",
            post(ingest_document).layer(DefaultBodyLimit::max(app_state.config.ingest_max_body_bytes)),
        )
        .route("/v1/workspaces/{workspace_id}/documents", get(list_documents))
        .route("/v1/workspaces/{workspace_id}/query", post(answer_query))
        .route_layer(from_fn(inject_actor));

    public.merge(protected)
}
