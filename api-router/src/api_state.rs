use std::sync::Arc;

use common::storage::{DocumentRepository, WorkspaceRepository};
use common::utils::config::AppConfig;
use ingestion_pipeline::pipeline::IngestionPipeline;
use retrieval_pipeline::AnswerOrchestrator;
use sqlx::PgPool;

/// Shared application state handed to every route. Business logic is
/// delegated entirely to the core collaborators; `pool` is kept around
/// only so `/readyz` has something to ping directly.
#[derive(Clone)]
pub struct ApiState {
    pub documents: Arc<dyn DocumentRepository>,
    pub workspaces: Arc<dyn WorkspaceRepository>,
    pub ingestion: Arc<IngestionPipeline>,
    pub orchestrator: Arc<AnswerOrchestrator>,
    pub pool: PgPool,
    pub config: AppConfig,
}
