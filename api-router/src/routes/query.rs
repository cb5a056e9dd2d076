use axum::{
    extract::{Path, State},
    response::IntoResponse,
    Extension, Json,
};
use common::domain::Actor;
use retrieval_pipeline::RetrievalOptions;
use serde::Deserialize;
use serde_json::json;
use uuid::Uuid;

use crate::{api_state::ApiState, error::ApiError};

#[derive(Debug, Deserialize)]
pub struct QueryBody {
    pub conversation_id: Option<Uuid>,
    pub query: String,
    #[serde(default = "default_top_k")]
    pub top_k: i64,
    #[serde(default)]
    pub hybrid: bool,
    #[serde(default)]
    pub two_tier: bool,
    #[serde(default)]
    pub rerank: bool,
    #[serde(default)]
    pub mmr: bool,
}

fn default_top_k() -> i64 {
    10
}

pub async fn answer_query(
    State(state): State<ApiState>,
    Extension(actor): Extension<Actor>,
    Path(workspace_id): Path<Uuid>,
    Json(body): Json<QueryBody>,
) -> Result<impl IntoResponse, ApiError> {
    let options = RetrievalOptions {
        hybrid: body.hybrid,
        two_tier: body.two_tier,
        rerank: body.rerank,
        mmr: body.mmr,
        ..RetrievalOptions::default()
    };

    let result = state
        .orchestrator
        .answer(body.conversation_id, workspace_id, &actor, &body.query, body.top_k, options)
        .await?;

    Ok(Json(json!({
        "conversation_id": result.conversation_id,
        "answer": result.answer,
        "metadata": result.metadata,
        "sources": result.chunks.iter().map(|c| json!({
            "chunk_id": c.chunk.id,
            "document_id": c.chunk.document_id,
            "chunk_index": c.chunk.chunk_index,
            "score": c.score,
        })).collect::<Vec<_>>(),
    })))
}
