use std::collections::{BTreeSet, HashMap};

use axum::{
    extract::{Path, Query, State},
    response::IntoResponse,
    Extension, Json,
};
use common::domain::{Actor, DocumentFilters, DocumentSortKey, DocumentStatus};
use ingestion_pipeline::pipeline::IngestRequest;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use uuid::Uuid;

use crate::{api_state::ApiState, error::ApiError};

#[derive(Debug, Deserialize)]
pub struct IngestBody {
    pub title: String,
    pub text: String,
    #[serde(default)]
    pub tags: BTreeSet<String>,
    #[serde(default)]
    pub metadata: HashMap<String, Value>,
}

pub async fn ingest_document(
    State(state): State<ApiState>,
    Extension(actor): Extension<Actor>,
    Path(workspace_id): Path<Uuid>,
    Json(body): Json<IngestBody>,
) -> Result<impl IntoResponse, ApiError> {
    let outcome = state
        .ingestion
        .ingest(IngestRequest {
            workspace_id,
            actor,
            title: body.title,
            text: body.text,
            metadata: body.metadata,
            tags: body.tags,
        })
        .await?;

    Ok(Json(json!({
        "document_id": outcome.document_id,
        "chunks_created": outcome.chunks_created,
        "status": outcome.status,
    })))
}

#[derive(Debug, Deserialize)]
pub struct ListDocumentsQuery {
    pub query: Option<String>,
    pub status: Option<DocumentStatus>,
    pub tag: Option<String>,
    #[serde(default)]
    pub sort: DocumentSortKey,
    pub limit: Option<i64>,
    pub offset: Option<i64>,
}

#[derive(Debug, Serialize)]
struct ListDocumentsResponse {
    documents: Vec<common::domain::Document>,
}

pub async fn list_documents(
    State(state): State<ApiState>,
    Extension(actor): Extension<Actor>,
    Path(workspace_id): Path<Uuid>,
    Query(params): Query<ListDocumentsQuery>,
) -> Result<impl IntoResponse, ApiError> {
    let workspace = state
        .workspaces
        .get_workspace(workspace_id)
        .await?
        .ok_or_else(|| common::error::AppError::NotFound("workspace not found".to_string()))?;
    let acl = state.workspaces.list_acl(workspace_id).await?;
    if !common::policy::can_read(&workspace, &actor, &acl) {
        return Err(common::error::AppError::NotFound("workspace not found".to_string()).into());
    }

    let filters = DocumentFilters {
        query: params.query,
        status: params.status,
        tag: params.tag,
        sort: params.sort,
    };
    let documents = state
        .documents
        .list_documents(workspace_id, params.limit.unwrap_or(50), params.offset.unwrap_or(0), &filters)
        .await?;
    let documents = common::policy::filter_documents(documents, &actor);

    Ok(Json(ListDocumentsResponse { documents }))
}
