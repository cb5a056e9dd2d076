use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// A coarse grouping of consecutive chunks used for 2-tier retrieval.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Node {
    pub id: Uuid,
    pub workspace_id: Uuid,
    pub document_id: Uuid,
    pub node_index: i32,
    pub node_text: String,
    pub embedding: Option<Vec<f32>>,
    pub span_start: i32,
    pub span_end: i32,
    pub created_at: DateTime<Utc>,
}

impl Node {
    pub fn new(
        workspace_id: Uuid,
        document_id: Uuid,
        node_index: i32,
        node_text: String,
        embedding: Option<Vec<f32>>,
        span_start: i32,
        span_end: i32,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            workspace_id,
            document_id,
            node_index,
            node_text,
            embedding,
            span_start,
            span_end,
            created_at: Utc::now(),
        }
    }

    pub fn span(&self) -> (i32, i32) {
        (self.span_start, self.span_end)
    }
}

/// A `(document_id, span_start..=span_end)` range used to fetch the chunks
/// belonging to a node hit.
#[derive(Debug, Clone, Copy)]
pub struct NodeSpan {
    pub document_id: Uuid,
    pub span_start: i32,
    pub span_end: i32,
}
