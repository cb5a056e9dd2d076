use std::collections::HashMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Chunk {
    pub id: Uuid,
    pub document_id: Uuid,
    pub workspace_id: Uuid,
    pub chunk_index: i32,
    pub content: String,
    pub embedding: Option<Vec<f32>>,
    pub metadata: HashMap<String, Value>,
    pub created_at: DateTime<Utc>,
}

impl Chunk {
    pub fn new(
        document_id: Uuid,
        workspace_id: Uuid,
        chunk_index: i32,
        content: String,
        embedding: Option<Vec<f32>>,
        metadata: HashMap<String, Value>,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            document_id,
            workspace_id,
            chunk_index,
            content,
            embedding,
            metadata,
            created_at: Utc::now(),
        }
    }
}

/// A chunk together with its retrieval score, used throughout the
/// retrieval pipeline so rank-fusion and reranking have a score to work with.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScoredChunk {
    pub chunk: Chunk,
    pub score: f32,
}
