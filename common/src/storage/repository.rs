//! Document Repository (C5): workspace-scoped CRUD, dedup lookup, and
//! vector/FTS queries over Postgres + pgvector.

use async_trait::async_trait;
use pgvector::Vector;
use sqlx::{PgPool, Postgres, Row, Transaction};
use uuid::Uuid;

use crate::domain::{
    chunk::ScoredChunk, document::DocumentFilters, document::DocumentSortKey, Chunk, Document,
    DocumentStatus, Node, EMBEDDING_DIM,
};
use crate::domain::node::NodeSpan;
use crate::error::AppError;

/// Outcome of `save_document_with_chunks`: either the document was newly
/// created, or a concurrent writer won the dedup race and this is the
/// pre-existing winner (§4.5 Race recovery).
#[derive(Debug, Clone)]
pub struct DocumentOutcome {
    pub document: Document,
    pub chunks_created: usize,
    pub was_existing: bool,
}

#[async_trait]
pub trait DocumentRepository: Send + Sync {
    async fn save_document_with_chunks(
        &self,
        document: Document,
        chunks: Vec<Chunk>,
        nodes: Option<Vec<Node>>,
    ) -> Result<DocumentOutcome, AppError>;

    async fn get_document(&self, workspace_id: Uuid, document_id: Uuid) -> Result<Option<Document>, AppError>;

    async fn get_document_by_content_hash(
        &self,
        workspace_id: Uuid,
        content_hash: &str,
    ) -> Result<Option<Document>, AppError>;

    async fn list_documents(
        &self,
        workspace_id: Uuid,
        limit: i64,
        offset: i64,
        filters: &DocumentFilters,
    ) -> Result<Vec<Document>, AppError>;

    async fn find_similar_chunks(
        &self,
        embedding: &[f32],
        top_k: i64,
        workspace_id: Uuid,
    ) -> Result<Vec<ScoredChunk>, AppError>;

    async fn find_similar_chunks_mmr(
        &self,
        embedding: &[f32],
        top_k: i64,
        lambda: f32,
        pool_size: i64,
        workspace_id: Uuid,
    ) -> Result<Vec<ScoredChunk>, AppError>;

    async fn find_chunks_full_text(
        &self,
        query: &str,
        top_k: i64,
        workspace_id: Uuid,
    ) -> Result<Vec<ScoredChunk>, AppError>;

    async fn find_similar_nodes(
        &self,
        embedding: &[f32],
        top_k: i64,
        workspace_id: Uuid,
    ) -> Result<Vec<(Node, f32)>, AppError>;

    async fn find_chunks_by_node_spans(
        &self,
        workspace_id: Uuid,
        spans: &[NodeSpan],
    ) -> Result<Vec<Chunk>, AppError>;

    async fn transition_document_status(
        &self,
        document_id: Uuid,
        from: DocumentStatus,
        to: DocumentStatus,
        error_message: Option<String>,
    ) -> Result<bool, AppError>;

    async fn delete_chunks_for_document(&self, document_id: Uuid) -> Result<(), AppError>;

    /// Inserts chunks/nodes for a document that already exists (the async
    /// processor's reprocess path), as opposed to `save_document_with_chunks`
    /// which also inserts a brand-new `documents` row.
    async fn insert_chunks_and_nodes(
        &self,
        document: &Document,
        chunks: Vec<Chunk>,
        nodes: Option<Vec<Node>>,
    ) -> Result<usize, AppError>;
}

pub struct PgDocumentRepository {
    pool: PgPool,
}

impl PgDocumentRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    fn validate_embedding(vec: &Option<Vec<f32>>) -> Result<(), AppError> {
        match vec {
            Some(v) if v.len() == EMBEDDING_DIM => Ok(()),
            Some(v) => Err(AppError::Validation(format!(
                "embedding dimension {} does not match required {}",
                v.len(),
                EMBEDDING_DIM
            ))),
            None => Err(AppError::Validation("embedding is required".into())),
        }
    }

    #[tracing::instrument(skip_all, fields(workspace_id = %document.workspace_id))]
    async fn insert_document_chunks_nodes(
        tx: &mut Transaction<'_, Postgres>,
        document: &Document,
        chunks: &[Chunk],
        nodes: &Option<Vec<Node>>,
        fts_regconfig: &str,
    ) -> Result<(), AppError> {
        sqlx::query(
            "INSERT INTO documents
                (id, workspace_id, title, status, content_hash, file_name, mime_type,
                 storage_key, tags, allowed_roles, external_source_id, external_etag,
                 external_modified_time, error_message, metadata, created_at, updated_at, deleted_at)
             VALUES ($1,$2,$3,$4,$5,$6,$7,$8,$9,$10,$11,$12,$13,$14,$15,$16,$17,$18)",
        )
        .bind(document.id)
        .bind(document.workspace_id)
        .bind(&document.title)
        .bind(document.status)
        .bind(&document.content_hash)
        .bind(&document.file_name)
        .bind(&document.mime_type)
        .bind(&document.storage_key)
        .bind(document.tags.iter().cloned().collect::<Vec<_>>())
        .bind(document.allowed_roles.iter().cloned().collect::<Vec<_>>())
        .bind(&document.external_source_id)
        .bind(&document.external_etag)
        .bind(document.external_modified_time)
        .bind(&document.error_message)
        .bind(serde_json::to_value(&document.metadata).unwrap_or(serde_json::Value::Null))
        .bind(document.created_at)
        .bind(document.updated_at)
        .bind(document.deleted_at)
        .execute(&mut **tx)
        .await?;

        for chunk in chunks {
            Self::validate_embedding(&chunk.embedding)?;
            let vector = Vector::from(chunk.embedding.clone().unwrap_or_default());
            sqlx::query(
                "INSERT INTO chunks
                    (id, document_id, workspace_id, chunk_index, content, embedding, tsv, metadata, created_at)
                 VALUES ($1,$2,$3,$4,$5,$6, to_tsvector($7::regconfig, $5), $8, $9)",
            )
            .bind(chunk.id)
            .bind(chunk.document_id)
            .bind(chunk.workspace_id)
            .bind(chunk.chunk_index)
            .bind(&chunk.content)
            .bind(vector)
            .bind(fts_regconfig)
            .bind(serde_json::to_value(&chunk.metadata).unwrap_or(serde_json::Value::Null))
            .bind(chunk.created_at)
            .execute(&mut **tx)
            .await?;
        }

        if let Some(nodes) = nodes {
            for node in nodes {
                Self::validate_embedding(&node.embedding)?;
                let vector = Vector::from(node.embedding.clone().unwrap_or_default());
                sqlx::query(
                    "INSERT INTO nodes
                        (id, workspace_id, document_id, node_index, node_text, embedding, span_start, span_end, created_at)
                     VALUES ($1,$2,$3,$4,$5,$6,$7,$8,$9)",
                )
                .bind(node.id)
                .bind(node.workspace_id)
                .bind(node.document_id)
                .bind(node.node_index)
                .bind(&node.node_text)
                .bind(vector)
                .bind(node.span_start)
                .bind(node.span_end)
                .bind(node.created_at)
                .execute(&mut **tx)
                .await?;
            }
        }

        Ok(())
    }

    async fn insert_chunks_nodes_only(
        tx: &mut Transaction<'_, Postgres>,
        chunks: &[Chunk],
        nodes: &Option<Vec<Node>>,
        fts_regconfig: &str,
    ) -> Result<(), AppError> {
        for chunk in chunks {
            Self::validate_embedding(&chunk.embedding)?;
            let vector = Vector::from(chunk.embedding.clone().unwrap_or_default());
            sqlx::query(
                "INSERT INTO chunks
                    (id, document_id, workspace_id, chunk_index, content, embedding, tsv, metadata, created_at)
                 VALUES ($1,$2,$3,$4,$5,$6, to_tsvector($7::regconfig, $5), $8, $9)",
            )
            .bind(chunk.id)
            .bind(chunk.document_id)
            .bind(chunk.workspace_id)
            .bind(chunk.chunk_index)
            .bind(&chunk.content)
            .bind(vector)
            .bind(fts_regconfig)
            .bind(serde_json::to_value(&chunk.metadata).unwrap_or(serde_json::Value::Null))
            .bind(chunk.created_at)
            .execute(&mut **tx)
            .await?;
        }

        if let Some(nodes) = nodes {
            for node in nodes {
                Self::validate_embedding(&node.embedding)?;
                let vector = Vector::from(node.embedding.clone().unwrap_or_default());
                sqlx::query(
                    "INSERT INTO nodes
                        (id, workspace_id, document_id, node_index, node_text, embedding, span_start, span_end, created_at)
                     VALUES ($1,$2,$3,$4,$5,$6,$7,$8,$9)",
                )
                .bind(node.id)
                .bind(node.workspace_id)
                .bind(node.document_id)
                .bind(node.node_index)
                .bind(&node.node_text)
                .bind(vector)
                .bind(node.span_start)
                .bind(node.span_end)
                .bind(node.created_at)
                .execute(&mut **tx)
                .await?;
            }
        }

        Ok(())
    }

    fn row_to_document(row: &sqlx::postgres::PgRow) -> Result<Document, AppError> {
        use std::collections::{BTreeSet, HashMap};
        let tags: Vec<String> = row.try_get("tags")?;
        let allowed_roles: Vec<String> = row.try_get("allowed_roles")?;
        let metadata_json: serde_json::Value = row.try_get("metadata")?;
        let metadata: HashMap<String, serde_json::Value> = match metadata_json {
            serde_json::Value::Object(map) => map.into_iter().collect(),
            _ => HashMap::new(),
        };
        Ok(Document {
            id: row.try_get("id")?,
            workspace_id: row.try_get("workspace_id")?,
            title: row.try_get("title")?,
            status: row.try_get("status")?,
            content_hash: row.try_get("content_hash")?,
            file_name: row.try_get("file_name")?,
            mime_type: row.try_get("mime_type")?,
            storage_key: row.try_get("storage_key")?,
            tags: BTreeSet::from_iter(tags),
            allowed_roles: BTreeSet::from_iter(allowed_roles),
            external_source_id: row.try_get("external_source_id")?,
            external_etag: row.try_get("external_etag")?,
            external_modified_time: row.try_get("external_modified_time")?,
            error_message: row.try_get("error_message")?,
            metadata,
            created_at: row.try_get("created_at")?,
            updated_at: row.try_get("updated_at")?,
            deleted_at: row.try_get("deleted_at")?,
        })
    }

    fn row_to_chunk(row: &sqlx::postgres::PgRow) -> Result<Chunk, AppError> {
        use std::collections::HashMap;
        let embedding: Option<Vector> = row.try_get("embedding")?;
        let metadata_json: serde_json::Value = row.try_get("metadata")?;
        let metadata: HashMap<String, serde_json::Value> = match metadata_json {
            serde_json::Value::Object(map) => map.into_iter().collect(),
            _ => HashMap::new(),
        };
        Ok(Chunk {
            id: row.try_get("id")?,
            document_id: row.try_get("document_id")?,
            workspace_id: row.try_get("workspace_id")?,
            chunk_index: row.try_get("chunk_index")?,
            content: row.try_get("content")?,
            embedding: embedding.map(|v| v.to_vec()),
            metadata,
            created_at: row.try_get("created_at")?,
        })
    }

    fn row_to_node(row: &sqlx::postgres::PgRow) -> Result<Node, AppError> {
        let embedding: Option<Vector> = row.try_get("embedding")?;
        Ok(Node {
            id: row.try_get("id")?,
            workspace_id: row.try_get("workspace_id")?,
            document_id: row.try_get("document_id")?,
            node_index: row.try_get("node_index")?,
            node_text: row.try_get("node_text")?,
            embedding: embedding.map(|v| v.to_vec()),
            span_start: row.try_get("span_start")?,
            span_end: row.try_get("span_end")?,
            created_at: row.try_get("created_at")?,
        })
    }
}

#[async_trait]
impl DocumentRepository for PgDocumentRepository {
    #[tracing::instrument(skip_all, fields(workspace_id = %document.workspace_id, chunks = chunks.len()))]
    async fn save_document_with_chunks(
        &self,
        document: Document,
        chunks: Vec<Chunk>,
        nodes: Option<Vec<Node>>,
    ) -> Result<DocumentOutcome, AppError> {
        let fts_regconfig: String = sqlx::query_scalar(
            "SELECT fts_language::text FROM workspaces WHERE id = $1",
        )
        .bind(document.workspace_id)
        .fetch_optional(&self.pool)
        .await?
        .unwrap_or_else(|| "spanish".to_string());

        let mut tx = self.pool.begin().await?;
        let chunks_created = chunks.len();
        let insert_result =
            Self::insert_document_chunks_nodes(&mut tx, &document, &chunks, &nodes, &fts_regconfig).await;

        match insert_result {
            Ok(()) => {
                tx.commit().await?;
                Ok(DocumentOutcome {
                    document,
                    chunks_created,
                    was_existing: false,
                })
            }
            Err(err) => {
                tx.rollback().await.ok();
                if err.is_unique_violation("uq_documents_workspace_content_hash") {
                    if let Some(hash) = &document.content_hash {
                        if let Some(existing) = self
                            .get_document_by_content_hash(document.workspace_id, hash)
                            .await?
                        {
                            return Ok(DocumentOutcome {
                                document: existing,
                                chunks_created: 0,
                                was_existing: true,
                            });
                        }
                    }
                }
                Err(err)
            }
        }
    }

    async fn get_document(&self, workspace_id: Uuid, document_id: Uuid) -> Result<Option<Document>, AppError> {
        let row = sqlx::query(
            "SELECT * FROM documents WHERE workspace_id = $1 AND id = $2 AND deleted_at IS NULL",
        )
        .bind(workspace_id)
        .bind(document_id)
        .fetch_optional(&self.pool)
        .await?;
        row.as_ref().map(Self::row_to_document).transpose()
    }

    async fn get_document_by_content_hash(
        &self,
        workspace_id: Uuid,
        content_hash: &str,
    ) -> Result<Option<Document>, AppError> {
        let row = sqlx::query(
            "SELECT * FROM documents WHERE workspace_id = $1 AND content_hash = $2 AND deleted_at IS NULL",
        )
        .bind(workspace_id)
        .bind(content_hash)
        .fetch_optional(&self.pool)
        .await?;
        row.as_ref().map(Self::row_to_document).transpose()
    }

    async fn list_documents(
        &self,
        workspace_id: Uuid,
        limit: i64,
        offset: i64,
        filters: &DocumentFilters,
    ) -> Result<Vec<Document>, AppError> {
        let order_by = match filters.sort {
            DocumentSortKey::CreatedAtDesc => "created_at DESC",
            DocumentSortKey::CreatedAtAsc => "created_at ASC",
            DocumentSortKey::TitleAsc => "title ASC",
            DocumentSortKey::TitleDesc => "title DESC",
        };

        // `limit + 1` rows are fetched so the caller can derive `next_cursor`.
        let sql = format!(
            "SELECT * FROM documents
             WHERE workspace_id = $1 AND deleted_at IS NULL
               AND ($2::text IS NULL OR title ILIKE '%' || $2 || '%')
               AND ($3::document_status IS NULL OR status = $3)
               AND ($4::text IS NULL OR $4 = ANY(tags))
             ORDER BY {order_by}
             LIMIT $5 OFFSET $6"
        );

        let rows = sqlx::query(&sql)
            .bind(workspace_id)
            .bind(&filters.query)
            .bind(filters.status)
            .bind(&filters.tag)
            .bind(limit + 1)
            .bind(offset)
            .fetch_all(&self.pool)
            .await?;

        rows.iter().map(Self::row_to_document).collect()
    }

    #[tracing::instrument(skip_all, fields(workspace_id = %workspace_id, top_k))]
    async fn find_similar_chunks(
        &self,
        embedding: &[f32],
        top_k: i64,
        workspace_id: Uuid,
    ) -> Result<Vec<ScoredChunk>, AppError> {
        let vector = Vector::from(embedding.to_vec());
        let rows = sqlx::query(
            "SELECT c.*, 1 - (c.embedding <=> $1) AS similarity
             FROM chunks c
             JOIN documents d ON d.id = c.document_id
             WHERE c.workspace_id = $2 AND d.deleted_at IS NULL
             ORDER BY c.embedding <=> $1
             LIMIT $3",
        )
        .bind(vector)
        .bind(workspace_id)
        .bind(top_k)
        .fetch_all(&self.pool)
        .await?;

        rows.iter()
            .map(|row| {
                Ok(ScoredChunk {
                    chunk: Self::row_to_chunk(row)?,
                    score: row.try_get::<f32, _>("similarity")?,
                })
            })
            .collect()
    }

    #[tracing::instrument(skip_all, fields(workspace_id = %workspace_id, top_k, lambda, pool_size))]
    async fn find_similar_chunks_mmr(
        &self,
        embedding: &[f32],
        top_k: i64,
        lambda: f32,
        pool_size: i64,
        workspace_id: Uuid,
    ) -> Result<Vec<ScoredChunk>, AppError> {
        let pool = self
            .find_similar_chunks(embedding, pool_size.max(top_k), workspace_id)
            .await?;
        Ok(mmr_select(pool, top_k as usize, lambda))
    }

    #[tracing::instrument(skip_all, fields(workspace_id = %workspace_id, top_k))]
    async fn find_chunks_full_text(
        &self,
        query: &str,
        top_k: i64,
        workspace_id: Uuid,
    ) -> Result<Vec<ScoredChunk>, AppError> {
        let regconfig: String = sqlx::query_scalar(
            "SELECT fts_language::text FROM workspaces WHERE id = $1",
        )
        .bind(workspace_id)
        .fetch_optional(&self.pool)
        .await?
        .unwrap_or_else(|| "spanish".to_string());

        let rows = sqlx::query(
            "SELECT c.*, ts_rank(c.tsv, websearch_to_tsquery($1::regconfig, $2)) AS rank
             FROM chunks c
             JOIN documents d ON d.id = c.document_id
             WHERE c.workspace_id = $3 AND d.deleted_at IS NULL
               AND c.tsv @@ websearch_to_tsquery($1::regconfig, $2)
             ORDER BY rank DESC
             LIMIT $4",
        )
        .bind(&regconfig)
        .bind(query)
        .bind(workspace_id)
        .bind(top_k)
        .fetch_all(&self.pool)
        .await?;

        rows.iter()
            .map(|row| {
                Ok(ScoredChunk {
                    chunk: Self::row_to_chunk(row)?,
                    score: row.try_get::<f32, _>("rank")?,
                })
            })
            .collect()
    }

    #[tracing::instrument(skip_all, fields(workspace_id = %workspace_id, top_k))]
    async fn find_similar_nodes(
        &self,
        embedding: &[f32],
        top_k: i64,
        workspace_id: Uuid,
    ) -> Result<Vec<(Node, f32)>, AppError> {
        let vector = Vector::from(embedding.to_vec());
        let rows = sqlx::query(
            "SELECT n.*, 1 - (n.embedding <=> $1) AS similarity
             FROM nodes n
             JOIN documents d ON d.id = n.document_id
             WHERE n.workspace_id = $2 AND d.deleted_at IS NULL
             ORDER BY n.embedding <=> $1
             LIMIT $3",
        )
        .bind(vector)
        .bind(workspace_id)
        .bind(top_k)
        .fetch_all(&self.pool)
        .await?;

        rows.iter()
            .map(|row| Ok((Self::row_to_node(row)?, row.try_get::<f32, _>("similarity")?)))
            .collect()
    }

    async fn find_chunks_by_node_spans(
        &self,
        workspace_id: Uuid,
        spans: &[NodeSpan],
    ) -> Result<Vec<Chunk>, AppError> {
        if spans.is_empty() {
            return Ok(Vec::new());
        }
        let document_ids: Vec<Uuid> = spans.iter().map(|s| s.document_id).collect();
        let starts: Vec<i32> = spans.iter().map(|s| s.span_start).collect();
        let ends: Vec<i32> = spans.iter().map(|s| s.span_end).collect();

        let rows = sqlx::query(
            "SELECT DISTINCT c.* FROM chunks c
             JOIN UNNEST($2::uuid[], $3::int[], $4::int[]) AS span(document_id, span_start, span_end)
               ON c.document_id = span.document_id
              AND c.chunk_index BETWEEN span.span_start AND span.span_end
             WHERE c.workspace_id = $1",
        )
        .bind(workspace_id)
        .bind(&document_ids)
        .bind(&starts)
        .bind(&ends)
        .fetch_all(&self.pool)
        .await?;

        rows.iter().map(Self::row_to_chunk).collect()
    }

    #[tracing::instrument(skip_all, fields(document_id = %document_id, from = ?from, to = ?to))]
    async fn transition_document_status(
        &self,
        document_id: Uuid,
        from: DocumentStatus,
        to: DocumentStatus,
        error_message: Option<String>,
    ) -> Result<bool, AppError> {
        if !from.can_transition_to(to) {
            return Err(AppError::Conflict(format!(
                "illegal document status transition {from:?} -> {to:?}"
            )));
        }
        let result = sqlx::query(
            "UPDATE documents SET status = $1, error_message = $2, updated_at = now()
             WHERE id = $3 AND status = $4",
        )
        .bind(to)
        .bind(&error_message)
        .bind(document_id)
        .bind(from)
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected() == 1)
    }

    async fn delete_chunks_for_document(&self, document_id: Uuid) -> Result<(), AppError> {
        let mut tx = self.pool.begin().await?;
        sqlx::query("DELETE FROM nodes WHERE document_id = $1")
            .bind(document_id)
            .execute(&mut *tx)
            .await?;
        sqlx::query("DELETE FROM chunks WHERE document_id = $1")
            .bind(document_id)
            .execute(&mut *tx)
            .await?;
        tx.commit().await?;
        Ok(())
    }

    #[tracing::instrument(skip_all, fields(document_id = %document.id, chunks = chunks.len()))]
    async fn insert_chunks_and_nodes(
        &self,
        document: &Document,
        chunks: Vec<Chunk>,
        nodes: Option<Vec<Node>>,
    ) -> Result<usize, AppError> {
        let fts_regconfig: String =
            sqlx::query_scalar("SELECT fts_language::text FROM workspaces WHERE id = $1")
                .bind(document.workspace_id)
                .fetch_optional(&self.pool)
                .await?
                .unwrap_or_else(|| "spanish".to_string());

        let mut tx = self.pool.begin().await?;
        let chunks_created = chunks.len();
        Self::insert_chunks_nodes_only(&mut tx, &chunks, &nodes, &fts_regconfig).await?;
        tx.commit().await?;
        Ok(chunks_created)
    }
}

/// Maximal Marginal Relevance selection over a candidate pool, balancing
/// query relevance against diversity from already-selected chunks.
fn mmr_select(pool: Vec<ScoredChunk>, top_k: usize, lambda: f32) -> Vec<ScoredChunk> {
    if pool.is_empty() || top_k == 0 {
        return Vec::new();
    }
    let mut remaining: Vec<ScoredChunk> = pool;
    let mut selected: Vec<ScoredChunk> = Vec::with_capacity(top_k.min(remaining.len()));

    while !remaining.is_empty() && selected.len() < top_k {
        let mut best_idx = 0;
        let mut best_score = f32::MIN;
        for (idx, candidate) in remaining.iter().enumerate() {
            let max_sim_to_selected = selected
                .iter()
                .map(|s| cosine_similarity(
                    candidate.chunk.embedding.as_deref().unwrap_or(&[]),
                    s.chunk.embedding.as_deref().unwrap_or(&[]),
                ))
                .fold(0.0_f32, f32::max);
            let mmr_score = lambda * candidate.score - (1.0 - lambda) * max_sim_to_selected;
            if mmr_score > best_score {
                best_score = mmr_score;
                best_idx = idx;
            }
        }
        selected.push(remaining.remove(best_idx));
    }
    selected
}

fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    if a.is_empty() || b.is_empty() || a.len() != b.len() {
        return 0.0;
    }
    let dot: f32 = a.iter().zip(b).map(|(x, y)| x * y).sum();
    let norm_a = a.iter().map(|x| x * x).sum::<f32>().sqrt();
    let norm_b = b.iter().map(|x| x * x).sum::<f32>().sqrt();
    if norm_a == 0.0 || norm_b == 0.0 {
        0.0
    } else {
        dot / (norm_a * norm_b)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use uuid::Uuid;

    fn chunk_with(embedding: Vec<f32>, score: f32) -> ScoredChunk {
        let doc = Uuid::new_v4();
        let ws = Uuid::new_v4();
        ScoredChunk {
            chunk: Chunk::new(doc, ws, 0, "x".into(), Some(embedding), HashMap::new()),
            score,
        }
    }

    #[test]
    fn mmr_prefers_diverse_candidates_over_near_duplicates() {
        let pool = vec![
            chunk_with(vec![1.0, 0.0], 0.99),
            chunk_with(vec![1.0, 0.01], 0.98), // near-duplicate of the first
            chunk_with(vec![0.0, 1.0], 0.70),  // diverse but lower relevance
        ];
        let selected = mmr_select(pool, 2, 0.5);
        assert_eq!(selected.len(), 2);
        // the near-duplicate should lose out to the diverse candidate once lambda weighs diversity.
        let second = &selected[1];
        assert!((second.chunk.embedding.as_ref().unwrap()[1] - 1.0).abs() < 1e-6);
    }

    #[test]
    fn mmr_empty_pool_yields_empty_output() {
        assert!(mmr_select(Vec::new(), 5, 0.5).is_empty());
    }
}
