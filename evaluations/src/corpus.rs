//! Builds an in-memory retrieval corpus from a converted dataset: chunks
//! every paragraph the same way the real ingestion pipeline does, embeds
//! the chunks with a deterministic fake provider, and answers
//! `DocumentRepository` queries out of memory so the harness needs no
//! running Postgres (A8, trimmed continuation of the teacher's `corpus/`
//! module).

use std::collections::{BTreeSet, HashMap};
use std::sync::Arc;

use async_trait::async_trait;
use uuid::Uuid;

use common::domain::node::NodeSpan;
use common::domain::{
    AclEntry, Chunk, Document, DocumentFilters, DocumentStatus, FtsLanguage, Node, ScoredChunk,
    Workspace, WorkspaceVisibility,
};
use common::ports::embedding::{EmbeddingProvider, FakeEmbeddingProvider};
use common::storage::{DocumentOutcome, DocumentRepository, WorkspaceRepository};
use common::AppError;
use ingestion_pipeline::chunker::{chunk_text, ChunkerConfig};

use crate::datasets::ConvertedParagraph;

pub const EVAL_EMBEDDING_DIM: usize = 64;

/// One evaluation case: a question plus the chunk ids that count as a
/// relevant hit (every chunk belonging to the paragraph the question was
/// authored against).
pub struct EvalCase {
    pub question_id: String,
    pub question: String,
    pub relevant_chunk_ids: BTreeSet<String>,
}

pub struct EvalCorpus {
    pub workspace_id: Uuid,
    pub workspaces: Arc<dyn WorkspaceRepository>,
    pub documents: Arc<dyn DocumentRepository>,
    pub embedder: Arc<dyn EmbeddingProvider>,
    pub cases: Vec<EvalCase>,
}

struct FixedWorkspaceRepo {
    workspace: Workspace,
}

#[async_trait]
impl WorkspaceRepository for FixedWorkspaceRepo {
    async fn get_workspace(&self, _workspace_id: Uuid) -> Result<Option<Workspace>, AppError> {
        Ok(Some(self.workspace.clone()))
    }
    async fn list_acl(&self, _workspace_id: Uuid) -> Result<Vec<AclEntry>, AppError> {
        Ok(Vec::new())
    }
}

/// Holds every chunk in the corpus and answers dense/sparse queries by
/// scanning in memory. Good enough for corpus sizes evaluation runs deal
/// with; production queries go through `PgDocumentRepository` instead.
struct InMemoryCorpusRepo {
    chunks: Vec<Chunk>,
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

fn keyword_overlap_score(query: &str, content: &str) -> f32 {
    let query_terms: BTreeSet<String> = query
        .split_whitespace()
        .map(|t| t.to_ascii_lowercase())
        .collect();
    if query_terms.is_empty() {
        return 0.0;
    }
    let content_lower = content.to_ascii_lowercase();
    let hits = query_terms
        .iter()
        .filter(|term| content_lower.contains(term.as_str()))
        .count();
    hits as f32 / query_terms.len() as f32
}

#[async_trait]
impl DocumentRepository for InMemoryCorpusRepo {
    async fn save_document_with_chunks(
        &self,
        _document: Document,
        _chunks: Vec<Chunk>,
        _nodes: Option<Vec<Node>>,
    ) -> Result<DocumentOutcome, AppError> {
        Err(AppError::Internal("eval corpus repository is read-only".into()))
    }

    async fn get_document(&self, _workspace_id: Uuid, _document_id: Uuid) -> Result<Option<Document>, AppError> {
        Ok(None)
    }

    async fn get_document_by_content_hash(&self, _workspace_id: Uuid, _content_hash: &str) -> Result<Option<Document>, AppError> {
        Ok(None)
    }

    async fn list_documents(&self, _workspace_id: Uuid, _limit: i64, _offset: i64, _filters: &DocumentFilters) -> Result<Vec<Document>, AppError> {
        Ok(Vec::new())
    }

    async fn find_similar_chunks(&self, embedding: &[f32], top_k: i64, _workspace_id: Uuid) -> Result<Vec<ScoredChunk>, AppError> {
        let mut scored: Vec<ScoredChunk> = self
            .chunks
            .iter()
            .map(|chunk| ScoredChunk {
                chunk: chunk.clone(),
                score: cosine_similarity(embedding, chunk.embedding.as_deref().unwrap_or(&[])),
            })
            .collect();
        scored.sort_by(|a, b| b.score.partial_cmp(&a.score).unwrap_or(std::cmp::Ordering::Equal));
        scored.truncate(top_k.max(0) as usize);
        Ok(scored)
    }

    async fn find_similar_chunks_mmr(&self, embedding: &[f32], top_k: i64, _lambda: f32, pool_size: i64, workspace_id: Uuid) -> Result<Vec<ScoredChunk>, AppError> {
        self.find_similar_chunks(embedding, pool_size.max(top_k), workspace_id).await
    }

    async fn find_chunks_full_text(&self, query: &str, top_k: i64, _workspace_id: Uuid) -> Result<Vec<ScoredChunk>, AppError> {
        let mut scored: Vec<ScoredChunk> = self
            .chunks
            .iter()
            .map(|chunk| ScoredChunk {
                chunk: chunk.clone(),
                score: keyword_overlap_score(query, &chunk.content),
            })
            .filter(|scored| scored.score > 0.0)
            .collect();
        scored.sort_by(|a, b| b.score.partial_cmp(&a.score).unwrap_or(std::cmp::Ordering::Equal));
        scored.truncate(top_k.max(0) as usize);
        Ok(scored)
    }

    async fn find_similar_nodes(&self, _embedding: &[f32], _top_k: i64, _workspace_id: Uuid) -> Result<Vec<(Node, f32)>, AppError> {
        // The harness evaluates flat dense/sparse/hybrid retrieval; 2-tier
        // node hits are exercised by the retrieval-pipeline crate's own tests.
        Ok(Vec::new())
    }

    async fn find_chunks_by_node_spans(&self, _workspace_id: Uuid, _spans: &[NodeSpan]) -> Result<Vec<Chunk>, AppError> {
        Ok(Vec::new())
    }

    async fn transition_document_status(&self, _document_id: Uuid, _from: DocumentStatus, _to: DocumentStatus, _error_message: Option<String>) -> Result<bool, AppError> {
        Ok(true)
    }

    async fn delete_chunks_for_document(&self, _document_id: Uuid) -> Result<(), AppError> {
        Ok(())
    }

    async fn insert_chunks_and_nodes(
        &self,
        _document: &Document,
        chunks: Vec<Chunk>,
        _nodes: Option<Vec<Node>>,
    ) -> Result<usize, AppError> {
        Ok(chunks.len())
    }
}

/// Converts paragraphs into chunked, embedded documents and seeds the
/// corresponding evaluation cases, one per non-impossible question.
pub async fn build_corpus(
    paragraphs: &[ConvertedParagraph],
    chunker_config: ChunkerConfig,
) -> Result<EvalCorpus, AppError> {
    let embedder: Arc<dyn EmbeddingProvider> = Arc::new(FakeEmbeddingProvider::new(EVAL_EMBEDDING_DIM));
    let workspace_id = Uuid::new_v4();
    let owner = Uuid::new_v4();
    let now = chrono::Utc::now();
    let workspace = Workspace {
        id: workspace_id,
        name: "eval".to_string(),
        owner_user_id: owner,
        visibility: WorkspaceVisibility::Private,
        fts_language: FtsLanguage::English,
        archived_at: None,
        created_at: now,
        updated_at: now,
    };

    let mut all_chunks = Vec::new();
    let mut chunk_ids_by_paragraph: HashMap<&str, Vec<String>> = HashMap::new();

    for paragraph in paragraphs {
        let pieces = chunk_text(&paragraph.context, chunker_config);
        if pieces.is_empty() {
            continue;
        }
        let embeddings = embedder.embed_batch(&pieces).await?;
        let document_id = Uuid::new_v4();
        let mut ids = Vec::with_capacity(pieces.len());
        for (idx, (content, embedding)) in pieces.into_iter().zip(embeddings).enumerate() {
            let chunk = Chunk::new(document_id, workspace_id, idx as i32, content, Some(embedding), HashMap::new());
            ids.push(chunk.id.to_string());
            all_chunks.push(chunk);
        }
        chunk_ids_by_paragraph.insert(paragraph.id.as_str(), ids);
    }

    let mut cases = Vec::new();
    for paragraph in paragraphs {
        let relevant_chunk_ids: BTreeSet<String> = chunk_ids_by_paragraph
            .get(paragraph.id.as_str())
            .cloned()
            .unwrap_or_default()
            .into_iter()
            .collect();
        if relevant_chunk_ids.is_empty() {
            continue;
        }
        for question in &paragraph.questions {
            if question.is_impossible {
                continue;
            }
            cases.push(EvalCase {
                question_id: question.id.clone(),
                question: question.question.clone(),
                relevant_chunk_ids: relevant_chunk_ids.clone(),
            });
        }
    }

    Ok(EvalCorpus {
        workspace_id,
        workspaces: Arc::new(FixedWorkspaceRepo { workspace }),
        documents: Arc::new(InMemoryCorpusRepo { chunks: all_chunks }),
        embedder,
        cases,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::datasets::ConvertedQuestion;

    fn paragraph(id: &str, context: &str, question: &str) -> ConvertedParagraph {
        ConvertedParagraph {
            id: id.to_string(),
            title: id.to_string(),
            context: context.to_string(),
            questions: vec![ConvertedQuestion {
                id: format!("{id}-q1"),
                question: question.to_string(),
                answers: vec!["answer".to_string()],
                is_impossible: false,
            }],
        }
    }

    #[tokio::test]
    async fn builds_one_case_per_answerable_question() {
        let paragraphs = vec![
            paragraph("p1", "Paris is the capital of France.", "What is the capital of France?"),
            paragraph("p2", "Tokyo is the capital of Japan.", "What is the capital of Japan?"),
        ];
        let corpus = build_corpus(&paragraphs, ChunkerConfig::new(200, 20).unwrap())
            .await
            .unwrap();
        assert_eq!(corpus.cases.len(), 2);
        assert!(corpus.cases.iter().all(|c| !c.relevant_chunk_ids.is_empty()));
    }

    #[tokio::test]
    async fn impossible_questions_are_excluded() {
        let mut paragraphs = vec![paragraph("p1", "some context here", "a question")];
        paragraphs[0].questions[0].is_impossible = true;
        let corpus = build_corpus(&paragraphs, ChunkerConfig::new(200, 20).unwrap())
            .await
            .unwrap();
        assert!(corpus.cases.is_empty());
    }
}
