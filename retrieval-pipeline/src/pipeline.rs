//! Retrieval Pipeline (C9): authorize → embed query → dense (or 2-tier) →
//! optional sparse + RRF fusion → optional rerank → injection filter →
//! truncate to `top_k`.

use std::sync::Arc;

use tracing::{info, instrument, warn};
use uuid::Uuid;

use common::domain::chunk::ScoredChunk;
use common::domain::node::NodeSpan;
use common::domain::Actor;
use common::policy::{can_access_document, can_read};
use common::ports::embedding::EmbeddingProvider;
use common::storage::{DocumentRepository, WorkspaceRepository};
use common::AppError;

use crate::fusion::reciprocal_rank_fusion;
use crate::injection::{apply_policy, InjectionMode};
use crate::reranker::{RerankOutcome, Reranker};

#[derive(Debug, Clone, Copy)]
pub struct RetrievalOptions {
    pub hybrid: bool,
    pub two_tier: bool,
    pub rerank: bool,
    pub mmr: bool,
    pub node_top_k: i64,
    pub pool_size: i64,
    pub lambda: f32,
    pub rrf_k: u32,
    pub injection_mode: InjectionMode,
    pub injection_threshold: f32,
}

impl Default for RetrievalOptions {
    fn default() -> Self {
        Self {
            hybrid: false,
            two_tier: false,
            rerank: false,
            mmr: false,
            node_top_k: 5,
            pool_size: 40,
            lambda: 0.5,
            rrf_k: crate::fusion::DEFAULT_RRF_K,
            injection_mode: InjectionMode::Downrank,
            injection_threshold: 0.6,
        }
    }
}

#[derive(Debug, Clone)]
pub struct RetrievalOutcome {
    pub chunks: Vec<ScoredChunk>,
    pub rerank: Option<RerankOutcome>,
    pub used_two_tier: bool,
    pub used_sparse: bool,
}

pub struct RetrievalPipeline {
    pub workspaces: Arc<dyn WorkspaceRepository>,
    pub documents: Arc<dyn DocumentRepository>,
    pub embedder: Arc<dyn EmbeddingProvider>,
    pub reranker: Reranker,
}

impl RetrievalPipeline {
    #[instrument(skip(self, options), fields(workspace_id = %workspace_id, top_k))]
    pub async fn retrieve(
        &self,
        query: &str,
        workspace_id: Uuid,
        actor: &Actor,
        top_k: i64,
        options: RetrievalOptions,
    ) -> Result<RetrievalOutcome, AppError> {
        // Cross-workspace / unauthorized access both surface as NOT_FOUND
        // so existence of an out-of-scope workspace is never disclosed.
        let workspace = self
            .workspaces
            .get_workspace(workspace_id)
            .await?
            .ok_or_else(|| AppError::NotFound("workspace not found".into()))?;
        let acl = self.workspaces.list_acl(workspace_id).await?;
        if !can_read(&workspace, actor, &acl) {
            return Err(AppError::NotFound("workspace not found".into()));
        }

        let query_embedding = self.embedder.embed_query(query).await?;

        let dense_pool = options.pool_size.max(top_k);
        let dense_fut = async {
            if options.mmr {
                self.documents
                    .find_similar_chunks_mmr(&query_embedding, top_k, options.lambda, dense_pool, workspace_id)
                    .await
            } else {
                self.documents
                    .find_similar_chunks(&query_embedding, dense_pool, workspace_id)
                    .await
            }
        };
        let sparse_fut = async {
            if options.hybrid {
                Some(self.documents.find_chunks_full_text(query, dense_pool, workspace_id).await)
            } else {
                None
            }
        };
        let (dense, sparse) = tokio::join!(dense_fut, sparse_fut);
        let dense = dense?;

        let (mut ranked, used_two_tier) = if options.two_tier {
            match self.two_tier_retrieve(&query_embedding, workspace_id, options.node_top_k, top_k).await? {
                Some(node_chunks) => (node_chunks, true),
                None => (dense.clone(), false),
            }
        } else {
            (dense.clone(), false)
        };

        let mut used_sparse = false;
        if !used_two_tier {
            match sparse {
                Some(Ok(sparse)) => {
                    used_sparse = true;
                    ranked = reciprocal_rank_fusion(&[dense.clone(), sparse], options.rrf_k);
                }
                Some(Err(err)) => {
                    warn!(
                        error = %err,
                        metric = "retrieval_fallback",
                        stage = "sparse",
                        "sparse FTS failed, continuing with dense ranking only"
                    );
                }
                None => {}
            }
        }

        let rerank_outcome = if options.rerank {
            let outcome = self
                .reranker
                .rerank(query, ranked, options.pool_size.max(top_k) as usize)
                .await;
            ranked = outcome.chunks.clone();
            Some(outcome)
        } else {
            None
        };

        ranked = self.filter_by_document_acl(workspace_id, actor, ranked).await?;
        ranked = apply_policy(ranked, options.injection_mode, options.injection_threshold);
        ranked.truncate(top_k as usize);

        info!(
            returned = ranked.len(),
            used_two_tier,
            used_sparse,
            reranked = rerank_outcome.is_some(),
            "retrieval pipeline completed"
        );

        Ok(RetrievalOutcome {
            chunks: ranked,
            rerank: rerank_outcome,
            used_two_tier,
            used_sparse,
        })
    }

    /// Per-document role gate (§4.6/`allowed_roles`) on top of the
    /// workspace-level `can_read` already checked above: drops chunks whose
    /// owning document's `allowed_roles` excludes `actor`. Admin/service
    /// actors bypass this and skip the lookups entirely; for everyone else
    /// each distinct `document_id` is fetched and checked at most once.
    async fn filter_by_document_acl(
        &self,
        workspace_id: Uuid,
        actor: &Actor,
        chunks: Vec<ScoredChunk>,
    ) -> Result<Vec<ScoredChunk>, AppError> {
        if actor.is_admin() || actor.is_service() {
            return Ok(chunks);
        }
        let mut allowed_cache: std::collections::HashMap<Uuid, bool> = std::collections::HashMap::new();
        let mut kept = Vec::with_capacity(chunks.len());
        for scored in chunks {
            let document_id = scored.chunk.document_id;
            let allowed = if let Some(&allowed) = allowed_cache.get(&document_id) {
                allowed
            } else {
                let allowed = match self.documents.get_document(workspace_id, document_id).await? {
                    Some(document) => can_access_document(&document, actor),
                    None => false,
                };
                allowed_cache.insert(document_id, allowed);
                allowed
            };
            if allowed {
                kept.push(scored);
            }
        }
        Ok(kept)
    }

    /// Node-hit path (§4.9 step 5): finds the best matching nodes, fetches
    /// their chunk spans, then ranks those chunks by cosine similarity to
    /// the query embedding. Returns `None` when no nodes exist, so the
    /// caller falls back to the already-computed standard dense ranking.
    async fn two_tier_retrieve(
        &self,
        query_embedding: &[f32],
        workspace_id: Uuid,
        node_top_k: i64,
        top_k: i64,
    ) -> Result<Option<Vec<ScoredChunk>>, AppError> {
        let nodes = self
            .documents
            .find_similar_nodes(query_embedding, node_top_k, workspace_id)
            .await?;
        if nodes.is_empty() {
            return Ok(None);
        }

        let spans: Vec<NodeSpan> = nodes
            .iter()
            .map(|(node, _)| NodeSpan {
                document_id: node.document_id,
                span_start: node.span_start,
                span_end: node.span_end,
            })
            .collect();

        let chunks = self.documents.find_chunks_by_node_spans(workspace_id, &spans).await?;
        let mut scored: Vec<ScoredChunk> = chunks
            .into_iter()
            .map(|chunk| {
                let score = cosine_similarity(query_embedding, chunk.embedding.as_deref().unwrap_or(&[]));
                ScoredChunk { chunk, score }
            })
            .collect();
        scored.sort_by(|a, b| b.score.partial_cmp(&a.score).unwrap_or(std::cmp::Ordering::Equal));
        scored.truncate(top_k as usize);
        Ok(Some(scored))
    }
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
