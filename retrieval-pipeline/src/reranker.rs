//! Reranker (C11): reorders a candidate chunk pool against the query,
//! either with a lightweight keyword-overlap heuristic or a cross-encoder
//! pool, mirroring the teacher's `RerankerPool`/`RerankerLease` leasing
//! pattern so cross-encoder inference is bounded by a semaphore instead of
//! spawning one model per request.

use std::collections::HashSet;
use std::env;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::thread::available_parallelism;

use common::error::AppError;
use common::utils::config::AppConfig;
use common::domain::chunk::ScoredChunk;
use fastembed::{RerankInitOptions, TextRerank};
use tokio::sync::{Mutex, OwnedSemaphorePermit, Semaphore};
use tracing::{debug, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RerankMode {
    Heuristic,
    CrossEncoder,
    /// Cross-encoder rerank failed; the caller bypassed rerank entirely and
    /// kept the pre-rerank order rather than substituting a heuristic one.
    Skipped,
}

#[derive(Debug, Clone)]
pub struct RerankOutcome {
    pub chunks: Vec<ScoredChunk>,
    pub original_count: usize,
    pub returned_count: usize,
    pub mode_used: RerankMode,
}

static NEXT_ENGINE: AtomicUsize = AtomicUsize::new(0);

fn pick_engine_index(pool_len: usize) -> usize {
    let n = NEXT_ENGINE.fetch_add(1, Ordering::Relaxed);
    n % pool_len
}

/// Pool of cross-encoder engines behind a semaphore, so concurrent reranks
/// are bounded rather than spawning unbounded inference work.
pub struct RerankerPool {
    engines: Vec<Arc<Mutex<TextRerank>>>,
    semaphore: Arc<Semaphore>,
}

impl RerankerPool {
    pub fn new(pool_size: usize) -> Result<Arc<Self>, AppError> {
        Self::new_with_options(pool_size, RerankInitOptions::default())
    }

    fn new_with_options(
        pool_size: usize,
        init_options: RerankInitOptions,
    ) -> Result<Arc<Self>, AppError> {
        if pool_size == 0 {
            return Err(AppError::Validation(
                "reranking pool size must be greater than zero".into(),
            ));
        }

        fs::create_dir_all(&init_options.cache_dir)?;

        let mut engines = Vec::with_capacity(pool_size);
        for idx in 0..pool_size {
            debug!(engine = idx, "creating cross-encoder reranking engine");
            let model = TextRerank::try_new(init_options.clone())
                .map_err(|e| AppError::Internal(e.to_string()))?;
            engines.push(Arc::new(Mutex::new(model)));
        }

        Ok(Arc::new(Self {
            engines,
            semaphore: Arc::new(Semaphore::new(pool_size)),
        }))
    }

    /// Builds a pool from config, or returns `None` when cross-encoder
    /// reranking is disabled (the heuristic mode is then the only mode).
    pub fn maybe_from_config(config: &AppConfig) -> Result<Option<Arc<Self>>, AppError> {
        if !config.reranking_enabled {
            return Ok(None);
        }
        let pool_size = config.reranking_pool_size.unwrap_or_else(default_pool_size);
        let init_options = build_rerank_init_options(config)?;
        Self::new_with_options(pool_size, init_options).map(Some)
    }

    pub async fn checkout(self: &Arc<Self>) -> RerankerLease {
        let permit = self
            .semaphore
            .clone()
            .acquire_owned()
            .await
            .expect("reranker semaphore closed");
        let idx = pick_engine_index(self.engines.len());
        let engine = self.engines[idx].clone();
        RerankerLease {
            _permit: permit,
            engine,
        }
    }
}

fn default_pool_size() -> usize {
    available_parallelism()
        .map(|value| value.get().min(2))
        .unwrap_or(2)
        .max(1)
}

fn build_rerank_init_options(config: &AppConfig) -> Result<RerankInitOptions, AppError> {
    let mut options = RerankInitOptions::default();
    let cache_dir = config
        .fastembed_cache_dir
        .as_ref()
        .map(PathBuf::from)
        .or_else(|| env::var("FASTEMBED_CACHE_DIR").ok().map(PathBuf::from))
        .unwrap_or_else(|| Path::new(&config.data_dir).join("fastembed").join("reranker"));
    fs::create_dir_all(&cache_dir)?;
    options.cache_dir = cache_dir;
    Ok(options)
}

pub struct RerankerLease {
    _permit: OwnedSemaphorePermit,
    engine: Arc<Mutex<TextRerank>>,
}

impl RerankerLease {
    async fn rerank(&self, query: &str, documents: Vec<String>) -> Result<Vec<(usize, f32)>, AppError> {
        let mut guard = self.engine.lock().await;
        guard
            .rerank(query.to_owned(), documents, false, None)
            .map(|results| results.into_iter().map(|r| (r.index, r.score)).collect())
            .map_err(|e| AppError::Internal(e.to_string()))
    }
}

/// Keyword-overlap fallback: fraction of distinct query tokens present in
/// the chunk content, case-insensitive. Used when no cross-encoder pool is
/// configured, or when a cross-encoder rerank fails mid-request.
fn heuristic_score(query_tokens: &HashSet<String>, content: &str) -> f32 {
    if query_tokens.is_empty() {
        return 0.0;
    }
    let content_lower = content.to_lowercase();
    let hits = query_tokens
        .iter()
        .filter(|tok| content_lower.contains(tok.as_str()))
        .count();
    hits as f32 / query_tokens.len() as f32
}

fn tokenize(query: &str) -> HashSet<String> {
    query
        .split_whitespace()
        .map(|w| w.trim_matches(|c: char| !c.is_alphanumeric()).to_lowercase())
        .filter(|w| !w.is_empty())
        .collect()
}

fn heuristic_rerank(query: &str, chunks: Vec<ScoredChunk>) -> Vec<ScoredChunk> {
    let tokens = tokenize(query);
    let mut scored: Vec<ScoredChunk> = chunks
        .into_iter()
        .map(|c| {
            let score = heuristic_score(&tokens, &c.chunk.content);
            ScoredChunk { chunk: c.chunk, score }
        })
        .collect();
    scored.sort_by(|a, b| b.score.partial_cmp(&a.score).unwrap_or(std::cmp::Ordering::Equal));
    scored
}

pub struct Reranker {
    pool: Option<Arc<RerankerPool>>,
}

impl Reranker {
    pub fn heuristic_only() -> Self {
        Self { pool: None }
    }

    pub fn with_pool(pool: Arc<RerankerPool>) -> Self {
        Self { pool: Some(pool) }
    }

    /// Reranks `chunks` against `query`, truncating to `top_k`. Uses the
    /// heuristic when no cross-encoder pool is configured. When a
    /// configured cross-encoder rerank fails, bypasses rerank entirely and
    /// returns the input order unchanged (truncated) rather than
    /// substituting a different reordering — the caller still gets a
    /// usable ranking, just not a reranked one.
    #[tracing::instrument(skip_all, fields(chunks = chunks.len(), top_k))]
    pub async fn rerank(&self, query: &str, chunks: Vec<ScoredChunk>, top_k: usize) -> RerankOutcome {
        let original_count = chunks.len();
        if chunks.is_empty() {
            return RerankOutcome {
                chunks: Vec::new(),
                original_count: 0,
                returned_count: 0,
                mode_used: RerankMode::Heuristic,
            };
        }

        if let Some(pool) = &self.pool {
            match self.cross_encoder_rerank(pool, query, chunks.clone()).await {
                Ok(mut reranked) => {
                    reranked.truncate(top_k);
                    let returned_count = reranked.len();
                    return RerankOutcome {
                        chunks: reranked,
                        original_count,
                        returned_count,
                        mode_used: RerankMode::CrossEncoder,
                    };
                }
                Err(err) => {
                    warn!(
                        error = %err,
                        metric = "retrieval_fallback",
                        stage = "rerank",
                        "cross-encoder rerank failed, bypassing rerank"
                    );
                    let mut bypassed = chunks;
                    bypassed.truncate(top_k);
                    let returned_count = bypassed.len();
                    return RerankOutcome {
                        chunks: bypassed,
                        original_count,
                        returned_count,
                        mode_used: RerankMode::Skipped,
                    };
                }
            }
        }

        let mut reranked = heuristic_rerank(query, chunks);
        reranked.truncate(top_k);
        let returned_count = reranked.len();
        RerankOutcome {
            chunks: reranked,
            original_count,
            returned_count,
            mode_used: RerankMode::Heuristic,
        }
    }

    async fn cross_encoder_rerank(
        &self,
        pool: &Arc<RerankerPool>,
        query: &str,
        chunks: Vec<ScoredChunk>,
    ) -> Result<Vec<ScoredChunk>, AppError> {
        let documents: Vec<String> = chunks.iter().map(|c| c.chunk.content.clone()).collect();
        let lease = pool.checkout().await;
        let results = lease.rerank(query, documents).await?;

        let mut slots: Vec<Option<ScoredChunk>> = chunks.into_iter().map(Some).collect();
        let mut reranked = Vec::with_capacity(slots.len());
        for (index, score) in results {
            if let Some(slot) = slots.get_mut(index) {
                if let Some(mut scored) = slot.take() {
                    scored.score = score;
                    reranked.push(scored);
                }
            }
        }
        for slot in slots.into_iter().flatten() {
            reranked.push(slot);
        }
        Ok(reranked)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use uuid::Uuid;

    fn chunk(content: &str) -> ScoredChunk {
        ScoredChunk {
            chunk: common::domain::Chunk::new(
                Uuid::new_v4(),
                Uuid::new_v4(),
                0,
                content.to_string(),
                None,
                HashMap::new(),
            ),
            score: 0.5,
        }
    }

    #[tokio::test]
    async fn empty_pool_yields_empty_outcome() {
        let reranker = Reranker::heuristic_only();
        let outcome = reranker.rerank("query", Vec::new(), 5).await;
        assert_eq!(outcome.original_count, 0);
        assert_eq!(outcome.returned_count, 0);
    }

    #[tokio::test]
    async fn heuristic_mode_prefers_keyword_overlap() {
        let reranker = Reranker::heuristic_only();
        let chunks = vec![
            chunk("totally unrelated text about gardening"),
            chunk("postgres vector search with pgvector extension"),
        ];
        let outcome = reranker.rerank("pgvector search", chunks, 2).await;
        assert_eq!(outcome.mode_used, RerankMode::Heuristic);
        assert!(outcome.chunks[0].chunk.content.contains("pgvector"));
    }

    #[tokio::test]
    async fn truncates_to_top_k() {
        let reranker = Reranker::heuristic_only();
        let chunks = vec![chunk("a"), chunk("b"), chunk("c")];
        let outcome = reranker.rerank("query", chunks, 1).await;
        assert_eq!(outcome.returned_count, 1);
        assert_eq!(outcome.original_count, 3);
    }
}
