//! Embedding Port + Cache (C4).

use std::collections::{HashMap, VecDeque};
use std::time::{Duration, Instant};

use async_openai::error::OpenAIError;
use async_openai::{config::OpenAIConfig, types::CreateEmbeddingRequestArgs, Client};
use async_trait::async_trait;
use sha2::{Digest, Sha256};
use tokio::sync::Mutex;
use tokio_retry::strategy::{jitter, ExponentialBackoff};
use tokio_retry::Retry;
use tracing::warn;

use crate::error::AppError;
use crate::hash::normalize_text;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TaskType {
    Query,
    Document,
}

#[async_trait]
pub trait EmbeddingProvider: Send + Sync {
    async fn embed_query(&self, text: &str) -> Result<Vec<f32>, AppError>;
    /// Order-preserving batch embed.
    async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, AppError>;
    fn model_id(&self) -> &str;
}

/// Transient HTTP/provider failure classes retry with backoff; everything
/// else (permanent 4xx classes) fails immediately (§4.4 Failure).
fn is_transient(err: &OpenAIError) -> bool {
    match err {
        OpenAIError::ApiError(api_err) => {
            let code = api_err
                .code
                .as_deref()
                .and_then(|c| c.parse::<u16>().ok())
                .unwrap_or(0);
            matches!(code, 408 | 425 | 429 | 500 | 502 | 503 | 504)
        }
        OpenAIError::Reqwest(_) | OpenAIError::StreamError(_) => true,
        _ => false,
    }
}

/// Production embedding provider backed by `async-openai`, with
/// exponential-backoff-with-jitter retry on transient failures, matching
/// the teacher's `ExponentialBackoff::from_millis(100).map(jitter).take(3)`
/// idiom.
pub struct OpenAiEmbeddingProvider {
    client: Client<OpenAIConfig>,
    model: String,
    dimensions: u32,
}

impl OpenAiEmbeddingProvider {
    pub fn new(client: Client<OpenAIConfig>, model: String, dimensions: u32) -> Self {
        Self {
            client,
            model,
            dimensions,
        }
    }

    async fn embed_one(&self, input: &str) -> Result<Vec<f32>, AppError> {
        let strategy = ExponentialBackoff::from_millis(100).map(jitter).take(3);
        let outcome = Retry::spawn(strategy, || async {
            let request = CreateEmbeddingRequestArgs::default()
                .model(&self.model)
                .dimensions(self.dimensions)
                .input([input])
                .build()
                .map_err(|e| (false, AppError::OpenAI(e)))?;
            self.client.embeddings().create(request).await.map_err(|e| {
                let transient = is_transient(&e);
                if transient {
                    warn!(error = %e, "transient embedding provider error, retrying");
                }
                (transient, AppError::OpenAI(e))
            })
        })
        .await;

        let response = match outcome {
            Ok(response) => response,
            Err((_, err)) => return Err(Self::classify_final(err)),
        };

        response
            .data
            .into_iter()
            .next()
            .map(|d| d.embedding)
            .ok_or_else(|| AppError::Internal("no embedding data received".into()))
    }

    fn classify_final(err: AppError) -> AppError {
        match &err {
            AppError::OpenAI(e) if is_transient(e) => {
                AppError::ServiceUnavailable("embedding provider unavailable after retries".into())
            }
            _ => err,
        }
    }
}

#[async_trait]
impl EmbeddingProvider for OpenAiEmbeddingProvider {
    async fn embed_query(&self, text: &str) -> Result<Vec<f32>, AppError> {
        self.embed_one(text).await
    }

    async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, AppError> {
        let mut out = Vec::with_capacity(texts.len());
        for text in texts {
            out.push(self.embed_one(text).await?);
        }
        Ok(out)
    }

    fn model_id(&self) -> &str {
        &self.model
    }
}

/// Deterministic fake provider (A9): hashes normalized text into a
/// unit-length vector of the configured dimension. No network I/O, fully
/// reproducible, used by tests and the IR evaluation harness.
pub struct FakeEmbeddingProvider {
    dimensions: usize,
    model: String,
}

impl FakeEmbeddingProvider {
    pub fn new(dimensions: usize) -> Self {
        Self {
            dimensions,
            model: "fake-embedding-v1".to_string(),
        }
    }

    fn deterministic_vector(&self, text: &str) -> Vec<f32> {
        let normalized = normalize_text(text);
        let mut seed = Sha256::digest(normalized.as_bytes()).to_vec();
        while seed.len() < self.dimensions * 4 {
            seed.extend(Sha256::digest(&seed).to_vec());
        }
        let mut vector: Vec<f32> = (0..self.dimensions)
            .map(|i| {
                let byte_offset = i * 4 % seed.len();
                let raw = u32::from_le_bytes([
                    seed[byte_offset],
                    seed[(byte_offset + 1) % seed.len()],
                    seed[(byte_offset + 2) % seed.len()],
                    seed[(byte_offset + 3) % seed.len()],
                ]);
                (raw as f32 / u32::MAX as f32) * 2.0 - 1.0
            })
            .collect();
        let norm = vector.iter().map(|v| v * v).sum::<f32>().sqrt();
        if norm > 0.0 {
            for v in &mut vector {
                *v /= norm;
            }
        }
        vector
    }
}

#[async_trait]
impl EmbeddingProvider for FakeEmbeddingProvider {
    async fn embed_query(&self, text: &str) -> Result<Vec<f32>, AppError> {
        Ok(self.deterministic_vector(text))
    }

    async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, AppError> {
        Ok(texts.iter().map(|t| self.deterministic_vector(t)).collect())
    }

    fn model_id(&self) -> &str {
        &self.model
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
struct CacheKey {
    model_id: String,
    task_type: TaskType,
    normalized_text: String,
}

struct CacheEntry {
    vector: Vec<f32>,
    inserted_at: Instant,
}

/// In-memory LRU-with-TTL embedding cache, keyed by
/// `(model_id, task_type, normalized_text)`. Concurrency is handled with a
/// single `tokio::sync::Mutex` around the map — cheap relative to the
/// network round-trip it's saving, and simpler than lock-free structures
/// for the access pattern here (§5 shared resources).
pub struct EmbeddingCache {
    capacity: usize,
    ttl: Duration,
    entries: Mutex<HashMap<CacheKey, CacheEntry>>,
    order: Mutex<VecDeque<CacheKey>>,
}

impl EmbeddingCache {
    pub fn new(capacity: usize, ttl: Duration) -> Self {
        Self {
            capacity: capacity.max(1),
            ttl,
            entries: Mutex::new(HashMap::new()),
            order: Mutex::new(VecDeque::new()),
        }
    }

    fn key(model_id: &str, task_type: TaskType, text: &str) -> CacheKey {
        CacheKey {
            model_id: model_id.to_string(),
            task_type,
            normalized_text: normalize_text(text),
        }
    }

    async fn get(&self, key: &CacheKey) -> Option<Vec<f32>> {
        let mut entries = self.entries.lock().await;
        match entries.get(key) {
            Some(entry) if entry.inserted_at.elapsed() <= self.ttl => Some(entry.vector.clone()),
            Some(_) => {
                entries.remove(key);
                None
            }
            None => None,
        }
    }

    async fn put(&self, key: CacheKey, vector: Vec<f32>) {
        let mut entries = self.entries.lock().await;
        let mut order = self.order.lock().await;
        if !entries.contains_key(&key) {
            order.push_back(key.clone());
        }
        entries.insert(
            key,
            CacheEntry {
                vector,
                inserted_at: Instant::now(),
            },
        );
        while entries.len() > self.capacity {
            if let Some(oldest) = order.pop_front() {
                entries.remove(&oldest);
            } else {
                break;
            }
        }
    }

    /// Embeds `texts` against `provider`, serving cache hits and calling
    /// the provider only for unique misses; reconstructs the output
    /// preserving input order and duplicates (§4.4 Cache).
    pub async fn embed_batch(
        &self,
        provider: &dyn EmbeddingProvider,
        task_type: TaskType,
        texts: &[String],
    ) -> Result<Vec<Vec<f32>>, AppError> {
        let keys: Vec<CacheKey> = texts
            .iter()
            .map(|t| Self::key(provider.model_id(), task_type, t))
            .collect();

        let mut resolved: Vec<Option<Vec<f32>>> = Vec::with_capacity(texts.len());
        for key in &keys {
            resolved.push(self.get(key).await);
        }

        let mut miss_indices = Vec::new();
        let mut miss_texts = Vec::new();
        let mut seen_miss_keys: HashMap<CacheKey, usize> = HashMap::new();
        for (i, (key, slot)) in keys.iter().zip(resolved.iter()).enumerate() {
            if slot.is_none() {
                if let Some(&first_idx) = seen_miss_keys.get(key) {
                    miss_indices.push((i, Some(first_idx)));
                } else {
                    seen_miss_keys.insert(key.clone(), miss_texts.len());
                    miss_indices.push((i, None));
                    miss_texts.push(texts[i].clone());
                }
            }
        }

        let fetched = if miss_texts.is_empty() {
            Vec::new()
        } else {
            provider.embed_batch(&miss_texts).await?
        };

        for (idx, dup_of) in miss_indices {
            let vector = match dup_of {
                Some(unique_slot) => fetched[unique_slot].clone(),
                None => {
                    let unique_slot = seen_miss_keys[&keys[idx]];
                    fetched[unique_slot].clone()
                }
            };
            self.put(keys[idx].clone(), vector.clone()).await;
            resolved[idx] = Some(vector);
        }

        Ok(resolved.into_iter().map(|v| v.unwrap_or_default()).collect())
    }
}

/// Wraps a provider with an `EmbeddingCache`, presenting the same
/// `EmbeddingProvider` trait so it can drop into a pipeline unchanged.
/// `embed_query` always treats its input as a single-element batch under
/// `TaskType::Query`; `embed_batch` uses `TaskType::Document`.
pub struct CachedEmbeddingProvider {
    inner: std::sync::Arc<dyn EmbeddingProvider>,
    cache: EmbeddingCache,
}

impl CachedEmbeddingProvider {
    pub fn new(inner: std::sync::Arc<dyn EmbeddingProvider>, capacity: usize, ttl: Duration) -> Self {
        Self {
            inner,
            cache: EmbeddingCache::new(capacity, ttl),
        }
    }
}

#[async_trait]
impl EmbeddingProvider for CachedEmbeddingProvider {
    async fn embed_query(&self, text: &str) -> Result<Vec<f32>, AppError> {
        let result = self
            .cache
            .embed_batch(self.inner.as_ref(), TaskType::Query, &[text.to_string()])
            .await?;
        result
            .into_iter()
            .next()
            .ok_or_else(|| AppError::Internal("cache returned no vector".into()))
    }

    async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, AppError> {
        self.cache
            .embed_batch(self.inner.as_ref(), TaskType::Document, texts)
            .await
    }

    fn model_id(&self) -> &str {
        self.inner.model_id()
    }
}
