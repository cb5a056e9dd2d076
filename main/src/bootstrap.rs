//! Shared startup wiring for the `server`, `worker`, and combined `main`
//! binaries: builds every core collaborator from `AppConfig` exactly once,
//! so the three entry points assemble the same pipeline instead of three
//! slightly different ones.

use std::sync::Arc;

use async_openai::{config::OpenAIConfig, Client};
use sqlx::PgPool;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use common::audit::{AuditSink, PgAuditSink};
use common::ports::{
    fake_llm_selected, CachedEmbeddingProvider, EmbeddingProvider, FakeEmbeddingProvider,
    FakeLlmProvider, InMemoryJobQueue, JobQueue, LlmProvider, LocalObjectStore, ObjectStore,
    OpenAiEmbeddingProvider, OpenAiLlmProvider,
};
use common::storage::{
    DocumentRepository, PgDb, PgDocumentRepository, PgWorkspaceRepository, WorkspaceRepository,
};
use common::utils::config::{get_config, AppConfig};
use common::AppError;
use ingestion_pipeline::chunker::ChunkerConfig;
use ingestion_pipeline::extractor::DefaultTextExtractor;
use ingestion_pipeline::node_builder::NodeBuilderConfig;
use ingestion_pipeline::pipeline::IngestionPipeline;
use ingestion_pipeline::processor::AsyncProcessor;
use retrieval_pipeline::orchestrator::AnswerOrchestrator;
use retrieval_pipeline::pipeline::RetrievalPipeline;
use retrieval_pipeline::reranker::{Reranker, RerankerPool};

/// Every collaborator an entry point needs, already wired together from
/// one `AppConfig`. Binaries pick out the fields they serve; nothing here
/// is binary-specific.
pub struct Collaborators {
    pub config: AppConfig,
    pub pool: PgPool,
    pub documents: Arc<dyn DocumentRepository>,
    pub workspaces: Arc<dyn WorkspaceRepository>,
    pub job_queue: Arc<dyn JobQueue>,
    pub ingestion: Arc<IngestionPipeline>,
    pub processor: Arc<AsyncProcessor>,
    pub retrieval: Arc<RetrievalPipeline>,
    pub orchestrator: Arc<AnswerOrchestrator>,
}

/// `tracing-subscriber` registry with an `EnvFilter` layer and an `fmt`
/// layer on stderr. Call once per process.
pub fn init_tracing() {
    tracing_subscriber::registry()
        .with(fmt::layer().with_writer(std::io::stderr))
        .with(EnvFilter::from_default_env())
        .init();
}

fn openai_client(config: &AppConfig) -> Client<OpenAIConfig> {
    let openai_config = OpenAIConfig::new()
        .with_api_key(&config.openai_api_key)
        .with_api_base(&config.openai_base_url);
    Client::with_config(openai_config)
}

fn build_embedding_provider(config: &AppConfig) -> Arc<dyn EmbeddingProvider> {
    if fake_llm_selected() {
        return Arc::new(FakeEmbeddingProvider::new(config.embedding_dimensions as usize));
    }
    let inner = OpenAiEmbeddingProvider::new(
        openai_client(config),
        config.embedding_model.clone(),
        config.embedding_dimensions,
    );
    Arc::new(CachedEmbeddingProvider::new(
        Arc::new(inner),
        config.embedding_cache_capacity,
        std::time::Duration::from_secs(config.embedding_cache_ttl_secs),
    ))
}

fn build_llm_provider(config: &AppConfig) -> Arc<dyn LlmProvider> {
    if fake_llm_selected() {
        return Arc::new(FakeLlmProvider);
    }
    Arc::new(OpenAiLlmProvider::new(openai_client(config), config.llm_model.clone()))
}

/// Loads config, opens the pool, applies migrations, and assembles every
/// collaborator. Shared verbatim by `main`, `server`, and `worker`.
pub async fn build() -> Result<Collaborators, AppError> {
    let config = get_config().map_err(|e| AppError::Internal(format!("invalid configuration: {e}")))?;

    let db = PgDb::connect(&config).await?;
    db.apply_migrations().await?;
    let pool = db.pool;

    let documents: Arc<dyn DocumentRepository> = Arc::new(PgDocumentRepository::new(pool.clone()));
    let workspaces: Arc<dyn WorkspaceRepository> = Arc::new(PgWorkspaceRepository::new(pool.clone()));
    let audit: Arc<dyn AuditSink> = Arc::new(PgAuditSink::new(pool.clone()));

    let embedder = build_embedding_provider(&config);
    let llm = build_llm_provider(&config);
    let object_store: Arc<dyn ObjectStore> = Arc::new(LocalObjectStore::new(&config.data_dir)?);
    let job_queue: Arc<dyn JobQueue> = Arc::new(InMemoryJobQueue::new(config.job_queue_capacity));

    let chunker_config = ChunkerConfig::new(config.chunk_size, config.chunk_overlap)
        .map_err(AppError::Validation)?;
    let node_builder_config = NodeBuilderConfig {
        group_size: config.node_group_size,
        max_chars: config.node_max_chars,
    };

    let ingestion = Arc::new(IngestionPipeline {
        workspaces: Arc::clone(&workspaces),
        documents: Arc::clone(&documents),
        embedder: Arc::clone(&embedder),
        chunker_config,
        node_builder_config,
        two_tier_enabled: config.two_tier_enabled,
    });

    let processor = Arc::new(AsyncProcessor {
        documents: Arc::clone(&documents),
        object_store,
        extractor: Arc::new(DefaultTextExtractor),
        embedder: Arc::clone(&embedder),
        chunker_config,
        node_builder_config,
        two_tier_enabled: config.two_tier_enabled,
    });

    let reranker = match RerankerPool::maybe_from_config(&config)? {
        Some(pool) => Reranker::with_pool(pool),
        None => Reranker::heuristic_only(),
    };

    let retrieval = Arc::new(RetrievalPipeline {
        workspaces: Arc::clone(&workspaces),
        documents: Arc::clone(&documents),
        embedder,
        reranker,
    });

    let orchestrator = Arc::new(AnswerOrchestrator {
        conversations: common::domain::conversation::ConversationStore::new(),
        retrieval: Arc::clone(&retrieval),
        llm,
        audit,
        conversation_history_size: config.conversation_history_size,
        context_char_budget: config.context_char_budget,
    });

    Ok(Collaborators {
        config,
        pool,
        documents,
        workspaces,
        job_queue,
        ingestion,
        processor,
        retrieval,
        orchestrator,
    })
}
