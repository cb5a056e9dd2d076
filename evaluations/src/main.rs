//! IR evaluation harness (A8): loads a labeled query/relevant-chunk
//! corpus, runs each query through the retrieval pipeline with a fake
//! embedding provider for determinism, and reports MRR / Recall@k /
//! Hit@1 / NDCG@k. Trimmed continuation of the teacher's `evaluations`
//! binary — LLM-answer-quality judging is out of scope here since this
//! system's testable properties (§8) are retrieval/ingestion invariants,
//! not generation quality.

mod corpus;
mod datasets;
mod metrics;

use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Parser;
use tracing::info;
use tracing_subscriber::{fmt, EnvFilter};
use uuid::Uuid;

use common::domain::{Actor, ActorRole};
use ingestion_pipeline::chunker::ChunkerConfig;
use retrieval_pipeline::pipeline::{RetrievalOptions, RetrievalPipeline};
use retrieval_pipeline::reranker::Reranker;

use datasets::DatasetKind;

/// Evaluate retrieval quality against a labeled IR corpus.
#[derive(Parser, Debug)]
#[command(name = "evaluations", version, about)]
struct Cli {
    /// Which labeled corpus to convert and evaluate against.
    #[arg(long, value_enum)]
    dataset: DatasetKind,

    /// Directory holding the raw dataset files (BEIR layout, or NQ jsonl).
    #[arg(long)]
    raw_dataset_path: PathBuf,

    /// Number of results to request from the retrieval pipeline per query.
    #[arg(long, default_value_t = 10)]
    top_k: usize,

    /// Cap on the number of evaluation cases (0 = no cap).
    #[arg(long, default_value_t = 0)]
    limit: usize,

    /// Include Natural Questions yes/no-only and unanswerable examples.
    #[arg(long, default_value_t = false)]
    include_unanswerable: bool,

    /// Enable hybrid dense+sparse fusion.
    #[arg(long, default_value_t = false)]
    hybrid: bool,

    /// Enable MMR diversity reranking of the dense pool.
    #[arg(long, default_value_t = false)]
    mmr: bool,

    /// Chunk size, characters (must match ingestion's chunker config).
    #[arg(long, default_value_t = 900)]
    chunk_size: usize,

    /// Chunk overlap, characters.
    #[arg(long, default_value_t = 120)]
    chunk_overlap: usize,
}

#[tokio::main]
async fn main() -> Result<()> {
    let filter = std::env::var("RUST_LOG").unwrap_or_else(|_| "info".to_string());
    let _ = fmt()
        .with_env_filter(EnvFilter::try_new(&filter).unwrap_or_else(|_| EnvFilter::new("info")))
        .try_init();

    let cli = Cli::parse();

    info!(dataset = cli.dataset.id(), path = %cli.raw_dataset_path.display(), "converting dataset");
    let paragraphs = datasets::convert(&cli.raw_dataset_path, cli.dataset, cli.include_unanswerable)
        .with_context(|| format!("converting {} dataset at {}", cli.dataset.label(), cli.raw_dataset_path.display()))?;

    let chunker_config = ChunkerConfig::new(cli.chunk_size, cli.chunk_overlap)
        .map_err(anyhow::Error::msg)
        .context("building chunker config")?;

    info!(paragraphs = paragraphs.len(), "building in-memory evaluation corpus");
    let eval_corpus = corpus::build_corpus(&paragraphs, chunker_config)
        .await
        .context("building evaluation corpus")?;

    let mut cases = eval_corpus.cases;
    if cli.limit > 0 {
        cases.truncate(cli.limit);
    }
    if cases.is_empty() {
        anyhow::bail!("no evaluable cases were produced from this dataset");
    }

    let pipeline = RetrievalPipeline {
        workspaces: eval_corpus.workspaces,
        documents: eval_corpus.documents,
        embedder: eval_corpus.embedder,
        reranker: Reranker::heuristic_only(),
    };

    let actor = Actor {
        user_id: Some(Uuid::new_v4()),
        role: ActorRole::Service,
    };

    let options = RetrievalOptions {
        hybrid: cli.hybrid,
        mmr: cli.mmr,
        ..RetrievalOptions::default()
    };

    let mut retrieved_ids = Vec::with_capacity(cases.len());
    let mut relevant_sets = Vec::with_capacity(cases.len());

    info!(cases = cases.len(), top_k = cli.top_k, "running retrieval evaluation");
    for case in &cases {
        let outcome = pipeline
            .retrieve(&case.question, eval_corpus.workspace_id, &actor, cli.top_k as i64, options)
            .await
            .with_context(|| format!("retrieving for question {}", case.question_id))?;
        retrieved_ids.push(outcome.chunks.into_iter().map(|sc| sc.chunk.id.to_string()).collect());
        relevant_sets.push(case.relevant_chunk_ids.clone());
    }

    let mrr = metrics::mean_reciprocal_rank(&retrieved_ids, &relevant_sets);
    let recall = metrics::recall_at_k(&retrieved_ids, &relevant_sets, cli.top_k);
    let hit1 = metrics::hit_at_1(&retrieved_ids, &relevant_sets);
    let ndcg = metrics::ndcg_at_k(&retrieved_ids, &relevant_sets, cli.top_k);

    println!(
        "[{}] cases={} MRR={mrr:.4} Recall@{k}={recall:.4} Hit@1={hit1:.4} NDCG@{k}={ndcg:.4}",
        cli.dataset.label(),
        cases.len(),
        k = cli.top_k,
    );

    Ok(())
}
