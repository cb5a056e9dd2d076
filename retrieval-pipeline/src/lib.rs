pub mod context_builder;
pub mod fusion;
pub mod injection;
pub mod orchestrator;
pub mod pipeline;
pub mod query_rewriter;
pub mod reranker;

pub use context_builder::build_context;
pub use fusion::{reciprocal_rank_fusion, DEFAULT_RRF_K};
pub use injection::{
    answer_has_citation, apply_policy, assess, evaluate_context_policy, InjectionAssessment,
    InjectionMode, PolicyDecision, REFUSAL_MESSAGE,
};
pub use orchestrator::{AnswerMetadata, AnswerOrchestrator, AnswerResult};
pub use pipeline::{RetrievalOptions, RetrievalOutcome, RetrievalPipeline};
pub use query_rewriter::{rewrite_query, RewriteResult};
pub use reranker::{RerankMode, RerankOutcome, Reranker, RerankerLease, RerankerPool};
