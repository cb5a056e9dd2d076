pub mod embedding;
pub mod job_queue;
pub mod llm;
pub mod object_store;

pub use embedding::{
    CachedEmbeddingProvider, EmbeddingCache, EmbeddingProvider, FakeEmbeddingProvider,
    OpenAiEmbeddingProvider, TaskType,
};
pub use job_queue::{InMemoryJobQueue, JobQueue, ProcessingJob};
pub use llm::{fake_llm_selected, FakeLlmProvider, LlmProvider, OpenAiLlmProvider, TokenStream};
pub use object_store::{InMemoryObjectStore, LocalObjectStore, ObjectStore};
