//! Configuration (A2): layered `File` + `Environment` config, matching the
//! teacher's `get_config()` idiom.

use config::{Config, ConfigError, Environment, File};
use serde::Deserialize;

#[derive(Clone, Copy, Deserialize, Debug, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum StorageKind {
    Local,
}

fn default_storage_kind() -> StorageKind {
    StorageKind::Local
}

#[derive(Clone, Deserialize, Debug)]
pub struct AppConfig {
    // Database
    pub database_url: String,
    #[serde(default = "default_db_max_connections")]
    pub db_max_connections: u32,

    // Embedding provider
    pub openai_api_key: String,
    #[serde(default = "default_openai_base_url")]
    pub openai_base_url: String,
    #[serde(default = "default_embedding_model")]
    pub embedding_model: String,
    #[serde(default = "default_embedding_dimensions")]
    pub embedding_dimensions: u32,
    #[serde(default = "default_llm_model")]
    pub llm_model: String,
    #[serde(default = "default_embedding_cache_ttl_secs")]
    pub embedding_cache_ttl_secs: u64,
    #[serde(default = "default_embedding_cache_capacity")]
    pub embedding_cache_capacity: usize,

    // Chunking
    #[serde(default = "default_chunk_size")]
    pub chunk_size: usize,
    #[serde(default = "default_chunk_overlap")]
    pub chunk_overlap: usize,

    // Nodes / 2-tier
    #[serde(default = "default_node_group_size")]
    pub node_group_size: usize,
    #[serde(default = "default_node_max_chars")]
    pub node_max_chars: usize,
    #[serde(default)]
    pub two_tier_enabled: bool,

    // Retrieval
    #[serde(default = "default_retrieval_top_k")]
    pub retrieval_top_k: usize,
    #[serde(default = "default_retrieval_pool_size")]
    pub retrieval_pool_size: usize,
    #[serde(default = "default_rrf_k")]
    pub rrf_k: u32,
    #[serde(default = "default_mmr_lambda")]
    pub mmr_lambda: f32,
    #[serde(default = "default_injection_mode")]
    pub injection_mode: String,
    #[serde(default = "default_injection_risk_threshold")]
    pub injection_risk_threshold: f32,

    // Reranking
    #[serde(default)]
    pub reranking_enabled: bool,
    pub reranking_pool_size: Option<usize>,
    pub fastembed_cache_dir: Option<String>,

    // Context builder
    #[serde(default = "default_context_char_budget")]
    pub context_char_budget: usize,

    // Conversation
    #[serde(default = "default_conversation_history")]
    pub conversation_history_size: usize,

    // Object storage
    #[serde(default = "default_storage_kind")]
    pub storage: StorageKind,
    #[serde(default = "default_data_dir")]
    pub data_dir: String,

    // Worker / queue
    #[serde(default = "default_worker_concurrency")]
    pub worker_concurrency: usize,
    #[serde(default = "default_job_queue_capacity")]
    pub job_queue_capacity: usize,

    // Transport
    #[serde(default = "default_http_port")]
    pub http_port: u16,
    #[serde(default = "default_ingest_max_body_bytes")]
    pub ingest_max_body_bytes: usize,
}

fn default_db_max_connections() -> u32 {
    10
}
fn default_openai_base_url() -> String {
    "https://api.openai.com/v1".to_string()
}
fn default_embedding_model() -> String {
    "text-embedding-3-small".to_string()
}
fn default_embedding_dimensions() -> u32 {
    768
}
fn default_llm_model() -> String {
    "gpt-4o-mini".to_string()
}
fn default_embedding_cache_ttl_secs() -> u64 {
    3600
}
fn default_embedding_cache_capacity() -> usize {
    10_000
}
fn default_chunk_size() -> usize {
    900
}
fn default_chunk_overlap() -> usize {
    120
}
fn default_node_group_size() -> usize {
    3
}
fn default_node_max_chars() -> usize {
    2700
}
fn default_retrieval_top_k() -> usize {
    10
}
fn default_retrieval_pool_size() -> usize {
    40
}
fn default_rrf_k() -> u32 {
    60
}
fn default_mmr_lambda() -> f32 {
    0.5
}
fn default_injection_mode() -> String {
    "downrank".to_string()
}
fn default_injection_risk_threshold() -> f32 {
    0.6
}
fn default_context_char_budget() -> usize {
    6000
}
fn default_conversation_history() -> usize {
    20
}
fn default_data_dir() -> String {
    "./data".to_string()
}
fn default_worker_concurrency() -> usize {
    std::thread::available_parallelism()
        .map(|p| p.get().min(4))
        .unwrap_or(4)
}
fn default_job_queue_capacity() -> usize {
    256
}
fn default_http_port() -> u16 {
    8080
}
fn default_ingest_max_body_bytes() -> usize {
    25 * 1024 * 1024
}

pub fn get_config() -> Result<AppConfig, ConfigError> {
    let config = Config::builder()
        .add_source(File::with_name("config").required(false))
        .add_source(Environment::default())
        .build()?;

    config.try_deserialize()
}
