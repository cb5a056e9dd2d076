pub mod chunker;
pub mod extractor;
pub mod node_builder;
pub mod pipeline;
pub mod processor;
pub mod state;

pub use chunker::{chunk_text, ChunkerConfig};
pub use extractor::{sanitize_extracted_text, DefaultTextExtractor, TextExtractor};
pub use node_builder::{build_nodes, NodeBuilderConfig};
pub use pipeline::{IngestOutcome, IngestRequest, IngestionPipeline};
pub use processor::{run_worker_pool, AsyncProcessor};
