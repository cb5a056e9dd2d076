//! Async Processor (C8): consumes upload jobs, moves a document through
//! `PENDING -> PROCESSING -> {READY, FAILED}`, and drives the worker pool
//! that pulls jobs off the queue.

use std::sync::Arc;

use tracing::{error, info, instrument, warn};
use uuid::Uuid;

use common::domain::{Document, DocumentStatus};
use common::ports::embedding::EmbeddingProvider;
use common::ports::job_queue::JobQueue;
use common::ports::object_store::ObjectStore;
use common::storage::DocumentRepository;
use common::AppError;

use crate::chunker::{chunk_text, ChunkerConfig};
use crate::extractor::{sanitize_extracted_text, TextExtractor};
use crate::node_builder::{build_nodes, NodeBuilderConfig};
use crate::state::{pending, ProcessingMachine};

pub struct AsyncProcessor {
    pub documents: Arc<dyn DocumentRepository>,
    pub object_store: Arc<dyn ObjectStore>,
    pub extractor: Arc<dyn TextExtractor>,
    pub embedder: Arc<dyn EmbeddingProvider>,
    pub chunker_config: ChunkerConfig,
    pub node_builder_config: NodeBuilderConfig,
    pub two_tier_enabled: bool,
}

impl AsyncProcessor {
    /// Processes one job end to end. Claim failure (document already
    /// `PROCESSING` or not `PENDING`) surfaces as `CONFLICT` and the job is
    /// dropped; a parse/chunk/embed failure flips the document to `FAILED`
    /// with `error_message` set rather than propagating.
    #[instrument(skip(self), fields(document_id = %document_id, workspace_id = %workspace_id))]
    pub async fn process_job(
        &self,
        document_id: Uuid,
        workspace_id: Uuid,
    ) -> Result<(), AppError> {
        let claimed = self
            .documents
            .transition_document_status(
                document_id,
                DocumentStatus::Pending,
                DocumentStatus::Processing,
                None,
            )
            .await?;
        if !claimed {
            return Err(AppError::Conflict(
                "document is not pending; duplicate claim ignored".into(),
            ));
        }
        let machine = pending().claim().map_err(|(_, guard)| {
            AppError::Internal(format!("illegal state transition during claim: {guard:?}"))
        })?;

        let document = self
            .documents
            .get_document(workspace_id, document_id)
            .await?
            .ok_or_else(|| AppError::NotFound("document not found".into()))?;

        match self.run_processing(&document, machine).await {
            Ok(_ready) => {
                self.documents
                    .transition_document_status(
                        document_id,
                        DocumentStatus::Processing,
                        DocumentStatus::Ready,
                        None,
                    )
                    .await?;
                info!("document processed successfully");
                Ok(())
            }
            Err(err) => {
                warn!(error = %err, "document processing failed");
                self.documents
                    .transition_document_status(
                        document_id,
                        DocumentStatus::Processing,
                        DocumentStatus::Failed,
                        Some(err.to_string()),
                    )
                    .await?;
                Ok(())
            }
        }
    }

    async fn run_processing(
        &self,
        document: &Document,
        machine: ProcessingMachine<(), crate::state::Processing>,
    ) -> Result<ProcessingMachine<(), crate::state::Ready>, AppError> {
        let storage_key = document
            .storage_key
            .as_deref()
            .ok_or_else(|| AppError::Internal("document has no storage_key to process".into()))?;
        let mime_type = document
            .mime_type
            .as_deref()
            .unwrap_or("application/octet-stream");

        let bytes = self.object_store.download(storage_key).await?;
        let raw_text = self.extractor.extract(mime_type, &bytes).await?;
        let text = sanitize_extracted_text(&raw_text);

        let chunk_texts = chunk_text(&text, self.chunker_config);

        if chunk_texts.is_empty() {
            // Nothing left can fail on this path, so it's safe to replace
            // the prior chunk set with the empty one right away.
            self.documents.delete_chunks_for_document(document.id).await?;
            return machine.ok().map_err(|(_, guard)| {
                AppError::Internal(format!("illegal state transition during ok: {guard:?}"))
            });
        }

        let embeddings = self.embedder.embed_batch(&chunk_texts).await?;
        let chunks: Vec<common::domain::Chunk> = chunk_texts
            .into_iter()
            .zip(embeddings.into_iter())
            .enumerate()
            .map(|(idx, (content, embedding))| {
                common::domain::Chunk::new(
                    document.id,
                    document.workspace_id,
                    idx as i32,
                    content,
                    Some(embedding),
                    std::collections::HashMap::new(),
                )
            })
            .collect();

        let nodes = if self.two_tier_enabled {
            match build_nodes(
                document.workspace_id,
                document.id,
                &chunks,
                self.node_builder_config,
                self.embedder.as_ref(),
            )
            .await
            {
                Ok(nodes) => Some(nodes),
                Err(err) => {
                    warn!(error = %err, "node build/embed failed during reprocess, degrading to nodes=None");
                    None
                }
            }
        } else {
            None
        };

        // Delete immediately before persisting the replacement set, so a
        // failure anywhere upstream (extraction, chunking, embedding, node
        // build) never leaves the document with chunks deleted and nothing
        // to replace them.
        self.documents.delete_chunks_for_document(document.id).await?;
        self.documents
            .insert_chunks_and_nodes(document, chunks, nodes)
            .await?;

        machine.ok().map_err(|(_, guard)| {
            AppError::Internal(format!("illegal state transition during ok: {guard:?}"))
        })
    }

    /// Admin-only reprocess trigger: rejects with `CONFLICT` if the
    /// document is already `PROCESSING`. Authorization (admin-only) is
    /// enforced by the caller before this is invoked.
    pub async fn request_reprocess(
        &self,
        queue: &dyn JobQueue,
        document_id: Uuid,
        workspace_id: Uuid,
    ) -> Result<(), AppError> {
        let document = self
            .documents
            .get_document(workspace_id, document_id)
            .await?
            .ok_or_else(|| AppError::NotFound("document not found".into()))?;
        if document.status == DocumentStatus::Processing {
            return Err(AppError::Conflict("document is already processing".into()));
        }
        let requeued = self
            .documents
            .transition_document_status(
                document_id,
                document.status,
                DocumentStatus::Pending,
                None,
            )
            .await?;
        if !requeued {
            return Err(AppError::Conflict(
                "document status changed concurrently; retry reprocess".into(),
            ));
        }
        queue
            .enqueue_document_processing(document_id, workspace_id)
            .await
    }
}

/// Runs `concurrency` job loops pulling from `queue`, each single-threaded
/// within itself, matching the teacher's `RerankerPool` sizing idiom for
/// the worker binary.
#[instrument(skip_all, fields(concurrency))]
pub async fn run_worker_pool(
    processor: Arc<AsyncProcessor>,
    queue: Arc<dyn JobQueue>,
    concurrency: usize,
) {
    let mut handles = Vec::with_capacity(concurrency.max(1));
    for worker_id in 0..concurrency.max(1) {
        let processor = Arc::clone(&processor);
        let queue = Arc::clone(&queue);
        handles.push(tokio::spawn(async move {
            while let Some(job) = queue.next().await {
                if let Err(err) = processor
                    .process_job(job.document_id, job.workspace_id)
                    .await
                {
                    error!(worker_id, error = %err, document_id = %job.document_id, "job processing error");
                }
            }
        }));
    }
    for handle in handles {
        let _ = handle.await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use bytes::Bytes;
    use common::domain::{DocumentFilters, Node, NodeSpan, ScoredChunk};
    use common::ports::embedding::FakeEmbeddingProvider;
    use common::ports::job_queue::InMemoryJobQueue;
    use common::ports::object_store::InMemoryObjectStore;
    use std::collections::HashMap;
    use std::sync::Mutex as StdMutex;

    #[derive(Default)]
    struct InMemoryDocRepo {
        docs: StdMutex<HashMap<Uuid, Document>>,
    }

    impl InMemoryDocRepo {
        fn with_document(document: Document) -> Self {
            let mut docs = HashMap::new();
            docs.insert(document.id, document);
            Self {
                docs: StdMutex::new(docs),
            }
        }
    }

    #[async_trait]
    impl DocumentRepository for InMemoryDocRepo {
        async fn save_document_with_chunks(
            &self,
            document: Document,
            chunks: Vec<common::domain::Chunk>,
            _nodes: Option<Vec<Node>>,
        ) -> Result<common::storage::DocumentOutcome, AppError> {
            Ok(common::storage::DocumentOutcome {
                document,
                chunks_created: chunks.len(),
                was_existing: false,
            })
        }

        async fn get_document(
            &self,
            _workspace_id: Uuid,
            document_id: Uuid,
        ) -> Result<Option<Document>, AppError> {
            Ok(self.docs.lock().unwrap().get(&document_id).cloned())
        }

        async fn get_document_by_content_hash(
            &self,
            _workspace_id: Uuid,
            _content_hash: &str,
        ) -> Result<Option<Document>, AppError> {
            Ok(None)
        }

        async fn list_documents(
            &self,
            _workspace_id: Uuid,
            _limit: i64,
            _offset: i64,
            _filters: &DocumentFilters,
        ) -> Result<Vec<Document>, AppError> {
            Ok(Vec::new())
        }

        async fn find_similar_chunks(
            &self,
            _embedding: &[f32],
            _top_k: i64,
            _workspace_id: Uuid,
        ) -> Result<Vec<ScoredChunk>, AppError> {
            Ok(Vec::new())
        }

        async fn find_similar_chunks_mmr(
            &self,
            _embedding: &[f32],
            _top_k: i64,
            _lambda: f32,
            _pool_size: i64,
            _workspace_id: Uuid,
        ) -> Result<Vec<ScoredChunk>, AppError> {
            Ok(Vec::new())
        }

        async fn find_chunks_full_text(
            &self,
            _query: &str,
            _top_k: i64,
            _workspace_id: Uuid,
        ) -> Result<Vec<ScoredChunk>, AppError> {
            Ok(Vec::new())
        }

        async fn find_similar_nodes(
            &self,
            _embedding: &[f32],
            _top_k: i64,
            _workspace_id: Uuid,
        ) -> Result<Vec<(Node, f32)>, AppError> {
            Ok(Vec::new())
        }

        async fn find_chunks_by_node_spans(
            &self,
            _workspace_id: Uuid,
            _spans: &[NodeSpan],
        ) -> Result<Vec<common::domain::Chunk>, AppError> {
            Ok(Vec::new())
        }

        async fn transition_document_status(
            &self,
            document_id: Uuid,
            from: DocumentStatus,
            to: DocumentStatus,
            error_message: Option<String>,
        ) -> Result<bool, AppError> {
            let mut docs = self.docs.lock().unwrap();
            let Some(doc) = docs.get_mut(&document_id) else {
                return Ok(false);
            };
            if doc.status != from || !from.can_transition_to(to) {
                return Ok(false);
            }
            doc.status = to;
            doc.error_message = error_message;
            Ok(true)
        }

        async fn delete_chunks_for_document(&self, _document_id: Uuid) -> Result<(), AppError> {
            Ok(())
        }

        async fn insert_chunks_and_nodes(
            &self,
            _document: &Document,
            chunks: Vec<common::domain::Chunk>,
            _nodes: Option<Vec<Node>>,
        ) -> Result<usize, AppError> {
            Ok(chunks.len())
        }
    }

    struct FailingExtractor;

    #[async_trait]
    impl TextExtractor for FailingExtractor {
        async fn extract(&self, _mime_type: &str, _bytes: &[u8]) -> Result<String, AppError> {
            Err(AppError::Validation("cannot parse this file".into()))
        }
    }

    fn pending_document(workspace_id: Uuid) -> Document {
        Document::new_pending(
            workspace_id,
            "doc".into(),
            "file.txt".into(),
            "text/plain".into(),
            "uploads/file.txt".into(),
        )
    }

    #[tokio::test]
    async fn successful_job_flips_document_to_ready() {
        let workspace_id = Uuid::new_v4();
        let document = pending_document(workspace_id);
        let document_id = document.id;

        let object_store = InMemoryObjectStore::new();
        object_store
            .upload(
                "uploads/file.txt",
                Bytes::from_static(b"hello world, this is a test document."),
                "text/plain",
            )
            .await
            .unwrap();

        let processor = AsyncProcessor {
            documents: Arc::new(InMemoryDocRepo::with_document(document)),
            object_store: Arc::new(object_store),
            extractor: Arc::new(crate::extractor::DefaultTextExtractor),
            embedder: Arc::new(FakeEmbeddingProvider::new(8)),
            chunker_config: ChunkerConfig::new(200, 40).unwrap(),
            node_builder_config: NodeBuilderConfig::default(),
            two_tier_enabled: false,
        };

        processor.process_job(document_id, workspace_id).await.unwrap();

        let stored = processor
            .documents
            .get_document(workspace_id, document_id)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(stored.status, DocumentStatus::Ready);
    }

    #[tokio::test]
    async fn extraction_failure_flips_document_to_failed_with_message() {
        let workspace_id = Uuid::new_v4();
        let document = pending_document(workspace_id);
        let document_id = document.id;

        let object_store = InMemoryObjectStore::new();
        object_store
            .upload("uploads/file.txt", Bytes::from_static(b"bytes"), "text/plain")
            .await
            .unwrap();

        let processor = AsyncProcessor {
            documents: Arc::new(InMemoryDocRepo::with_document(document)),
            object_store: Arc::new(object_store),
            extractor: Arc::new(FailingExtractor),
            embedder: Arc::new(FakeEmbeddingProvider::new(8)),
            chunker_config: ChunkerConfig::new(200, 40).unwrap(),
            node_builder_config: NodeBuilderConfig::default(),
            two_tier_enabled: false,
        };

        processor.process_job(document_id, workspace_id).await.unwrap();

        let stored = processor
            .documents
            .get_document(workspace_id, document_id)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(stored.status, DocumentStatus::Failed);
        assert!(stored.error_message.is_some());
    }

    #[tokio::test]
    async fn duplicate_claim_on_non_pending_document_is_a_conflict() {
        let workspace_id = Uuid::new_v4();
        let mut document = pending_document(workspace_id);
        document.status = DocumentStatus::Processing;
        let document_id = document.id;

        let processor = AsyncProcessor {
            documents: Arc::new(InMemoryDocRepo::with_document(document)),
            object_store: Arc::new(InMemoryObjectStore::new()),
            extractor: Arc::new(crate::extractor::DefaultTextExtractor),
            embedder: Arc::new(FakeEmbeddingProvider::new(8)),
            chunker_config: ChunkerConfig::new(200, 40).unwrap(),
            node_builder_config: NodeBuilderConfig::default(),
            two_tier_enabled: false,
        };

        let err = processor
            .process_job(document_id, workspace_id)
            .await
            .unwrap_err();
        assert_eq!(err.code(), "CONFLICT");
    }

    #[tokio::test]
    async fn reprocess_rejects_while_processing() {
        let workspace_id = Uuid::new_v4();
        let mut document = pending_document(workspace_id);
        document.status = DocumentStatus::Processing;
        let document_id = document.id;

        let processor = AsyncProcessor {
            documents: Arc::new(InMemoryDocRepo::with_document(document)),
            object_store: Arc::new(InMemoryObjectStore::new()),
            extractor: Arc::new(crate::extractor::DefaultTextExtractor),
            embedder: Arc::new(FakeEmbeddingProvider::new(8)),
            chunker_config: ChunkerConfig::new(200, 40).unwrap(),
            node_builder_config: NodeBuilderConfig::default(),
            two_tier_enabled: false,
        };
        let queue = InMemoryJobQueue::new(4);

        let err = processor
            .request_reprocess(&queue, document_id, workspace_id)
            .await
            .unwrap_err();
        assert_eq!(err.code(), "CONFLICT");
    }
}
