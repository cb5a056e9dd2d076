//! Ingestion Pipeline (C7): resolve workspace → authorize → hash → dedup
//! → chunk → embed → (optional) node-build → persist atomically.

use std::collections::{BTreeSet, HashMap};
use std::sync::Arc;

use serde_json::Value;
use tracing::{info, instrument, warn};
use uuid::Uuid;

use common::domain::{Actor, Document};
use common::policy::can_write;
use common::ports::embedding::EmbeddingProvider;
use common::storage::{DocumentOutcome, DocumentRepository, WorkspaceRepository};
use common::{hash, AppError};

use crate::chunker::{chunk_text, ChunkerConfig};
use crate::node_builder::{build_nodes, NodeBuilderConfig};

pub struct IngestionPipeline {
    pub workspaces: Arc<dyn WorkspaceRepository>,
    pub documents: Arc<dyn DocumentRepository>,
    pub embedder: Arc<dyn EmbeddingProvider>,
    pub chunker_config: ChunkerConfig,
    pub node_builder_config: NodeBuilderConfig,
    pub two_tier_enabled: bool,
}

pub struct IngestRequest {
    pub workspace_id: Uuid,
    pub actor: Actor,
    pub title: String,
    pub text: String,
    pub metadata: HashMap<String, Value>,
    pub tags: BTreeSet<String>,
}

pub struct IngestOutcome {
    pub document_id: Uuid,
    pub chunks_created: usize,
    pub status: common::domain::DocumentStatus,
}

impl IngestionPipeline {
    #[instrument(skip_all, fields(workspace_id = %request.workspace_id))]
    pub async fn ingest(&self, request: IngestRequest) -> Result<IngestOutcome, AppError> {
        let workspace = self
            .workspaces
            .get_workspace(request.workspace_id)
            .await?
            .ok_or_else(|| AppError::NotFound("workspace not found".into()))?;

        if !can_write(&workspace, &request.actor) {
            return Err(AppError::Forbidden("actor cannot write to workspace".into()));
        }

        let content_hash = if request.text.trim().is_empty() {
            None
        } else {
            Some(hash::hash_text(request.workspace_id, &request.text))
        };

        if let Some(hash) = &content_hash {
            if let Some(existing) = self
                .documents
                .get_document_by_content_hash(request.workspace_id, hash)
                .await?
            {
                info!(document_id = %existing.id, "ingestion dedup hit, skipping provider calls");
                return Ok(IngestOutcome {
                    document_id: existing.id,
                    chunks_created: 0,
                    status: existing.status,
                });
            }
        }
        info!(has_hash = content_hash.is_some(), "ingestion dedup miss, proceeding");

        let chunk_texts = chunk_text(&request.text, self.chunker_config);
        let document = Document::new_ready(
            request.workspace_id,
            request.title,
            content_hash,
            request.tags,
            request.metadata,
        );

        if chunk_texts.is_empty() {
            let outcome = self
                .documents
                .save_document_with_chunks(document, Vec::new(), None)
                .await?;
            return Ok(to_ingest_outcome(outcome));
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
                    HashMap::new(),
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
                    warn!(error = %err, "node build/embed failed, degrading gracefully to nodes=None");
                    None
                }
            }
        } else {
            None
        };

        let outcome = self
            .documents
            .save_document_with_chunks(document, chunks, nodes)
            .await?;
        Ok(to_ingest_outcome(outcome))
    }
}

fn to_ingest_outcome(outcome: DocumentOutcome) -> IngestOutcome {
    IngestOutcome {
        document_id: outcome.document.id,
        chunks_created: outcome.chunks_created,
        status: outcome.document.status,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use common::domain::{
        AclEntry, Chunk, DocumentFilters, DocumentStatus, FtsLanguage, Node, NodeSpan,
        ScoredChunk, Workspace, WorkspaceVisibility,
    };
    use common::ports::embedding::FakeEmbeddingProvider;
    use std::sync::Mutex as StdMutex;

    struct FixedWorkspaceRepo {
        workspace: Workspace,
    }

    #[async_trait]
    impl WorkspaceRepository for FixedWorkspaceRepo {
        async fn get_workspace(&self, _workspace_id: Uuid) -> Result<Option<Workspace>, AppError> {
            Ok(Some(self.workspace.clone()))
        }
        async fn list_acl(&self, _workspace_id: Uuid) -> Result<Vec<AclEntry>, AppError> {
            Ok(Vec::new())
        }
    }

    #[derive(Default)]
    struct InMemoryDocRepo {
        by_hash: StdMutex<HashMap<String, Document>>,
    }

    #[async_trait]
    impl DocumentRepository for InMemoryDocRepo {
        async fn save_document_with_chunks(
            &self,
            document: Document,
            chunks: Vec<Chunk>,
            _nodes: Option<Vec<Node>>,
        ) -> Result<DocumentOutcome, AppError> {
            if let Some(hash) = &document.content_hash {
                self.by_hash
                    .lock()
                    .unwrap()
                    .insert(hash.clone(), document.clone());
            }
            Ok(DocumentOutcome {
                document,
                chunks_created: chunks.len(),
                was_existing: false,
            })
        }

        async fn get_document(
            &self,
            _workspace_id: Uuid,
            _document_id: Uuid,
        ) -> Result<Option<Document>, AppError> {
            Ok(None)
        }

        async fn get_document_by_content_hash(
            &self,
            _workspace_id: Uuid,
            content_hash: &str,
        ) -> Result<Option<Document>, AppError> {
            Ok(self.by_hash.lock().unwrap().get(content_hash).cloned())
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
        ) -> Result<Vec<Chunk>, AppError> {
            Ok(Vec::new())
        }

        async fn transition_document_status(
            &self,
            _document_id: Uuid,
            _from: DocumentStatus,
            _to: DocumentStatus,
            _error_message: Option<String>,
        ) -> Result<bool, AppError> {
            Ok(true)
        }

        async fn delete_chunks_for_document(&self, _document_id: Uuid) -> Result<(), AppError> {
            Ok(())
        }

        async fn insert_chunks_and_nodes(
            &self,
            _document: &Document,
            chunks: Vec<Chunk>,
            _nodes: Option<Vec<Node>>,
        ) -> Result<usize, AppError> {
            Ok(chunks.len())
        }
    }

    fn workspace(owner: Uuid) -> Workspace {
        let now = chrono::Utc::now();
        Workspace {
            id: Uuid::new_v4(),
            name: "w".into(),
            owner_user_id: owner,
            visibility: WorkspaceVisibility::Private,
            fts_language: FtsLanguage::Spanish,
            archived_at: None,
            created_at: now,
            updated_at: now,
        }
    }

    fn make_pipeline(owner: Uuid) -> IngestionPipeline {
        IngestionPipeline {
            workspaces: Arc::new(FixedWorkspaceRepo {
                workspace: workspace(owner),
            }),
            documents: Arc::new(InMemoryDocRepo::default()),
            embedder: Arc::new(FakeEmbeddingProvider::new(8)),
            chunker_config: ChunkerConfig::new(200, 40).unwrap(),
            node_builder_config: NodeBuilderConfig::default(),
            two_tier_enabled: false,
        }
    }

    #[tokio::test]
    async fn forbidden_when_actor_cannot_write() {
        let owner = Uuid::new_v4();
        let pipeline = make_pipeline(owner);
        let request = IngestRequest {
            workspace_id: Uuid::new_v4(),
            actor: Actor::employee(Uuid::new_v4()),
            title: "t".into(),
            text: "hello world".into(),
            metadata: HashMap::new(),
            tags: BTreeSet::new(),
        };
        let err = pipeline.ingest(request).await.unwrap_err();
        assert_eq!(err.code(), "FORBIDDEN");
    }

    #[tokio::test]
    async fn second_ingest_of_identical_text_is_a_dedup_hit() {
        let owner = Uuid::new_v4();
        let pipeline = make_pipeline(owner);
        let workspace_id = Uuid::new_v4();
        let make_req = || IngestRequest {
            workspace_id,
            actor: Actor {
                user_id: Some(owner),
                role: common::domain::ActorRole::Employee,
            },
            title: "doc".into(),
            text: "hello world, this is a test document.".into(),
            metadata: HashMap::new(),
            tags: BTreeSet::new(),
        };

        let first = pipeline.ingest(make_req()).await.unwrap();
        assert!(first.chunks_created > 0);

        let second = pipeline.ingest(make_req()).await.unwrap();
        assert_eq!(second.document_id, first.document_id);
        assert_eq!(second.chunks_created, 0);
    }
}
