//! Answer Orchestrator (C15): glues the conversation store, query
//! rewriter, retrieval pipeline, context builder, injection policy, LLM
//! provider, and audit sink into one request/response flow.

use std::sync::Arc;

use futures::StreamExt;
use serde_json::json;
use tracing::instrument;
use uuid::Uuid;

use common::audit::{AuditEvent, AuditSink};
use common::domain::conversation::{ConversationRole, ConversationStore, Message};
use common::domain::Actor;
use common::ports::llm::{LlmProvider, TokenStream};
use common::AppError;

use crate::context_builder::build_context;
use crate::injection::{answer_has_citation, evaluate_context_policy, REFUSAL_MESSAGE};
use crate::pipeline::{RetrievalOptions, RetrievalPipeline};
use crate::query_rewriter::rewrite_query;

pub struct AnswerOrchestrator {
    pub conversations: ConversationStore,
    pub retrieval: Arc<RetrievalPipeline>,
    pub llm: Arc<dyn LlmProvider>,
    pub audit: Arc<dyn AuditSink>,
    pub conversation_history_size: usize,
    pub context_char_budget: usize,
}

#[derive(Debug, Clone, serde::Serialize)]
pub struct AnswerMetadata {
    pub original_query: String,
    pub rewritten_query: String,
    pub rewrite_applied: bool,
    pub sources_count: usize,
}

#[derive(Debug, Clone)]
pub struct AnswerResult {
    pub conversation_id: Uuid,
    pub answer: String,
    pub chunks: Vec<common::domain::chunk::ScoredChunk>,
    pub metadata: AnswerMetadata,
}

impl AnswerOrchestrator {
    /// Full non-streaming turn: rewrite → retrieve → assemble → generate
    /// → audit. Refuses (without calling the LLM) when the assembled
    /// context carries no citable evidence.
    #[instrument(skip(self), fields(workspace_id = %workspace_id))]
    pub async fn answer(
        &self,
        conversation_id: Option<Uuid>,
        workspace_id: Uuid,
        actor: &Actor,
        query: &str,
        top_k: i64,
        options: RetrievalOptions,
    ) -> Result<AnswerResult, AppError> {
        let (conversation_id, rewrite, context, chunks_used) = self
            .prepare_turn(conversation_id, workspace_id, actor, query, top_k, options)
            .await?;

        let decision = evaluate_context_policy(&context, chunks_used.len());
        let answer = if let Some(refusal) = decision.refusal_message {
            self.audit_refusal(workspace_id, actor).await;
            refusal
        } else {
            let prompt = build_prompt(&rewrite.rewritten_query, &context);
            let generated = self.llm.generate(&prompt).await?;
            self.record_answer_audit(workspace_id, actor, chunks_used.len()).await;
            generated
        };

        self.append_assistant_turn(conversation_id, &answer).await;

        Ok(AnswerResult {
            conversation_id,
            metadata: AnswerMetadata {
                original_query: rewrite.original_query,
                rewritten_query: rewrite.rewritten_query,
                rewrite_applied: rewrite.was_rewritten,
                sources_count: chunks_used.len(),
            },
            answer,
            chunks: chunks_used,
        })
    }

    /// Streaming variant: returns the token stream directly to the caller
    /// instead of buffering a full answer. Citations and audit bookkeeping
    /// happen up front since they depend only on the assembled context,
    /// not on the generated text; dropping the returned stream early
    /// releases the upstream generation (no orphan generations, §5).
    #[instrument(skip(self), fields(workspace_id = %workspace_id))]
    pub async fn answer_stream(
        &self,
        conversation_id: Option<Uuid>,
        workspace_id: Uuid,
        actor: &Actor,
        query: &str,
        top_k: i64,
        options: RetrievalOptions,
    ) -> Result<(TokenStream, AnswerMetadata), AppError> {
        let (conversation_id, rewrite, context, chunks_used) = self
            .prepare_turn(conversation_id, workspace_id, actor, query, top_k, options)
            .await?;

        let metadata = AnswerMetadata {
            original_query: rewrite.original_query.clone(),
            rewritten_query: rewrite.rewritten_query.clone(),
            rewrite_applied: rewrite.was_rewritten,
            sources_count: chunks_used.len(),
        };

        let decision = evaluate_context_policy(&context, chunks_used.len());
        if let Some(refusal) = decision.refusal_message {
            self.audit_refusal(workspace_id, actor).await;
            self.append_assistant_turn(conversation_id, &refusal).await;
            let tokens = futures::stream::once(async move { Ok(refusal) });
            return Ok((tokens.boxed(), metadata));
        }

        let prompt = build_prompt(&rewrite.rewritten_query, &context);
        let upstream = self.llm.generate_stream(&prompt).await?;
        self.record_answer_audit(workspace_id, actor, chunks_used.len()).await;

        let conversations = self.conversations.clone();
        let history_capacity = self.conversation_history_size;
        let tapped = async_stream::stream! {
            let mut upstream = upstream;
            let mut accumulated = String::new();
            while let Some(item) = upstream.next().await {
                if let Ok(token) = &item {
                    accumulated.push_str(token);
                }
                yield item;
            }
            let conversation = conversations.get_or_create(Some(conversation_id), history_capacity).await;
            conversation.lock().await.append(ConversationRole::Assistant, accumulated);
        };

        Ok((tapped.boxed(), metadata))
    }

    async fn prepare_turn(
        &self,
        conversation_id: Option<Uuid>,
        workspace_id: Uuid,
        actor: &Actor,
        query: &str,
        top_k: i64,
        options: RetrievalOptions,
    ) -> Result<(Uuid, crate::query_rewriter::RewriteResult, String, Vec<common::domain::chunk::ScoredChunk>), AppError> {
        let conversation = self
            .conversations
            .get_or_create(conversation_id, self.conversation_history_size)
            .await;

        let (conversation_id, history) = {
            let mut guard = conversation.lock().await;
            guard.append(ConversationRole::User, query);
            (guard.id, guard.recent(self.conversation_history_size))
        };

        let history_without_current = drop_last_user_turn(history);
        let rewrite = rewrite_query(query, &history_without_current);

        let outcome = self
            .retrieval
            .retrieve(&rewrite.rewritten_query, workspace_id, actor, top_k, options)
            .await?;

        let (context, used_count) = build_context(&outcome.chunks, self.context_char_budget);
        // `build_context` dedups by chunk id before applying the budget cut,
        // so the same dedup has to happen here for `take(used_count)` to
        // line up with the chunks it actually cited.
        let mut seen = std::collections::HashSet::new();
        let chunks_used = outcome
            .chunks
            .into_iter()
            .filter(|scored| seen.insert(scored.chunk.id))
            .take(used_count)
            .collect();

        Ok((conversation_id, rewrite, context, chunks_used))
    }

    async fn append_assistant_turn(&self, conversation_id: Uuid, answer: &str) {
        let conversation = self
            .conversations
            .get_or_create(Some(conversation_id), self.conversation_history_size)
            .await;
        conversation.lock().await.append(ConversationRole::Assistant, answer);
    }

    async fn record_answer_audit(&self, workspace_id: Uuid, actor: &Actor, sources_count: usize) {
        let event = AuditEvent::new(
            actor_label(actor),
            "rag.answer",
            Some(workspace_id.to_string()),
            json!({ "workspace_id": workspace_id, "sources_count": sources_count }),
        );
        if let Err(err) = self.audit.record_event(event).await {
            tracing::warn!(error = %err, "failed to record rag.answer audit event");
        }
    }

    async fn audit_refusal(&self, workspace_id: Uuid, actor: &Actor) {
        let event = AuditEvent::new(
            actor_label(actor),
            "rag.refusal",
            Some(workspace_id.to_string()),
            json!({ "workspace_id": workspace_id, "reason": "insufficient_evidence" }),
        );
        if let Err(err) = self.audit.record_event(event).await {
            tracing::warn!(error = %err, "failed to record rag.refusal audit event");
        }
    }
}

fn actor_label(actor: &Actor) -> String {
    match actor.user_id {
        Some(id) => id.to_string(),
        None => "service".to_string(),
    }
}

/// The just-appended current turn is always the last user message; the
/// rewriter needs only what preceded it.
fn drop_last_user_turn(mut history: Vec<Message>) -> Vec<Message> {
    history.pop();
    history
}

fn build_prompt(query: &str, context: &str) -> String {
    format!(
        "Responde la siguiente pregunta usando únicamente el contexto proporcionado. Cita las fuentes con su clave [S#].\n\nPregunta: {query}\n\nContexto:\n{context}"
    )
}

/// True when `answer` both came from generation (not a stock refusal) and
/// carries at least one citation — the invariant every non-refusal answer
/// must satisfy (§8 Laws: policy refusal).
pub fn satisfies_citation_law(answer: &str) -> bool {
    answer == REFUSAL_MESSAGE || answer_has_citation(answer)
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use common::domain::{AclEntry, Chunk, Document, DocumentFilters, DocumentStatus, FtsLanguage, Node, NodeSpan, ScoredChunk, Workspace, WorkspaceVisibility};
    use common::ports::embedding::FakeEmbeddingProvider;
    use common::ports::llm::FakeLlmProvider;
    use common::storage::{DocumentOutcome, DocumentRepository, WorkspaceRepository};
    use common::audit::InMemoryAuditSink;
    use crate::reranker::Reranker;
    use std::collections::HashMap;

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
    struct StubDocRepo {
        dense: Vec<ScoredChunk>,
    }

    #[async_trait]
    impl DocumentRepository for StubDocRepo {
        async fn save_document_with_chunks(&self, document: Document, chunks: Vec<Chunk>, _nodes: Option<Vec<Node>>) -> Result<DocumentOutcome, AppError> {
            Ok(DocumentOutcome { document, chunks_created: chunks.len(), was_existing: false })
        }
        async fn get_document(&self, workspace_id: Uuid, _document_id: Uuid) -> Result<Option<Document>, AppError> {
            Ok(Some(Document::new_ready(workspace_id, "doc".into(), None, Default::default(), Default::default())))
        }
        async fn get_document_by_content_hash(&self, _workspace_id: Uuid, _content_hash: &str) -> Result<Option<Document>, AppError> { Ok(None) }
        async fn list_documents(&self, _workspace_id: Uuid, _limit: i64, _offset: i64, _filters: &DocumentFilters) -> Result<Vec<Document>, AppError> { Ok(Vec::new()) }
        async fn find_similar_chunks(&self, _embedding: &[f32], _top_k: i64, _workspace_id: Uuid) -> Result<Vec<ScoredChunk>, AppError> { Ok(self.dense.clone()) }
        async fn find_similar_chunks_mmr(&self, _embedding: &[f32], _top_k: i64, _lambda: f32, _pool_size: i64, _workspace_id: Uuid) -> Result<Vec<ScoredChunk>, AppError> { Ok(self.dense.clone()) }
        async fn find_chunks_full_text(&self, _query: &str, _top_k: i64, _workspace_id: Uuid) -> Result<Vec<ScoredChunk>, AppError> { Ok(Vec::new()) }
        async fn find_similar_nodes(&self, _embedding: &[f32], _top_k: i64, _workspace_id: Uuid) -> Result<Vec<(Node, f32)>, AppError> { Ok(Vec::new()) }
        async fn find_chunks_by_node_spans(&self, _workspace_id: Uuid, _spans: &[NodeSpan]) -> Result<Vec<Chunk>, AppError> { Ok(Vec::new()) }
        async fn transition_document_status(&self, _document_id: Uuid, _from: DocumentStatus, _to: DocumentStatus, _error_message: Option<String>) -> Result<bool, AppError> { Ok(true) }
        async fn delete_chunks_for_document(&self, _document_id: Uuid) -> Result<(), AppError> { Ok(()) }
        async fn insert_chunks_and_nodes(&self, _document: &Document, chunks: Vec<Chunk>, _nodes: Option<Vec<Node>>) -> Result<usize, AppError> { Ok(chunks.len()) }
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

    fn make_orchestrator(owner: Uuid, dense: Vec<ScoredChunk>) -> AnswerOrchestrator {
        let retrieval = RetrievalPipeline {
            workspaces: Arc::new(FixedWorkspaceRepo { workspace: workspace(owner) }),
            documents: Arc::new(StubDocRepo { dense }),
            embedder: Arc::new(FakeEmbeddingProvider::new(8)),
            reranker: Reranker::heuristic_only(),
        };
        AnswerOrchestrator {
            conversations: ConversationStore::new(),
            retrieval: Arc::new(retrieval),
            llm: Arc::new(FakeLlmProvider),
            audit: Arc::new(InMemoryAuditSink::new()),
            conversation_history_size: 20,
            context_char_budget: 4000,
        }
    }

    #[tokio::test]
    async fn empty_retrieval_produces_policy_refusal_with_no_citations() {
        let owner = Uuid::new_v4();
        let orchestrator = make_orchestrator(owner, Vec::new());
        let actor = Actor { user_id: Some(owner), role: common::domain::ActorRole::Employee };
        let result = orchestrator
            .answer(None, Uuid::new_v4(), &actor, "what is in the manual?", 5, RetrievalOptions::default())
            .await
            .unwrap();
        assert_eq!(result.answer, REFUSAL_MESSAGE);
        assert!(result.chunks.is_empty());
    }

    #[tokio::test]
    async fn grounded_retrieval_yields_an_answer_with_citations() {
        let owner = Uuid::new_v4();
        let chunk = ScoredChunk {
            chunk: Chunk::new(Uuid::new_v4(), Uuid::new_v4(), 0, "pgvector supports HNSW indexes".into(), Some(vec![0.1; 8]), HashMap::new()),
            score: 0.9,
        };
        let orchestrator = make_orchestrator(owner, vec![chunk]);
        let actor = Actor { user_id: Some(owner), role: common::domain::ActorRole::Employee };
        let result = orchestrator
            .answer(None, Uuid::new_v4(), &actor, "how does indexing work?", 5, RetrievalOptions::default())
            .await
            .unwrap();
        assert!(result.answer.contains("[S1]"));
        assert_eq!(result.chunks.len(), 1);
        assert_eq!(result.metadata.sources_count, 1);
        assert_eq!(result.metadata.original_query, "how does indexing work?");
    }

    #[tokio::test]
    async fn metadata_always_carries_the_original_query() {
        let owner = Uuid::new_v4();
        let orchestrator = make_orchestrator(owner, Vec::new());
        let actor = Actor { user_id: Some(owner), role: common::domain::ActorRole::Employee };
        let result = orchestrator
            .answer(None, Uuid::new_v4(), &actor, "tell me about it", 5, RetrievalOptions::default())
            .await
            .unwrap();
        assert_eq!(result.metadata.original_query, "tell me about it");
    }
}
