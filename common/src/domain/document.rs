use std::collections::{BTreeSet, HashMap};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

/// Document lifecycle status. Transitions form a DAG (§4.8):
/// `PENDING -> PROCESSING -> {READY, FAILED}`, plus the pure-text
/// ingestion shortcut that creates a document directly as `READY`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "document_status", rename_all = "UPPERCASE")]
pub enum DocumentStatus {
    Pending,
    Processing,
    Ready,
    Failed,
}

impl DocumentStatus {
    /// Whether `self -> to` is a transition the state machine allows.
    /// `Ready`/`Failed` -> `Pending` is the reprocess re-entry edge: an
    /// admin-triggered reprocess requeues a finished document rather than
    /// resuming it mid-`Processing`.
    pub fn can_transition_to(self, to: Self) -> bool {
        matches!(
            (self, to),
            (Self::Pending, Self::Processing)
                | (Self::Processing, Self::Ready)
                | (Self::Processing, Self::Failed)
                | (Self::Ready, Self::Pending)
                | (Self::Failed, Self::Pending)
        )
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Document {
    pub id: Uuid,
    pub workspace_id: Uuid,
    pub title: String,
    pub status: DocumentStatus,
    pub content_hash: Option<String>,
    pub file_name: Option<String>,
    pub mime_type: Option<String>,
    pub storage_key: Option<String>,
    pub tags: BTreeSet<String>,
    pub allowed_roles: BTreeSet<String>,
    pub external_source_id: Option<String>,
    pub external_etag: Option<String>,
    pub external_modified_time: Option<DateTime<Utc>>,
    pub error_message: Option<String>,
    pub metadata: HashMap<String, Value>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub deleted_at: Option<DateTime<Utc>>,
}

impl Document {
    /// A document created from plain text goes straight to `READY`;
    /// one created for async upload processing starts `PENDING`.
    pub fn new_ready(
        workspace_id: Uuid,
        title: String,
        content_hash: Option<String>,
        tags: BTreeSet<String>,
        metadata: HashMap<String, Value>,
    ) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4(),
            workspace_id,
            title,
            status: DocumentStatus::Ready,
            content_hash,
            file_name: None,
            mime_type: None,
            storage_key: None,
            tags,
            allowed_roles: BTreeSet::new(),
            external_source_id: None,
            external_etag: None,
            external_modified_time: None,
            error_message: None,
            metadata,
            created_at: now,
            updated_at: now,
            deleted_at: None,
        }
    }

    pub fn new_pending(
        workspace_id: Uuid,
        title: String,
        file_name: String,
        mime_type: String,
        storage_key: String,
    ) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4(),
            workspace_id,
            title,
            status: DocumentStatus::Pending,
            content_hash: None,
            file_name: Some(file_name),
            mime_type: Some(mime_type),
            storage_key: Some(storage_key),
            tags: BTreeSet::new(),
            allowed_roles: BTreeSet::new(),
            external_source_id: None,
            external_etag: None,
            external_modified_time: None,
            error_message: None,
            metadata: HashMap::new(),
            created_at: now,
            updated_at: now,
            deleted_at: None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum DocumentSortKey {
    #[default]
    CreatedAtDesc,
    CreatedAtAsc,
    TitleAsc,
    TitleDesc,
}

#[derive(Debug, Clone, Default)]
pub struct DocumentFilters {
    pub query: Option<String>,
    pub status: Option<DocumentStatus>,
    pub tag: Option<String>,
    pub sort: DocumentSortKey,
}
