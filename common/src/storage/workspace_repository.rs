//! Workspace + ACL repository: resolves the inputs `can_read`/`can_write`/
//! `can_manage_acl` (C6) need. Kept separate from `DocumentRepository`
//! since workspaces are looked up by both the ingestion and retrieval
//! pipelines regardless of which documents are in play.

use async_trait::async_trait;
use sqlx::{PgPool, Row};
use uuid::Uuid;

use crate::domain::{AclEntry, Workspace};
use crate::error::AppError;

#[async_trait]
pub trait WorkspaceRepository: Send + Sync {
    async fn get_workspace(&self, workspace_id: Uuid) -> Result<Option<Workspace>, AppError>;
    async fn list_acl(&self, workspace_id: Uuid) -> Result<Vec<AclEntry>, AppError>;
}

pub struct PgWorkspaceRepository {
    pool: PgPool,
}

impl PgWorkspaceRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    fn row_to_workspace(row: &sqlx::postgres::PgRow) -> Result<Workspace, AppError> {
        Ok(Workspace {
            id: row.try_get("id")?,
            name: row.try_get("name")?,
            owner_user_id: row.try_get("owner_user_id")?,
            visibility: row.try_get("visibility")?,
            fts_language: row.try_get("fts_language")?,
            archived_at: row.try_get("archived_at")?,
            created_at: row.try_get("created_at")?,
            updated_at: row.try_get("updated_at")?,
        })
    }

    fn row_to_acl_entry(row: &sqlx::postgres::PgRow) -> Result<AclEntry, AppError> {
        Ok(AclEntry {
            workspace_id: row.try_get("workspace_id")?,
            user_id: row.try_get("user_id")?,
            role: row.try_get("role")?,
            granted_by: row.try_get("granted_by")?,
            created_at: row.try_get("created_at")?,
        })
    }
}

#[async_trait]
impl WorkspaceRepository for PgWorkspaceRepository {
    async fn get_workspace(&self, workspace_id: Uuid) -> Result<Option<Workspace>, AppError> {
        let row = sqlx::query("SELECT * FROM workspaces WHERE id = $1")
            .bind(workspace_id)
            .fetch_optional(&self.pool)
            .await?;
        row.as_ref().map(Self::row_to_workspace).transpose()
    }

    async fn list_acl(&self, workspace_id: Uuid) -> Result<Vec<AclEntry>, AppError> {
        let rows = sqlx::query("SELECT * FROM workspace_acl WHERE workspace_id = $1")
            .bind(workspace_id)
            .fetch_all(&self.pool)
            .await?;
        rows.iter().map(Self::row_to_acl_entry).collect()
    }
}
