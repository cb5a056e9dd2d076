//! Audit Event (§3) and the append-only Audit Sink port (A7).

use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use sqlx::PgPool;
use tokio::sync::Mutex;
use uuid::Uuid;

use crate::error::AppError;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuditEvent {
    pub id: Uuid,
    pub actor: String,
    pub action: String,
    pub target_id: Option<String>,
    pub metadata: Value,
    pub created_at: DateTime<Utc>,
}

impl AuditEvent {
    pub fn new(actor: impl Into<String>, action: impl Into<String>, target_id: Option<String>, metadata: Value) -> Self {
        Self {
            id: Uuid::new_v4(),
            actor: actor.into(),
            action: action.into(),
            target_id,
            metadata,
            created_at: Utc::now(),
        }
    }
}

#[async_trait]
pub trait AuditSink: Send + Sync {
    async fn record_event(&self, event: AuditEvent) -> Result<(), AppError>;
}

/// Postgres-backed append-only sink: `INSERT INTO audit_events`, no update
/// or delete path exists anywhere in this crate.
pub struct PgAuditSink {
    pool: PgPool,
}

impl PgAuditSink {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl AuditSink for PgAuditSink {
    #[tracing::instrument(skip_all, fields(action = %event.action, target_id = ?event.target_id))]
    async fn record_event(&self, event: AuditEvent) -> Result<(), AppError> {
        sqlx::query(
            "INSERT INTO audit_events (id, actor, action, target_id, metadata, created_at)
             VALUES ($1, $2, $3, $4, $5, $6)",
        )
        .bind(event.id)
        .bind(&event.actor)
        .bind(&event.action)
        .bind(&event.target_id)
        .bind(&event.metadata)
        .bind(event.created_at)
        .execute(&self.pool)
        .await?;
        Ok(())
    }
}

/// In-memory fake for tests that don't need Postgres (A9).
#[derive(Clone, Default)]
pub struct InMemoryAuditSink {
    events: Arc<Mutex<Vec<AuditEvent>>>,
}

impl InMemoryAuditSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn events(&self) -> Vec<AuditEvent> {
        self.events.lock().await.clone()
    }
}

#[async_trait]
impl AuditSink for InMemoryAuditSink {
    async fn record_event(&self, event: AuditEvent) -> Result<(), AppError> {
        self.events.lock().await.push(event);
        Ok(())
    }
}
