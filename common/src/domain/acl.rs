use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "acl_role", rename_all = "UPPERCASE")]
pub enum AclRole {
    Viewer,
    Editor,
}

/// One row of a `SHARED` workspace's access-control list.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AclEntry {
    pub workspace_id: Uuid,
    pub user_id: Uuid,
    pub role: AclRole,
    pub granted_by: Uuid,
    pub created_at: DateTime<Utc>,
}
