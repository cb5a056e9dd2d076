use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Visibility tier that gates `can_read` for non-owner, non-admin actors.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "visibility", rename_all = "UPPERCASE")]
pub enum WorkspaceVisibility {
    Private,
    OrgRead,
    Shared,
}

/// Full-text-search language. Anything outside the allowlist falls back to
/// `Spanish` at the domain boundary rather than being rejected.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "fts_language", rename_all = "lowercase")]
pub enum FtsLanguage {
    Spanish,
    English,
    Simple,
}

impl FtsLanguage {
    /// Parses a workspace's configured language, falling back to the
    /// default when the value is outside the allowlist (§6 FTS allowlist).
    pub fn parse_or_default(raw: &str) -> Self {
        match raw.to_ascii_lowercase().as_str() {
            "english" => Self::English,
            "simple" => Self::Simple,
            "spanish" => Self::Spanish,
            _ => Self::default(),
        }
    }

    /// The Postgres `regconfig` name this language maps to.
    pub fn regconfig(self) -> &'static str {
        match self {
            Self::Spanish => "spanish",
            Self::English => "english",
            Self::Simple => "simple",
        }
    }
}

impl Default for FtsLanguage {
    fn default() -> Self {
        Self::Spanish
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Workspace {
    pub id: Uuid,
    pub name: String,
    pub owner_user_id: Uuid,
    pub visibility: WorkspaceVisibility,
    pub fts_language: FtsLanguage,
    pub archived_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Workspace {
    pub fn is_archived(&self) -> bool {
        self.archived_at.is_some()
    }
}
