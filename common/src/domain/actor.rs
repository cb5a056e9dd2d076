use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Principal role, as handed to the core by the (out-of-scope) auth layer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum ActorRole {
    Admin,
    Employee,
    Service,
}

/// The authenticated principal performing an operation. Identity/JWT
/// issuance are out of scope; this is the shape the core consumes.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Actor {
    pub user_id: Option<Uuid>,
    pub role: ActorRole,
}

impl Actor {
    pub fn admin(user_id: Uuid) -> Self {
        Self {
            user_id: Some(user_id),
            role: ActorRole::Admin,
        }
    }

    pub fn employee(user_id: Uuid) -> Self {
        Self {
            user_id: Some(user_id),
            role: ActorRole::Employee,
        }
    }

    pub fn service() -> Self {
        Self {
            user_id: None,
            role: ActorRole::Service,
        }
    }

    pub fn is_admin(&self) -> bool {
        self.role == ActorRole::Admin
    }

    pub fn is_service(&self) -> bool {
        self.role == ActorRole::Service
    }
}

impl ActorRole {
    /// Lowercase role name, matching the strings `Document.allowed_roles`
    /// is populated with.
    pub fn as_role_name(self) -> &'static str {
        match self {
            Self::Admin => "admin",
            Self::Employee => "employee",
            Self::Service => "service",
        }
    }
}
