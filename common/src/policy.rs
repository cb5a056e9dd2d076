//! Workspace Policy (C6): pure decision functions over
//! `(Workspace, Actor, ACL)`. No side effects, no I/O.

use crate::domain::{AclEntry, Actor, Document, Workspace, WorkspaceVisibility};

fn is_owner_or_admin(workspace: &Workspace, actor: &Actor) -> bool {
    actor.is_admin() || actor.user_id == Some(workspace.owner_user_id)
}

fn in_acl(actor: &Actor, acl: &[AclEntry]) -> bool {
    match actor.user_id {
        Some(user_id) => acl.iter().any(|entry| entry.user_id == user_id),
        None => false,
    }
}

/// `can_read(ws, actor, acl)`: admin/owner always; otherwise gated by
/// visibility. `SERVICE` principals bypass per-document ACL, but workspace
/// visibility still applies to them — a `Private` workspace stays closed to
/// a non-owner `SERVICE` actor, while a `Shared` one treats `SERVICE` as an
/// always-present ACL member.
pub fn can_read(workspace: &Workspace, actor: &Actor, acl: &[AclEntry]) -> bool {
    if actor.user_id.is_none() && !actor.is_service() {
        return false;
    }
    if is_owner_or_admin(workspace, actor) {
        return true;
    }
    match workspace.visibility {
        WorkspaceVisibility::Private => false,
        WorkspaceVisibility::OrgRead => true,
        WorkspaceVisibility::Shared => actor.is_service() || in_acl(actor, acl),
    }
}

/// `can_write(ws, actor)`: admin/owner only, and never on an archived
/// workspace (archived workspaces are read-only).
pub fn can_write(workspace: &Workspace, actor: &Actor) -> bool {
    if actor.user_id.is_none() && !actor.is_service() {
        return false;
    }
    if workspace.is_archived() {
        return false;
    }
    is_owner_or_admin(workspace, actor)
}

/// `can_manage_acl(ws, actor)`: admin/owner only.
pub fn can_manage_acl(workspace: &Workspace, actor: &Actor) -> bool {
    if actor.user_id.is_none() && !actor.is_service() {
        return false;
    }
    is_owner_or_admin(workspace, actor)
}

/// `can_access_document(document, actor)`: per-document role gate on top of
/// `can_read`'s workspace-level check. `allowed_roles` empty means the
/// document defers entirely to workspace ACL (already enforced by the
/// caller's `can_read`), so this only ever narrows access further.
/// `SERVICE` principals bypass this per-document ACL (but not workspace
/// visibility, which `can_read` already applied).
pub fn can_access_document(document: &Document, actor: &Actor) -> bool {
    if actor.is_admin() || actor.is_service() {
        return true;
    }
    if document.allowed_roles.is_empty() {
        return true;
    }
    document.allowed_roles.contains(actor.role.as_role_name())
}

/// Filters `documents` down to the ones `actor` may access per
/// `can_access_document`. Callers are expected to have already checked
/// `can_read` on the owning workspace.
pub fn filter_documents(documents: Vec<Document>, actor: &Actor) -> Vec<Document> {
    documents
        .into_iter()
        .filter(|document| can_access_document(document, actor))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{AclRole, ActorRole, FtsLanguage};
    use chrono::Utc;
    use uuid::Uuid;

    fn workspace(visibility: WorkspaceVisibility, archived: bool) -> (Workspace, Uuid) {
        let owner = Uuid::new_v4();
        let now = Utc::now();
        (
            Workspace {
                id: Uuid::new_v4(),
                name: "w".into(),
                owner_user_id: owner,
                visibility,
                fts_language: FtsLanguage::Spanish,
                archived_at: if archived { Some(now) } else { None },
                created_at: now,
                updated_at: now,
            },
            owner,
        )
    }

    #[test]
    fn owner_can_always_read_and_write() {
        let (ws, owner) = workspace(WorkspaceVisibility::Private, false);
        let actor = Actor {
            user_id: Some(owner),
            role: ActorRole::Employee,
        };
        assert!(can_read(&ws, &actor, &[]));
        assert!(can_write(&ws, &actor));
    }

    #[test]
    fn private_workspace_denies_strangers() {
        let (ws, _) = workspace(WorkspaceVisibility::Private, false);
        let stranger = Actor::employee(Uuid::new_v4());
        assert!(!can_read(&ws, &stranger, &[]));
    }

    #[test]
    fn org_read_allows_any_employee() {
        let (ws, _) = workspace(WorkspaceVisibility::OrgRead, false);
        let stranger = Actor::employee(Uuid::new_v4());
        assert!(can_read(&ws, &stranger, &[]));
        assert!(!can_write(&ws, &stranger));
    }

    #[test]
    fn shared_workspace_requires_acl_membership() {
        let (ws, _) = workspace(WorkspaceVisibility::Shared, false);
        let member = Uuid::new_v4();
        let acl = vec![AclEntry {
            workspace_id: ws.id,
            user_id: member,
            role: AclRole::Viewer,
            granted_by: ws.owner_user_id,
            created_at: Utc::now(),
        }];
        assert!(can_read(&ws, &Actor::employee(member), &acl));
        assert!(!can_read(&ws, &Actor::employee(Uuid::new_v4()), &acl));
    }

    #[test]
    fn service_bypasses_acl_but_respects_workspace_policy() {
        let (ws, _) = workspace(WorkspaceVisibility::Shared, false);
        assert!(can_read(&ws, &Actor::service(), &[]));
    }

    #[test]
    fn service_is_still_denied_on_private_workspace_it_does_not_own() {
        let (ws, _) = workspace(WorkspaceVisibility::Private, false);
        assert!(!can_read(&ws, &Actor::service(), &[]));
    }

    #[test]
    fn archived_workspace_rejects_all_writes() {
        let (ws, owner) = workspace(WorkspaceVisibility::OrgRead, true);
        let owner_actor = Actor {
            user_id: Some(owner),
            role: ActorRole::Employee,
        };
        assert!(!can_write(&ws, &owner_actor));
        assert!(can_read(&ws, &owner_actor, &[]));
    }

    #[test]
    fn unknown_actor_has_no_access() {
        let (ws, _) = workspace(WorkspaceVisibility::OrgRead, false);
        let unknown = Actor {
            user_id: None,
            role: ActorRole::Employee,
        };
        assert!(!can_read(&ws, &unknown, &[]));
        assert!(!can_write(&ws, &unknown));
        assert!(!can_manage_acl(&ws, &unknown));
    }

    fn doc_with_roles(roles: &[&str]) -> Document {
        let mut doc = Document::new_ready(
            Uuid::new_v4(),
            "Doc".into(),
            None,
            Default::default(),
            Default::default(),
        );
        doc.allowed_roles = roles.iter().map(|r| r.to_string()).collect();
        doc
    }

    #[test]
    fn admin_can_access_any_document() {
        let document = doc_with_roles(&["employee"]);
        assert!(can_access_document(&document, &Actor::admin(Uuid::new_v4())));
    }

    #[test]
    fn empty_allowed_roles_defers_to_workspace_acl() {
        let document = doc_with_roles(&[]);
        assert!(can_access_document(&document, &Actor::employee(Uuid::new_v4())));
    }

    #[test]
    fn employee_can_access_when_role_allowed() {
        let document = doc_with_roles(&["employee"]);
        assert!(can_access_document(&document, &Actor::employee(Uuid::new_v4())));
    }

    #[test]
    fn employee_denied_when_role_not_allowed() {
        let document = doc_with_roles(&["admin"]);
        assert!(!can_access_document(&document, &Actor::employee(Uuid::new_v4())));
    }

    #[test]
    fn service_principal_bypasses_document_acl() {
        let document = doc_with_roles(&["admin"]);
        assert!(can_access_document(&document, &Actor::service()));
    }

    #[test]
    fn filter_documents_applies_acl() {
        let allowed = doc_with_roles(&["employee"]);
        let denied = doc_with_roles(&["admin"]);
        let employee = Actor::employee(Uuid::new_v4());
        let result = filter_documents(vec![allowed.clone(), denied], &employee);
        assert_eq!(result.len(), 1);
        assert_eq!(result[0].id, allowed.id);
    }
}
