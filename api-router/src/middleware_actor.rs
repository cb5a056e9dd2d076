//! Stand-in for an upstream auth layer (§6: identity/JWT issuance is out of
//! scope). Trusts an already-authenticated `Actor`, passed via headers, and
//! inserts it into request extensions for handlers to pick up.

use axum::{extract::Request, http::HeaderMap, middleware::Next, response::Response};
use common::domain::{Actor, ActorRole};
use uuid::Uuid;

use crate::error::ApiError;

const ACTOR_ID_HEADER: &str = "x-actor-id";
const ACTOR_ROLE_HEADER: &str = "x-actor-role";

pub async fn inject_actor(mut request: Request, next: Next) -> Result<Response, ApiError> {
    let actor = parse_actor(request.headers())
        .ok_or_else(|| ApiError::Unauthorized("missing or malformed actor headers".to_string()))?;
    request.extensions_mut().insert(actor);
    Ok(next.run(request).await)
}

fn parse_actor(headers: &HeaderMap) -> Option<Actor> {
    let role = match headers.get(ACTOR_ROLE_HEADER)?.to_str().ok()?.to_uppercase().as_str() {
        "ADMIN" => ActorRole::Admin,
        "EMPLOYEE" => ActorRole::Employee,
        "SERVICE" => ActorRole::Service,
        _ => return None,
    };

    if role == ActorRole::Service {
        return Some(Actor { user_id: None, role });
    }

    let user_id = headers
        .get(ACTOR_ID_HEADER)?
        .to_str()
        .ok()
        .and_then(|raw| Uuid::parse_str(raw).ok())?;

    Some(Actor {
        user_id: Some(user_id),
        role,
    })
}
