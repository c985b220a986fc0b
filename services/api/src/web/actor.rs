//! services/api/src/web/actor.rs
//!
//! Identifies the caller from headers set by the upstream authentication layer.

use crate::error::ApiError;
use axum::http::HeaderMap;
use tuteskillz_core::domain::{Id, Role};

pub const USER_ID_HEADER: &str = "x-user-id";
pub const USER_ROLE_HEADER: &str = "x-user-role";

/// The authenticated user making a request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Actor {
    pub user_id: Id,
    pub role: Role,
}

impl Actor {
    /// Reads the actor headers. No headers means a trusted internal caller.
    pub fn from_headers(headers: &HeaderMap) -> Result<Option<Self>, ApiError> {
        let user_id = headers.get(USER_ID_HEADER).and_then(|v| v.to_str().ok());
        let role = headers.get(USER_ROLE_HEADER).and_then(|v| v.to_str().ok());

        match (user_id, role) {
            (None, None) => Ok(None),
            (Some(id), Some(role)) => {
                let user_id = id
                    .trim()
                    .parse::<Id>()
                    .map_err(|_| ApiError::bad_request("Invalid x-user-id header"))?;
                let role = role
                    .parse::<Role>()
                    .map_err(|_| ApiError::bad_request("Invalid x-user-role header"))?;
                Ok(Some(Self { user_id, role }))
            }
            _ => Err(ApiError::bad_request(
                "x-user-id and x-user-role must be sent together",
            )),
        }
    }
}

/// Rejects a caller of `role` acting on another user's resources. Admins pass.
pub fn ensure_owner(actor: Option<Actor>, role: Role, owner_id: Id) -> Result<(), ApiError> {
    match actor {
        Some(actor) if actor.role == role && actor.user_id != owner_id => {
            Err(ApiError::Forbidden("Forbidden".to_string()))
        }
        _ => Ok(()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::HeaderValue;

    fn headers(id: &str, role: &str) -> HeaderMap {
        let mut map = HeaderMap::new();
        map.insert(USER_ID_HEADER, HeaderValue::from_str(id).unwrap());
        map.insert(USER_ROLE_HEADER, HeaderValue::from_str(role).unwrap());
        map
    }

    #[test]
    fn absent_headers_mean_internal_caller() {
        assert_eq!(Actor::from_headers(&HeaderMap::new()).unwrap(), None);
    }

    #[test]
    fn parses_actor() {
        let actor = Actor::from_headers(&headers("7", "Tutor")).unwrap();
        assert_eq!(actor, Some(Actor { user_id: 7, role: Role::Tutor }));
        assert!(Actor::from_headers(&headers("seven", "tutor")).is_err());
    }

    #[test]
    fn tutors_only_touch_their_own_sessions() {
        let tutor = Some(Actor { user_id: 7, role: Role::Tutor });
        assert!(ensure_owner(tutor, Role::Tutor, 7).is_ok());
        assert!(matches!(
            ensure_owner(tutor, Role::Tutor, 8),
            Err(ApiError::Forbidden(_))
        ));
        let admin = Some(Actor { user_id: 1, role: Role::Admin });
        assert!(ensure_owner(admin, Role::Tutor, 8).is_ok());
    }
}
