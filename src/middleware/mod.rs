use actix_session::SessionExt;
use actix_web::{dev, FromRequest, HttpRequest};
use serde::Serialize;
use std::future::{ready, Ready as StdReady};

use crate::models::Role;

/// Extractor for the admin surface. Handlers that take this parameter
/// only run for requests carrying a live session.
#[derive(Serialize)]
pub struct AuthenticatedUser {
    pub user_id: i64,
    pub username: String,
    pub role: Role,
}

impl FromRequest for AuthenticatedUser {
    type Error = actix_web::Error;
    type Future = StdReady<Result<Self, Self::Error>>;

    fn from_request(req: &HttpRequest, _: &mut dev::Payload) -> Self::Future {
        let session = req.get_session();
        if let (Ok(Some(user_id)), Ok(Some(username)), Ok(Some(role))) = (
            session.get("user_id"),
            session.get("username"),
            session.get("role"),
        ) {
            ready(Ok(AuthenticatedUser {
                user_id,
                username,
                role,
            }))
        } else {
            ready(Err(actix_web::error::ErrorUnauthorized("Not logged in.")))
        }
    }
}

/// The ownership rule for mutations: admins may touch anything, everyone
/// else only what they created.
pub fn may_modify(role: Role, actor_id: i64, owner_id: i64) -> bool {
    role == Role::Admin || actor_id == owner_id
}
