//! Acting-user extraction.

use axum::{extract::FromRequestParts, http::request::Parts};

use crate::domain::ledger_entry::UserId;

use super::WebError;

pub const USER_ID_HEADER: &str = "x-user-id";

/// The identity on whose behalf the request runs.
#[derive(Debug, Clone, Copy)]
pub struct ActingUser(pub UserId);

impl<S> FromRequestParts<S> for ActingUser
where
    S: Send + Sync,
{
    type Rejection = WebError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        let raw = parts
            .headers
            .get(USER_ID_HEADER)
            .ok_or_else(|| WebError::unauthorized("missing X-User-Id header"))?;

        raw.to_str()
            .ok()
            .and_then(|v| v.trim().parse::<i64>().ok())
            .map(|id| ActingUser(UserId(id)))
            .ok_or_else(|| WebError::unauthorized("X-User-Id must be an integer"))
    }
}
