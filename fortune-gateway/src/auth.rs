//! Minimal owner-identity extraction for the stream gateway.
//!
//! The surrounding system is expected to authenticate the caller upstream
//! (e.g. at a reverse proxy) and forward the resolved owner id in this
//! header; this core only needs *an* owner id to check against the task row.

use axum::extract::FromRequestParts;
use axum::http::request::Parts;
use axum::http::StatusCode;

pub const OWNER_HEADER: &str = "x-fortune-owner";

#[derive(Debug, Clone)]
pub struct AuthenticatedOwner(pub String);

impl<S> FromRequestParts<S> for AuthenticatedOwner
where
    S: Send + Sync,
{
    type Rejection = (StatusCode, &'static str);

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        let owner_id = parts
            .headers
            .get(OWNER_HEADER)
            .and_then(|v| v.to_str().ok())
            .filter(|s| !s.is_empty())
            .ok_or((StatusCode::UNAUTHORIZED, "missing owner identity"))?;
        Ok(Self(owner_id.to_string()))
    }
}
