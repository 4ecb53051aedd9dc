use axum::{extract::FromRequestParts, http::request::Parts};

use crate::{
    error::{AppError, AppResult},
    models::UserId,
};

/// Header carrying the caller's user ID, set by the upstream auth layer
pub const USER_ID_HEADER: &str = "x-user-id";

/// Caller identity; `None` for anonymous requests
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CurrentUser(pub Option<UserId>);

impl CurrentUser {
    /// The signed-in user, or Unauthorized
    pub fn require(&self) -> AppResult<UserId> {
        self.0
            .ok_or_else(|| AppError::Unauthorized("Sign in required".to_string()))
    }
}

#[axum::async_trait]
impl<S> FromRequestParts<S> for CurrentUser
where
    S: Send + Sync,
{
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        let Some(value) = parts.headers.get(USER_ID_HEADER) else {
            return Ok(CurrentUser(None));
        };

        value
            .to_str()
            .ok()
            .and_then(|raw| raw.trim().parse::<i64>().ok())
            .map(|id| CurrentUser(Some(UserId(id))))
            .ok_or_else(|| AppError::Unauthorized(format!("Malformed {} header", USER_ID_HEADER)))
    }
}
