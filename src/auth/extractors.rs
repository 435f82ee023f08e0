use axum::{
    async_trait,
    extract::FromRequestParts,
    http::{header::AUTHORIZATION, request::Parts},
};
use tracing::warn;

use crate::{
    error::{AppError, AuthError},
    state::AppState,
    users::{repo_types::User, services::resolve_session},
};

/// The live, active user behind the request's bearer token.
pub struct CurrentUser(pub User);

fn bearer_token(parts: &Parts) -> Result<&str, AppError> {
    let header = parts
        .headers
        .get(AUTHORIZATION)
        .and_then(|h| h.to_str().ok())
        .ok_or(AppError::Token(AuthError::Malformed))?;

    // Expect "Bearer <token>"
    header
        .strip_prefix("Bearer ")
        .or_else(|| header.strip_prefix("bearer "))
        .map(str::trim)
        .filter(|t| !t.is_empty())
        .ok_or(AppError::Token(AuthError::Malformed))
}

#[async_trait]
impl FromRequestParts<AppState> for CurrentUser {
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, state: &AppState) -> Result<Self, Self::Rejection> {
        let token = bearer_token(parts).map_err(|e| {
            warn!("missing or invalid Authorization header");
            e
        })?;

        let user = resolve_session(state.store.as_ref(), &state.keys, token).await?;
        if !user.is_active {
            warn!(user_id = user.id, "inactive user presented a valid token");
            return Err(AppError::InactiveUser);
        }
        Ok(CurrentUser(user))
    }
}
