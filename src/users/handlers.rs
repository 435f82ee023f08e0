use axum::{
    extract::State,
    routing::{get, post},
    Json, Router,
};
use tracing::instrument;

use super::{
    dto::{ChangePasswordRequest, DetailResponse, LoginForm, PublicUser, SignupRequest, TokenResponse},
    services,
};
use crate::{
    auth::extractors::CurrentUser,
    error::{AppError, AppResult},
    extractors::{AppForm, AppJson},
    state::AppState,
};

pub fn users_routes() -> Router<AppState> {
    Router::new()
        .route("/users/signup", post(signup))
        .route("/users/token", post(login_for_access_token))
        .route("/users/me", get(read_me))
        .route("/users/change-password", post(change_password))
}

#[instrument(skip(state, payload))]
pub async fn signup(
    State(state): State<AppState>,
    AppJson(payload): AppJson<SignupRequest>,
) -> AppResult<Json<PublicUser>> {
    let user = services::signup(state.store.as_ref(), payload).await?;
    Ok(Json(user))
}

#[instrument(skip(state, form), fields(username = %form.username))]
pub async fn login_for_access_token(
    State(state): State<AppState>,
    AppForm(form): AppForm<LoginForm>,
) -> AppResult<Json<TokenResponse>> {
    let token = services::login(state.store.as_ref(), &state.keys, &form.username, &form.password).await?;
    Ok(Json(token))
}

#[instrument(skip_all, fields(user_id = user.id))]
pub async fn read_me(CurrentUser(user): CurrentUser) -> Json<PublicUser> {
    Json(user.into())
}

#[instrument(skip_all, fields(user_id = user.id))]
pub async fn change_password(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
    AppJson(payload): AppJson<ChangePasswordRequest>,
) -> AppResult<Json<DetailResponse>> {
    services::change_password(
        state.store.as_ref(),
        &user,
        &payload.current_password,
        &payload.new_password,
    )
    .await
    .map_err(|e| match e {
        AppError::InvalidCredentials => AppError::IncorrectCurrentPassword,
        other => other,
    })?;

    Ok(Json(DetailResponse {
        detail: "Password changed successfully".into(),
    }))
}
