use anyhow::Context;
use time::OffsetDateTime;
use tracing::{info, instrument, warn};

use super::{
    dto::{PublicUser, SignupRequest, TokenResponse},
    repo::UserStore,
    repo_types::{NewUser, User},
};
use crate::{
    auth::{jwt::JwtKeys, password},
    error::{AppError, AppResult},
};

async fn hash_blocking(plain: &str) -> AppResult<String> {
    let plain = plain.to_owned();
    let hash = tokio::task::spawn_blocking(move || password::hash_password(&plain))
        .await
        .context("password hashing task")??;
    Ok(hash)
}

async fn verify_blocking(plain: &str, hash: &str) -> AppResult<bool> {
    let (plain, hash) = (plain.to_owned(), hash.to_owned());
    let ok = tokio::task::spawn_blocking(move || password::verify_password(&plain, &hash))
        .await
        .context("password verification task")?;
    Ok(ok)
}

fn require_username(value: &str) -> AppResult<()> {
    if value.trim().is_empty() {
        return Err(AppError::Validation("username must not be blank".into()));
    }
    Ok(())
}

/// Passwords are taken as-is; only the empty string is refused.
fn require_password(field: &str, value: &str) -> AppResult<()> {
    if value.is_empty() {
        return Err(AppError::Validation(format!("{field} must not be empty")));
    }
    Ok(())
}

/// Registers a new active user.
///
/// The existence check runs before hashing so a taken username costs no hash.
/// Two concurrent signups can both pass it; the store's unique constraint then
/// rejects the second insert, which is reported the same way.
#[instrument(skip(store, req), fields(username = %req.username))]
pub async fn signup(store: &dyn UserStore, req: SignupRequest) -> AppResult<PublicUser> {
    require_username(&req.username)?;
    require_password("password", &req.password)?;

    if store.find_by_username(&req.username).await?.is_some() {
        warn!("username already registered");
        return Err(AppError::DuplicateUser);
    }

    let hash = hash_blocking(&req.password).await?;

    let user = store
        .insert(NewUser {
            username: &req.username,
            password_hash: &hash,
            chronic_condition: &req.chronic_condition,
            location: &req.location,
        })
        .await
        .map_err(|e| {
            let e = AppError::from(e);
            if matches!(e, AppError::DuplicateUser) {
                warn!("username taken by a concurrent signup");
            }
            e
        })?;

    info!(user_id = user.id, "user registered");
    Ok(user.into())
}

/// Checks credentials and issues an access token.
///
/// An unknown username and a wrong password produce the same error.
#[instrument(skip(store, keys, password))]
pub async fn login(
    store: &dyn UserStore,
    keys: &JwtKeys,
    username: &str,
    password: &str,
) -> AppResult<TokenResponse> {
    let Some(user) = store.find_by_username(username).await? else {
        // same Argon2 cost as the wrong-password path
        verify_blocking(password, password::DUMMY_HASH).await?;
        warn!("login for unknown username");
        return Err(AppError::InvalidCredentials);
    };

    if !verify_blocking(password, &user.password_hash).await? {
        warn!(user_id = user.id, "login with wrong password");
        return Err(AppError::InvalidCredentials);
    }

    let token = keys.issue(&user.username)?;
    info!(user_id = user.id, "user logged in");
    Ok(TokenResponse::bearer(token))
}

/// Resolves a bearer token to the live user record.
#[instrument(skip_all)]
pub async fn resolve_session(store: &dyn UserStore, keys: &JwtKeys, token: &str) -> AppResult<User> {
    let username = keys.validate(token)?;
    store
        .find_by_username(&username)
        .await?
        .ok_or_else(|| {
            warn!(%username, "token subject no longer exists");
            AppError::UserNotFound
        })
}

/// Rotates the password of `current_user`. Tokens already issued stay valid.
#[instrument(skip(store, current_user, current_password, new_password), fields(user_id = current_user.id))]
pub async fn change_password(
    store: &dyn UserStore,
    current_user: &User,
    current_password: &str,
    new_password: &str,
) -> AppResult<()> {
    if !verify_blocking(current_password, &current_user.password_hash).await? {
        warn!("current password verification failed");
        return Err(AppError::InvalidCredentials);
    }
    require_password("new_password", new_password)?;

    let hash = hash_blocking(new_password).await?;
    store
        .update_password(&current_user.username, &hash, OffsetDateTime::now_utc())
        .await?;

    info!("password changed");
    Ok(())
}
