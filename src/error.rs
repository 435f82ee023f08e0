use axum::{
    http::{header, HeaderValue, StatusCode},
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;
use thiserror::Error;

use crate::users::repo::StoreError;

/// Why a bearer token was rejected.
#[derive(Debug, Clone, Copy, Error, PartialEq, Eq)]
pub enum AuthError {
    #[error("token is malformed or its signature is invalid")]
    Malformed,
    #[error("token has expired")]
    Expired,
}

#[derive(Debug, Error)]
pub enum AppError {
    #[error("username already registered")]
    DuplicateUser,

    /// Unknown username and wrong password both end up here.
    #[error("incorrect username or password")]
    InvalidCredentials,

    #[error(transparent)]
    Token(#[from] AuthError),

    /// Current password did not match during a password change.
    #[error("current password is incorrect")]
    IncorrectCurrentPassword,

    #[error("user not found")]
    UserNotFound,

    #[error("inactive user")]
    InactiveUser,

    #[error("{0}")]
    Validation(String),

    #[error("store error: {0}")]
    Store(StoreError),

    #[error(transparent)]
    Internal(#[from] anyhow::Error),
}

impl From<StoreError> for AppError {
    fn from(e: StoreError) -> Self {
        match e {
            StoreError::UniqueViolation => AppError::DuplicateUser,
            StoreError::NotFound => AppError::UserNotFound,
            other => AppError::Store(other),
        }
    }
}

#[derive(Debug, Serialize)]
pub struct ErrorBody {
    pub detail: String,
}

impl AppError {
    pub fn status(&self) -> StatusCode {
        match self {
            AppError::DuplicateUser
            | AppError::IncorrectCurrentPassword
            | AppError::InactiveUser => StatusCode::BAD_REQUEST,
            AppError::InvalidCredentials | AppError::Token(_) | AppError::UserNotFound => {
                StatusCode::UNAUTHORIZED
            }
            AppError::Validation(_) => StatusCode::UNPROCESSABLE_ENTITY,
            AppError::Store(_) | AppError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// Message safe to show the caller. Internal failures are logged here and
    /// replaced with a generic message.
    pub fn detail(&self) -> String {
        match self {
            AppError::DuplicateUser => "Username already registered".into(),
            AppError::InvalidCredentials => "Incorrect username or password".into(),
            AppError::IncorrectCurrentPassword => "Current password is incorrect".into(),
            AppError::Token(AuthError::Expired) => "Token has expired".into(),
            AppError::Token(AuthError::Malformed) | AppError::UserNotFound => {
                "Could not validate credentials".into()
            }
            AppError::InactiveUser => "Inactive user".into(),
            AppError::Validation(msg) => msg.clone(),
            AppError::Store(e) => {
                tracing::error!(error = %e, "store failure");
                "Internal server error".into()
            }
            AppError::Internal(e) => {
                tracing::error!(error = ?e, "internal failure");
                "Internal server error".into()
            }
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = self.status();
        let body = Json(ErrorBody {
            detail: self.detail(),
        });
        let mut res = (status, body).into_response();
        if status == StatusCode::UNAUTHORIZED {
            res.headers_mut()
                .insert(header::WWW_AUTHENTICATE, HeaderValue::from_static("Bearer"));
        }
        res
    }
}

pub type AppResult<T> = Result<T, AppError>;
