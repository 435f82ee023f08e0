//! Body extractors whose rejections use the `{"detail"}` error shape.

use axum::{
    async_trait,
    extract::{
        rejection::{FormRejection, JsonRejection},
        FromRequest, Request,
    },
    Form, Json,
};
use tracing::debug;

use crate::error::AppError;

/// `Json<T>` that rejects malformed bodies with `AppError::Validation`.
pub struct AppJson<T>(pub T);

#[async_trait]
impl<S, T> FromRequest<S> for AppJson<T>
where
    S: Send + Sync,
    Json<T>: FromRequest<S, Rejection = JsonRejection>,
{
    type Rejection = AppError;

    async fn from_request(req: Request, state: &S) -> Result<Self, Self::Rejection> {
        let Json(value) = Json::<T>::from_request(req, state).await.map_err(|e| {
            debug!(status = %e.status(), "json body rejected");
            AppError::Validation(e.body_text())
        })?;
        Ok(AppJson(value))
    }
}

/// `Form<T>` counterpart of [`AppJson`].
pub struct AppForm<T>(pub T);

#[async_trait]
impl<S, T> FromRequest<S> for AppForm<T>
where
    S: Send + Sync,
    Form<T>: FromRequest<S, Rejection = FormRejection>,
{
    type Rejection = AppError;

    async fn from_request(req: Request, state: &S) -> Result<Self, Self::Rejection> {
        let Form(value) = Form::<T>::from_request(req, state).await.map_err(|e| {
            debug!(status = %e.status(), "form body rejected");
            AppError::Validation(e.body_text())
        })?;
        Ok(AppForm(value))
    }
}
