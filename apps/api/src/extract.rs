//! `Json`, `Path` and `Query` with rejections reported as [`AppError`], so a
//! malformed request gets the same `{"error": {..}}` body as every other failure.

use axum::{
    async_trait,
    extract::{FromRequest, FromRequestParts, Multipart, Path, Query, Request},
    http::request::Parts,
    Json,
};
use serde::de::DeserializeOwned;

use crate::errors::AppError;
use crate::upload::rejection_error;

#[derive(Debug, Clone, Copy, Default)]
pub struct AppJson<T>(pub T);

#[async_trait]
impl<T, S> FromRequest<S> for AppJson<T>
where
    T: DeserializeOwned,
    S: Send + Sync,
{
    type Rejection = AppError;

    async fn from_request(req: Request, state: &S) -> Result<Self, Self::Rejection> {
        let Json(value) = Json::<T>::from_request(req, state)
            .await
            .map_err(|e| rejection_error(e.status(), e.body_text()))?;
        Ok(AppJson(value))
    }
}

pub struct AppMultipart(pub Multipart);

#[async_trait]
impl<S> FromRequest<S> for AppMultipart
where
    S: Send + Sync,
{
    type Rejection = AppError;

    async fn from_request(req: Request, state: &S) -> Result<Self, Self::Rejection> {
        Multipart::from_request(req, state)
            .await
            .map(AppMultipart)
            .map_err(|e| rejection_error(e.status(), e.body_text()))
    }
}

#[derive(Debug, Clone, Copy)]
pub struct AppPath<T>(pub T);

#[async_trait]
impl<T, S> FromRequestParts<S> for AppPath<T>
where
    T: DeserializeOwned + Send,
    S: Send + Sync,
{
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        let Path(value) = Path::<T>::from_request_parts(parts, state)
            .await
            .map_err(|e| rejection_error(e.status(), e.body_text()))?;
        Ok(AppPath(value))
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct AppQuery<T>(pub T);

#[async_trait]
impl<T, S> FromRequestParts<S> for AppQuery<T>
where
    T: DeserializeOwned,
    S: Send + Sync,
{
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        let Query(value) = Query::<T>::from_request_parts(parts, state)
            .await
            .map_err(|e| rejection_error(e.status(), e.body_text()))?;
        Ok(AppQuery(value))
    }
}
