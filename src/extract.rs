//! Request extractors that keep the JSON error contract.
//!
//! Axum's own `Json` and `Path` reject malformed input with a plain-text
//! body (and 415/422 statuses). [`ApiJson`] and [`ApiPath`] wrap them and
//! turn every rejection into an [`AppError`], so a bad body or a
//! non-numeric id still renders `{"error":{"code","message"}}`.

use axum::{
    extract::{
        rejection::{JsonRejection, PathRejection},
        FromRequest, FromRequestParts, Path, Request,
    },
    http::{request::Parts, StatusCode},
    Json,
};
use serde::de::DeserializeOwned;

use crate::error::{bad_request, internal, payload_too_large, AppError};

/// JSON request body; rejections become 400 (or 413 for an oversized body).
#[derive(Debug, Clone)]
pub struct ApiJson<T>(pub T);

/// Path parameters; rejections become 400.
#[derive(Debug, Clone)]
pub struct ApiPath<T>(pub T);

fn json_rejection(rejection: JsonRejection) -> AppError {
    tracing::debug!("rejected request body: {}", rejection.body_text());
    if rejection.status() == StatusCode::PAYLOAD_TOO_LARGE {
        payload_too_large("Request body too large")
    } else {
        bad_request(rejection.body_text())
    }
}

fn path_rejection(rejection: PathRejection) -> AppError {
    tracing::debug!("rejected path parameters: {}", rejection.body_text());
    if rejection.status().is_server_error() {
        internal(rejection.body_text())
    } else {
        bad_request(rejection.body_text())
    }
}

impl<T, S> FromRequest<S> for ApiJson<T>
where
    T: DeserializeOwned,
    S: Send + Sync,
{
    type Rejection = AppError;

    async fn from_request(req: Request, state: &S) -> Result<Self, AppError> {
        Json::<T>::from_request(req, state)
            .await
            .map(|Json(value)| ApiJson(value))
            .map_err(json_rejection)
    }
}

impl<T, S> FromRequestParts<S> for ApiPath<T>
where
    T: DeserializeOwned + Send,
    S: Send + Sync,
{
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, AppError> {
        Path::<T>::from_request_parts(parts, state)
            .await
            .map(|Path(value)| ApiPath(value))
            .map_err(path_rejection)
    }
}
