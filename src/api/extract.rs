// Extractors whose rejections use the crate's `{"error"}` 400 body

use axum::{
    async_trait,
    body::Bytes,
    extract::{FromRequest, FromRequestParts, Query, Request},
    http::{request::Parts, StatusCode},
    response::{IntoResponse, Response},
};
use serde::de::DeserializeOwned;

use crate::Error;

/// JSON body extractor
///
/// An empty body is "No input data provided." and any syntax or type error
/// becomes a validation error. The content type is not checked. Bodies over
/// the size limit keep their 413.
#[derive(Debug, Clone, Copy, Default)]
pub struct ApiJson<T>(pub T);

#[async_trait]
impl<T, S> FromRequest<S> for ApiJson<T>
where
    T: DeserializeOwned,
    S: Send + Sync,
{
    type Rejection = Response;

    async fn from_request(req: Request, state: &S) -> Result<Self, Self::Rejection> {
        let bytes = Bytes::from_request(req, state).await.map_err(|e| {
            if e.status() == StatusCode::PAYLOAD_TOO_LARGE {
                e.into_response()
            } else {
                Error::Validation(e.body_text()).into_response()
            }
        })?;

        if bytes.iter().all(u8::is_ascii_whitespace) {
            return Err(Error::Validation("No input data provided.".to_string()).into_response());
        }

        serde_json::from_slice(&bytes).map(ApiJson).map_err(|e| {
            Error::Validation(format!("Invalid request body: {e}")).into_response()
        })
    }
}

/// Query string extractor
#[derive(Debug, Clone, Copy, Default)]
pub struct ApiQuery<T>(pub T);

#[async_trait]
impl<T, S> FromRequestParts<S> for ApiQuery<T>
where
    T: DeserializeOwned,
    S: Send + Sync,
{
    type Rejection = Error;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        Query::<T>::from_request_parts(parts, state)
            .await
            .map(|Query(value)| ApiQuery(value))
            .map_err(|e| Error::Validation(e.body_text()))
    }
}
