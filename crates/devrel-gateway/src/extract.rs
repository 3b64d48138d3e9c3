//! Extractors that reject with the JSON error body instead of plain text.

use crate::error::ApiError;
use crate::server::AppState;
use axum::extract::{FromRequest, FromRequestParts, Path, Query, Request};
use axum::http::request::Parts;
use axum::Json;
use devrel_core::types::PageRequest;
use serde::de::DeserializeOwned;
use serde::Deserialize;
use std::sync::Arc;

/// `Json<T>` with 400 `VALIDATION_ERROR` on malformed bodies.
pub struct ApiJson<T>(pub T);

impl<S, T> FromRequest<S> for ApiJson<T>
where
    T: DeserializeOwned,
    S: Send + Sync,
{
    type Rejection = ApiError;

    async fn from_request(req: Request, state: &S) -> Result<Self, Self::Rejection> {
        let Json(value) = Json::<T>::from_request(req, state).await?;
        Ok(Self(value))
    }
}

/// `Query<T>` with 400 `VALIDATION_ERROR` on malformed query strings.
pub struct ApiQuery<T>(pub T);

impl<S, T> FromRequestParts<S> for ApiQuery<T>
where
    T: DeserializeOwned,
    S: Send + Sync,
{
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        let Query(value) = Query::<T>::from_request_parts(parts, state).await?;
        Ok(Self(value))
    }
}

pub struct ApiPath<T>(pub T);

impl<S, T> FromRequestParts<S> for ApiPath<T>
where
    T: DeserializeOwned + Send,
    S: Send + Sync,
{
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        let Path(value) = Path::<T>::from_request_parts(parts, state).await?;
        Ok(Self(value))
    }
}

#[derive(Deserialize)]
struct RawPage {
    page: Option<u32>,
    limit: Option<u32>,
}

/// `page`/`limit` validated against the configured bounds.
pub struct Paging(pub PageRequest);

impl FromRequestParts<Arc<AppState>> for Paging {
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, state: &Arc<AppState>) -> Result<Self, Self::Rejection> {
        let ApiQuery(raw) = ApiQuery::<RawPage>::from_request_parts(parts, state).await?;
        let limits = &state.config.pagination;
        let page = PageRequest::new(raw.page, raw.limit, limits.default_limit, limits.max_limit)?;
        Ok(Self(page))
    }
}
