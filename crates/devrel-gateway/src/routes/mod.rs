//! API route handlers for the gateway.

pub mod activities;
pub mod analytics;
pub mod campaigns;
pub mod developers;
pub mod plugins;
pub mod session;
pub mod settings;
pub mod tokens;

use axum::extract::State;
use axum::Json;
use devrel_core::types::{Page, PageInfo, PageLink};
use serde::Serialize;
use std::sync::Arc;

use crate::server::AppState;

const PAGE_SIBLINGS: u32 = 1;

/// List body: `{items, pagination, links?}`. `links` is omitted when
/// everything fits on one page.
#[derive(Debug, Serialize)]
pub struct ListResponse<T> {
    pub items: Vec<T>,
    pub pagination: PageInfo,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub links: Option<Vec<PageLink>>,
}

impl<T> From<Page<T>> for ListResponse<T> {
    fn from(page: Page<T>) -> Self {
        Self {
            links: page.pagination.window(PAGE_SIBLINGS),
            items: page.items,
            pagination: page.pagination,
        }
    }
}

pub(crate) fn list<T>(page: Page<T>) -> Json<ListResponse<T>> {
    Json(page.into())
}

/// Health check endpoint.
pub async fn health_check(State(state): State<Arc<AppState>>) -> Json<serde_json::Value> {
    Json(serde_json::json!({
        "status": "ok",
        "service": "devrel-gateway",
        "version": env!("CARGO_PKG_VERSION"),
        "uptimeSecs": state.start_time.elapsed().as_secs(),
    }))
}
