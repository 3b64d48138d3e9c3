//! Funnel and overview dashboards.

use crate::auth::AuthContext;
use crate::error::ApiResult;
use crate::extract::ApiQuery;
use crate::server::AppState;
use axum::extract::State;
use axum::Json;
use devrel_platform::funnel::{FunnelQuery, FunnelReport};
use devrel_platform::overview::Overview;
use serde::Deserialize;
use std::sync::Arc;

pub async fn funnel(
    State(state): State<Arc<AppState>>,
    auth: AuthContext,
    ApiQuery(query): ApiQuery<FunnelQuery>,
) -> ApiResult<Json<FunnelReport>> {
    Ok(Json(state.db()?.funnel_report(&auth.tenant_id, &query)?))
}

#[derive(Debug, Deserialize)]
pub struct OverviewQuery {
    pub days: Option<u32>,
}

pub async fn overview(
    State(state): State<Arc<AppState>>,
    auth: AuthContext,
    ApiQuery(query): ApiQuery<OverviewQuery>,
) -> ApiResult<Json<Overview>> {
    Ok(Json(state.db()?.overview(&auth.tenant_id, query.days)?))
}
