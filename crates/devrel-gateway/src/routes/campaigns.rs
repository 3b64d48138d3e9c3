//! Campaign and budget routes.

use super::{list as list_body, ListResponse};
use crate::auth::AuthContext;
use crate::error::ApiResult;
use crate::extract::{ApiJson, ApiPath, ApiQuery, Paging};
use crate::server::AppState;
use axum::extract::State;
use axum::http::StatusCode;
use axum::Json;
use devrel_platform::campaigns::{
    BudgetEntry, Campaign, CampaignFilter, CampaignPatch, CampaignStatus, NewBudgetEntry, NewCampaign,
};
use serde::Deserialize;
use std::sync::Arc;

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CampaignQuery {
    pub status: Option<CampaignStatus>,
    pub channel: Option<String>,
    pub search: Option<String>,
    pub order_by: Option<String>,
}

pub async fn list(
    State(state): State<Arc<AppState>>,
    auth: AuthContext,
    Paging(page): Paging,
    ApiQuery(q): ApiQuery<CampaignQuery>,
) -> ApiResult<Json<ListResponse<Campaign>>> {
    let filter = CampaignFilter {
        status: q.status,
        channel: q.channel,
        search: q.search,
        order_by: q.order_by,
        page,
    };
    Ok(list_body(state.db()?.list_campaigns(&auth.tenant_id, &filter)?))
}

pub async fn create(
    State(state): State<Arc<AppState>>,
    auth: AuthContext,
    ApiJson(input): ApiJson<NewCampaign>,
) -> ApiResult<(StatusCode, Json<Campaign>)> {
    let campaign = state.db()?.create_campaign(&auth.tenant_id, &input)?;
    tracing::info!("📣 Campaign '{}' created by {}", campaign.name, auth.actor_id());
    Ok((StatusCode::CREATED, Json(campaign)))
}

pub async fn get_one(
    State(state): State<Arc<AppState>>,
    auth: AuthContext,
    ApiPath(id): ApiPath<String>,
) -> ApiResult<Json<Campaign>> {
    Ok(Json(state.db()?.get_campaign(&auth.tenant_id, &id)?))
}

pub async fn update(
    State(state): State<Arc<AppState>>,
    auth: AuthContext,
    ApiPath(id): ApiPath<String>,
    ApiJson(patch): ApiJson<CampaignPatch>,
) -> ApiResult<Json<Campaign>> {
    Ok(Json(state.db()?.update_campaign(&auth.tenant_id, &id, &patch)?))
}

pub async fn delete(
    State(state): State<Arc<AppState>>,
    auth: AuthContext,
    ApiPath(id): ApiPath<String>,
) -> ApiResult<Json<serde_json::Value>> {
    let db = state.db()?;
    db.delete_campaign(&auth.tenant_id, &id)?;
    db.log_event(&auth.tenant_id, "campaign_deleted", auth.actor_type(), auth.actor_id(), Some(id.as_str()))?;
    Ok(Json(serde_json::json!({ "ok": true, "id": id })))
}

pub async fn list_budget(
    State(state): State<Arc<AppState>>,
    auth: AuthContext,
    ApiPath(id): ApiPath<String>,
) -> ApiResult<Json<serde_json::Value>> {
    let db = state.db()?;
    let campaign = db.get_campaign(&auth.tenant_id, &id)?;
    let entries = db.list_budget_entries(&auth.tenant_id, &id)?;
    Ok(Json(serde_json::json!({
        "items": entries,
        "budget": campaign.budget,
        "spent": campaign.cost,
        "remaining": campaign.budget - campaign.cost,
    })))
}

pub async fn add_budget(
    State(state): State<Arc<AppState>>,
    auth: AuthContext,
    ApiPath(id): ApiPath<String>,
    ApiJson(input): ApiJson<NewBudgetEntry>,
) -> ApiResult<(StatusCode, Json<BudgetEntry>)> {
    let entry = state.db()?.add_budget_entry(&auth.tenant_id, &id, &input)?;
    Ok((StatusCode::CREATED, Json(entry)))
}

pub async fn delete_budget(
    State(state): State<Arc<AppState>>,
    auth: AuthContext,
    ApiPath((id, entry_id)): ApiPath<(String, String)>,
) -> ApiResult<Json<serde_json::Value>> {
    state.db()?.delete_budget_entry(&auth.tenant_id, &id, &entry_id)?;
    Ok(Json(serde_json::json!({ "ok": true })))
}
