//! Plugin, plugin event and plugin run routes.

use super::{list as list_body, ListResponse};
use crate::auth::AuthContext;
use crate::error::{ApiError, ApiResult};
use crate::extract::{ApiJson, ApiPath, ApiQuery, Paging};
use crate::server::AppState;
use axum::body::Bytes;
use axum::extract::State;
use axum::http::StatusCode;
use axum::Json;
use devrel_platform::events::{
    EventFilter, EventResult, EventStats, EventStatus, IngestSummary, NewPluginEvent, PluginEvent,
};
use devrel_platform::plugins::{NewPlugin, PluginPatch, PluginView};
use devrel_platform::runs::{PluginRun, RunFilter, RunStatus, RunTrigger, RunUpdate};
use serde::Deserialize;
use std::sync::Arc;

// ── Plugins ────────────────────────────────────

pub async fn list(State(state): State<Arc<AppState>>, auth: AuthContext) -> ApiResult<Json<serde_json::Value>> {
    let plugins: Vec<PluginView> = state.db()?.list_plugins(&auth.tenant_id)?.iter().map(|p| p.view()).collect();
    Ok(Json(serde_json::json!({ "items": plugins })))
}

pub async fn create(
    State(state): State<Arc<AppState>>,
    auth: AuthContext,
    ApiJson(input): ApiJson<NewPlugin>,
) -> ApiResult<(StatusCode, Json<PluginView>)> {
    let db = state.db()?;
    let plugin = db.create_plugin(&auth.tenant_id, &input)?;
    db.log_event(&auth.tenant_id, "plugin_installed", auth.actor_type(), auth.actor_id(), Some(plugin.key.as_str()))?;
    Ok((StatusCode::CREATED, Json(plugin.view())))
}

pub async fn get_one(
    State(state): State<Arc<AppState>>,
    auth: AuthContext,
    ApiPath(id): ApiPath<String>,
) -> ApiResult<Json<PluginView>> {
    Ok(Json(state.db()?.get_plugin(&auth.tenant_id, &id)?.view()))
}

pub async fn update(
    State(state): State<Arc<AppState>>,
    auth: AuthContext,
    ApiPath(id): ApiPath<String>,
    ApiJson(patch): ApiJson<PluginPatch>,
) -> ApiResult<Json<PluginView>> {
    Ok(Json(state.db()?.update_plugin(&auth.tenant_id, &id, &patch)?.view()))
}

pub async fn delete(
    State(state): State<Arc<AppState>>,
    auth: AuthContext,
    ApiPath(id): ApiPath<String>,
) -> ApiResult<Json<serde_json::Value>> {
    let db = state.db()?;
    db.delete_plugin(&auth.tenant_id, &id)?;
    db.log_event(&auth.tenant_id, "plugin_removed", auth.actor_type(), auth.actor_id(), Some(id.as_str()))?;
    Ok(Json(serde_json::json!({ "ok": true, "id": id })))
}

// ── Events ────────────────────────────────────

/// A single event, a bare array, or `{"events": [...]}`.
#[derive(Debug, Deserialize)]
#[serde(untagged)]
pub enum IngestBody {
    Batch { events: Vec<NewPluginEvent> },
    Many(Vec<NewPluginEvent>),
    One(NewPluginEvent),
}

impl IngestBody {
    fn into_events(self) -> Vec<NewPluginEvent> {
        match self {
            Self::Batch { events } | Self::Many(events) => events,
            Self::One(event) => vec![event],
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EventQuery {
    pub status: Option<EventStatus>,
    pub event_type: Option<String>,
    pub search: Option<String>,
    pub from: Option<String>,
    pub to: Option<String>,
    pub order_by: Option<String>,
}

pub async fn ingest(
    State(state): State<Arc<AppState>>,
    auth: AuthContext,
    ApiPath(id): ApiPath<String>,
    ApiJson(body): ApiJson<IngestBody>,
) -> ApiResult<(StatusCode, Json<IngestSummary>)> {
    let summary = state.db()?.ingest_events(&auth.tenant_id, &id, &body.into_events())?;
    let status = if summary.accepted > 0 { StatusCode::CREATED } else { StatusCode::OK };
    Ok((status, Json(summary)))
}

pub async fn list_events(
    State(state): State<Arc<AppState>>,
    auth: AuthContext,
    ApiPath(id): ApiPath<String>,
    Paging(page): Paging,
    ApiQuery(q): ApiQuery<EventQuery>,
) -> ApiResult<Json<ListResponse<PluginEvent>>> {
    let filter = EventFilter {
        status: q.status,
        event_type: q.event_type,
        search: q.search,
        from: q.from,
        to: q.to,
        order_by: q.order_by,
        page,
    };
    Ok(list_body(state.db()?.list_plugin_events(&auth.tenant_id, &id, &filter)?))
}

pub async fn get_event(
    State(state): State<Arc<AppState>>,
    auth: AuthContext,
    ApiPath((id, event_id)): ApiPath<(String, String)>,
) -> ApiResult<Json<PluginEvent>> {
    Ok(Json(state.db()?.get_plugin_event(&auth.tenant_id, &id, &event_id)?))
}

pub async fn report_result(
    State(state): State<Arc<AppState>>,
    auth: AuthContext,
    ApiPath((id, event_id)): ApiPath<(String, String)>,
    ApiJson(result): ApiJson<EventResult>,
) -> ApiResult<Json<PluginEvent>> {
    Ok(Json(state.db()?.report_event_result(&auth.tenant_id, &id, &event_id, &result)?))
}

pub async fn reprocess_event(
    State(state): State<Arc<AppState>>,
    auth: AuthContext,
    ApiPath((id, event_id)): ApiPath<(String, String)>,
) -> ApiResult<Json<PluginEvent>> {
    Ok(Json(state.db()?.reprocess_event(&auth.tenant_id, &id, &event_id)?))
}

pub async fn reprocess_failed(
    State(state): State<Arc<AppState>>,
    auth: AuthContext,
    ApiPath(id): ApiPath<String>,
) -> ApiResult<Json<serde_json::Value>> {
    let requeued = state.db()?.reprocess_failed_events(&auth.tenant_id, &id)?;
    Ok(Json(serde_json::json!({ "requeued": requeued })))
}

pub async fn event_stats(
    State(state): State<Arc<AppState>>,
    auth: AuthContext,
    ApiPath(id): ApiPath<String>,
) -> ApiResult<Json<EventStats>> {
    Ok(Json(state.db()?.plugin_event_stats(&auth.tenant_id, &id)?))
}

// ── Runs ────────────────────────────────────

#[derive(Debug, Deserialize)]
pub struct RunQuery {
    pub status: Option<RunStatus>,
}

#[derive(Debug, Deserialize)]
pub struct TriggerBody {
    pub trigger: RunTrigger,
}

pub async fn list_runs(
    State(state): State<Arc<AppState>>,
    auth: AuthContext,
    ApiPath(id): ApiPath<String>,
    Paging(page): Paging,
    ApiQuery(q): ApiQuery<RunQuery>,
) -> ApiResult<Json<ListResponse<PluginRun>>> {
    let filter = RunFilter { status: q.status, page };
    Ok(list_body(state.db()?.list_plugin_runs(&auth.tenant_id, &id, &filter)?))
}

/// Queue a run. An empty body means a manual trigger.
pub async fn trigger_run(
    State(state): State<Arc<AppState>>,
    auth: AuthContext,
    ApiPath(id): ApiPath<String>,
    body: Bytes,
) -> ApiResult<(StatusCode, Json<PluginRun>)> {
    let trigger = if body.iter().all(u8::is_ascii_whitespace) {
        RunTrigger::Manual
    } else {
        serde_json::from_slice::<TriggerBody>(&body)
            .map_err(|e| ApiError::bad_request(format!("invalid run request: {e}")))?
            .trigger
    };
    let run = state.db()?.trigger_plugin_run(&auth.tenant_id, &id, trigger)?;
    Ok((StatusCode::CREATED, Json(run)))
}

pub async fn get_run(
    State(state): State<Arc<AppState>>,
    auth: AuthContext,
    ApiPath((id, run_id)): ApiPath<(String, String)>,
) -> ApiResult<Json<PluginRun>> {
    Ok(Json(state.db()?.get_plugin_run(&auth.tenant_id, &id, &run_id)?))
}

pub async fn update_run(
    State(state): State<Arc<AppState>>,
    auth: AuthContext,
    ApiPath((id, run_id)): ApiPath<(String, String)>,
    ApiJson(update): ApiJson<RunUpdate>,
) -> ApiResult<Json<PluginRun>> {
    Ok(Json(state.db()?.update_plugin_run(&auth.tenant_id, &id, &run_id, &update)?))
}
