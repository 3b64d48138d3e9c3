//! Developer routes.

use super::{list as list_body, ListResponse};
use crate::auth::AuthContext;
use crate::error::ApiResult;
use crate::extract::{ApiJson, ApiPath, ApiQuery, Paging};
use crate::server::AppState;
use axum::extract::State;
use axum::http::StatusCode;
use axum::Json;
use devrel_platform::activities::{Activity, ActivityFilter};
use devrel_platform::developers::{Developer, DeveloperFilter, DeveloperPatch, NewDeveloper};
use devrel_platform::funnel::FunnelStage;
use serde::Deserialize;
use std::sync::Arc;

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DeveloperQuery {
    pub search: Option<String>,
    pub stage: Option<FunnelStage>,
    pub tag: Option<String>,
    pub order_by: Option<String>,
}

pub async fn list(
    State(state): State<Arc<AppState>>,
    auth: AuthContext,
    Paging(page): Paging,
    ApiQuery(q): ApiQuery<DeveloperQuery>,
) -> ApiResult<Json<ListResponse<Developer>>> {
    let filter = DeveloperFilter {
        search: q.search,
        stage: q.stage,
        tag: q.tag,
        order_by: q.order_by,
        page,
    };
    Ok(list_body(state.db()?.list_developers(&auth.tenant_id, &filter)?))
}

pub async fn create(
    State(state): State<Arc<AppState>>,
    auth: AuthContext,
    ApiJson(input): ApiJson<NewDeveloper>,
) -> ApiResult<(StatusCode, Json<Developer>)> {
    let developer = state.db()?.create_developer(&auth.tenant_id, &input)?;
    Ok((StatusCode::CREATED, Json(developer)))
}

pub async fn get_one(
    State(state): State<Arc<AppState>>,
    auth: AuthContext,
    ApiPath(id): ApiPath<String>,
) -> ApiResult<Json<Developer>> {
    Ok(Json(state.db()?.get_developer(&auth.tenant_id, &id)?))
}

pub async fn update(
    State(state): State<Arc<AppState>>,
    auth: AuthContext,
    ApiPath(id): ApiPath<String>,
    ApiJson(patch): ApiJson<DeveloperPatch>,
) -> ApiResult<Json<Developer>> {
    Ok(Json(state.db()?.update_developer(&auth.tenant_id, &id, &patch)?))
}

pub async fn delete(
    State(state): State<Arc<AppState>>,
    auth: AuthContext,
    ApiPath(id): ApiPath<String>,
) -> ApiResult<Json<serde_json::Value>> {
    let db = state.db()?;
    db.delete_developer(&auth.tenant_id, &id)?;
    db.log_event(&auth.tenant_id, "developer_deleted", auth.actor_type(), auth.actor_id(), Some(id.as_str()))?;
    Ok(Json(serde_json::json!({ "ok": true, "id": id })))
}

/// A developer's activity timeline, newest first.
pub async fn activities(
    State(state): State<Arc<AppState>>,
    auth: AuthContext,
    ApiPath(id): ApiPath<String>,
    Paging(page): Paging,
) -> ApiResult<Json<ListResponse<Activity>>> {
    let db = state.db()?;
    db.get_developer(&auth.tenant_id, &id)?;
    let filter = ActivityFilter {
        developer_id: Some(id),
        page,
        ..Default::default()
    };
    Ok(list_body(db.list_activities(&auth.tenant_id, &filter)?))
}

#[cfg(test)]
mod tests {
    use crate::routes::test_support::*;
    use axum::http::StatusCode;
    use serde_json::json;

    #[tokio::test]
    async fn test_developer_lifecycle() {
        let app = app().await;
        let (status, dev) = app
            .call(
                "POST",
                "/api/developers",
                Some(json!({"displayName": "Ada Lovelace", "email": "ada@example.com", "tags": ["rust"]})),
            )
            .await;
        assert_eq!(status, StatusCode::CREATED, "{dev}");
        let id = dev["id"].as_str().unwrap().to_string();

        let (status, _) = app
            .call("POST", "/api/developers", Some(json!({"displayName": "Dup", "email": "ada@example.com"})))
            .await;
        assert_eq!(status, StatusCode::CONFLICT);

        let (status, _) = app
            .call("POST", "/api/developers", Some(json!({"displayName": "Bad", "email": "not-an-email"})))
            .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);

        let (status, _) = app
            .call(
                "POST",
                "/api/activities",
                Some(json!({"developerId": id, "action": "sdk_install", "source": "cli"})),
            )
            .await;
        assert_eq!(status, StatusCode::CREATED);

        let (_, fetched) = app.call("GET", &format!("/api/developers/{id}"), None).await;
        assert_eq!(fetched["stage"], "adoption");
        assert_eq!(fetched["activityCount"], 1);

        let (_, timeline) = app.call("GET", &format!("/api/developers/{id}/activities"), None).await;
        assert_eq!(timeline["items"][0]["action"], "sdk_install");

        let (_, by_stage) = app.call("GET", "/api/developers?stage=adoption", None).await;
        assert_eq!(by_stage["pagination"]["total"], 1);

        let (status, patched) = app
            .call("PATCH", &format!("/api/developers/{id}"), Some(json!({"organization": "Analytical Engines"})))
            .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(patched["organization"], "Analytical Engines");

        let (status, _) = app.call("DELETE", &format!("/api/developers/{id}"), None).await;
        assert_eq!(status, StatusCode::OK);
        let (status, _) = app.call("DELETE", &format!("/api/developers/{id}"), None).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
    }
}
