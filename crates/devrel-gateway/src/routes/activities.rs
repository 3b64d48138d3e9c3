//! Activity and activity-type routes.

use super::{list as list_body, ListResponse};
use crate::auth::AuthContext;
use crate::error::ApiResult;
use crate::extract::{ApiJson, ApiPath, ApiQuery, Paging};
use crate::server::AppState;
use axum::extract::State;
use axum::http::StatusCode;
use axum::Json;
use devrel_platform::activities::{
    Activity, ActivityFilter, ActivityType, ActivityTypePatch, NewActivity, NewActivityType,
};
use serde::Deserialize;
use std::sync::Arc;

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ActivityQuery {
    pub developer_id: Option<String>,
    pub campaign_id: Option<String>,
    pub action: Option<String>,
    pub source: Option<String>,
    pub from: Option<String>,
    pub to: Option<String>,
    pub order_by: Option<String>,
}

pub async fn list(
    State(state): State<Arc<AppState>>,
    auth: AuthContext,
    Paging(page): Paging,
    ApiQuery(q): ApiQuery<ActivityQuery>,
) -> ApiResult<Json<ListResponse<Activity>>> {
    let filter = ActivityFilter {
        developer_id: q.developer_id,
        campaign_id: q.campaign_id,
        action: q.action,
        source: q.source,
        from: q.from,
        to: q.to,
        order_by: q.order_by,
        page,
    };
    Ok(list_body(state.db()?.list_activities(&auth.tenant_id, &filter)?))
}

pub async fn record(
    State(state): State<Arc<AppState>>,
    auth: AuthContext,
    ApiJson(input): ApiJson<NewActivity>,
) -> ApiResult<(StatusCode, Json<Activity>)> {
    let activity = state.db()?.record_activity(&auth.tenant_id, &input)?;
    Ok((StatusCode::CREATED, Json(activity)))
}

pub async fn delete(
    State(state): State<Arc<AppState>>,
    auth: AuthContext,
    ApiPath(id): ApiPath<String>,
) -> ApiResult<Json<serde_json::Value>> {
    state.db()?.delete_activity(&auth.tenant_id, &id)?;
    Ok(Json(serde_json::json!({ "ok": true, "id": id })))
}

pub async fn list_types(
    State(state): State<Arc<AppState>>,
    auth: AuthContext,
) -> ApiResult<Json<serde_json::Value>> {
    let types = state.db()?.list_activity_types(&auth.tenant_id)?;
    Ok(Json(serde_json::json!({ "items": types })))
}

pub async fn get_type(
    State(state): State<Arc<AppState>>,
    auth: AuthContext,
    ApiPath(id): ApiPath<String>,
) -> ApiResult<Json<ActivityType>> {
    Ok(Json(state.db()?.get_activity_type(&auth.tenant_id, &id)?))
}

pub async fn create_type(
    State(state): State<Arc<AppState>>,
    auth: AuthContext,
    ApiJson(input): ApiJson<NewActivityType>,
) -> ApiResult<(StatusCode, Json<ActivityType>)> {
    let created = state.db()?.create_activity_type(&auth.tenant_id, &input)?;
    Ok((StatusCode::CREATED, Json(created)))
}

pub async fn update_type(
    State(state): State<Arc<AppState>>,
    auth: AuthContext,
    ApiPath(id): ApiPath<String>,
    ApiJson(patch): ApiJson<ActivityTypePatch>,
) -> ApiResult<Json<ActivityType>> {
    Ok(Json(state.db()?.update_activity_type(&auth.tenant_id, &id, &patch)?))
}

pub async fn delete_type(
    State(state): State<Arc<AppState>>,
    auth: AuthContext,
    ApiPath(id): ApiPath<String>,
) -> ApiResult<Json<serde_json::Value>> {
    state.db()?.delete_activity_type(&auth.tenant_id, &id)?;
    Ok(Json(serde_json::json!({ "ok": true, "id": id })))
}

#[cfg(test)]
mod tests {
    use crate::routes::test_support::*;
    use axum::http::StatusCode;
    use serde_json::json;

    #[tokio::test]
    async fn test_activity_types_catalog() {
        let app = app().await;
        let (status, catalog) = app.call("GET", "/api/activity-types", None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(catalog["items"].as_array().unwrap().len(), 12);

        let (status, created) = app
            .call(
                "POST",
                "/api/activity-types",
                Some(json!({"action": "docs_feedback", "name": "Left docs feedback", "funnelStage": "engagement"})),
            )
            .await;
        assert_eq!(status, StatusCode::CREATED, "{created}");
        let id = created["id"].as_str().unwrap().to_string();

        let (status, _) = app
            .call("POST", "/api/activity-types", Some(json!({"action": "docs_feedback", "name": "Again"})))
            .await;
        assert_eq!(status, StatusCode::CONFLICT);

        let (status, cleared) = app
            .call("PATCH", &format!("/api/activity-types/{id}"), Some(json!({"funnelStage": null})))
            .await;
        assert_eq!(status, StatusCode::OK);
        assert!(cleared["funnelStage"].is_null());

        let (status, _) = app.call("DELETE", &format!("/api/activity-types/{id}"), None).await;
        assert_eq!(status, StatusCode::OK);
    }

    #[tokio::test]
    async fn test_record_and_filter_activities() {
        let app = app().await;
        let (_, dev) = app.call("POST", "/api/developers", Some(json!({"displayName": "Linus"}))).await;
        let dev_id = dev["id"].as_str().unwrap();

        let (status, json) = app
            .call(
                "POST",
                "/api/activities",
                Some(json!({"developerId": dev_id, "action": "unknown_action", "source": "web"})),
            )
            .await;
        assert_eq!(status, StatusCode::BAD_REQUEST, "{json}");

        let (status, _) = app
            .call(
                "POST",
                "/api/activities",
                Some(json!({"developerId": "nobody", "action": "content_view", "source": "web"})),
            )
            .await;
        assert_eq!(status, StatusCode::NOT_FOUND);

        for (action, at) in [("content_view", "2024-01-01T10:00:00Z"), ("pull_request", "2024-02-01T10:00:00Z")] {
            let (status, _) = app
                .call(
                    "POST",
                    "/api/activities",
                    Some(json!({"developerId": dev_id, "action": action, "source": "github", "occurredAt": at})),
                )
                .await;
            assert_eq!(status, StatusCode::CREATED);
        }

        let (_, listed) = app.call("GET", "/api/activities?from=2024-01-15", None).await;
        assert_eq!(listed["pagination"]["total"], 1);
        assert_eq!(listed["items"][0]["action"], "pull_request");

        let (_, ordered) = app.call("GET", "/api/activities?orderBy=occurredAt", None).await;
        assert_eq!(ordered["items"][0]["action"], "content_view");

        // activity type in use cannot be removed
        let (_, catalog) = app.call("GET", "/api/activity-types", None).await;
        let pr_type = catalog["items"]
            .as_array()
            .unwrap()
            .iter()
            .find(|t| t["action"] == "pull_request")
            .unwrap()["id"]
            .as_str()
            .unwrap()
            .to_string();
        let (status, _) = app.call("DELETE", &format!("/api/activity-types/{pr_type}"), None).await;
        assert_eq!(status, StatusCode::CONFLICT);
    }
}
