//! API token management. Session only: a token cannot mint or revoke tokens.

use super::{list as list_body, ListResponse};
use crate::auth::SessionAuth;
use crate::error::ApiResult;
use crate::extract::{ApiJson, ApiPath, ApiQuery, Paging};
use crate::server::AppState;
use axum::extract::State;
use axum::http::StatusCode;
use axum::Json;
use devrel_platform::tokens::{ApiToken, CreatedToken, NewApiToken, TokenFilter, TokenStatus};
use serde::Deserialize;
use std::sync::Arc;

#[derive(Debug, Deserialize)]
pub struct TokenQuery {
    pub status: Option<TokenStatus>,
}

pub async fn list(
    State(state): State<Arc<AppState>>,
    SessionAuth(auth): SessionAuth,
    Paging(page): Paging,
    ApiQuery(q): ApiQuery<TokenQuery>,
) -> ApiResult<Json<ListResponse<ApiToken>>> {
    let filter = TokenFilter { status: q.status, page };
    Ok(list_body(state.db()?.list_api_tokens(&auth.tenant_id, &filter)?))
}

/// The plaintext token is only ever part of this response.
pub async fn create(
    State(state): State<Arc<AppState>>,
    SessionAuth(auth): SessionAuth,
    ApiJson(input): ApiJson<NewApiToken>,
) -> ApiResult<(StatusCode, Json<CreatedToken>)> {
    let created = state.db()?.create_api_token(&auth.tenant_id, Some(auth.actor_id()), &input)?;
    Ok((StatusCode::CREATED, Json(created)))
}

pub async fn get_one(
    State(state): State<Arc<AppState>>,
    SessionAuth(auth): SessionAuth,
    ApiPath(id): ApiPath<String>,
) -> ApiResult<Json<ApiToken>> {
    Ok(Json(state.db()?.get_api_token(&auth.tenant_id, &id)?))
}

/// Idempotent: revoking twice, or an id this tenant does not own, succeeds.
pub async fn revoke(
    State(state): State<Arc<AppState>>,
    SessionAuth(auth): SessionAuth,
    ApiPath(id): ApiPath<String>,
) -> ApiResult<Json<serde_json::Value>> {
    state.db()?.revoke_api_token(&auth.tenant_id, &id, auth.actor_id())?;
    Ok(Json(serde_json::json!({ "ok": true, "id": id })))
}

#[cfg(test)]
mod tests {
    use crate::routes::test_support::*;
    use axum::http::StatusCode;
    use devrel_platform::tokens::TokenScope;
    use serde_json::json;

    #[tokio::test]
    async fn test_token_lifecycle() {
        let app = app().await;
        let (status, created) = app
            .call("POST", "/api/tokens", Some(json!({"name": "CI", "scopes": ["read", "read", "ingest"]})))
            .await;
        assert_eq!(status, StatusCode::CREATED, "{created}");
        let plaintext = created["token"].as_str().unwrap().to_string();
        assert!(plaintext.starts_with("drm_"));
        assert_eq!(created["scopes"], json!(["read", "ingest"]));
        let id = created["id"].as_str().unwrap().to_string();

        let (status, fetched) = app.call("GET", &format!("/api/tokens/{id}"), None).await;
        assert_eq!(status, StatusCode::OK);
        assert!(fetched.get("token").is_none());
        assert!(fetched.get("tokenHash").is_none());
        assert_eq!(fetched["status"], "active");

        let (status, _) = app.bearer("GET", "/api/campaigns", &plaintext, None).await;
        assert_eq!(status, StatusCode::OK);

        for _ in 0..2 {
            let (status, json) = app.call("DELETE", &format!("/api/tokens/{id}"), None).await;
            assert_eq!(status, StatusCode::OK);
            assert_eq!(json["ok"], true);
        }
        let (_, fetched) = app.call("GET", &format!("/api/tokens/{id}"), None).await;
        assert_eq!(fetched["status"], "revoked");
        assert!(fetched["revokedAt"].is_string());

        let (status, json) = app.bearer("GET", "/api/campaigns", &plaintext, None).await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);
        assert_eq!(json["code"], "UNAUTHORIZED");

        let (status, _) = app.call("DELETE", "/api/tokens/does-not-exist", None).await;
        assert_eq!(status, StatusCode::OK);

        let (_, revoked) = app.call("GET", "/api/tokens?status=revoked", None).await;
        assert_eq!(revoked["pagination"]["total"], 1);
    }

    #[tokio::test]
    async fn test_tokens_cannot_manage_tokens() {
        let app = app().await;
        let token = app.token(&[TokenScope::Read, TokenScope::Write]).await;
        let (status, json) = app.bearer("GET", "/api/tokens", &token, None).await;
        assert_eq!(status, StatusCode::FORBIDDEN);
        assert_eq!(json["code"], "FORBIDDEN");
        let (status, _) = app
            .bearer("POST", "/api/tokens", &token, Some(json!({"name": "child", "scopes": ["write"]})))
            .await;
        assert_eq!(status, StatusCode::FORBIDDEN);
    }

    #[tokio::test]
    async fn test_token_validation() {
        let app = app().await;
        let (status, _) = app.call("POST", "/api/tokens", Some(json!({"name": "none", "scopes": []}))).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        let (status, _) = app
            .call("POST", "/api/tokens", Some(json!({"name": "bad", "scopes": ["admin"]})))
            .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        let (status, _) = app
            .call(
                "POST",
                "/api/tokens",
                Some(json!({"name": "old", "scopes": ["read"], "expiresAt": "2001-01-01T00:00:00Z"})),
            )
            .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        let (status, _) = app.bearer("GET", "/api/campaigns", "drm_not-a-real-token", None).await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);
    }
}
