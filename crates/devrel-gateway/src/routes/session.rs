//! Sign in, sign out, current user.

use crate::auth::{AuthContext, Principal};
use crate::error::{ApiError, ApiResult};
use crate::extract::ApiJson;
use crate::server::AppState;
use axum::extract::State;
use axum::http::header;
use axum::response::{AppendHeaders, IntoResponse};
use axum::Json;
use devrel_core::config::AuthConfig;
use devrel_platform::auth::{create_token, verify_password};
use serde::Deserialize;
use std::sync::Arc;

#[derive(Debug, Deserialize)]
pub struct LoginRequest {
    pub email: String,
    pub password: String,
}

fn session_cookie(auth: &AuthConfig, value: &str, max_age_secs: i64) -> String {
    let mut cookie = format!(
        "{}={}; HttpOnly; Path=/; SameSite=Lax; Max-Age={}",
        auth.cookie_name, value, max_age_secs
    );
    if auth.secure_cookie {
        cookie.push_str("; Secure");
    }
    cookie
}

pub async fn login(
    State(state): State<Arc<AppState>>,
    ApiJson(req): ApiJson<LoginRequest>,
) -> ApiResult<impl IntoResponse> {
    if req.email.trim().is_empty() || req.password.is_empty() {
        return Err(ApiError::bad_request("email and password are required"));
    }
    let (account, hash) = state.db()?.login_account(&req.email)?;
    let password = req.password;
    // bcrypt runs off the runtime and without the store lock.
    let verified = tokio::task::spawn_blocking(move || verify_password(&password, &hash))
        .await
        .map_err(|e| ApiError::internal(format!("password check aborted: {e}")))?;
    let user = state.db()?.complete_login(&account, verified)?;
    let auth = &state.config.auth;
    let jwt = create_token(&user, &auth.jwt_secret, auth.session_ttl_hours)?;
    tracing::info!("🔐 User {} signed in", user.id);

    let cookie = session_cookie(auth, &jwt, auth.session_ttl_hours * 3600);
    Ok((AppendHeaders([(header::SET_COOKIE, cookie)]), Json(serde_json::json!({ "user": user }))))
}

pub async fn logout(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    let cookie = session_cookie(&state.config.auth, "", 0);
    (AppendHeaders([(header::SET_COOKIE, cookie)]), Json(serde_json::json!({ "ok": true })))
}

pub async fn me(State(state): State<Arc<AppState>>, auth: AuthContext) -> ApiResult<Json<serde_json::Value>> {
    let db = state.db()?;
    let tenant = db.get_tenant(&auth.tenant_id)?;
    let body = match &auth.principal {
        Principal::User { id, .. } => serde_json::json!({
            "user": db.get_user(&auth.tenant_id, id)?,
            "tenant": tenant,
        }),
        Principal::Token { id, scopes } => serde_json::json!({
            "token": { "id": id, "scopes": scopes },
            "tenant": tenant,
        }),
    };
    Ok(Json(body))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::routes::test_support::*;
    use crate::routes::test_support::login;
    use axum::body::Body;
    use axum::http::{Request, StatusCode};

    #[test]
    fn test_session_cookie_flags() {
        let mut auth = AuthConfig::default();
        assert_eq!(
            session_cookie(&auth, "jwt", 60),
            "drm_session=jwt; HttpOnly; Path=/; SameSite=Lax; Max-Age=60"
        );
        auth.secure_cookie = true;
        assert!(session_cookie(&auth, "jwt", 60).ends_with("; Secure"));
    }

    #[tokio::test]
    async fn test_login_and_me() {
        let app = app().await;
        assert!(app.session.starts_with("drm_session="));
        let (status, json) = app.call("GET", "/api/auth/me", None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(json["user"]["email"], "owner@acme.dev");
        assert_eq!(json["tenant"]["slug"], "acme");
        assert!(json["user"].get("passwordHash").is_none());
    }

    #[tokio::test]
    async fn test_bad_credentials_and_missing_auth() {
        let app = app().await;
        let (status, json, _) = send_raw(
            &app.router,
            Request::post("/api/auth/login")
                .header(header::CONTENT_TYPE, "application/json")
                .body(Body::from(r#"{"email":"owner@acme.dev","password":"wrong"}"#))
                .unwrap(),
        )
        .await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);
        assert_eq!(json["code"], "UNAUTHORIZED");

        let (status, json, _) = send_raw(
            &app.router,
            Request::post("/api/auth/login")
                .header(header::CONTENT_TYPE, "application/json")
                .body(Body::from("{not json"))
                .unwrap(),
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(json["code"], "VALIDATION_ERROR");

        let (status, _, _) = send_raw(&app.router, Request::get("/api/campaigns").body(Body::empty()).unwrap()).await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);

        let (status, _) = app
            .call_with("GET", "/api/campaigns", None, header::COOKIE, "drm_session=forged.jwt.value")
            .await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_login_does_not_hold_the_store() {
        let app = app().await;
        let reference_hash = devrel_platform::auth::hash_password(PASSWORD).unwrap();
        let started = std::time::Instant::now();
        assert!(verify_password(PASSWORD, &reference_hash));
        let bcrypt_time = started.elapsed();

        let router = app.router.clone();
        let login_task = tokio::spawn(async move { login(&router, "owner@acme.dev").await });
        tokio::time::sleep(std::time::Duration::from_millis(20)).await;

        let started = std::time::Instant::now();
        let (status, _) = app.call("GET", "/api/campaigns", None).await;
        let elapsed = started.elapsed();
        assert_eq!(status, StatusCode::OK);
        assert!(
            elapsed < bcrypt_time / 2,
            "list took {elapsed:?} while a login was verifying (bcrypt {bcrypt_time:?})"
        );
        login_task.await.unwrap();
    }

    #[tokio::test]
    async fn test_logout_clears_cookie() {
        let app = app().await;
        let (_, _, headers) = send_raw(&app.router, Request::post("/api/auth/logout").body(Body::empty()).unwrap()).await;
        let cookie = headers.get(header::SET_COOKIE).unwrap().to_str().unwrap();
        assert!(cookie.starts_with("drm_session=;"));
        assert!(cookie.contains("Max-Age=0"));
    }
}
