//! Tenant settings, members and the audit log.

use crate::auth::{AuthContext, Principal, SessionAuth};
use crate::error::{ApiError, ApiResult};
use crate::extract::{ApiJson, ApiQuery};
use crate::server::AppState;
use axum::extract::State;
use axum::Json;
use devrel_platform::db::{AuditEntry, Tenant, User};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

const AUDIT_DEFAULT: usize = 50;
const AUDIT_MAX: usize = 200;

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SettingsView {
    pub tenant: Tenant,
    pub users: Vec<User>,
}

#[derive(Debug, Deserialize)]
pub struct SettingsUpdate {
    pub name: String,
}

#[derive(Debug, Deserialize)]
pub struct AuditQuery {
    pub limit: Option<usize>,
}

pub async fn get(State(state): State<Arc<AppState>>, auth: AuthContext) -> ApiResult<Json<SettingsView>> {
    let db = state.db()?;
    Ok(Json(SettingsView {
        tenant: db.get_tenant(&auth.tenant_id)?,
        users: db.list_users(&auth.tenant_id)?,
    }))
}

/// Rename the tenant. Owners and admins only.
pub async fn update(
    State(state): State<Arc<AppState>>,
    SessionAuth(auth): SessionAuth,
    ApiJson(input): ApiJson<SettingsUpdate>,
) -> ApiResult<Json<SettingsView>> {
    let Principal::User { role, .. } = &auth.principal else {
        return Err(ApiError::forbidden("this endpoint requires a signed-in user"));
    };
    if !matches!(role.as_str(), "owner" | "admin") {
        return Err(ApiError::forbidden("only owners and admins can change settings"));
    }
    let db = state.db()?;
    let tenant = db.rename_tenant(&auth.tenant_id, &input.name)?;
    db.log_event(&auth.tenant_id, "settings_updated", auth.actor_type(), auth.actor_id(), Some(tenant.name.as_str()))?;
    Ok(Json(SettingsView {
        tenant,
        users: db.list_users(&auth.tenant_id)?,
    }))
}

pub async fn users(State(state): State<Arc<AppState>>, auth: AuthContext) -> ApiResult<Json<serde_json::Value>> {
    let users = state.db()?.list_users(&auth.tenant_id)?;
    Ok(Json(serde_json::json!({ "items": users })))
}

pub async fn audit_log(
    State(state): State<Arc<AppState>>,
    SessionAuth(auth): SessionAuth,
    ApiQuery(q): ApiQuery<AuditQuery>,
) -> ApiResult<Json<serde_json::Value>> {
    let limit = match q.limit {
        None => AUDIT_DEFAULT,
        Some(n) if (1..=AUDIT_MAX).contains(&n) => n,
        Some(_) => return Err(ApiError::bad_request(format!("limit must be between 1 and {AUDIT_MAX}"))),
    };
    let entries: Vec<AuditEntry> = state.db()?.recent_events(&auth.tenant_id, limit)?;
    Ok(Json(serde_json::json!({ "items": entries })))
}
