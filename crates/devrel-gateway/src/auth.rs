//! Request authentication: session cookie or `Authorization: Bearer`.
//!
//! A bearer value is either a session JWT or an API token (`drm_...`).
//! API tokens are checked against the route's required scope; session
//! users hold every scope.

use crate::error::{ApiError, ApiResult};
use crate::server::AppState;
use axum::extract::FromRequestParts;
use axum::http::request::Parts;
use axum::http::{header, Method};
use devrel_core::DevRelError;
use devrel_platform::auth::validate_token;
use devrel_platform::tokens::{looks_like_api_token, TokenScope};
use std::sync::Arc;

#[derive(Debug, Clone)]
pub enum Principal {
    User { id: String, email: String, role: String },
    Token { id: String, scopes: Vec<TokenScope> },
}

#[derive(Debug, Clone)]
pub struct AuthContext {
    pub tenant_id: String,
    pub principal: Principal,
}

impl AuthContext {
    pub fn actor_id(&self) -> &str {
        match &self.principal {
            Principal::User { id, .. } | Principal::Token { id, .. } => id,
        }
    }

    pub fn actor_type(&self) -> &'static str {
        match self.principal {
            Principal::User { .. } => "user",
            Principal::Token { .. } => "token",
        }
    }

    pub fn is_session(&self) -> bool {
        matches!(self.principal, Principal::User { .. })
    }

    pub fn allows(&self, scope: TokenScope) -> bool {
        match &self.principal {
            Principal::User { .. } => true,
            Principal::Token { scopes, .. } => scopes.contains(&scope),
        }
    }
}

/// Scope an API token needs for this request.
fn required_scopes(method: &Method, path: &str) -> &'static [TokenScope] {
    if matches!(*method, Method::GET | Method::HEAD) {
        return &[TokenScope::Read];
    }
    let segments: Vec<&str> = path.trim_matches('/').split('/').collect();
    let is_ingest = *method == Method::POST && matches!(segments.as_slice(), ["api", "plugins", _, "events"]);
    if is_ingest {
        &[TokenScope::Ingest, TokenScope::Write]
    } else {
        &[TokenScope::Write]
    }
}

/// Value of cookie `name` from the `Cookie` header.
pub fn cookie_value<'a>(parts: &'a Parts, name: &str) -> Option<&'a str> {
    parts
        .headers
        .get_all(header::COOKIE)
        .iter()
        .filter_map(|v| v.to_str().ok())
        .flat_map(|v| v.split(';'))
        .filter_map(|pair| pair.trim().split_once('='))
        .find(|(k, _)| *k == name)
        .map(|(_, v)| v)
}

fn bearer(parts: &Parts) -> Option<&str> {
    parts
        .headers
        .get(header::AUTHORIZATION)?
        .to_str()
        .ok()?
        .strip_prefix("Bearer ")
        .map(str::trim)
        .filter(|t| !t.is_empty())
}

fn session_context(state: &AppState, jwt: &str) -> ApiResult<AuthContext> {
    let claims = validate_token(jwt, &state.config.auth.jwt_secret)
        .map_err(|_| ApiError::unauthorized("invalid or expired session"))?;
    let user = state
        .db()?
        .get_user(&claims.tenant_id, &claims.sub)
        .map_err(|e| match e {
            DevRelError::NotFound(_) => ApiError::unauthorized("session user no longer exists"),
            other => other.into(),
        })?;
    Ok(AuthContext {
        tenant_id: user.tenant_id,
        principal: Principal::User {
            id: user.id,
            email: user.email,
            role: user.role,
        },
    })
}

fn resolve(parts: &Parts, state: &AppState) -> ApiResult<AuthContext> {
    if let Some(value) = bearer(parts) {
        if !looks_like_api_token(value) {
            return session_context(state, value);
        }
        let identity = state.db()?.authenticate_api_token(value)?;
        let ctx = AuthContext {
            tenant_id: identity.tenant_id,
            principal: Principal::Token {
                id: identity.token.id,
                scopes: identity.token.scopes,
            },
        };
        let needed = required_scopes(&parts.method, parts.uri.path());
        if !needed.iter().any(|s| ctx.allows(*s)) {
            tracing::warn!("Token {} lacks scope for {} {}", ctx.actor_id(), parts.method, parts.uri.path());
            return Err(ApiError::forbidden(format!("API token requires the '{}' scope", needed[0])));
        }
        return Ok(ctx);
    }
    match cookie_value(parts, &state.config.auth.cookie_name) {
        Some(jwt) => session_context(state, jwt),
        None => Err(ApiError::unauthorized("authentication required")),
    }
}

impl FromRequestParts<Arc<AppState>> for AuthContext {
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, state: &Arc<AppState>) -> Result<Self, Self::Rejection> {
        resolve(parts, state)
    }
}

/// Authenticated by session only; API tokens are refused.
pub struct SessionAuth(pub AuthContext);

impl FromRequestParts<Arc<AppState>> for SessionAuth {
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, state: &Arc<AppState>) -> Result<Self, Self::Rejection> {
        let ctx = resolve(parts, state)?;
        if !ctx.is_session() {
            return Err(ApiError::forbidden("this endpoint requires a signed-in user"));
        }
        Ok(Self(ctx))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::Request;

    fn parts(method: Method, uri: &str, cookie: Option<&str>) -> Parts {
        let mut builder = Request::builder().method(method).uri(uri);
        if let Some(c) = cookie {
            builder = builder.header(header::COOKIE, c);
        }
        builder.body(()).unwrap().into_parts().0
    }

    #[test]
    fn test_required_scopes() {
        assert_eq!(required_scopes(&Method::GET, "/api/campaigns"), &[TokenScope::Read]);
        assert_eq!(
            required_scopes(&Method::POST, "/api/plugins/p1/events"),
            &[TokenScope::Ingest, TokenScope::Write]
        );
        assert_eq!(required_scopes(&Method::POST, "/api/plugins/p1/events/reprocess"), &[TokenScope::Write]);
        assert_eq!(required_scopes(&Method::DELETE, "/api/campaigns/c1"), &[TokenScope::Write]);
    }

    #[test]
    fn test_cookie_value() {
        let p = parts(Method::GET, "/api/auth/me", Some("theme=dark; drm_session=abc.def.ghi"));
        assert_eq!(cookie_value(&p, "drm_session"), Some("abc.def.ghi"));
        assert_eq!(cookie_value(&p, "missing"), None);
    }
}
