//! API tokens: bearer credentials for scripts and integrations.
//!
//! The plaintext (`drm_` + 32 random bytes, URL-safe base64) is returned
//! once at creation; only its SHA-256 hex digest is stored.

use crate::db::{conflict_or_db, db_err, new_id, Filter, PlatformDb};
use crate::validation::{check, validate_not_blank};
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine;
use devrel_core::error::{DevRelError, Result};
use devrel_core::types::{self, Page, PageRequest};
use rand::RngCore;
use rusqlite::{params, OptionalExtension};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::fmt;
use std::str::FromStr;
use validator::Validate;

pub const TOKEN_PREFIX: &str = "drm_";
const DISPLAY_PREFIX_LEN: usize = 12;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TokenScope {
    Read,
    Write,
    Ingest,
}

impl TokenScope {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Read => "read",
            Self::Write => "write",
            Self::Ingest => "ingest",
        }
    }
}

impl fmt::Display for TokenScope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for TokenScope {
    type Err = DevRelError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim() {
            "read" => Ok(Self::Read),
            "write" => Ok(Self::Write),
            "ingest" => Ok(Self::Ingest),
            other => Err(DevRelError::validation(format!("unknown token scope '{other}'"))),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TokenStatus {
    Active,
    Revoked,
}

impl FromStr for TokenStatus {
    type Err = DevRelError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "active" => Ok(Self::Active),
            "revoked" => Ok(Self::Revoked),
            other => Err(DevRelError::validation(format!("unknown token status '{other}'"))),
        }
    }
}

impl TokenStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Active => "active",
            Self::Revoked => "revoked",
        }
    }
}

/// Stored token metadata. Carries no hash.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ApiToken {
    pub id: String,
    pub name: String,
    pub token_prefix: String,
    pub scopes: Vec<TokenScope>,
    pub status: TokenStatus,
    pub expires_at: Option<String>,
    pub last_used_at: Option<String>,
    pub created_by: Option<String>,
    pub created_at: String,
    pub revoked_at: Option<String>,
}

impl ApiToken {
    pub fn has_scope(&self, scope: TokenScope) -> bool {
        self.scopes.contains(&scope)
    }
}

/// Returned once from creation.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreatedToken {
    pub token: String,
    #[serde(flatten)]
    pub record: ApiToken,
}

#[derive(Debug, Clone, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct NewApiToken {
    #[validate(length(min = 1, max = 100), custom(function = "validate_not_blank"))]
    pub name: String,
    #[validate(length(min = 1, message = "at least one scope is required"))]
    pub scopes: Vec<TokenScope>,
    pub expires_at: Option<String>,
}

#[derive(Debug, Clone, Default)]
pub struct TokenFilter {
    pub status: Option<TokenStatus>,
    pub page: PageRequest,
}

/// Identity resolved from a bearer token.
#[derive(Debug, Clone)]
pub struct TokenIdentity {
    pub tenant_id: String,
    pub token: ApiToken,
}

pub fn hash_token(plaintext: &str) -> String {
    let digest = Sha256::digest(plaintext.as_bytes());
    digest.iter().map(|b| format!("{b:02x}")).collect()
}

pub fn generate_token() -> String {
    let mut bytes = [0u8; 32];
    rand::rngs::OsRng.fill_bytes(&mut bytes);
    format!("{TOKEN_PREFIX}{}", URL_SAFE_NO_PAD.encode(bytes))
}

pub fn looks_like_api_token(raw: &str) -> bool {
    raw.strip_prefix(TOKEN_PREFIX)
        .is_some_and(|rest| rest.len() == 43 && rest.chars().all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_'))
}

const TOKEN_COLUMNS: &str =
    "id, name, token_prefix, scopes, status, expires_at, last_used_at, created_by, created_at, revoked_at";

fn token_from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<ApiToken> {
    let scopes: String = row.get(3)?;
    let status: String = row.get(4)?;
    Ok(ApiToken {
        id: row.get(0)?,
        name: row.get(1)?,
        token_prefix: row.get(2)?,
        scopes: serde_json::from_str(&scopes).unwrap_or_default(),
        status: status.parse().unwrap_or(TokenStatus::Revoked),
        expires_at: row.get(5)?,
        last_used_at: row.get(6)?,
        created_by: row.get(7)?,
        created_at: row.get(8)?,
        revoked_at: row.get(9)?,
    })
}

impl PlatformDb {
    pub fn create_api_token(&self, tenant_id: &str, created_by: Option<&str>, input: &NewApiToken) -> Result<CreatedToken> {
        check(input)?;
        let expires_at = input.expires_at.as_deref().map(types::parse_timestamp).transpose()?;
        if let Some(at) = &expires_at {
            if at.as_str() <= types::now().as_str() {
                return Err(DevRelError::validation("expiresAt must be in the future"));
            }
        }
        let mut scopes: Vec<TokenScope> = Vec::with_capacity(input.scopes.len());
        for scope in &input.scopes {
            if !scopes.contains(scope) {
                scopes.push(*scope);
            }
        }
        let scopes_json = serde_json::to_string(&scopes)?;

        let token = generate_token();
        let id = new_id();
        self.conn
            .execute(
                "INSERT INTO api_tokens (id, tenant_id, name, token_prefix, token_hash, scopes, expires_at, created_by, created_at)
                 VALUES (?1,?2,?3,?4,?5,?6,?7,?8,?9)",
                params![
                    id,
                    tenant_id,
                    input.name.trim(),
                    &token[..DISPLAY_PREFIX_LEN],
                    hash_token(&token),
                    scopes_json,
                    expires_at,
                    created_by,
                    types::now(),
                ],
            )
            .map_err(conflict_or_db("Insert token", "token collision, retry".into()))?;
        self.log_event(
            tenant_id,
            "token_created",
            "user",
            created_by.unwrap_or("system"),
            Some(&format!("id={id} name={}", input.name.trim())),
        )?;
        tracing::info!("🔑 Created API token '{}' ({})", input.name.trim(), id);
        Ok(CreatedToken {
            token,
            record: self.get_api_token(tenant_id, &id)?,
        })
    }

    pub fn get_api_token(&self, tenant_id: &str, id: &str) -> Result<ApiToken> {
        self.conn
            .query_row(
                &format!("SELECT {TOKEN_COLUMNS} FROM api_tokens WHERE tenant_id=?1 AND id=?2"),
                params![tenant_id, id],
                token_from_row,
            )
            .optional()
            .map_err(db_err("Get token"))?
            .ok_or_else(|| DevRelError::not_found(format!("token {id}")))
    }

    pub fn list_api_tokens(&self, tenant_id: &str, filter: &TokenFilter) -> Result<Page<ApiToken>> {
        let mut f = Filter::tenant("tenant_id", tenant_id);
        f.opt("status = ?", filter.status.map(|s| s.as_str().to_string()));
        let total = self.count("api_tokens", &f)?;
        let sql = format!(
            "SELECT {TOKEN_COLUMNS} FROM api_tokens {} ORDER BY created_at DESC, rowid DESC LIMIT ? OFFSET ?",
            f.sql()
        );
        let mut stmt = self.conn.prepare(&sql).map_err(db_err("Prepare"))?;
        let items = stmt
            .query_map(f.paged_params(filter.page), token_from_row)
            .map_err(db_err("Query tokens"))?
            .collect::<rusqlite::Result<Vec<_>>>()
            .map_err(db_err("Read token"))?;
        Ok(Page::new(items, filter.page, total))
    }

    /// Revoke a token. Unknown, foreign and already revoked ids are a no-op,
    /// so the caller learns nothing about other tenants' tokens.
    pub fn revoke_api_token(&self, tenant_id: &str, id: &str, actor_id: &str) -> Result<()> {
        let changed = self
            .conn
            .execute(
                "UPDATE api_tokens SET status='revoked', revoked_at=?1
                 WHERE tenant_id=?2 AND id=?3 AND status='active'",
                params![types::now(), tenant_id, id],
            )
            .map_err(db_err("Revoke token"))?;
        if changed > 0 {
            self.log_event(tenant_id, "token_revoked", "user", actor_id, Some(&format!("id={id}")))?;
            tracing::info!("🔒 Revoked API token {}", id);
        }
        Ok(())
    }

    /// Resolve a bearer token. Revoked, expired and unknown tokens all fail
    /// with `Unauthorized`. Stamps `last_used_at` on success.
    pub fn authenticate_api_token(&self, plaintext: &str) -> Result<TokenIdentity> {
        let found = self
            .conn
            .query_row(
                &format!("SELECT tenant_id, {TOKEN_COLUMNS} FROM api_tokens WHERE token_hash=?1"),
                params![hash_token(plaintext)],
                |row| {
                    let tenant_id: String = row.get(0)?;
                    let scopes: String = row.get(4)?;
                    let status: String = row.get(5)?;
                    Ok(TokenIdentity {
                        tenant_id,
                        token: ApiToken {
                            id: row.get(1)?,
                            name: row.get(2)?,
                            token_prefix: row.get(3)?,
                            scopes: serde_json::from_str(&scopes).unwrap_or_default(),
                            status: status.parse().unwrap_or(TokenStatus::Revoked),
                            expires_at: row.get(6)?,
                            last_used_at: row.get(7)?,
                            created_by: row.get(8)?,
                            created_at: row.get(9)?,
                            revoked_at: row.get(10)?,
                        },
                    })
                },
            )
            .optional()
            .map_err(db_err("Lookup token"))?;

        let Some(mut identity) = found else {
            return Err(DevRelError::Unauthorized("invalid API token".into()));
        };
        if identity.token.status != TokenStatus::Active {
            return Err(DevRelError::Unauthorized("API token has been revoked".into()));
        }
        let now = types::now();
        if identity.token.expires_at.as_deref().is_some_and(|exp| exp <= now.as_str()) {
            return Err(DevRelError::Unauthorized("API token has expired".into()));
        }
        self.conn
            .execute("UPDATE api_tokens SET last_used_at=?1 WHERE id=?2", params![now, identity.token.id])
            .map_err(db_err("Touch token"))?;
        identity.token.last_used_at = Some(now);
        Ok(identity)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::tests::db_with_tenant;

    fn ci_token() -> NewApiToken {
        NewApiToken {
            name: "CI ingest".into(),
            scopes: vec![TokenScope::Ingest, TokenScope::Read],
            expires_at: None,
        }
    }

    #[test]
    fn test_generated_token_shape() {
        let token = generate_token();
        assert!(token.starts_with("drm_"));
        assert_eq!(token.len(), 4 + 43);
        assert!(looks_like_api_token(&token));
        assert!(!looks_like_api_token("drm_short"));
        assert!(!looks_like_api_token("eyJhbGciOi.jwt.token"));
        assert_ne!(generate_token(), token);
    }

    #[test]
    fn test_hash_is_sha256_hex() {
        assert_eq!(
            hash_token("abc"),
            "ba7816bf8f01cfea414140de5dae2223b00361a396177a9cb410ff61f20015ad"
        );
    }

    #[test]
    fn test_create_and_authenticate() {
        let (db, t) = db_with_tenant();
        let created = db.create_api_token(&t.id, Some("u-1"), &ci_token()).unwrap();
        assert!(created.token.starts_with(&created.record.token_prefix));
        assert_eq!(created.record.status, TokenStatus::Active);

        let json = serde_json::to_value(&created.record).unwrap();
        assert!(json.get("tokenHash").is_none());

        let identity = db.authenticate_api_token(&created.token).unwrap();
        assert_eq!(identity.tenant_id, t.id);
        assert!(identity.token.has_scope(TokenScope::Ingest));
        assert!(!identity.token.has_scope(TokenScope::Write));
        assert!(db.get_api_token(&t.id, &created.record.id).unwrap().last_used_at.is_some());

        assert!(matches!(
            db.authenticate_api_token("drm_nope"),
            Err(DevRelError::Unauthorized(_))
        ));
    }

    #[test]
    fn test_revoke_is_idempotent() {
        let (db, t) = db_with_tenant();
        let other = db.create_tenant("Other", "other").unwrap();
        let created = db.create_api_token(&t.id, Some("u-1"), &ci_token()).unwrap();
        let id = &created.record.id;

        // foreign tenant cannot revoke, but gets no error either
        db.revoke_api_token(&other.id, id, "u-2").unwrap();
        assert_eq!(db.get_api_token(&t.id, id).unwrap().status, TokenStatus::Active);

        db.revoke_api_token(&t.id, id, "u-1").unwrap();
        db.revoke_api_token(&t.id, id, "u-1").unwrap();
        db.revoke_api_token(&t.id, "missing", "u-1").unwrap();
        let token = db.get_api_token(&t.id, id).unwrap();
        assert_eq!(token.status, TokenStatus::Revoked);
        assert!(token.revoked_at.is_some());
        assert!(db.authenticate_api_token(&created.token).is_err());

        let revocations = db
            .recent_events(&t.id, 10)
            .unwrap()
            .into_iter()
            .filter(|e| e.event_type == "token_revoked")
            .count();
        assert_eq!(revocations, 1);
    }

    #[test]
    fn test_validation_and_expiry() {
        let (db, t) = db_with_tenant();
        let no_scopes = NewApiToken {
            scopes: vec![],
            ..ci_token()
        };
        assert!(matches!(db.create_api_token(&t.id, None, &no_scopes), Err(DevRelError::Validation(_))));

        let past = NewApiToken {
            expires_at: Some("2001-01-01T00:00:00Z".into()),
            ..ci_token()
        };
        assert!(db.create_api_token(&t.id, None, &past).is_err());

        let created = db.create_api_token(&t.id, None, &ci_token()).unwrap();
        db.conn
            .execute(
                "UPDATE api_tokens SET expires_at='2001-01-01T00:00:00.000Z' WHERE id=?1",
                params![created.record.id],
            )
            .unwrap();
        assert!(matches!(
            db.authenticate_api_token(&created.token),
            Err(DevRelError::Unauthorized(_))
        ));
    }

    #[test]
    fn test_list_filters_status() {
        let (db, t) = db_with_tenant();
        let a = db.create_api_token(&t.id, None, &ci_token()).unwrap();
        db.create_api_token(&t.id, None, &ci_token()).unwrap();
        db.revoke_api_token(&t.id, &a.record.id, "u-1").unwrap();

        let active = db
            .list_api_tokens(
                &t.id,
                &TokenFilter {
                    status: Some(TokenStatus::Active),
                    ..Default::default()
                },
            )
            .unwrap();
        assert_eq!(active.pagination.total, 1);
        assert_eq!(db.list_api_tokens(&t.id, &TokenFilter::default()).unwrap().pagination.total, 2);
    }
}
