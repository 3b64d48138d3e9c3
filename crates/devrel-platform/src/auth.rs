//! Session authentication: JWT cookies and bcrypt passwords.

use crate::db::{db_err, PlatformDb, Tenant, User};
use devrel_core::error::{DevRelError, Result};
use jsonwebtoken::{decode, encode, Algorithm, DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};

const BCRYPT_COST: u32 = 12;
pub const MIN_PASSWORD_LENGTH: usize = 8;

/// JWT claims.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Claims {
    pub sub: String, // user ID
    pub tenant_id: String,
    pub email: String,
    pub role: String,
    pub exp: usize,
}

/// Generate a session JWT for `user`.
pub fn create_token(user: &User, secret: &str, ttl_hours: i64) -> Result<String> {
    let expiration = chrono::Utc::now()
        .checked_add_signed(chrono::Duration::hours(ttl_hours))
        .ok_or_else(|| DevRelError::Auth("session lifetime out of range".into()))?
        .timestamp() as usize;

    let claims = Claims {
        sub: user.id.clone(),
        tenant_id: user.tenant_id.clone(),
        email: user.email.clone(),
        role: user.role.clone(),
        exp: expiration,
    };

    encode(&Header::default(), &claims, &EncodingKey::from_secret(secret.as_bytes()))
        .map_err(|e| DevRelError::Auth(format!("Token creation failed: {e}")))
}

/// Validate and decode a session JWT.
pub fn validate_token(token: &str, secret: &str) -> Result<Claims> {
    let validation = Validation::new(Algorithm::HS256);
    decode::<Claims>(token, &DecodingKey::from_secret(secret.as_bytes()), &validation)
        .map(|data| data.claims)
        .map_err(|e| DevRelError::Unauthorized(format!("Token validation failed: {e}")))
}

/// Hash a password using bcrypt.
pub fn hash_password(password: &str) -> Result<String> {
    bcrypt::hash(password, BCRYPT_COST).map_err(|e| DevRelError::Auth(format!("Hash error: {e}")))
}

/// Verify a password against a bcrypt hash.
pub fn verify_password(password: &str, hash: &str) -> bool {
    bcrypt::verify(password, hash).unwrap_or(false)
}

impl PlatformDb {
    /// Account and password hash for a sign-in attempt. Unknown emails fail
    /// the same way wrong passwords do.
    pub fn login_account(&self, email: &str) -> Result<(User, String)> {
        self.get_user_by_email(email)?.ok_or_else(|| {
            tracing::warn!("Login failed for unknown email");
            DevRelError::Unauthorized("invalid email or password".into())
        })
    }

    /// Record the outcome of a password check made outside the store.
    pub fn complete_login(&self, user: &User, verified: bool) -> Result<User> {
        if !verified {
            self.log_event(&user.tenant_id, "login_failed", "user", &user.id, None)?;
            tracing::warn!("Login failed for user {}", user.id);
            return Err(DevRelError::Unauthorized("invalid email or password".into()));
        }
        self.touch_login(&user.id)?;
        self.log_event(&user.tenant_id, "login_success", "user", &user.id, None)?;
        self.get_user(&user.tenant_id, &user.id)
    }

    /// Check credentials in one call.
    pub fn login(&self, email: &str, password: &str) -> Result<User> {
        let (user, hash) = self.login_account(email)?;
        self.complete_login(&user, verify_password(password, &hash))
    }

    /// Create a tenant with its owner account.
    pub fn bootstrap_tenant(
        &self,
        name: &str,
        slug: &str,
        owner_email: &str,
        owner_password: &str,
    ) -> Result<(Tenant, User)> {
        if owner_password.len() < MIN_PASSWORD_LENGTH {
            return Err(DevRelError::validation(format!(
                "password must be at least {MIN_PASSWORD_LENGTH} characters"
            )));
        }
        let hash = hash_password(owner_password)?;
        // Rolled back on drop unless every step succeeds.
        let tx = self.conn.unchecked_transaction().map_err(db_err("Begin bootstrap"))?;
        let tenant = self.create_tenant(name, slug)?;
        let owner = self.create_user(&tenant.id, owner_email, &hash, "Owner", "owner")?;
        self.log_event(&tenant.id, "tenant_created", "system", "cli", Some(&format!("owner={}", owner.email)))?;
        tx.commit().map_err(db_err("Commit bootstrap"))?;
        Ok((tenant, owner))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::tests::temp_db;

    fn user() -> User {
        User {
            id: "user-1".into(),
            tenant_id: "tenant-1".into(),
            email: "admin@test.com".into(),
            display_name: "Admin".into(),
            role: "admin".into(),
            last_login_at: None,
            created_at: devrel_core::types::now(),
        }
    }

    #[test]
    fn test_jwt_roundtrip() {
        let secret = "test-secret-key-devrel";
        let token = create_token(&user(), secret, 24).unwrap();
        let claims = validate_token(&token, secret).unwrap();
        assert_eq!(claims.sub, "user-1");
        assert_eq!(claims.tenant_id, "tenant-1");
        assert_eq!(claims.email, "admin@test.com");
        assert_eq!(claims.role, "admin");
        assert!(validate_token(&token, "another-secret-key").is_err());
    }

    #[test]
    fn test_invalid_token() {
        let result = validate_token("invalid.token.here", "secret");
        assert!(matches!(result, Err(DevRelError::Unauthorized(_))));
    }

    #[test]
    fn test_expired_token() {
        let secret = "test-secret-key-devrel";
        let token = create_token(&user(), secret, -2).unwrap();
        assert!(validate_token(&token, secret).is_err());
    }

    #[test]
    fn test_password_hash() {
        let hash = hash_password("MySecurePassword123!").unwrap();
        assert!(verify_password("MySecurePassword123!", &hash));
        assert!(!verify_password("WrongPassword", &hash));
    }

    #[test]
    fn test_bootstrap_and_login() {
        let db = temp_db();
        let (tenant, owner) = db.bootstrap_tenant("Acme", "acme", "owner@acme.dev", "correct-horse").unwrap();
        assert_eq!(owner.role, "owner");
        assert_eq!(owner.tenant_id, tenant.id);

        let logged_in = db.login("OWNER@acme.dev", "correct-horse").unwrap();
        assert!(logged_in.last_login_at.is_some());
        assert!(matches!(db.login("owner@acme.dev", "nope"), Err(DevRelError::Unauthorized(_))));
        assert!(matches!(db.login("ghost@acme.dev", "x"), Err(DevRelError::Unauthorized(_))));
        assert!(db.bootstrap_tenant("B", "b", "b@b.dev", "short").is_err());

        let kinds: Vec<String> = db.recent_events(&tenant.id, 10).unwrap().into_iter().map(|e| e.event_type).collect();
        assert!(kinds.contains(&"login_success".to_string()));
        assert!(kinds.contains(&"login_failed".to_string()));
    }

    #[test]
    fn test_bootstrap_is_all_or_nothing() {
        let db = temp_db();
        db.bootstrap_tenant("Acme", "acme", "owner@acme.dev", "correct-horse").unwrap();

        let reused = db.bootstrap_tenant("Acme Two", "acme-two", "owner@acme.dev", "correct-horse");
        assert!(matches!(reused, Err(DevRelError::Conflict(_))));
        assert!(matches!(db.get_tenant_by_slug("acme-two"), Err(DevRelError::NotFound(_))));

        let (tenant, owner) = db
            .bootstrap_tenant("Acme Two", "acme-two", "second@acme.dev", "correct-horse")
            .unwrap();
        assert_eq!(owner.tenant_id, tenant.id);
        assert!(!db.list_activity_types(&tenant.id).unwrap().is_empty());
    }
}
