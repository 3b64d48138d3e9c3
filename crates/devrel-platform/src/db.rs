//! Platform database: SQLite schema and tenant, user and audit records.
//!
//! Every table carries `tenant_id` and every query filters on it; the
//! entity modules add their own `impl PlatformDb` blocks on top of this.

use devrel_core::error::{DevRelError, Result};
use devrel_core::types::{self, PageRequest};
use rusqlite::types::Value;
use rusqlite::{params, Connection, OptionalExtension};
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Platform database manager.
pub struct PlatformDb {
    pub(crate) conn: Connection,
}

/// Tenant record.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Tenant {
    pub id: String,
    pub name: String,
    pub slug: String,
    pub created_at: String,
}

/// User record. The password hash never leaves the store.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct User {
    pub id: String,
    pub tenant_id: String,
    pub email: String,
    pub display_name: String,
    pub role: String,
    pub last_login_at: Option<String>,
    pub created_at: String,
}

/// Audit log entry.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AuditEntry {
    pub id: i64,
    pub event_type: String,
    pub actor_type: String,
    pub actor_id: String,
    pub details: Option<String>,
    pub created_at: String,
}

pub const ROLES: [&str; 3] = ["owner", "admin", "member"];

pub(crate) fn db_err(context: &str) -> impl FnOnce(rusqlite::Error) -> DevRelError + '_ {
    move |e| DevRelError::database(format!("{context}: {e}"))
}

pub(crate) fn new_id() -> String {
    uuid::Uuid::new_v4().to_string()
}

/// Maps a unique-constraint violation to `Conflict`, anything else to `Database`.
pub(crate) fn conflict_or_db(context: &str, conflict: String) -> impl FnOnce(rusqlite::Error) -> DevRelError + '_ {
    move |e| match e {
        rusqlite::Error::SqliteFailure(err, _)
            if err.code == rusqlite::ErrorCode::ConstraintViolation =>
        {
            DevRelError::Conflict(conflict)
        }
        other => DevRelError::database(format!("{context}: {other}")),
    }
}

/// Incrementally built `WHERE` clause with positional parameters.
pub(crate) struct Filter {
    clauses: Vec<String>,
    values: Vec<Value>,
}

impl Filter {
    /// Start with the tenant restriction on `column`.
    pub(crate) fn tenant(column: &str, tenant_id: &str) -> Self {
        Self {
            clauses: vec![format!("{column} = ?")],
            values: vec![Value::from(tenant_id.to_string())],
        }
    }

    /// Add a clause containing exactly one `?`.
    pub(crate) fn push(&mut self, clause: impl Into<String>, value: impl Into<Value>) -> &mut Self {
        self.clauses.push(clause.into());
        self.values.push(value.into());
        self
    }

    /// Add a clause with no parameters.
    pub(crate) fn raw(&mut self, clause: impl Into<String>) -> &mut Self {
        self.clauses.push(clause.into());
        self
    }

    pub(crate) fn opt(&mut self, clause: &str, value: Option<impl Into<Value>>) -> &mut Self {
        if let Some(v) = value {
            self.push(clause, v);
        }
        self
    }

    /// Case-insensitive substring match over any of `columns`.
    pub(crate) fn search(&mut self, columns: &[&str], term: Option<&str>) -> &mut Self {
        let Some(term) = term.map(str::trim).filter(|t| !t.is_empty()) else {
            return self;
        };
        let pattern = format!("%{}%", escape_like(term));
        let ors: Vec<String> = columns
            .iter()
            .map(|c| format!("{c} LIKE ? ESCAPE '\\'"))
            .collect();
        self.clauses.push(format!("({})", ors.join(" OR ")));
        for _ in columns {
            self.values.push(Value::from(pattern.clone()));
        }
        self
    }

    pub(crate) fn sql(&self) -> String {
        format!("WHERE {}", self.clauses.join(" AND "))
    }

    pub(crate) fn params(&self) -> rusqlite::ParamsFromIter<std::slice::Iter<'_, Value>> {
        rusqlite::params_from_iter(self.values.iter())
    }

    /// Parameters followed by `LIMIT ? OFFSET ?` values.
    pub(crate) fn paged_params(&self, page: PageRequest) -> rusqlite::ParamsFromIter<Vec<Value>> {
        let mut values = self.values.clone();
        values.push(Value::from(page.limit as i64));
        values.push(Value::from(page.offset() as i64));
        rusqlite::params_from_iter(values)
    }
}

fn escape_like(term: &str) -> String {
    let mut out = String::with_capacity(term.len());
    for c in term.chars() {
        if matches!(c, '%' | '_' | '\\') {
            out.push('\\');
        }
        out.push(c);
    }
    out
}

/// Patch fields where an explicit `null` clears the stored value:
/// absent → `None`, `null` → `Some(None)`, value → `Some(Some(v))`.
pub(crate) mod double_option {
    use serde::{Deserialize, Deserializer};

    pub fn deserialize<'de, T, D>(deserializer: D) -> Result<Option<Option<T>>, D::Error>
    where
        T: Deserialize<'de>,
        D: Deserializer<'de>,
    {
        Option::<T>::deserialize(deserializer).map(Some)
    }
}

/// Split a slug-like name out of free text: lowercase alphanumerics and dashes.
pub fn slugify(name: &str) -> String {
    let mut slug = String::new();
    for c in name.trim().chars() {
        if c.is_ascii_alphanumeric() {
            slug.push(c.to_ascii_lowercase());
        } else if !slug.ends_with('-') && !slug.is_empty() {
            slug.push('-');
        }
    }
    slug.trim_end_matches('-').to_string()
}

impl PlatformDb {
    /// Open or create the platform database.
    pub fn open(path: &Path) -> Result<Self> {
        let conn = Connection::open(path).map_err(db_err("DB open"))?;
        let db = Self { conn };
        db.migrate()?;
        Ok(db)
    }

    pub fn open_in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory().map_err(db_err("DB open"))?;
        let db = Self { conn };
        db.migrate()?;
        Ok(db)
    }

    /// Run schema migrations.
    fn migrate(&self) -> Result<()> {
        self.conn
            .execute_batch(
                "
            PRAGMA foreign_keys = ON;

            CREATE TABLE IF NOT EXISTS tenants (
                id TEXT PRIMARY KEY,
                name TEXT NOT NULL,
                slug TEXT UNIQUE NOT NULL,
                created_at TEXT NOT NULL
            );

            CREATE TABLE IF NOT EXISTS users (
                id TEXT PRIMARY KEY,
                tenant_id TEXT NOT NULL REFERENCES tenants(id),
                email TEXT UNIQUE NOT NULL,
                password_hash TEXT NOT NULL,
                display_name TEXT NOT NULL,
                role TEXT NOT NULL DEFAULT 'member',
                last_login_at TEXT,
                created_at TEXT NOT NULL
            );

            CREATE TABLE IF NOT EXISTS audit_log (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                tenant_id TEXT NOT NULL,
                event_type TEXT NOT NULL,
                actor_type TEXT NOT NULL,
                actor_id TEXT NOT NULL,
                details TEXT,
                created_at TEXT NOT NULL
            );

            CREATE TABLE IF NOT EXISTS campaigns (
                id TEXT PRIMARY KEY,
                tenant_id TEXT NOT NULL REFERENCES tenants(id),
                name TEXT NOT NULL,
                description TEXT,
                channel TEXT,
                status TEXT NOT NULL DEFAULT 'draft',
                start_date TEXT,
                end_date TEXT,
                budget REAL NOT NULL DEFAULT 0,
                created_at TEXT NOT NULL,
                updated_at TEXT NOT NULL,
                deleted_at TEXT
            );
            CREATE INDEX IF NOT EXISTS idx_campaigns_tenant ON campaigns(tenant_id, status);

            CREATE TABLE IF NOT EXISTS campaign_budgets (
                id TEXT PRIMARY KEY,
                tenant_id TEXT NOT NULL,
                campaign_id TEXT NOT NULL REFERENCES campaigns(id),
                category TEXT NOT NULL,
                amount REAL NOT NULL,
                memo TEXT,
                spent_on TEXT NOT NULL,
                created_at TEXT NOT NULL
            );
            CREATE INDEX IF NOT EXISTS idx_budgets_campaign ON campaign_budgets(campaign_id);

            CREATE TABLE IF NOT EXISTS developers (
                id TEXT PRIMARY KEY,
                tenant_id TEXT NOT NULL REFERENCES tenants(id),
                display_name TEXT NOT NULL,
                email TEXT,
                github TEXT,
                organization TEXT,
                tags TEXT NOT NULL DEFAULT '[]',
                created_at TEXT NOT NULL,
                updated_at TEXT NOT NULL,
                deleted_at TEXT
            );
            CREATE UNIQUE INDEX IF NOT EXISTS idx_developers_email
                ON developers(tenant_id, email) WHERE email IS NOT NULL AND deleted_at IS NULL;

            CREATE TABLE IF NOT EXISTS activity_types (
                id TEXT PRIMARY KEY,
                tenant_id TEXT NOT NULL REFERENCES tenants(id),
                action TEXT NOT NULL,
                name TEXT NOT NULL,
                funnel_stage TEXT,
                created_at TEXT NOT NULL,
                UNIQUE(tenant_id, action)
            );

            CREATE TABLE IF NOT EXISTS activities (
                id TEXT PRIMARY KEY,
                tenant_id TEXT NOT NULL,
                developer_id TEXT NOT NULL REFERENCES developers(id),
                action TEXT NOT NULL,
                source TEXT NOT NULL,
                campaign_id TEXT REFERENCES campaigns(id),
                value REAL NOT NULL DEFAULT 0,
                metadata TEXT NOT NULL DEFAULT '{}',
                occurred_at TEXT NOT NULL,
                created_at TEXT NOT NULL
            );
            CREATE INDEX IF NOT EXISTS idx_activities_tenant ON activities(tenant_id, occurred_at);
            CREATE INDEX IF NOT EXISTS idx_activities_developer ON activities(developer_id);
            CREATE INDEX IF NOT EXISTS idx_activities_campaign ON activities(campaign_id);

            CREATE TABLE IF NOT EXISTS plugins (
                id TEXT PRIMARY KEY,
                tenant_id TEXT NOT NULL REFERENCES tenants(id),
                key TEXT NOT NULL,
                name TEXT NOT NULL,
                enabled INTEGER NOT NULL DEFAULT 1,
                config TEXT NOT NULL DEFAULT '{}',
                schedule TEXT,
                last_run_at TEXT,
                created_at TEXT NOT NULL,
                updated_at TEXT NOT NULL,
                deleted_at TEXT
            );
            CREATE UNIQUE INDEX IF NOT EXISTS idx_plugins_key
                ON plugins(tenant_id, key) WHERE deleted_at IS NULL;

            CREATE TABLE IF NOT EXISTS plugin_events (
                id TEXT PRIMARY KEY,
                tenant_id TEXT NOT NULL,
                plugin_id TEXT NOT NULL REFERENCES plugins(id),
                event_type TEXT NOT NULL,
                external_id TEXT,
                status TEXT NOT NULL DEFAULT 'pending',
                payload TEXT NOT NULL DEFAULT '{}',
                error_message TEXT,
                attempts INTEGER NOT NULL DEFAULT 0,
                received_at TEXT NOT NULL,
                processed_at TEXT
            );
            CREATE UNIQUE INDEX IF NOT EXISTS idx_plugin_events_external
                ON plugin_events(plugin_id, external_id) WHERE external_id IS NOT NULL;
            CREATE INDEX IF NOT EXISTS idx_plugin_events_status ON plugin_events(plugin_id, status);

            CREATE TABLE IF NOT EXISTS plugin_runs (
                id TEXT PRIMARY KEY,
                tenant_id TEXT NOT NULL,
                plugin_id TEXT NOT NULL REFERENCES plugins(id),
                trigger_kind TEXT NOT NULL,
                status TEXT NOT NULL DEFAULT 'queued',
                events_processed INTEGER NOT NULL DEFAULT 0,
                events_failed INTEGER NOT NULL DEFAULT 0,
                error_message TEXT,
                created_at TEXT NOT NULL,
                started_at TEXT,
                finished_at TEXT
            );
            CREATE INDEX IF NOT EXISTS idx_plugin_runs_plugin ON plugin_runs(plugin_id, created_at);

            CREATE TABLE IF NOT EXISTS api_tokens (
                id TEXT PRIMARY KEY,
                tenant_id TEXT NOT NULL REFERENCES tenants(id),
                name TEXT NOT NULL,
                token_prefix TEXT NOT NULL,
                token_hash TEXT UNIQUE NOT NULL,
                scopes TEXT NOT NULL DEFAULT '[]',
                status TEXT NOT NULL DEFAULT 'active',
                expires_at TEXT,
                last_used_at TEXT,
                created_by TEXT,
                created_at TEXT NOT NULL,
                revoked_at TEXT
            );
        ",
            )
            .map_err(db_err("Migration"))?;
        Ok(())
    }

    // ── Tenants ────────────────────────────────────

    /// Create a tenant and seed its default activity types.
    pub fn create_tenant(&self, name: &str, slug: &str) -> Result<Tenant> {
        let name = name.trim();
        if name.is_empty() || name.len() > 120 {
            return Err(DevRelError::validation("tenant name must be 1-120 characters"));
        }
        if slug.is_empty() || slugify(slug) != slug {
            return Err(DevRelError::validation(format!(
                "slug '{slug}' must be lowercase letters, digits and dashes"
            )));
        }
        let id = new_id();
        self.conn
            .execute(
                "INSERT INTO tenants (id, name, slug, created_at) VALUES (?1,?2,?3,?4)",
                params![id, name, slug, types::now()],
            )
            .map_err(conflict_or_db("Insert tenant", format!("slug '{slug}' is taken")))?;
        self.seed_activity_types(&id)?;
        tracing::info!("🏢 Created tenant '{}' ({})", slug, id);
        self.get_tenant(&id)
    }

    pub fn get_tenant(&self, id: &str) -> Result<Tenant> {
        self.conn
            .query_row(
                "SELECT id, name, slug, created_at FROM tenants WHERE id=?1",
                params![id],
                |row| {
                    Ok(Tenant {
                        id: row.get(0)?,
                        name: row.get(1)?,
                        slug: row.get(2)?,
                        created_at: row.get(3)?,
                    })
                },
            )
            .optional()
            .map_err(db_err("Get tenant"))?
            .ok_or_else(|| DevRelError::not_found(format!("tenant {id}")))
    }

    pub fn get_tenant_by_slug(&self, slug: &str) -> Result<Tenant> {
        let id: Option<String> = self
            .conn
            .query_row("SELECT id FROM tenants WHERE slug=?1", params![slug], |r| r.get(0))
            .optional()
            .map_err(db_err("Get tenant"))?;
        match id {
            Some(id) => self.get_tenant(&id),
            None => Err(DevRelError::not_found(format!("tenant '{slug}'"))),
        }
    }

    pub fn rename_tenant(&self, id: &str, name: &str) -> Result<Tenant> {
        let name = name.trim();
        if name.is_empty() || name.len() > 120 {
            return Err(DevRelError::validation("tenant name must be 1-120 characters"));
        }
        let changed = self
            .conn
            .execute("UPDATE tenants SET name=?1 WHERE id=?2", params![name, id])
            .map_err(db_err("Rename tenant"))?;
        if changed == 0 {
            return Err(DevRelError::not_found(format!("tenant {id}")));
        }
        self.get_tenant(id)
    }

    // ── Users ────────────────────────────────────

    /// Create a user. `password_hash` must already be a bcrypt hash.
    pub fn create_user(
        &self,
        tenant_id: &str,
        email: &str,
        password_hash: &str,
        display_name: &str,
        role: &str,
    ) -> Result<User> {
        if !ROLES.contains(&role) {
            return Err(DevRelError::validation(format!("unknown role '{role}'")));
        }
        let email = email.trim().to_lowercase();
        if !email.contains('@') {
            return Err(DevRelError::validation(format!("'{email}' is not an email address")));
        }
        let id = new_id();
        self.conn
            .execute(
                "INSERT INTO users (id, tenant_id, email, password_hash, display_name, role, created_at)
                 VALUES (?1,?2,?3,?4,?5,?6,?7)",
                params![id, tenant_id, email, password_hash, display_name, role, types::now()],
            )
            .map_err(conflict_or_db("Create user", format!("user '{email}' already exists")))?;
        self.get_user(tenant_id, &id)
    }

    pub fn get_user(&self, tenant_id: &str, id: &str) -> Result<User> {
        self.conn
            .query_row(
                "SELECT id, tenant_id, email, display_name, role, last_login_at, created_at
                 FROM users WHERE tenant_id=?1 AND id=?2",
                params![tenant_id, id],
                user_from_row,
            )
            .optional()
            .map_err(db_err("Get user"))?
            .ok_or_else(|| DevRelError::not_found(format!("user {id}")))
    }

    /// Look up a user and password hash by email, across tenants (login).
    pub fn get_user_by_email(&self, email: &str) -> Result<Option<(User, String)>> {
        self.conn
            .query_row(
                "SELECT id, tenant_id, email, display_name, role, last_login_at, created_at, password_hash
                 FROM users WHERE email=?1",
                params![email.trim().to_lowercase()],
                |row| Ok((user_from_row(row)?, row.get::<_, String>(7)?)),
            )
            .optional()
            .map_err(db_err("Get user"))
    }

    pub fn list_users(&self, tenant_id: &str) -> Result<Vec<User>> {
        let mut stmt = self
            .conn
            .prepare(
                "SELECT id, tenant_id, email, display_name, role, last_login_at, created_at
                 FROM users WHERE tenant_id=?1 ORDER BY created_at, rowid",
            )
            .map_err(db_err("Prepare"))?;
        let users = stmt
            .query_map(params![tenant_id], user_from_row)
            .map_err(db_err("Query"))?
            .collect::<rusqlite::Result<Vec<_>>>()
            .map_err(db_err("Read user"))?;
        Ok(users)
    }

    pub fn touch_login(&self, user_id: &str) -> Result<()> {
        self.conn
            .execute(
                "UPDATE users SET last_login_at=?1 WHERE id=?2",
                params![types::now(), user_id],
            )
            .map_err(db_err("Touch login"))?;
        Ok(())
    }

    // ── Audit Log ────────────────────────────────────

    /// Log an audit event.
    pub fn log_event(
        &self,
        tenant_id: &str,
        event_type: &str,
        actor_type: &str,
        actor_id: &str,
        details: Option<&str>,
    ) -> Result<()> {
        self.conn
            .execute(
                "INSERT INTO audit_log (tenant_id, event_type, actor_type, actor_id, details, created_at)
                 VALUES (?1,?2,?3,?4,?5,?6)",
                params![tenant_id, event_type, actor_type, actor_id, details, types::now()],
            )
            .map_err(db_err("Log event"))?;
        Ok(())
    }

    /// Most recent audit entries first.
    pub fn recent_events(&self, tenant_id: &str, limit: usize) -> Result<Vec<AuditEntry>> {
        let mut stmt = self
            .conn
            .prepare(
                "SELECT id, event_type, actor_type, actor_id, details, created_at
                 FROM audit_log WHERE tenant_id=?1 ORDER BY id DESC LIMIT ?2",
            )
            .map_err(db_err("Prepare"))?;
        let entries = stmt
            .query_map(params![tenant_id, limit as i64], |row| {
                Ok(AuditEntry {
                    id: row.get(0)?,
                    event_type: row.get(1)?,
                    actor_type: row.get(2)?,
                    actor_id: row.get(3)?,
                    details: row.get(4)?,
                    created_at: row.get(5)?,
                })
            })
            .map_err(db_err("Query"))?
            .collect::<rusqlite::Result<Vec<_>>>()
            .map_err(db_err("Read audit entry"))?;
        Ok(entries)
    }

    /// Run a `SELECT COUNT(*)` with the given filter.
    pub(crate) fn count(&self, from: &str, filter: &Filter) -> Result<u64> {
        let sql = format!("SELECT COUNT(*) FROM {from} {}", filter.sql());
        let n: i64 = self
            .conn
            .query_row(&sql, filter.params(), |r| r.get(0))
            .map_err(db_err("Count"))?;
        Ok(n as u64)
    }
}

fn user_from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<User> {
    Ok(User {
        id: row.get(0)?,
        tenant_id: row.get(1)?,
        email: row.get(2)?,
        display_name: row.get(3)?,
        role: row.get(4)?,
        last_login_at: row.get(5)?,
        created_at: row.get(6)?,
    })
}
