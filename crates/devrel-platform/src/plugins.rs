//! Plugin registrations: ingestion integrations with config and a cron
//! schedule. Execution happens in an external runtime that reports back
//! through plugin events and runs.

use crate::db::{conflict_or_db, db_err, new_id, PlatformDb};
use crate::validation::{check, parse_schedule, validate_cron, validate_json_object, validate_key, validate_not_blank};
use devrel_core::error::{DevRelError, Result};
use devrel_core::types;
use rusqlite::{params, OptionalExtension};
use serde::{Deserialize, Serialize};
use validator::Validate;

pub const MASK: &str = "********";

const SECRET_MARKERS: [&str; 4] = ["secret", "token", "password", "key"];

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Plugin {
    pub id: String,
    pub key: String,
    pub name: String,
    pub enabled: bool,
    pub config: serde_json::Value,
    pub schedule: Option<String>,
    pub last_run_at: Option<String>,
    pub created_at: String,
    pub updated_at: String,
}

/// What the API returns: secrets masked, next run resolved.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PluginView {
    pub id: String,
    pub key: String,
    pub name: String,
    pub enabled: bool,
    pub config: serde_json::Value,
    pub schedule: Option<String>,
    pub next_run_at: Option<String>,
    pub last_run_at: Option<String>,
    pub created_at: String,
    pub updated_at: String,
}

impl Plugin {
    pub fn view(&self) -> PluginView {
        let next_run_at = match (&self.schedule, self.enabled) {
            (Some(expr), true) => next_run(expr),
            _ => None,
        };
        PluginView {
            id: self.id.clone(),
            key: self.key.clone(),
            name: self.name.clone(),
            enabled: self.enabled,
            config: mask_config(&self.config),
            schedule: self.schedule.clone(),
            next_run_at,
            last_run_at: self.last_run_at.clone(),
            created_at: self.created_at.clone(),
            updated_at: self.updated_at.clone(),
        }
    }
}

fn next_run(expr: &str) -> Option<String> {
    parse_schedule(expr)
        .ok()?
        .upcoming(chrono::Utc)
        .next()
        .map(types::timestamp)
}

fn is_secret_key(key: &str) -> bool {
    let key = key.to_ascii_lowercase();
    SECRET_MARKERS.iter().any(|m| key.contains(m))
}

/// Replace values under secret-looking keys, recursively.
pub fn mask_config(config: &serde_json::Value) -> serde_json::Value {
    match config {
        serde_json::Value::Object(map) => serde_json::Value::Object(
            map.iter()
                .map(|(k, v)| {
                    let masked = if is_secret_key(k) && !v.is_null() && !v.is_object() {
                        serde_json::Value::String(MASK.into())
                    } else {
                        mask_config(v)
                    };
                    (k.clone(), masked)
                })
                .collect(),
        ),
        serde_json::Value::Array(items) => serde_json::Value::Array(items.iter().map(mask_config).collect()),
        other => other.clone(),
    }
}

/// Merge an incoming config over the stored one. Keys sent back as the
/// mask keep their stored value, so a masked form can be resubmitted.
fn merge_config(current: &serde_json::Value, incoming: &serde_json::Value) -> serde_json::Value {
    match (current, incoming) {
        (serde_json::Value::Object(cur), serde_json::Value::Object(inc)) => serde_json::Value::Object(
            inc.iter()
                .map(|(k, v)| {
                    let merged = match (cur.get(k), v) {
                        (Some(old), serde_json::Value::String(s)) if s == MASK => old.clone(),
                        (Some(old), serde_json::Value::Object(_)) => merge_config(old, v),
                        _ => v.clone(),
                    };
                    (k.clone(), merged)
                })
                .collect(),
        ),
        _ => incoming.clone(),
    }
}

#[derive(Debug, Clone, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct NewPlugin {
    #[validate(custom(function = "validate_key"))]
    pub key: String,
    #[validate(length(min = 1, max = 100), custom(function = "validate_not_blank"))]
    pub name: String,
    pub enabled: Option<bool>,
    #[validate(custom(function = "validate_json_object"))]
    pub config: Option<serde_json::Value>,
    #[validate(custom(function = "validate_cron"))]
    pub schedule: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct PluginPatch {
    #[validate(length(min = 1, max = 100), custom(function = "validate_not_blank"))]
    pub name: Option<String>,
    pub enabled: Option<bool>,
    #[validate(custom(function = "validate_json_object"))]
    pub config: Option<serde_json::Value>,
    /// An empty string clears the schedule.
    pub schedule: Option<String>,
}

const PLUGIN_COLUMNS: &str = "id, key, name, enabled, config, schedule, last_run_at, created_at, updated_at";

fn plugin_from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<Plugin> {
    let config: String = row.get(4)?;
    Ok(Plugin {
        id: row.get(0)?,
        key: row.get(1)?,
        name: row.get(2)?,
        enabled: row.get::<_, i32>(3)? != 0,
        config: serde_json::from_str(&config).unwrap_or_else(|_| serde_json::json!({})),
        schedule: row.get(5)?,
        last_run_at: row.get(6)?,
        created_at: row.get(7)?,
        updated_at: row.get(8)?,
    })
}

impl PlatformDb {
    pub fn create_plugin(&self, tenant_id: &str, input: &NewPlugin) -> Result<Plugin> {
        check(input)?;
        let id = new_id();
        let now = types::now();
        let config = input.config.clone().unwrap_or_else(|| serde_json::json!({}));
        let schedule = input.schedule.as_deref().map(str::trim).filter(|s| !s.is_empty());
        self.conn
            .execute(
                "INSERT INTO plugins (id, tenant_id, key, name, enabled, config, schedule, created_at, updated_at)
                 VALUES (?1,?2,?3,?4,?5,?6,?7,?8,?8)",
                params![
                    id,
                    tenant_id,
                    input.key,
                    input.name.trim(),
                    input.enabled.unwrap_or(true) as i32,
                    config.to_string(),
                    schedule,
                    now,
                ],
            )
            .map_err(conflict_or_db("Insert plugin", format!("plugin '{}' is already installed", input.key)))?;
        tracing::info!("🔌 Installed plugin '{}' ({})", input.key, id);
        self.get_plugin(tenant_id, &id)
    }

    pub fn get_plugin(&self, tenant_id: &str, id: &str) -> Result<Plugin> {
        self.conn
            .query_row(
                &format!("SELECT {PLUGIN_COLUMNS} FROM plugins WHERE tenant_id=?1 AND id=?2 AND deleted_at IS NULL"),
                params![tenant_id, id],
                plugin_from_row,
            )
            .optional()
            .map_err(db_err("Get plugin"))?
            .ok_or_else(|| DevRelError::not_found(format!("plugin {id}")))
    }

    pub fn list_plugins(&self, tenant_id: &str) -> Result<Vec<Plugin>> {
        let mut stmt = self
            .conn
            .prepare(&format!(
                "SELECT {PLUGIN_COLUMNS} FROM plugins WHERE tenant_id=?1 AND deleted_at IS NULL ORDER BY name, rowid"
            ))
            .map_err(db_err("Prepare"))?;
        let plugins = stmt
            .query_map(params![tenant_id], plugin_from_row)
            .map_err(db_err("Query plugins"))?
            .collect::<rusqlite::Result<Vec<_>>>()
            .map_err(db_err("Read plugin"))?;
        Ok(plugins)
    }

    pub fn update_plugin(&self, tenant_id: &str, id: &str, patch: &PluginPatch) -> Result<Plugin> {
        check(patch)?;
        let current = self.get_plugin(tenant_id, id)?;
        let schedule = match patch.schedule.as_deref().map(str::trim) {
            Some("") => None,
            Some(expr) => {
                parse_schedule(expr)?;
                Some(expr.to_string())
            }
            None => current.schedule.clone(),
        };
        let config = match &patch.config {
            Some(incoming) => merge_config(&current.config, incoming),
            None => current.config.clone(),
        };
        let name = patch.name.as_deref().map(str::trim).unwrap_or(current.name.as_str());
        let enabled = patch.enabled.unwrap_or(current.enabled);

        self.conn
            .execute(
                "UPDATE plugins SET name=?1, enabled=?2, config=?3, schedule=?4, updated_at=?5 WHERE tenant_id=?6 AND id=?7",
                params![name, enabled as i32, config.to_string(), schedule, types::now(), tenant_id, id],
            )
            .map_err(db_err("Update plugin"))?;
        if enabled != current.enabled {
            tracing::info!("Plugin '{}' {}", current.key, if enabled { "enabled" } else { "disabled" });
        }
        self.get_plugin(tenant_id, id)
    }

    /// Soft delete; events and runs are kept for history.
    pub fn delete_plugin(&self, tenant_id: &str, id: &str) -> Result<()> {
        let changed = self
            .conn
            .execute(
                "UPDATE plugins SET deleted_at=?1, enabled=0 WHERE tenant_id=?2 AND id=?3 AND deleted_at IS NULL",
                params![types::now(), tenant_id, id],
            )
            .map_err(db_err("Delete plugin"))?;
        if changed == 0 {
            return Err(DevRelError::not_found(format!("plugin {id}")));
        }
        tracing::info!("🔌 Removed plugin {}", id);
        Ok(())
    }

    pub(crate) fn touch_plugin_run(&self, plugin_id: &str, at: &str) -> Result<()> {
        self.conn
            .execute("UPDATE plugins SET last_run_at=?1 WHERE id=?2", params![at, plugin_id])
            .map_err(db_err("Touch plugin"))?;
        Ok(())
    }
}
