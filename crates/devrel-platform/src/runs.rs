//! Plugin runs: one execution of a plugin's ingestion job, reported by the
//! external runtime.

use crate::db::{db_err, new_id, Filter, PlatformDb};
use devrel_core::error::{DevRelError, Result};
use devrel_core::types::{self, Page, PageRequest};
use rusqlite::{params, OptionalExtension};
use serde::{Deserialize, Serialize};
use std::str::FromStr;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RunTrigger {
    Manual,
    Schedule,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RunStatus {
    Queued,
    Running,
    Success,
    Failed,
}

impl RunStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Queued => "queued",
            Self::Running => "running",
            Self::Success => "success",
            Self::Failed => "failed",
        }
    }

    pub fn is_finished(&self) -> bool {
        matches!(self, Self::Success | Self::Failed)
    }

    /// Allowed moves: queued → running → success | failed. A queued run
    /// may also fail before it starts.
    pub fn can_move_to(&self, next: RunStatus) -> bool {
        matches!(
            (self, next),
            (Self::Queued, Self::Running) | (Self::Queued, Self::Failed) | (Self::Running, Self::Success) | (Self::Running, Self::Failed)
        )
    }
}

impl FromStr for RunStatus {
    type Err = DevRelError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "queued" => Ok(Self::Queued),
            "running" => Ok(Self::Running),
            "success" => Ok(Self::Success),
            "failed" => Ok(Self::Failed),
            other => Err(DevRelError::validation(format!("unknown run status '{other}'"))),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PluginRun {
    pub id: String,
    pub plugin_id: String,
    pub trigger: RunTrigger,
    pub status: RunStatus,
    pub events_processed: u32,
    pub events_failed: u32,
    pub error_message: Option<String>,
    pub created_at: String,
    pub started_at: Option<String>,
    pub finished_at: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RunUpdate {
    pub status: RunStatus,
    pub events_processed: Option<u32>,
    pub events_failed: Option<u32>,
    pub error: Option<String>,
}

#[derive(Debug, Clone, Default)]
pub struct RunFilter {
    pub status: Option<RunStatus>,
    pub page: PageRequest,
}

const RUN_COLUMNS: &str = "id, plugin_id, trigger_kind, status, events_processed, events_failed, error_message, \
                           created_at, started_at, finished_at";

fn run_from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<PluginRun> {
    let trigger: String = row.get(2)?;
    let status: String = row.get(3)?;
    Ok(PluginRun {
        id: row.get(0)?,
        plugin_id: row.get(1)?,
        trigger: if trigger == "schedule" { RunTrigger::Schedule } else { RunTrigger::Manual },
        status: status.parse().unwrap_or(RunStatus::Failed),
        events_processed: row.get(4)?,
        events_failed: row.get(5)?,
        error_message: row.get(6)?,
        created_at: row.get(7)?,
        started_at: row.get(8)?,
        finished_at: row.get(9)?,
    })
}

impl PlatformDb {
    pub fn list_plugin_runs(&self, tenant_id: &str, plugin_id: &str, filter: &RunFilter) -> Result<Page<PluginRun>> {
        self.get_plugin(tenant_id, plugin_id)?;
        let mut f = Filter::tenant("tenant_id", tenant_id);
        f.push("plugin_id = ?", plugin_id.to_string())
            .opt("status = ?", filter.status.map(|s| s.as_str().to_string()));
        let total = self.count("plugin_runs", &f)?;
        let sql = format!(
            "SELECT {RUN_COLUMNS} FROM plugin_runs {} ORDER BY created_at DESC, rowid DESC LIMIT ? OFFSET ?",
            f.sql()
        );
        let mut stmt = self.conn.prepare(&sql).map_err(db_err("Prepare"))?;
        let items = stmt
            .query_map(f.paged_params(filter.page), run_from_row)
            .map_err(db_err("Query plugin runs"))?
            .collect::<rusqlite::Result<Vec<_>>>()
            .map_err(db_err("Read plugin run"))?;
        Ok(Page::new(items, filter.page, total))
    }

    pub fn get_plugin_run(&self, tenant_id: &str, plugin_id: &str, id: &str) -> Result<PluginRun> {
        self.conn
            .query_row(
                &format!("SELECT {RUN_COLUMNS} FROM plugin_runs WHERE tenant_id=?1 AND plugin_id=?2 AND id=?3"),
                params![tenant_id, plugin_id, id],
                run_from_row,
            )
            .optional()
            .map_err(db_err("Get plugin run"))?
            .ok_or_else(|| DevRelError::not_found(format!("run {id}")))
    }

    /// Queue a run. Only one queued or running run per plugin at a time.
    pub fn trigger_plugin_run(&self, tenant_id: &str, plugin_id: &str, trigger: RunTrigger) -> Result<PluginRun> {
        let plugin = self.get_plugin(tenant_id, plugin_id)?;
        if !plugin.enabled {
            return Err(DevRelError::conflict(format!("plugin '{}' is disabled", plugin.key)));
        }
        let active: Option<String> = self
            .conn
            .query_row(
                "SELECT id FROM plugin_runs WHERE tenant_id=?1 AND plugin_id=?2 AND status IN ('queued','running') LIMIT 1",
                params![tenant_id, plugin_id],
                |r| r.get(0),
            )
            .optional()
            .map_err(db_err("Check active run"))?;
        if let Some(run_id) = active {
            return Err(DevRelError::conflict(format!("run {run_id} is already in progress")));
        }

        let id = new_id();
        let kind = match trigger {
            RunTrigger::Manual => "manual",
            RunTrigger::Schedule => "schedule",
        };
        self.conn
            .execute(
                "INSERT INTO plugin_runs (id, tenant_id, plugin_id, trigger_kind, status, created_at)
                 VALUES (?1,?2,?3,?4,'queued',?5)",
                params![id, tenant_id, plugin_id, kind, types::now()],
            )
            .map_err(db_err("Insert plugin run"))?;
        tracing::info!("▶️ Queued {} run {} for plugin '{}'", kind, id, plugin.key);
        self.get_plugin_run(tenant_id, plugin_id, &id)
    }

    /// Advance a run. Finishing it stamps the plugin's `last_run_at`.
    pub fn update_plugin_run(&self, tenant_id: &str, plugin_id: &str, id: &str, update: &RunUpdate) -> Result<PluginRun> {
        let run = self.get_plugin_run(tenant_id, plugin_id, id)?;
        if !run.status.can_move_to(update.status) {
            return Err(DevRelError::conflict(format!(
                "run {id} cannot move from {} to {}",
                run.status.as_str(),
                update.status.as_str()
            )));
        }
        let now = types::now();
        let started_at = match (update.status, &run.started_at) {
            (RunStatus::Running, None) => Some(now.clone()),
            (_, existing) => existing.clone(),
        };
        let finished_at = update.status.is_finished().then(|| now.clone());
        let error = match update.status {
            RunStatus::Failed => Some(update.error.clone().unwrap_or_else(|| "run failed".into())),
            _ => None,
        };
        self.conn
            .execute(
                "UPDATE plugin_runs SET status=?1, events_processed=?2, events_failed=?3, error_message=?4,
                        started_at=?5, finished_at=?6
                 WHERE tenant_id=?7 AND id=?8",
                params![
                    update.status.as_str(),
                    update.events_processed.unwrap_or(run.events_processed),
                    update.events_failed.unwrap_or(run.events_failed),
                    error,
                    started_at,
                    finished_at,
                    tenant_id,
                    id,
                ],
            )
            .map_err(db_err("Update plugin run"))?;
        if let Some(at) = &finished_at {
            self.touch_plugin_run(plugin_id, at)?;
            if update.status == RunStatus::Failed {
                tracing::warn!("Run {} failed: {}", id, error.as_deref().unwrap_or_default());
            } else {
                tracing::info!("✅ Run {} finished", id);
            }
        }
        self.get_plugin_run(tenant_id, plugin_id, id)
    }
}
