//! Activity types (the per-tenant action catalog) and recorded activities.

use crate::db::{conflict_or_db, db_err, new_id, Filter, PlatformDb};
use crate::funnel::FunnelStage;
use crate::validation::{check, validate_json_object, validate_key, validate_not_blank};
use devrel_core::error::{DevRelError, Result};
use devrel_core::types::{self, Page, PageRequest, Sort};
use rusqlite::{params, OptionalExtension};
use serde::{Deserialize, Serialize};
use validator::Validate;

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ActivityType {
    pub id: String,
    pub action: String,
    pub name: String,
    pub funnel_stage: Option<FunnelStage>,
    pub created_at: String,
}

#[derive(Debug, Clone, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct NewActivityType {
    #[validate(custom(function = "validate_key"))]
    pub action: String,
    #[validate(length(min = 1, max = 100), custom(function = "validate_not_blank"))]
    pub name: String,
    pub funnel_stage: Option<FunnelStage>,
}

/// `funnelStage: null` clears the stage; an absent key leaves it alone.
#[derive(Debug, Clone, Default, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct ActivityTypePatch {
    #[validate(length(min = 1, max = 100), custom(function = "validate_not_blank"))]
    pub name: Option<String>,
    #[serde(default, with = "crate::db::double_option")]
    pub funnel_stage: Option<Option<FunnelStage>>,
}

/// Catalog every new tenant starts with.
pub const DEFAULT_ACTIVITY_TYPES: &[(&str, &str, FunnelStage)] = &[
    ("content_view", "Viewed content", FunnelStage::Awareness),
    ("event_registration", "Registered for an event", FunnelStage::Awareness),
    ("newsletter_signup", "Signed up for the newsletter", FunnelStage::Awareness),
    ("event_attendance", "Attended an event", FunnelStage::Engagement),
    ("community_post", "Posted in the community", FunnelStage::Engagement),
    ("github_star", "Starred a repository", FunnelStage::Engagement),
    ("api_signup", "Created an API account", FunnelStage::Adoption),
    ("sdk_install", "Installed an SDK", FunnelStage::Adoption),
    ("first_api_call", "Made a first API call", FunnelStage::Adoption),
    ("pull_request", "Opened a pull request", FunnelStage::Advocacy),
    ("blog_post", "Published a blog post", FunnelStage::Advocacy),
    ("talk_given", "Gave a talk", FunnelStage::Advocacy),
];

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Activity {
    pub id: String,
    pub developer_id: String,
    pub action: String,
    pub source: String,
    pub campaign_id: Option<String>,
    pub value: f64,
    pub metadata: serde_json::Value,
    pub occurred_at: String,
    pub created_at: String,
}

#[derive(Debug, Clone, Default, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct NewActivity {
    #[validate(length(min = 1))]
    pub developer_id: String,
    #[validate(custom(function = "validate_key"))]
    pub action: String,
    #[validate(length(min = 1, max = 64), custom(function = "validate_not_blank"))]
    pub source: String,
    pub campaign_id: Option<String>,
    #[validate(range(min = 0.0))]
    pub value: Option<f64>,
    #[validate(custom(function = "validate_json_object"))]
    pub metadata: Option<serde_json::Value>,
    /// RFC 3339; defaults to now.
    pub occurred_at: Option<String>,
}

#[derive(Debug, Clone, Default)]
pub struct ActivityFilter {
    pub developer_id: Option<String>,
    pub campaign_id: Option<String>,
    pub action: Option<String>,
    pub source: Option<String>,
    pub from: Option<String>,
    pub to: Option<String>,
    pub order_by: Option<String>,
    pub page: PageRequest,
}

pub const ACTIVITY_SORTS: &[(&str, &str)] = &[("occurredAt", "occurred_at"), ("value", "value")];

/// Per-action totals.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ActionCount {
    pub action: String,
    pub count: u64,
}

fn activity_type_from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<ActivityType> {
    let stage: Option<String> = row.get(3)?;
    Ok(ActivityType {
        id: row.get(0)?,
        action: row.get(1)?,
        name: row.get(2)?,
        funnel_stage: stage.and_then(|s| s.parse().ok()),
        created_at: row.get(4)?,
    })
}

fn activity_from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<Activity> {
    let metadata: String = row.get(6)?;
    Ok(Activity {
        id: row.get(0)?,
        developer_id: row.get(1)?,
        action: row.get(2)?,
        source: row.get(3)?,
        campaign_id: row.get(4)?,
        value: row.get(5)?,
        metadata: serde_json::from_str(&metadata).unwrap_or_else(|_| serde_json::json!({})),
        occurred_at: row.get(7)?,
        created_at: row.get(8)?,
    })
}

const ACTIVITY_COLUMNS: &str =
    "id, developer_id, action, source, campaign_id, value, metadata, occurred_at, created_at";

impl PlatformDb {
    // ── Activity types ────────────────────────────────────

    pub(crate) fn seed_activity_types(&self, tenant_id: &str) -> Result<()> {
        let now = types::now();
        let mut stmt = self
            .conn
            .prepare(
                "INSERT OR IGNORE INTO activity_types (id, tenant_id, action, name, funnel_stage, created_at)
                 VALUES (?1,?2,?3,?4,?5,?6)",
            )
            .map_err(db_err("Prepare"))?;
        for (action, name, stage) in DEFAULT_ACTIVITY_TYPES {
            stmt.execute(params![new_id(), tenant_id, action, name, stage.as_str(), now])
                .map_err(db_err("Seed activity type"))?;
        }
        Ok(())
    }

    pub fn list_activity_types(&self, tenant_id: &str) -> Result<Vec<ActivityType>> {
        let mut stmt = self
            .conn
            .prepare(
                "SELECT id, action, name, funnel_stage, created_at FROM activity_types
                 WHERE tenant_id=?1 ORDER BY action",
            )
            .map_err(db_err("Prepare"))?;
        let catalog = stmt
            .query_map(params![tenant_id], activity_type_from_row)
            .map_err(db_err("Query"))?
            .collect::<rusqlite::Result<Vec<_>>>()
            .map_err(db_err("Read activity type"))?;
        Ok(catalog)
    }

    pub fn get_activity_type(&self, tenant_id: &str, id: &str) -> Result<ActivityType> {
        self.conn
            .query_row(
                "SELECT id, action, name, funnel_stage, created_at FROM activity_types WHERE tenant_id=?1 AND id=?2",
                params![tenant_id, id],
                activity_type_from_row,
            )
            .optional()
            .map_err(db_err("Get activity type"))?
            .ok_or_else(|| DevRelError::not_found(format!("activity type {id}")))
    }

    fn activity_type_exists(&self, tenant_id: &str, action: &str) -> Result<bool> {
        let mut f = Filter::tenant("tenant_id", tenant_id);
        f.push("action = ?", action.to_string());
        Ok(self.count("activity_types", &f)? > 0)
    }

    pub fn create_activity_type(&self, tenant_id: &str, input: &NewActivityType) -> Result<ActivityType> {
        check(input)?;
        let id = new_id();
        self.conn
            .execute(
                "INSERT INTO activity_types (id, tenant_id, action, name, funnel_stage, created_at)
                 VALUES (?1,?2,?3,?4,?5,?6)",
                params![
                    id,
                    tenant_id,
                    input.action,
                    input.name.trim(),
                    input.funnel_stage.map(|s| s.as_str()),
                    types::now()
                ],
            )
            .map_err(conflict_or_db(
                "Insert activity type",
                format!("activity type '{}' already exists", input.action),
            ))?;
        self.get_activity_type(tenant_id, &id)
    }

    pub fn update_activity_type(&self, tenant_id: &str, id: &str, patch: &ActivityTypePatch) -> Result<ActivityType> {
        check(patch)?;
        let current = self.get_activity_type(tenant_id, id)?;
        let name = patch.name.as_deref().map(str::trim).unwrap_or(current.name.as_str());
        let stage = patch.funnel_stage.unwrap_or(current.funnel_stage);
        self.conn
            .execute(
                "UPDATE activity_types SET name=?1, funnel_stage=?2 WHERE tenant_id=?3 AND id=?4",
                params![name, stage.map(|s| s.as_str()), tenant_id, id],
            )
            .map_err(db_err("Update activity type"))?;
        self.get_activity_type(tenant_id, id)
    }

    /// Refuses while activities still use the action.
    pub fn delete_activity_type(&self, tenant_id: &str, id: &str) -> Result<()> {
        let current = self.get_activity_type(tenant_id, id)?;
        let mut used = Filter::tenant("tenant_id", tenant_id);
        used.push("action = ?", current.action.clone());
        let uses = self.count("activities", &used)?;
        if uses > 0 {
            return Err(DevRelError::conflict(format!(
                "activity type '{}' is used by {uses} activities",
                current.action
            )));
        }
        self.conn
            .execute("DELETE FROM activity_types WHERE tenant_id=?1 AND id=?2", params![tenant_id, id])
            .map_err(db_err("Delete activity type"))?;
        Ok(())
    }

    // ── Activities ────────────────────────────────────

    pub fn record_activity(&self, tenant_id: &str, input: &NewActivity) -> Result<Activity> {
        check(input)?;
        self.get_developer(tenant_id, &input.developer_id)?;
        if let Some(campaign_id) = input.campaign_id.as_deref() {
            self.get_campaign(tenant_id, campaign_id)?;
        }
        if !self.activity_type_exists(tenant_id, &input.action)? {
            return Err(DevRelError::validation(format!("unknown activity action '{}'", input.action)));
        }
        let occurred_at = match input.occurred_at.as_deref() {
            Some(raw) => types::parse_timestamp(raw)?,
            None => types::now(),
        };
        let metadata = input.metadata.clone().unwrap_or_else(|| serde_json::json!({}));
        let id = new_id();
        let now = types::now();
        self.conn
            .execute(
                "INSERT INTO activities (id, tenant_id, developer_id, action, source, campaign_id, value, metadata, occurred_at, created_at)
                 VALUES (?1,?2,?3,?4,?5,?6,?7,?8,?9,?10)",
                params![
                    id,
                    tenant_id,
                    input.developer_id,
                    input.action,
                    input.source.trim(),
                    input.campaign_id,
                    input.value.unwrap_or(0.0),
                    metadata.to_string(),
                    occurred_at,
                    now,
                ],
            )
            .map_err(db_err("Insert activity"))?;
        Ok(Activity {
            id,
            developer_id: input.developer_id.clone(),
            action: input.action.clone(),
            source: input.source.trim().to_string(),
            campaign_id: input.campaign_id.clone(),
            value: input.value.unwrap_or(0.0),
            metadata,
            occurred_at,
            created_at: now,
        })
    }

    pub fn list_activities(&self, tenant_id: &str, filter: &ActivityFilter) -> Result<Page<Activity>> {
        let sort = Sort::parse(filter.order_by.as_deref(), ACTIVITY_SORTS, Sort::desc("occurred_at"))?;
        let from = filter.from.as_deref().map(|s| types::parse_range_bound(s, false)).transpose()?;
        let to = filter.to.as_deref().map(|s| types::parse_range_bound(s, true)).transpose()?;

        let mut f = Filter::tenant("tenant_id", tenant_id);
        f.opt("developer_id = ?", filter.developer_id.clone())
            .opt("campaign_id = ?", filter.campaign_id.clone())
            .opt("action = ?", filter.action.clone())
            .opt("source = ?", filter.source.clone())
            .opt("occurred_at >= ?", from)
            .opt("occurred_at <= ?", to);

        let total = self.count("activities", &f)?;
        let sql = format!(
            "SELECT {ACTIVITY_COLUMNS} FROM activities {} ORDER BY {} LIMIT ? OFFSET ?",
            f.sql(),
            sort.to_sql("rowid")
        );
        let mut stmt = self.conn.prepare(&sql).map_err(db_err("Prepare"))?;
        let items = stmt
            .query_map(f.paged_params(filter.page), activity_from_row)
            .map_err(db_err("Query activities"))?
            .collect::<rusqlite::Result<Vec<_>>>()
            .map_err(db_err("Read activity"))?;
        Ok(Page::new(items, filter.page, total))
    }

    pub fn delete_activity(&self, tenant_id: &str, id: &str) -> Result<()> {
        let changed = self
            .conn
            .execute("DELETE FROM activities WHERE tenant_id=?1 AND id=?2", params![tenant_id, id])
            .map_err(db_err("Delete activity"))?;
        if changed == 0 {
            return Err(DevRelError::not_found(format!("activity {id}")));
        }
        Ok(())
    }

    /// Most frequent actions of live developers in `[since, until]`.
    pub fn top_actions(&self, tenant_id: &str, since: &str, until: &str, limit: usize) -> Result<Vec<ActionCount>> {
        let mut stmt = self
            .conn
            .prepare(
                "SELECT a.action, COUNT(*) AS n FROM activities a
                 JOIN developers d ON d.id = a.developer_id AND d.deleted_at IS NULL
                 WHERE a.tenant_id=?1 AND a.occurred_at >= ?2 AND a.occurred_at <= ?3
                 GROUP BY a.action ORDER BY n DESC, a.action ASC LIMIT ?4",
            )
            .map_err(db_err("Prepare"))?;
        let rows = stmt
            .query_map(params![tenant_id, since, until, limit as i64], |row| {
                Ok(ActionCount {
                    action: row.get(0)?,
                    count: row.get::<_, i64>(1)? as u64,
                })
            })
            .map_err(db_err("Query"))?
            .collect::<rusqlite::Result<Vec<_>>>()
            .map_err(db_err("Read action count"))?;
        Ok(rows)
    }
}
