//! Developer profiles.

use crate::db::{conflict_or_db, db_err, new_id, Filter, PlatformDb};
use crate::funnel::{FunnelStage, STAGE_RANK_SQL};
use crate::validation::{check, validate_not_blank};
use devrel_core::error::{DevRelError, Result};
use devrel_core::types::{self, Page, PageRequest, Sort};
use rusqlite::{params, OptionalExtension};
use serde::{Deserialize, Serialize};
use validator::Validate;

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Developer {
    pub id: String,
    pub display_name: String,
    pub email: Option<String>,
    pub github: Option<String>,
    pub organization: Option<String>,
    pub tags: Vec<String>,
    pub activity_count: u64,
    pub last_activity_at: Option<String>,
    /// Highest funnel stage reached by any activity.
    pub stage: Option<FunnelStage>,
    pub created_at: String,
    pub updated_at: String,
}

#[derive(Debug, Clone, Default, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct NewDeveloper {
    #[validate(length(min = 1, max = 200), custom(function = "validate_not_blank"))]
    pub display_name: String,
    #[validate(email)]
    pub email: Option<String>,
    #[validate(length(max = 100))]
    pub github: Option<String>,
    #[validate(length(max = 200))]
    pub organization: Option<String>,
    #[validate(length(max = 20))]
    #[serde(default)]
    pub tags: Vec<String>,
}

#[derive(Debug, Clone, Default, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct DeveloperPatch {
    #[validate(length(min = 1, max = 200), custom(function = "validate_not_blank"))]
    pub display_name: Option<String>,
    #[validate(email)]
    pub email: Option<String>,
    #[validate(length(max = 100))]
    pub github: Option<String>,
    #[validate(length(max = 200))]
    pub organization: Option<String>,
    #[validate(length(max = 20))]
    pub tags: Option<Vec<String>>,
}

#[derive(Debug, Clone, Default)]
pub struct DeveloperFilter {
    pub search: Option<String>,
    pub stage: Option<FunnelStage>,
    pub tag: Option<String>,
    pub order_by: Option<String>,
    pub page: PageRequest,
}

pub const DEVELOPER_SORTS: &[(&str, &str)] = &[
    ("displayName", "display_name"),
    ("createdAt", "created_at"),
    ("lastActivityAt", "last_activity_at"),
    ("activityCount", "activity_count"),
];

fn developer_cte() -> String {
    format!(
        "WITH d AS (
            SELECT developers.rowid AS seq, developers.*,
                (SELECT COUNT(*) FROM activities a WHERE a.developer_id = developers.id) AS activity_count,
                (SELECT MAX(occurred_at) FROM activities a WHERE a.developer_id = developers.id) AS last_activity_at,
                (SELECT MAX({STAGE_RANK_SQL}) FROM activities a
                    JOIN activity_types t ON t.tenant_id = a.tenant_id AND t.action = a.action
                    WHERE a.developer_id = developers.id) AS stage_rank
            FROM developers
        )"
    )
}

const DEVELOPER_COLUMNS: &str = "id, display_name, email, github, organization, tags, activity_count, \
     last_activity_at, stage_rank, created_at, updated_at";

fn developer_from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<Developer> {
    let tags: String = row.get(5)?;
    let stage_rank: Option<i64> = row.get(8)?;
    Ok(Developer {
        id: row.get(0)?,
        display_name: row.get(1)?,
        email: row.get(2)?,
        github: row.get(3)?,
        organization: row.get(4)?,
        tags: serde_json::from_str(&tags).unwrap_or_default(),
        activity_count: row.get::<_, i64>(6)? as u64,
        last_activity_at: row.get(7)?,
        stage: stage_rank.and_then(FunnelStage::from_rank),
        created_at: row.get(9)?,
        updated_at: row.get(10)?,
    })
}

fn normalize_tags(tags: &[String]) -> Vec<String> {
    let mut out: Vec<String> = tags
        .iter()
        .map(|t| t.trim().to_lowercase())
        .filter(|t| !t.is_empty())
        .collect();
    out.sort();
    out.dedup();
    out
}

fn clean(value: Option<&str>) -> Option<String> {
    value.map(str::trim).filter(|s| !s.is_empty()).map(String::from)
}

impl PlatformDb {
    pub fn create_developer(&self, tenant_id: &str, input: &NewDeveloper) -> Result<Developer> {
        check(input)?;
        let id = new_id();
        let now = types::now();
        let email = clean(input.email.as_deref()).map(|e| e.to_lowercase());
        let tags = serde_json::to_string(&normalize_tags(&input.tags))?;
        self.conn
            .execute(
                "INSERT INTO developers (id, tenant_id, display_name, email, github, organization, tags, created_at, updated_at)
                 VALUES (?1,?2,?3,?4,?5,?6,?7,?8,?8)",
                params![
                    id,
                    tenant_id,
                    input.display_name.trim(),
                    email,
                    clean(input.github.as_deref()),
                    clean(input.organization.as_deref()),
                    tags,
                    now,
                ],
            )
            .map_err(conflict_or_db(
                "Insert developer",
                format!("a developer with email '{}' already exists", email.as_deref().unwrap_or_default()),
            ))?;
        tracing::debug!("Created developer {}", id);
        self.get_developer(tenant_id, &id)
    }

    pub fn get_developer(&self, tenant_id: &str, id: &str) -> Result<Developer> {
        let sql = format!(
            "{} SELECT {DEVELOPER_COLUMNS} FROM d WHERE tenant_id=?1 AND id=?2 AND deleted_at IS NULL",
            developer_cte()
        );
        self.conn
            .query_row(&sql, params![tenant_id, id], developer_from_row)
            .optional()
            .map_err(db_err("Get developer"))?
            .ok_or_else(|| DevRelError::not_found(format!("developer {id}")))
    }

    pub fn list_developers(&self, tenant_id: &str, filter: &DeveloperFilter) -> Result<Page<Developer>> {
        let sort = Sort::parse(filter.order_by.as_deref(), DEVELOPER_SORTS, Sort::desc("created_at"))?;
        let mut f = Filter::tenant("tenant_id", tenant_id);
        f.raw("deleted_at IS NULL")
            .opt("stage_rank = ?", filter.stage.map(|s| s.rank()))
            .search(&["display_name", "email", "organization", "github"], filter.search.as_deref());
        if let Some(tag) = filter.tag.as_deref() {
            // tags are stored as a sorted JSON array of lowercase strings
            f.push(
                "EXISTS (SELECT 1 FROM json_each(d.tags) WHERE json_each.value = ?)",
                tag.trim().to_lowercase(),
            );
        }

        let cte = developer_cte();
        let total: i64 = self
            .conn
            .query_row(&format!("{cte} SELECT COUNT(*) FROM d {}", f.sql()), f.params(), |r| r.get(0))
            .map_err(db_err("Count developers"))?;

        let sql = format!(
            "{cte} SELECT {DEVELOPER_COLUMNS} FROM d {} ORDER BY {} LIMIT ? OFFSET ?",
            f.sql(),
            sort.to_sql("seq")
        );
        let mut stmt = self.conn.prepare(&sql).map_err(db_err("Prepare"))?;
        let items = stmt
            .query_map(f.paged_params(filter.page), developer_from_row)
            .map_err(db_err("Query developers"))?
            .collect::<rusqlite::Result<Vec<_>>>()
            .map_err(db_err("Read developer"))?;
        Ok(Page::new(items, filter.page, total as u64))
    }

    pub fn update_developer(&self, tenant_id: &str, id: &str, patch: &DeveloperPatch) -> Result<Developer> {
        check(patch)?;
        let current = self.get_developer(tenant_id, id)?;
        let display_name = patch
            .display_name
            .as_deref()
            .map(str::trim)
            .unwrap_or(current.display_name.as_str());
        let email = match &patch.email {
            Some(e) => clean(Some(e)).map(|e| e.to_lowercase()),
            None => current.email.clone(),
        };
        let github = match &patch.github {
            Some(g) => clean(Some(g)),
            None => current.github.clone(),
        };
        let organization = match &patch.organization {
            Some(o) => clean(Some(o)),
            None => current.organization.clone(),
        };
        let tags = match &patch.tags {
            Some(tags) => normalize_tags(tags),
            None => current.tags.clone(),
        };

        self.conn
            .execute(
                "UPDATE developers SET display_name=?1, email=?2, github=?3, organization=?4, tags=?5, updated_at=?6
                 WHERE tenant_id=?7 AND id=?8",
                params![
                    display_name,
                    email,
                    github,
                    organization,
                    serde_json::to_string(&tags)?,
                    types::now(),
                    tenant_id,
                    id
                ],
            )
            .map_err(conflict_or_db(
                "Update developer",
                format!("a developer with email '{}' already exists", email.as_deref().unwrap_or_default()),
            ))?;
        self.get_developer(tenant_id, id)
    }

    /// Soft delete; activities are kept but drop out of the funnel.
    pub fn delete_developer(&self, tenant_id: &str, id: &str) -> Result<()> {
        let changed = self
            .conn
            .execute(
                "UPDATE developers SET deleted_at=?1 WHERE tenant_id=?2 AND id=?3 AND deleted_at IS NULL",
                params![types::now(), tenant_id, id],
            )
            .map_err(db_err("Delete developer"))?;
        if changed == 0 {
            return Err(DevRelError::not_found(format!("developer {id}")));
        }
        tracing::info!("🗑 Deleted developer {}", id);
        Ok(())
    }

    /// Developers with a profile, and those created since `since`.
    pub fn developer_counts(&self, tenant_id: &str, since: &str) -> Result<(u64, u64)> {
        let mut all = Filter::tenant("tenant_id", tenant_id);
        all.raw("deleted_at IS NULL");
        let total = self.count("developers", &all)?;
        all.push("created_at >= ?", since.to_string());
        let new = self.count("developers", &all)?;
        Ok((total, new))
    }
}
