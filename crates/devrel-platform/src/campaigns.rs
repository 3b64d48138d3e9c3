//! Campaigns, their budget entries, and ROI.

use crate::db::{db_err, new_id, Filter, PlatformDb};
use crate::validation::{check, validate_not_blank};
use devrel_core::error::{DevRelError, Result};
use devrel_core::types::{self, Page, PageRequest, Sort};
use rusqlite::{params, OptionalExtension};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use validator::Validate;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CampaignStatus {
    Draft,
    Active,
    Paused,
    Completed,
    Archived,
}

impl CampaignStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Draft => "draft",
            Self::Active => "active",
            Self::Paused => "paused",
            Self::Completed => "completed",
            Self::Archived => "archived",
        }
    }
}

impl fmt::Display for CampaignStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for CampaignStatus {
    type Err = DevRelError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "draft" => Ok(Self::Draft),
            "active" => Ok(Self::Active),
            "paused" => Ok(Self::Paused),
            "completed" => Ok(Self::Completed),
            "archived" => Ok(Self::Archived),
            other => Err(DevRelError::validation(format!("unknown campaign status '{other}'"))),
        }
    }
}

/// Colour of the ROI badge.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RoiTone {
    Positive,
    Negative,
    Neutral,
}

impl RoiTone {
    pub fn from_roi(roi: Option<f64>) -> Self {
        match roi {
            Some(r) if r > 0.0 => Self::Positive,
            Some(r) if r < 0.0 => Self::Negative,
            _ => Self::Neutral,
        }
    }
}

/// ROI as a percentage, two decimals. `None` without spend.
pub fn compute_roi(value: f64, cost: f64) -> Option<f64> {
    if cost <= 0.0 {
        return None;
    }
    let roi = (value - cost) / cost * 100.0;
    Some((roi * 100.0).round() / 100.0)
}

/// Campaign with its computed spend, attributed value and ROI.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Campaign {
    pub id: String,
    pub name: String,
    pub description: Option<String>,
    pub channel: Option<String>,
    pub status: CampaignStatus,
    pub start_date: Option<String>,
    pub end_date: Option<String>,
    pub budget: f64,
    pub cost: f64,
    pub value: f64,
    pub roi: Option<f64>,
    pub roi_tone: RoiTone,
    pub activity_count: u64,
    pub created_at: String,
    pub updated_at: String,
}

#[derive(Debug, Clone, Default, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct NewCampaign {
    #[validate(length(min = 1, max = 200), custom(function = "validate_not_blank"))]
    pub name: String,
    #[validate(length(max = 5000))]
    pub description: Option<String>,
    #[validate(length(max = 64))]
    pub channel: Option<String>,
    pub status: Option<CampaignStatus>,
    pub start_date: Option<String>,
    pub end_date: Option<String>,
    #[validate(range(min = 0.0))]
    pub budget: Option<f64>,
}

/// Partial update; absent fields are left unchanged.
#[derive(Debug, Clone, Default, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct CampaignPatch {
    #[validate(length(min = 1, max = 200), custom(function = "validate_not_blank"))]
    pub name: Option<String>,
    #[validate(length(max = 5000))]
    pub description: Option<String>,
    #[validate(length(max = 64))]
    pub channel: Option<String>,
    pub status: Option<CampaignStatus>,
    /// `null` clears the date.
    #[serde(default, with = "crate::db::double_option")]
    pub start_date: Option<Option<String>>,
    #[serde(default, with = "crate::db::double_option")]
    pub end_date: Option<Option<String>>,
    #[validate(range(min = 0.0))]
    pub budget: Option<f64>,
}

#[derive(Debug, Clone, Default)]
pub struct CampaignFilter {
    pub status: Option<CampaignStatus>,
    pub channel: Option<String>,
    pub search: Option<String>,
    pub order_by: Option<String>,
    pub page: PageRequest,
}

pub const CAMPAIGN_SORTS: &[(&str, &str)] = &[
    ("name", "name"),
    ("createdAt", "created_at"),
    ("startDate", "start_date"),
    ("budget", "budget"),
    ("roi", "roi"),
];

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BudgetEntry {
    pub id: String,
    pub campaign_id: String,
    pub category: String,
    pub amount: f64,
    pub memo: Option<String>,
    pub spent_on: String,
    pub created_at: String,
}

#[derive(Debug, Clone, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct NewBudgetEntry {
    #[validate(length(min = 1, max = 64), custom(function = "validate_not_blank"))]
    pub category: String,
    #[validate(range(exclusive_min = 0.0))]
    pub amount: f64,
    #[validate(length(max = 500))]
    pub memo: Option<String>,
    /// Defaults to today.
    pub spent_on: Option<String>,
}

/// Campaign rows with computed spend and value (`c`), then ROI (`r`).
const CAMPAIGN_CTE: &str = "
    WITH c AS (
        SELECT campaigns.rowid AS seq, campaigns.*,
            (SELECT COALESCE(SUM(amount), 0) FROM campaign_budgets b WHERE b.campaign_id = campaigns.id) AS cost,
            (SELECT COALESCE(SUM(value), 0) FROM activities a WHERE a.campaign_id = campaigns.id) AS value,
            (SELECT COUNT(*) FROM activities a WHERE a.campaign_id = campaigns.id) AS activity_count
        FROM campaigns
    ),
    r AS (
        SELECT c.*, CASE WHEN cost > 0 THEN (value - cost) * 100.0 / cost END AS roi FROM c
    )";

const CAMPAIGN_COLUMNS: &str = "id, name, description, channel, status, start_date, end_date, budget, \
     cost, value, activity_count, created_at, updated_at";

fn campaign_from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<Campaign> {
    let status: String = row.get(4)?;
    let cost: f64 = row.get(8)?;
    let value: f64 = row.get(9)?;
    let roi = compute_roi(value, cost);
    Ok(Campaign {
        id: row.get(0)?,
        name: row.get(1)?,
        description: row.get(2)?,
        channel: row.get(3)?,
        status: status.parse().unwrap_or(CampaignStatus::Draft),
        start_date: row.get(5)?,
        end_date: row.get(6)?,
        budget: row.get(7)?,
        cost,
        value,
        roi,
        roi_tone: RoiTone::from_roi(roi),
        activity_count: row.get::<_, i64>(10)? as u64,
        created_at: row.get(11)?,
        updated_at: row.get(12)?,
    })
}

/// Normalize optional dates and check `end >= start`.
fn check_dates(start: Option<&str>, end: Option<&str>) -> Result<(Option<String>, Option<String>)> {
    let start = start.map(types::parse_date).transpose()?;
    let end = end.map(types::parse_date).transpose()?;
    if let (Some(s), Some(e)) = (start, end) {
        if e < s {
            return Err(DevRelError::validation("endDate must not be before startDate"));
        }
    }
    Ok((start.map(|d| d.to_string()), end.map(|d| d.to_string())))
}

fn trimmed(value: Option<&str>) -> Option<String> {
    value.map(str::trim).filter(|s| !s.is_empty()).map(String::from)
}

impl PlatformDb {
    pub fn create_campaign(&self, tenant_id: &str, input: &NewCampaign) -> Result<Campaign> {
        check(input)?;
        let (start, end) = check_dates(input.start_date.as_deref(), input.end_date.as_deref())?;
        let id = new_id();
        let now = types::now();
        self.conn
            .execute(
                "INSERT INTO campaigns (id, tenant_id, name, description, channel, status, start_date, end_date, budget, created_at, updated_at)
                 VALUES (?1,?2,?3,?4,?5,?6,?7,?8,?9,?10,?10)",
                params![
                    id,
                    tenant_id,
                    input.name.trim(),
                    trimmed(input.description.as_deref()),
                    trimmed(input.channel.as_deref()),
                    input.status.unwrap_or(CampaignStatus::Draft).as_str(),
                    start,
                    end,
                    input.budget.unwrap_or(0.0),
                    now,
                ],
            )
            .map_err(db_err("Insert campaign"))?;
        tracing::info!("📣 Created campaign '{}' ({})", input.name.trim(), id);
        self.get_campaign(tenant_id, &id)
    }

    pub fn get_campaign(&self, tenant_id: &str, id: &str) -> Result<Campaign> {
        let sql = format!(
            "{CAMPAIGN_CTE} SELECT {CAMPAIGN_COLUMNS} FROM r
             WHERE tenant_id=?1 AND id=?2 AND deleted_at IS NULL"
        );
        self.conn
            .query_row(&sql, params![tenant_id, id], campaign_from_row)
            .optional()
            .map_err(db_err("Get campaign"))?
            .ok_or_else(|| DevRelError::not_found(format!("campaign {id}")))
    }

    pub fn list_campaigns(&self, tenant_id: &str, filter: &CampaignFilter) -> Result<Page<Campaign>> {
        let sort = Sort::parse(filter.order_by.as_deref(), CAMPAIGN_SORTS, Sort::desc("created_at"))?;
        let mut f = Filter::tenant("tenant_id", tenant_id);
        f.raw("deleted_at IS NULL")
            .opt("status = ?", filter.status.map(|s| s.as_str().to_string()))
            .opt("channel = ?", filter.channel.clone())
            .search(&["name", "description"], filter.search.as_deref());

        let total = {
            let sql = format!("{CAMPAIGN_CTE} SELECT COUNT(*) FROM r {}", f.sql());
            let n: i64 = self
                .conn
                .query_row(&sql, f.params(), |r| r.get(0))
                .map_err(db_err("Count campaigns"))?;
            n as u64
        };

        let sql = format!(
            "{CAMPAIGN_CTE} SELECT {CAMPAIGN_COLUMNS} FROM r {} ORDER BY {} LIMIT ? OFFSET ?",
            f.sql(),
            sort.to_sql("seq"),
        );
        let mut stmt = self.conn.prepare(&sql).map_err(db_err("Prepare"))?;
        let items = stmt
            .query_map(f.paged_params(filter.page), campaign_from_row)
            .map_err(db_err("Query campaigns"))?
            .collect::<rusqlite::Result<Vec<_>>>()
            .map_err(db_err("Read campaign"))?;
        Ok(Page::new(items, filter.page, total))
    }

    pub fn update_campaign(&self, tenant_id: &str, id: &str, patch: &CampaignPatch) -> Result<Campaign> {
        check(patch)?;
        let current = self.get_campaign(tenant_id, id)?;
        let start = match &patch.start_date {
            Some(value) => value.as_deref(),
            None => current.start_date.as_deref(),
        };
        let end = match &patch.end_date {
            Some(value) => value.as_deref(),
            None => current.end_date.as_deref(),
        };
        let (start, end) = check_dates(start, end)?;

        let name = patch.name.as_deref().map(str::trim).unwrap_or(current.name.as_str());
        let description = match &patch.description {
            Some(d) => trimmed(Some(d)),
            None => current.description.clone(),
        };
        let channel = match &patch.channel {
            Some(c) => trimmed(Some(c)),
            None => current.channel.clone(),
        };
        let status = patch.status.unwrap_or(current.status);
        let budget = patch.budget.unwrap_or(current.budget);

        self.conn
            .execute(
                "UPDATE campaigns SET name=?1, description=?2, channel=?3, status=?4, start_date=?5,
                 end_date=?6, budget=?7, updated_at=?8 WHERE tenant_id=?9 AND id=?10",
                params![name, description, channel, status.as_str(), start, end, budget, types::now(), tenant_id, id],
            )
            .map_err(db_err("Update campaign"))?;
        if status != current.status {
            tracing::info!("Campaign {} status {} → {}", id, current.status, status);
        }
        self.get_campaign(tenant_id, id)
    }

    /// Soft delete. A second delete reports not found.
    pub fn delete_campaign(&self, tenant_id: &str, id: &str) -> Result<()> {
        let changed = self
            .conn
            .execute(
                "UPDATE campaigns SET deleted_at=?1 WHERE tenant_id=?2 AND id=?3 AND deleted_at IS NULL",
                params![types::now(), tenant_id, id],
            )
            .map_err(db_err("Delete campaign"))?;
        if changed == 0 {
            return Err(DevRelError::not_found(format!("campaign {id}")));
        }
        tracing::info!("🗑 Archived campaign {}", id);
        Ok(())
    }

    // ── Budget entries ────────────────────────────────────

    pub fn add_budget_entry(&self, tenant_id: &str, campaign_id: &str, input: &NewBudgetEntry) -> Result<BudgetEntry> {
        check(input)?;
        self.get_campaign(tenant_id, campaign_id)?;
        let spent_on = match input.spent_on.as_deref() {
            Some(d) => types::parse_date(d)?.to_string(),
            None => chrono::Utc::now().date_naive().to_string(),
        };
        let id = new_id();
        let now = types::now();
        self.conn
            .execute(
                "INSERT INTO campaign_budgets (id, tenant_id, campaign_id, category, amount, memo, spent_on, created_at)
                 VALUES (?1,?2,?3,?4,?5,?6,?7,?8)",
                params![id, tenant_id, campaign_id, input.category.trim(), input.amount, trimmed(input.memo.as_deref()), spent_on, now],
            )
            .map_err(db_err("Insert budget entry"))?;
        Ok(BudgetEntry {
            id,
            campaign_id: campaign_id.into(),
            category: input.category.trim().into(),
            amount: input.amount,
            memo: trimmed(input.memo.as_deref()),
            spent_on,
            created_at: now,
        })
    }

    pub fn list_budget_entries(&self, tenant_id: &str, campaign_id: &str) -> Result<Vec<BudgetEntry>> {
        self.get_campaign(tenant_id, campaign_id)?;
        let mut stmt = self
            .conn
            .prepare(
                "SELECT id, campaign_id, category, amount, memo, spent_on, created_at FROM campaign_budgets
                 WHERE tenant_id=?1 AND campaign_id=?2 ORDER BY spent_on DESC, rowid DESC",
            )
            .map_err(db_err("Prepare"))?;
        let entries = stmt
            .query_map(params![tenant_id, campaign_id], |row| {
                Ok(BudgetEntry {
                    id: row.get(0)?,
                    campaign_id: row.get(1)?,
                    category: row.get(2)?,
                    amount: row.get(3)?,
                    memo: row.get(4)?,
                    spent_on: row.get(5)?,
                    created_at: row.get(6)?,
                })
            })
            .map_err(db_err("Query"))?
            .collect::<rusqlite::Result<Vec<_>>>()
            .map_err(db_err("Read budget entry"))?;
        Ok(entries)
    }

    pub fn delete_budget_entry(&self, tenant_id: &str, campaign_id: &str, entry_id: &str) -> Result<()> {
        let changed = self
            .conn
            .execute(
                "DELETE FROM campaign_budgets WHERE tenant_id=?1 AND campaign_id=?2 AND id=?3",
                params![tenant_id, campaign_id, entry_id],
            )
            .map_err(db_err("Delete budget entry"))?;
        if changed == 0 {
            return Err(DevRelError::not_found(format!("budget entry {entry_id}")));
        }
        Ok(())
    }

    /// Number of campaigns currently in `active` status.
    pub fn active_campaign_count(&self, tenant_id: &str) -> Result<u64> {
        let mut f = Filter::tenant("tenant_id", tenant_id);
        f.raw("deleted_at IS NULL").push("status = ?", CampaignStatus::Active.as_str().to_string());
        self.count("campaigns", &f)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::tests::db_with_tenant;

    fn new_campaign(name: &str) -> NewCampaign {
        NewCampaign {
            name: name.into(),
            ..Default::default()
        }
    }

    #[test]
    fn test_roi_and_tone() {
        assert_eq!(compute_roi(1500.0, 1000.0), Some(50.0));
        assert_eq!(compute_roi(500.0, 1000.0), Some(-50.0));
        assert_eq!(compute_roi(100.0, 0.0), None);
        assert_eq!(compute_roi(1.0, 3.0), Some(-66.67));

        assert_eq!(RoiTone::from_roi(Some(0.01)), RoiTone::Positive);
        assert_eq!(RoiTone::from_roi(Some(-2.0)), RoiTone::Negative);
        assert_eq!(RoiTone::from_roi(Some(0.0)), RoiTone::Neutral);
        assert_eq!(RoiTone::from_roi(None), RoiTone::Neutral);
    }

    #[test]
    fn test_create_and_get() {
        let (db, t) = db_with_tenant();
        let c = db
            .create_campaign(
                &t.id,
                &NewCampaign {
                    name: " Launch Week ".into(),
                    channel: Some("event".into()),
                    start_date: Some("2024-05-01".into()),
                    end_date: Some("2024-05-07".into()),
                    budget: Some(5000.0),
                    ..Default::default()
                },
            )
            .unwrap();
        assert_eq!(c.name, "Launch Week");
        assert_eq!(c.status, CampaignStatus::Draft);
        assert_eq!(c.roi, None);
        assert_eq!(c.roi_tone, RoiTone::Neutral);
        assert_eq!(db.get_campaign(&t.id, &c.id).unwrap().budget, 5000.0);
    }

    #[test]
    fn test_validation() {
        let (db, t) = db_with_tenant();
        assert!(matches!(
            db.create_campaign(&t.id, &new_campaign("   ")),
            Err(DevRelError::Validation(_))
        ));
        let backwards = NewCampaign {
            name: "Backwards".into(),
            start_date: Some("2024-05-07".into()),
            end_date: Some("2024-05-01".into()),
            ..Default::default()
        };
        assert!(db.create_campaign(&t.id, &backwards).is_err());
        let negative = NewCampaign {
            name: "Negative".into(),
            budget: Some(-1.0),
            ..Default::default()
        };
        assert!(db.create_campaign(&t.id, &negative).is_err());
    }

    #[test]
    fn test_patch_dates_keep_or_clear() {
        let (db, t) = db_with_tenant();
        let c = db
            .create_campaign(
                &t.id,
                &NewCampaign {
                    name: "Roadshow".into(),
                    start_date: Some("2024-05-01".into()),
                    end_date: Some("2024-05-07".into()),
                    ..Default::default()
                },
            )
            .unwrap();

        let rename: CampaignPatch = serde_json::from_value(serde_json::json!({"name": "Roadshow EU"})).unwrap();
        let kept = db.update_campaign(&t.id, &c.id, &rename).unwrap();
        assert_eq!(kept.start_date.as_deref(), Some("2024-05-01"));
        assert_eq!(kept.end_date.as_deref(), Some("2024-05-07"));

        let clear: CampaignPatch = serde_json::from_value(serde_json::json!({"endDate": null})).unwrap();
        let cleared = db.update_campaign(&t.id, &c.id, &clear).unwrap();
        assert_eq!(cleared.start_date.as_deref(), Some("2024-05-01"));
        assert_eq!(cleared.end_date, None);

        let both: CampaignPatch =
            serde_json::from_value(serde_json::json!({"startDate": null, "endDate": "2024-06-30"})).unwrap();
        let moved = db.update_campaign(&t.id, &c.id, &both).unwrap();
        assert_eq!(moved.start_date, None);
        assert_eq!(moved.end_date.as_deref(), Some("2024-06-30"));

        let backwards = CampaignPatch {
            start_date: Some(Some("2024-07-01".into())),
            ..Default::default()
        };
        assert!(matches!(
            db.update_campaign(&t.id, &c.id, &backwards),
            Err(DevRelError::Validation(_))
        ));
    }

    #[test]
    fn test_budget_entries_drive_cost() {
        let (db, t) = db_with_tenant();
        let c = db.create_campaign(&t.id, &new_campaign("Meetup")).unwrap();
        let entry = NewBudgetEntry {
            category: "venue".into(),
            amount: 400.0,
            memo: None,
            spent_on: Some("2024-02-01".into()),
        };
        db.add_budget_entry(&t.id, &c.id, &entry).unwrap();
        let second = db
            .add_budget_entry(&t.id, &c.id, &NewBudgetEntry { amount: 100.0, ..entry.clone() })
            .unwrap();

        let loaded = db.get_campaign(&t.id, &c.id).unwrap();
        assert_eq!(loaded.cost, 500.0);
        assert_eq!(loaded.roi, Some(-100.0));
        assert_eq!(loaded.roi_tone, RoiTone::Negative);

        db.delete_budget_entry(&t.id, &c.id, &second.id).unwrap();
        assert_eq!(db.list_budget_entries(&t.id, &c.id).unwrap().len(), 1);
        assert!(db.delete_budget_entry(&t.id, &c.id, &second.id).is_err());

        let zero = NewBudgetEntry { amount: 0.0, ..entry };
        assert!(db.add_budget_entry(&t.id, &c.id, &zero).is_err());
    }

    #[test]
    fn test_list_filter_search_sort_paginate() {
        let (db, t) = db_with_tenant();
        for (name, status) in [
            ("Alpha Launch", CampaignStatus::Active),
            ("Beta Webinar", CampaignStatus::Draft),
            ("Gamma Launch", CampaignStatus::Active),
        ] {
            db.create_campaign(
                &t.id,
                &NewCampaign {
                    name: name.into(),
                    status: Some(status),
                    ..Default::default()
                },
            )
            .unwrap();
        }

        let active = db
            .list_campaigns(
                &t.id,
                &CampaignFilter {
                    status: Some(CampaignStatus::Active),
                    order_by: Some("name".into()),
                    ..Default::default()
                },
            )
            .unwrap();
        assert_eq!(active.pagination.total, 2);
        assert_eq!(active.items[0].name, "Alpha Launch");

        let search = db
            .list_campaigns(
                &t.id,
                &CampaignFilter {
                    search: Some("launch".into()),
                    order_by: Some("-name".into()),
                    ..Default::default()
                },
            )
            .unwrap();
        assert_eq!(search.items.len(), 2);
        assert_eq!(search.items[0].name, "Gamma Launch");

        let paged = db
            .list_campaigns(
                &t.id,
                &CampaignFilter {
                    page: PageRequest { page: 2, limit: 2 },
                    ..Default::default()
                },
            )
            .unwrap();
        assert_eq!(paged.items.len(), 1);
        assert_eq!(paged.pagination.total_pages, 2);
        // default order is newest first
        assert_eq!(paged.items[0].name, "Alpha Launch");

        let bad_sort = CampaignFilter {
            order_by: Some("tenant_id".into()),
            ..Default::default()
        };
        assert!(db.list_campaigns(&t.id, &bad_sort).is_err());
    }

    #[test]
    fn test_update_and_soft_delete() {
        let (db, t) = db_with_tenant();
        let c = db.create_campaign(&t.id, &new_campaign("Docs Sprint")).unwrap();
        let updated = db
            .update_campaign(
                &t.id,
                &c.id,
                &CampaignPatch {
                    status: Some(CampaignStatus::Active),
                    description: Some("  ".into()),
                    ..Default::default()
                },
            )
            .unwrap();
        assert_eq!(updated.status, CampaignStatus::Active);
        assert_eq!(updated.name, "Docs Sprint");
        assert_eq!(updated.description, None);
        assert_eq!(db.active_campaign_count(&t.id).unwrap(), 1);

        db.delete_campaign(&t.id, &c.id).unwrap();
        assert!(matches!(db.get_campaign(&t.id, &c.id), Err(DevRelError::NotFound(_))));
        assert!(db.delete_campaign(&t.id, &c.id).is_err());
        assert_eq!(db.list_campaigns(&t.id, &CampaignFilter::default()).unwrap().pagination.total, 0);
    }

    #[test]
    fn test_tenant_isolation() {
        let (db, t) = db_with_tenant();
        let other = db.create_tenant("Other", "other").unwrap();
        let c = db.create_campaign(&t.id, &new_campaign("Private")).unwrap();

        assert!(db.get_campaign(&other.id, &c.id).is_err());
        assert!(db.update_campaign(&other.id, &c.id, &CampaignPatch::default()).is_err());
        assert!(db.delete_campaign(&other.id, &c.id).is_err());
        assert_eq!(db.list_campaigns(&other.id, &CampaignFilter::default()).unwrap().items.len(), 0);
    }
}
