//! Dashboard overview for a trailing window of days.

use crate::activities::ActionCount;
use crate::db::{db_err, PlatformDb};
use crate::events::EventHealth;
use chrono::{DateTime, Duration, NaiveDate, Utc};
use devrel_core::error::{DevRelError, Result};
use devrel_core::types;
use rusqlite::params;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

pub const DEFAULT_DAYS: u32 = 30;
pub const MAX_DAYS: u32 = 365;
const TOP_ACTIONS: usize = 5;

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OverviewTotals {
    pub developers: u64,
    pub active_developers: u64,
    pub new_developers: u64,
    pub activities: u64,
    pub active_campaigns: u64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DailyPoint {
    pub date: NaiveDate,
    pub count: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Overview {
    pub days: u32,
    pub since: String,
    pub totals: OverviewTotals,
    pub activity_series: Vec<DailyPoint>,
    pub top_actions: Vec<ActionCount>,
    pub plugin_events: EventHealth,
}

/// Fill every day in `[start, start + days)` from sparse per-day counts.
pub fn zero_filled(start: NaiveDate, days: u32, counts: &HashMap<NaiveDate, u64>) -> Vec<DailyPoint> {
    (0..days as i64)
        .map(|offset| {
            let date = start + Duration::days(offset);
            DailyPoint {
                date,
                count: counts.get(&date).copied().unwrap_or(0),
            }
        })
        .collect()
}

impl PlatformDb {
    pub fn overview(&self, tenant_id: &str, days: Option<u32>) -> Result<Overview> {
        self.overview_at(tenant_id, days, Utc::now())
    }

    pub(crate) fn overview_at(&self, tenant_id: &str, days: Option<u32>, now: DateTime<Utc>) -> Result<Overview> {
        let days = days.unwrap_or(DEFAULT_DAYS);
        if !(1..=MAX_DAYS).contains(&days) {
            return Err(DevRelError::validation(format!("days must be between 1 and {MAX_DAYS}")));
        }
        let start = now.date_naive() - Duration::days(days as i64 - 1);
        let since = start
            .and_hms_opt(0, 0, 0)
            .map(|t| types::timestamp(t.and_utc()))
            .ok_or_else(|| DevRelError::validation("invalid window start"))?;
        let until = types::timestamp(now);

        let (developers, new_developers) = self.developer_counts(tenant_id, &since)?;
        let (activities, active_developers) = self
            .conn
            .query_row(
                "SELECT COUNT(*), COUNT(DISTINCT a.developer_id) FROM activities a
                 JOIN developers d ON d.id = a.developer_id AND d.deleted_at IS NULL
                 WHERE a.tenant_id=?1 AND a.occurred_at >= ?2 AND a.occurred_at <= ?3",
                params![tenant_id, since, until],
                |r| Ok((r.get::<_, i64>(0)? as u64, r.get::<_, i64>(1)? as u64)),
            )
            .map_err(db_err("Overview totals"))?;

        let mut stmt = self
            .conn
            .prepare(
                "SELECT substr(a.occurred_at, 1, 10) AS day, COUNT(*) FROM activities a
                 JOIN developers d ON d.id = a.developer_id AND d.deleted_at IS NULL
                 WHERE a.tenant_id=?1 AND a.occurred_at >= ?2 AND a.occurred_at <= ?3 GROUP BY day",
            )
            .map_err(db_err("Prepare"))?;
        let counts: HashMap<NaiveDate, u64> = stmt
            .query_map(params![tenant_id, since, until], |r| {
                Ok((r.get::<_, String>(0)?, r.get::<_, i64>(1)? as u64))
            })
            .map_err(db_err("Query series"))?
            .collect::<rusqlite::Result<Vec<_>>>()
            .map_err(db_err("Read series"))?
            .into_iter()
            .filter_map(|(day, n)| types::parse_date(&day).ok().map(|d| (d, n)))
            .collect();

        Ok(Overview {
            days,
            totals: OverviewTotals {
                developers,
                active_developers,
                new_developers,
                activities,
                active_campaigns: self.active_campaign_count(tenant_id)?,
            },
            activity_series: zero_filled(start, days, &counts),
            top_actions: self.top_actions(tenant_id, &since, &until, TOP_ACTIONS)?,
            plugin_events: self.event_health(tenant_id)?,
            since,
        })
    }
}
