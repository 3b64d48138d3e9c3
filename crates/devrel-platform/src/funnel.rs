//! Developer funnel: awareness → engagement → adoption → advocacy.

use crate::db::{db_err, Filter, PlatformDb};
use devrel_core::error::{DevRelError, Result};
use devrel_core::types;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FunnelStage {
    Awareness,
    Engagement,
    Adoption,
    Advocacy,
}

impl FunnelStage {
    pub const ALL: [FunnelStage; 4] = [
        FunnelStage::Awareness,
        FunnelStage::Engagement,
        FunnelStage::Adoption,
        FunnelStage::Advocacy,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Awareness => "awareness",
            Self::Engagement => "engagement",
            Self::Adoption => "adoption",
            Self::Advocacy => "advocacy",
        }
    }

    /// 1-based position in the funnel.
    pub fn rank(&self) -> i64 {
        match self {
            Self::Awareness => 1,
            Self::Engagement => 2,
            Self::Adoption => 3,
            Self::Advocacy => 4,
        }
    }

    pub fn from_rank(rank: i64) -> Option<Self> {
        Self::ALL.into_iter().find(|s| s.rank() == rank)
    }
}

impl fmt::Display for FunnelStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for FunnelStage {
    type Err = DevRelError;

    fn from_str(s: &str) -> Result<Self> {
        Self::ALL
            .into_iter()
            .find(|stage| stage.as_str() == s)
            .ok_or_else(|| DevRelError::validation(format!("unknown funnel stage '{s}'")))
    }
}

/// SQL expression ranking `t.funnel_stage` (activity_types aliased `t`).
pub(crate) const STAGE_RANK_SQL: &str = "CASE t.funnel_stage \
    WHEN 'awareness' THEN 1 WHEN 'engagement' THEN 2 \
    WHEN 'adoption' THEN 3 WHEN 'advocacy' THEN 4 END";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FunnelStageCount {
    pub stage: FunnelStage,
    pub developers: u64,
    /// Percentage of the previous stage that reached this one.
    pub conversion_rate: Option<f64>,
    pub drop_off: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FunnelReport {
    pub from: Option<String>,
    pub to: Option<String>,
    pub campaign_id: Option<String>,
    pub stages: Vec<FunnelStageCount>,
    pub overall_conversion: Option<f64>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FunnelQuery {
    pub from: Option<String>,
    pub to: Option<String>,
    pub campaign_id: Option<String>,
}

pub(crate) fn percent(part: u64, whole: u64) -> Option<f64> {
    if whole == 0 {
        return None;
    }
    Some(((part as f64 / whole as f64) * 10_000.0).round() / 100.0)
}

/// Build stage counts from each developer's highest reached stage. A
/// developer counts toward every stage up to and including their highest.
pub fn build_funnel(highest: impl IntoIterator<Item = FunnelStage>) -> Vec<FunnelStageCount> {
    let mut reached = [0u64; 4];
    for stage in highest {
        for slot in reached.iter_mut().take(stage.rank() as usize) {
            *slot += 1;
        }
    }

    let mut previous: Option<u64> = None;
    FunnelStage::ALL
        .into_iter()
        .zip(reached)
        .map(|(stage, developers)| {
            let count = FunnelStageCount {
                stage,
                developers,
                conversion_rate: previous.and_then(|p| percent(developers, p)),
                drop_off: previous.map(|p| p - developers).unwrap_or(0),
            };
            previous = Some(developers);
            count
        })
        .collect()
}

impl PlatformDb {
    /// Each developer's highest stage reached by activities in the window.
    fn highest_stages(
        &self,
        tenant_id: &str,
        from: Option<&str>,
        to: Option<&str>,
        campaign_id: Option<&str>,
    ) -> Result<Vec<FunnelStage>> {
        let mut f = Filter::tenant("a.tenant_id", tenant_id);
        f.raw("t.funnel_stage IS NOT NULL")
            .opt("a.occurred_at >= ?", from.map(String::from))
            .opt("a.occurred_at <= ?", to.map(String::from))
            .opt("a.campaign_id = ?", campaign_id.map(String::from));
        let sql = format!(
            "SELECT MAX({STAGE_RANK_SQL}) FROM activities a
             JOIN activity_types t ON t.tenant_id = a.tenant_id AND t.action = a.action
             JOIN developers d ON d.id = a.developer_id AND d.deleted_at IS NULL
             {} GROUP BY a.developer_id",
            f.sql()
        );
        let mut stmt = self.conn.prepare(&sql).map_err(db_err("Prepare"))?;
        let ranks = stmt
            .query_map(f.params(), |row| row.get::<_, i64>(0))
            .map_err(db_err("Query funnel"))?
            .collect::<rusqlite::Result<Vec<_>>>()
            .map_err(db_err("Read funnel row"))?;
        Ok(ranks.into_iter().filter_map(FunnelStage::from_rank).collect())
    }

    pub fn funnel_report(&self, tenant_id: &str, query: &FunnelQuery) -> Result<FunnelReport> {
        let from = query.from.as_deref().map(|s| types::parse_range_bound(s, false)).transpose()?;
        let to = query.to.as_deref().map(|s| types::parse_range_bound(s, true)).transpose()?;
        if let (Some(f), Some(t)) = (&from, &to) {
            if t < f {
                return Err(DevRelError::validation("'to' must not be before 'from'"));
            }
        }
        if let Some(campaign_id) = query.campaign_id.as_deref() {
            self.get_campaign(tenant_id, campaign_id)?;
        }

        let highest = self.highest_stages(tenant_id, from.as_deref(), to.as_deref(), query.campaign_id.as_deref())?;
        let stages = build_funnel(highest);
        let first = stages.first().map(|s| s.developers).unwrap_or(0);
        let last = stages.last().map(|s| s.developers).unwrap_or(0);
        Ok(FunnelReport {
            from,
            to,
            campaign_id: query.campaign_id.clone(),
            overall_conversion: percent(last, first),
            stages,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::activities::NewActivity;
    use crate::db::tests::db_with_tenant;
    use crate::developers::NewDeveloper;

    #[test]
    fn test_build_funnel_counts_are_cumulative() {
        use FunnelStage::*;
        let stages = build_funnel([Awareness, Engagement, Engagement, Adoption, Advocacy]);
        let counts: Vec<u64> = stages.iter().map(|s| s.developers).collect();
        assert_eq!(counts, vec![5, 4, 2, 1]);
        assert_eq!(stages[0].conversion_rate, None);
        assert_eq!(stages[1].conversion_rate, Some(80.0));
        assert_eq!(stages[2].conversion_rate, Some(50.0));
        assert_eq!(stages[2].drop_off, 2);
        assert!(counts.windows(2).all(|w| w[0] >= w[1]));
    }

    #[test]
    fn test_build_funnel_empty() {
        let stages = build_funnel(Vec::<FunnelStage>::new());
        assert!(stages.iter().all(|s| s.developers == 0 && s.conversion_rate.is_none()));
    }

    #[test]
    fn test_stage_parse() {
        assert_eq!("adoption".parse::<FunnelStage>().unwrap(), FunnelStage::Adoption);
        assert!("retention".parse::<FunnelStage>().is_err());
        assert_eq!(FunnelStage::from_rank(4), Some(FunnelStage::Advocacy));
        assert_eq!(FunnelStage::from_rank(0), None);
    }

    #[test]
    fn test_funnel_report_from_activities() {
        let (db, t) = db_with_tenant();
        let record = |dev: &str, action: &str, at: &str| {
            db.record_activity(
                &t.id,
                &NewActivity {
                    developer_id: dev.into(),
                    action: action.into(),
                    source: "test".into(),
                    occurred_at: Some(at.into()),
                    ..Default::default()
                },
            )
            .unwrap();
        };
        let dev = |name: &str| {
            db.create_developer(
                &t.id,
                &NewDeveloper {
                    display_name: name.into(),
                    ..Default::default()
                },
            )
            .unwrap()
            .id
        };
        let ada = dev("Ada");
        let bob = dev("Bob");
        let cy = dev("Cy");
        record(&ada, "content_view", "2024-01-02T10:00:00Z");
        record(&ada, "first_api_call", "2024-01-05T10:00:00Z");
        record(&bob, "content_view", "2024-01-03T10:00:00Z");
        record(&bob, "community_post", "2024-01-04T10:00:00Z");
        record(&cy, "talk_given", "2024-03-01T10:00:00Z");

        let report = db.funnel_report(&t.id, &FunnelQuery::default()).unwrap();
        let counts: Vec<u64> = report.stages.iter().map(|s| s.developers).collect();
        assert_eq!(counts, vec![3, 3, 2, 1]);
        assert_eq!(report.overall_conversion, Some(33.33));

        let january = db
            .funnel_report(
                &t.id,
                &FunnelQuery {
                    from: Some("2024-01-01".into()),
                    to: Some("2024-01-31".into()),
                    campaign_id: None,
                },
            )
            .unwrap();
        let counts: Vec<u64> = january.stages.iter().map(|s| s.developers).collect();
        assert_eq!(counts, vec![2, 2, 1, 0]);

        let backwards = FunnelQuery {
            from: Some("2024-02-01".into()),
            to: Some("2024-01-01".into()),
            campaign_id: None,
        };
        assert!(db.funnel_report(&t.id, &backwards).is_err());
    }
}
