//! Plugin events: raw deliveries from an integration, processed out of band.

use crate::db::{db_err, new_id, Filter, PlatformDb};
use crate::funnel::percent;
use crate::validation::{check, validate_json_object, validate_not_blank};
use devrel_core::error::{DevRelError, Result};
use devrel_core::types::{self, Page, PageRequest, Sort};
use rusqlite::{params, OptionalExtension};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use validator::Validate;

pub const MAX_BATCH: usize = 500;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EventStatus {
    Pending,
    Processed,
    Failed,
}

impl EventStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Processed => "processed",
            Self::Failed => "failed",
        }
    }
}

impl fmt::Display for EventStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for EventStatus {
    type Err = DevRelError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "pending" => Ok(Self::Pending),
            "processed" => Ok(Self::Processed),
            "failed" => Ok(Self::Failed),
            other => Err(DevRelError::validation(format!("unknown event status '{other}'"))),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PluginEvent {
    pub id: String,
    pub plugin_id: String,
    pub event_type: String,
    pub external_id: Option<String>,
    pub status: EventStatus,
    pub payload: serde_json::Value,
    pub error_message: Option<String>,
    pub attempts: u32,
    pub received_at: String,
    pub processed_at: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct NewPluginEvent {
    #[validate(length(min = 1, max = 100), custom(function = "validate_not_blank"))]
    pub event_type: String,
    #[validate(length(min = 1, max = 200))]
    pub external_id: Option<String>,
    #[validate(custom(function = "validate_json_object"))]
    pub payload: Option<serde_json::Value>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct IngestSummary {
    pub accepted: usize,
    pub event_ids: Vec<String>,
    /// External ids that were already stored (or repeated in the batch).
    pub duplicates: Vec<String>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EventResult {
    pub status: EventStatus,
    pub error: Option<String>,
}

#[derive(Debug, Clone, Default)]
pub struct EventFilter {
    pub status: Option<EventStatus>,
    pub event_type: Option<String>,
    pub search: Option<String>,
    pub from: Option<String>,
    pub to: Option<String>,
    pub order_by: Option<String>,
    pub page: PageRequest,
}

pub const EVENT_SORTS: &[(&str, &str)] = &[
    ("receivedAt", "received_at"),
    ("processedAt", "processed_at"),
    ("eventType", "event_type"),
    ("attempts", "attempts"),
];

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EventTypeCount {
    pub event_type: String,
    pub total: u64,
    pub failed: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EventStats {
    pub total: u64,
    pub pending: u64,
    pub processed: u64,
    pub failed: u64,
    /// Failed share of finished events, in percent.
    pub error_rate: Option<f64>,
    pub by_type: Vec<EventTypeCount>,
    pub last_received_at: Option<String>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EventHealth {
    pub pending: u64,
    pub failed: u64,
}

const EVENT_COLUMNS: &str =
    "id, plugin_id, event_type, external_id, status, payload, error_message, attempts, received_at, processed_at";

fn event_from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<PluginEvent> {
    let status: String = row.get(4)?;
    let payload: String = row.get(5)?;
    Ok(PluginEvent {
        id: row.get(0)?,
        plugin_id: row.get(1)?,
        event_type: row.get(2)?,
        external_id: row.get(3)?,
        status: status.parse().unwrap_or(EventStatus::Pending),
        payload: serde_json::from_str(&payload).unwrap_or(serde_json::Value::Null),
        error_message: row.get(6)?,
        attempts: row.get(7)?,
        received_at: row.get(8)?,
        processed_at: row.get(9)?,
    })
}

fn is_unique_violation(e: &rusqlite::Error) -> bool {
    matches!(e, rusqlite::Error::SqliteFailure(err, _) if err.code == rusqlite::ErrorCode::ConstraintViolation)
}

impl PlatformDb {
    /// Store a batch of events for an enabled plugin. Deliveries whose
    /// external id is already known are skipped and reported back.
    pub fn ingest_events(&self, tenant_id: &str, plugin_id: &str, events: &[NewPluginEvent]) -> Result<IngestSummary> {
        if events.is_empty() {
            return Err(DevRelError::validation("at least one event is required"));
        }
        if events.len() > MAX_BATCH {
            return Err(DevRelError::validation(format!(
                "batch of {} events exceeds the limit of {MAX_BATCH}",
                events.len()
            )));
        }
        for (i, event) in events.iter().enumerate() {
            check(event).map_err(|e| DevRelError::Validation(format!("events[{i}]: {e}")))?;
        }
        let plugin = self.get_plugin(tenant_id, plugin_id)?;
        if !plugin.enabled {
            return Err(DevRelError::conflict(format!("plugin '{}' is disabled", plugin.key)));
        }

        let tx = self.conn.unchecked_transaction().map_err(db_err("Begin ingest"))?;
        let now = types::now();
        let mut summary = IngestSummary {
            accepted: 0,
            event_ids: Vec::new(),
            duplicates: Vec::new(),
        };
        for event in events {
            let id = new_id();
            let payload = event.payload.clone().unwrap_or_else(|| serde_json::json!({}));
            let inserted = tx.execute(
                "INSERT INTO plugin_events (id, tenant_id, plugin_id, event_type, external_id, payload, received_at)
                 VALUES (?1,?2,?3,?4,?5,?6,?7)",
                params![id, tenant_id, plugin_id, event.event_type.trim(), event.external_id, payload.to_string(), now],
            );
            match inserted {
                Ok(_) => {
                    summary.accepted += 1;
                    summary.event_ids.push(id);
                }
                Err(e) if is_unique_violation(&e) => {
                    summary.duplicates.push(event.external_id.clone().unwrap_or_default());
                }
                Err(e) => return Err(DevRelError::database(format!("Insert plugin event: {e}"))),
            }
        }
        tx.commit().map_err(db_err("Commit ingest"))?;

        if !summary.duplicates.is_empty() {
            tracing::warn!(
                "Plugin '{}': skipped {} duplicate event(s)",
                plugin.key,
                summary.duplicates.len()
            );
        }
        tracing::debug!("Plugin '{}': ingested {} event(s)", plugin.key, summary.accepted);
        Ok(summary)
    }

    pub fn get_plugin_event(&self, tenant_id: &str, plugin_id: &str, id: &str) -> Result<PluginEvent> {
        self.conn
            .query_row(
                &format!("SELECT {EVENT_COLUMNS} FROM plugin_events WHERE tenant_id=?1 AND plugin_id=?2 AND id=?3"),
                params![tenant_id, plugin_id, id],
                event_from_row,
            )
            .optional()
            .map_err(db_err("Get plugin event"))?
            .ok_or_else(|| DevRelError::not_found(format!("event {id}")))
    }

    pub fn list_plugin_events(&self, tenant_id: &str, plugin_id: &str, filter: &EventFilter) -> Result<Page<PluginEvent>> {
        self.get_plugin(tenant_id, plugin_id)?;
        let sort = Sort::parse(filter.order_by.as_deref(), EVENT_SORTS, Sort::desc("received_at"))?;
        let from = filter.from.as_deref().map(|s| types::parse_range_bound(s, false)).transpose()?;
        let to = filter.to.as_deref().map(|s| types::parse_range_bound(s, true)).transpose()?;

        let mut f = Filter::tenant("tenant_id", tenant_id);
        f.push("plugin_id = ?", plugin_id.to_string())
            .opt("status = ?", filter.status.map(|s| s.as_str().to_string()))
            .opt("event_type = ?", filter.event_type.clone())
            .opt("received_at >= ?", from)
            .opt("received_at <= ?", to)
            .search(&["event_type", "external_id", "error_message"], filter.search.as_deref());

        let total = self.count("plugin_events", &f)?;
        let sql = format!(
            "SELECT {EVENT_COLUMNS} FROM plugin_events {} ORDER BY {} LIMIT ? OFFSET ?",
            f.sql(),
            sort.to_sql("rowid"),
        );
        let mut stmt = self.conn.prepare(&sql).map_err(db_err("Prepare"))?;
        let items = stmt
            .query_map(f.paged_params(filter.page), event_from_row)
            .map_err(db_err("Query plugin events"))?
            .collect::<rusqlite::Result<Vec<_>>>()
            .map_err(db_err("Read plugin event"))?;
        Ok(Page::new(items, filter.page, total))
    }

    /// Record the outcome of processing a pending event.
    pub fn report_event_result(
        &self,
        tenant_id: &str,
        plugin_id: &str,
        id: &str,
        result: &EventResult,
    ) -> Result<PluginEvent> {
        let event = self.get_plugin_event(tenant_id, plugin_id, id)?;
        if event.status != EventStatus::Pending {
            return Err(DevRelError::conflict(format!("event {id} is already {}", event.status)));
        }
        let error = match result.status {
            EventStatus::Pending => return Err(DevRelError::validation("result status must be processed or failed")),
            EventStatus::Processed => None,
            EventStatus::Failed => Some(
                result
                    .error
                    .as_deref()
                    .map(str::trim)
                    .filter(|e| !e.is_empty())
                    .unwrap_or("processing failed")
                    .to_string(),
            ),
        };
        self.conn
            .execute(
                "UPDATE plugin_events SET status=?1, error_message=?2, attempts=attempts+1, processed_at=?3
                 WHERE tenant_id=?4 AND id=?5",
                params![result.status.as_str(), error, types::now(), tenant_id, id],
            )
            .map_err(db_err("Report event result"))?;
        self.get_plugin_event(tenant_id, plugin_id, id)
    }

    /// Queue a finished event for another attempt.
    pub fn reprocess_event(&self, tenant_id: &str, plugin_id: &str, id: &str) -> Result<PluginEvent> {
        let event = self.get_plugin_event(tenant_id, plugin_id, id)?;
        if event.status == EventStatus::Pending {
            return Err(DevRelError::conflict(format!("event {id} is already pending")));
        }
        self.conn
            .execute(
                "UPDATE plugin_events SET status='pending', error_message=NULL, processed_at=NULL
                 WHERE tenant_id=?1 AND id=?2",
                params![tenant_id, id],
            )
            .map_err(db_err("Reprocess event"))?;
        tracing::info!("Event {} queued for reprocessing", id);
        self.get_plugin_event(tenant_id, plugin_id, id)
    }

    /// Requeue every failed event of a plugin; returns how many.
    pub fn reprocess_failed_events(&self, tenant_id: &str, plugin_id: &str) -> Result<usize> {
        self.get_plugin(tenant_id, plugin_id)?;
        let n = self
            .conn
            .execute(
                "UPDATE plugin_events SET status='pending', error_message=NULL, processed_at=NULL
                 WHERE tenant_id=?1 AND plugin_id=?2 AND status='failed'",
                params![tenant_id, plugin_id],
            )
            .map_err(db_err("Reprocess failed events"))?;
        if n > 0 {
            tracing::info!("Requeued {} failed event(s) for plugin {}", n, plugin_id);
        }
        Ok(n)
    }

    pub fn plugin_event_stats(&self, tenant_id: &str, plugin_id: &str) -> Result<EventStats> {
        self.get_plugin(tenant_id, plugin_id)?;
        let (total, pending, processed, failed, last_received_at) = self
            .conn
            .query_row(
                "SELECT COUNT(*),
                        COALESCE(SUM(status='pending'),0),
                        COALESCE(SUM(status='processed'),0),
                        COALESCE(SUM(status='failed'),0),
                        MAX(received_at)
                 FROM plugin_events WHERE tenant_id=?1 AND plugin_id=?2",
                params![tenant_id, plugin_id],
                |r| {
                    Ok((
                        r.get::<_, i64>(0)? as u64,
                        r.get::<_, i64>(1)? as u64,
                        r.get::<_, i64>(2)? as u64,
                        r.get::<_, i64>(3)? as u64,
                        r.get::<_, Option<String>>(4)?,
                    ))
                },
            )
            .map_err(db_err("Event stats"))?;

        let mut stmt = self
            .conn
            .prepare(
                "SELECT event_type, COUNT(*), COALESCE(SUM(status='failed'),0)
                 FROM plugin_events WHERE tenant_id=?1 AND plugin_id=?2
                 GROUP BY event_type ORDER BY COUNT(*) DESC, event_type",
            )
            .map_err(db_err("Prepare"))?;
        let by_type = stmt
            .query_map(params![tenant_id, plugin_id], |r| {
                Ok(EventTypeCount {
                    event_type: r.get(0)?,
                    total: r.get::<_, i64>(1)? as u64,
                    failed: r.get::<_, i64>(2)? as u64,
                })
            })
            .map_err(db_err("Query event types"))?
            .collect::<rusqlite::Result<Vec<_>>>()
            .map_err(db_err("Read event type"))?;

        Ok(EventStats {
            total,
            pending,
            processed,
            failed,
            error_rate: percent(failed, processed + failed),
            by_type,
            last_received_at,
        })
    }

    /// Pending and failed events across the tenant's live plugins.
    pub fn event_health(&self, tenant_id: &str) -> Result<EventHealth> {
        self.conn
            .query_row(
                "SELECT COALESCE(SUM(e.status='pending'),0), COALESCE(SUM(e.status='failed'),0)
                 FROM plugin_events e JOIN plugins p ON p.id = e.plugin_id
                 WHERE e.tenant_id=?1 AND p.deleted_at IS NULL",
                params![tenant_id],
                |r| {
                    Ok(EventHealth {
                        pending: r.get::<_, i64>(0)? as u64,
                        failed: r.get::<_, i64>(1)? as u64,
                    })
                },
            )
            .map_err(db_err("Event health"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::tests::db_with_tenant;
    use crate::plugins::tests::github_plugin;
    use crate::plugins::PluginPatch;
    use serde_json::json;

    fn event(kind: &str, external_id: Option<&str>) -> NewPluginEvent {
        NewPluginEvent {
            event_type: kind.into(),
            external_id: external_id.map(String::from),
            payload: Some(json!({"repo": "acme/sdk"})),
        }
    }

    #[test]
    fn test_ingest_skips_duplicates() {
        let (db, t) = db_with_tenant();
        let plugin = db.create_plugin(&t.id, &github_plugin()).unwrap();

        let first = db
            .ingest_events(&t.id, &plugin.id, &[event("star", Some("gh-1")), event("star", Some("gh-2"))])
            .unwrap();
        assert_eq!(first.accepted, 2);
        assert!(first.duplicates.is_empty());

        let again = db
            .ingest_events(
                &t.id,
                &plugin.id,
                &[event("star", Some("gh-1")), event("fork", None), event("fork", None), event("star", Some("gh-3")), event("star", Some("gh-3"))],
            )
            .unwrap();
        assert_eq!(again.accepted, 3);
        assert_eq!(again.duplicates, vec!["gh-1".to_string(), "gh-3".to_string()]);

        let all = db.list_plugin_events(&t.id, &plugin.id, &EventFilter::default()).unwrap();
        assert_eq!(all.pagination.total, 5);
    }

    #[test]
    fn test_ingest_rejections() {
        let (db, t) = db_with_tenant();
        let plugin = db.create_plugin(&t.id, &github_plugin()).unwrap();

        assert!(matches!(db.ingest_events(&t.id, &plugin.id, &[]), Err(DevRelError::Validation(_))));
        let too_many = vec![event("star", None); MAX_BATCH + 1];
        assert!(matches!(db.ingest_events(&t.id, &plugin.id, &too_many), Err(DevRelError::Validation(_))));
        let mut bad = event("star", None);
        bad.payload = Some(json!([1, 2]));
        assert!(matches!(db.ingest_events(&t.id, &plugin.id, &[bad]), Err(DevRelError::Validation(_))));

        db.update_plugin(
            &t.id,
            &plugin.id,
            &PluginPatch {
                enabled: Some(false),
                ..Default::default()
            },
        )
        .unwrap();
        assert!(matches!(
            db.ingest_events(&t.id, &plugin.id, &[event("star", None)]),
            Err(DevRelError::Conflict(_))
        ));
    }

    #[test]
    fn test_result_and_reprocess_lifecycle() {
        let (db, t) = db_with_tenant();
        let plugin = db.create_plugin(&t.id, &github_plugin()).unwrap();
        let ids = db
            .ingest_events(&t.id, &plugin.id, &[event("star", Some("a")), event("star", Some("b"))])
            .unwrap()
            .event_ids;

        // pending events cannot be reprocessed
        assert!(matches!(db.reprocess_event(&t.id, &plugin.id, &ids[0]), Err(DevRelError::Conflict(_))));

        let failed = db
            .report_event_result(
                &t.id,
                &plugin.id,
                &ids[0],
                &EventResult {
                    status: EventStatus::Failed,
                    error: Some("rate limited".into()),
                },
            )
            .unwrap();
        assert_eq!(failed.status, EventStatus::Failed);
        assert_eq!(failed.attempts, 1);
        assert!(failed.processed_at.is_some());

        let processed = db
            .report_event_result(
                &t.id,
                &plugin.id,
                &ids[1],
                &EventResult {
                    status: EventStatus::Processed,
                    error: None,
                },
            )
            .unwrap();
        assert_eq!(processed.error_message, None);
        assert!(db
            .report_event_result(
                &t.id,
                &plugin.id,
                &ids[1],
                &EventResult {
                    status: EventStatus::Processed,
                    error: None,
                }
            )
            .is_err());

        let stats = db.plugin_event_stats(&t.id, &plugin.id).unwrap();
        assert_eq!((stats.total, stats.pending, stats.processed, stats.failed), (2, 0, 1, 1));
        assert_eq!(stats.error_rate, Some(50.0));
        assert_eq!(stats.by_type[0].event_type, "star");

        assert_eq!(db.reprocess_failed_events(&t.id, &plugin.id).unwrap(), 1);
        let requeued = db.get_plugin_event(&t.id, &plugin.id, &ids[0]).unwrap();
        assert_eq!(requeued.status, EventStatus::Pending);
        assert_eq!(requeued.error_message, None);
        assert_eq!(requeued.attempts, 1);

        let again = db.reprocess_event(&t.id, &plugin.id, &ids[1]).unwrap();
        assert_eq!(again.status, EventStatus::Pending);
        assert_eq!(db.event_health(&t.id).unwrap(), EventHealth { pending: 2, failed: 0 });
    }

    #[test]
    fn test_list_filters_and_isolation() {
        let (db, t) = db_with_tenant();
        let other = db.create_tenant("Other", "other").unwrap();
        let plugin = db.create_plugin(&t.id, &github_plugin()).unwrap();
        db.ingest_events(&t.id, &plugin.id, &[event("star", Some("s-1")), event("fork", Some("f-1")), event("fork", None)])
            .unwrap();

        let forks = db
            .list_plugin_events(
                &t.id,
                &plugin.id,
                &EventFilter {
                    event_type: Some("fork".into()),
                    ..Default::default()
                },
            )
            .unwrap();
        assert_eq!(forks.pagination.total, 2);

        let searched = db
            .list_plugin_events(
                &t.id,
                &plugin.id,
                &EventFilter {
                    search: Some("s-1".into()),
                    ..Default::default()
                },
            )
            .unwrap();
        assert_eq!(searched.items.len(), 1);

        let bad_sort = EventFilter {
            order_by: Some("payload".into()),
            ..Default::default()
        };
        assert!(db.list_plugin_events(&t.id, &plugin.id, &bad_sort).is_err());

        assert!(db.list_plugin_events(&other.id, &plugin.id, &EventFilter::default()).is_err());
        let id = &forks.items[0].id;
        assert!(db.get_plugin_event(&other.id, &plugin.id, id).is_err());
    }
}
