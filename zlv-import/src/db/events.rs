//! Audit event database operations

use chrono::{DateTime, Utc};
use sqlx::sqlite::SqliteRow;
use sqlx::{Executor, QueryBuilder, Row, Sqlite};
use uuid::Uuid;
use zlv_common::db::{format_timestamp, parse_timestamp, parse_uuid, Event, EventKind};
use zlv_common::Result;

/// Criteria for [`delete_events_matching`]; unset fields do not filter
///
/// `created_from` is inclusive, `created_to` exclusive.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct EventFilter {
    pub kind: Option<EventKind>,
    pub housing_id: Option<Uuid>,
    pub created_by: Option<Uuid>,
    pub created_from: Option<DateTime<Utc>>,
    pub created_to: Option<DateTime<Utc>>,
}

pub async fn insert_event<'e, E>(executor: E, event: &Event) -> Result<()>
where
    E: Executor<'e, Database = Sqlite>,
{
    let old = event.old.as_ref().map(serde_json::to_string).transpose()?;
    let new = event.new.as_ref().map(serde_json::to_string).transpose()?;

    sqlx::query(
        r#"
        INSERT INTO events (id, kind, housing_id, owner_id, old, new, created_at, created_by)
        VALUES (?, ?, ?, ?, ?, ?, ?, ?)
        "#,
    )
    .bind(event.id.to_string())
    .bind(event.kind.as_str())
    .bind(event.housing_id.map(|id| id.to_string()))
    .bind(event.owner_id.map(|id| id.to_string()))
    .bind(old)
    .bind(new)
    .bind(format_timestamp(&event.created_at))
    .bind(event.created_by.to_string())
    .execute(executor)
    .await?;

    Ok(())
}

/// Delete events matching all set criteria; returns the number deleted
pub async fn delete_events_matching<'e, E>(executor: E, filter: &EventFilter) -> Result<u64>
where
    E: Executor<'e, Database = Sqlite>,
{
    let mut builder: QueryBuilder<Sqlite> = QueryBuilder::new("DELETE FROM events WHERE 1 = 1");
    if let Some(kind) = filter.kind {
        builder.push(" AND kind = ").push_bind(kind.as_str());
    }
    if let Some(housing_id) = filter.housing_id {
        builder.push(" AND housing_id = ").push_bind(housing_id.to_string());
    }
    if let Some(created_by) = filter.created_by {
        builder.push(" AND created_by = ").push_bind(created_by.to_string());
    }
    if let Some(from) = &filter.created_from {
        builder.push(" AND created_at >= ").push_bind(format_timestamp(from));
    }
    if let Some(to) = &filter.created_to {
        builder.push(" AND created_at < ").push_bind(format_timestamp(to));
    }

    let result = builder.build().execute(executor).await?;
    Ok(result.rows_affected())
}

/// Events of a housing unit, oldest first
pub async fn find_events_by_housing<'e, E>(executor: E, housing_id: Uuid) -> Result<Vec<Event>>
where
    E: Executor<'e, Database = Sqlite>,
{
    let rows = sqlx::query(
        r#"
        SELECT id, kind, housing_id, owner_id, old, new, created_at, created_by
        FROM events
        WHERE housing_id = ?
        ORDER BY created_at, kind
        "#,
    )
    .bind(housing_id.to_string())
    .fetch_all(executor)
    .await?;

    rows.iter().map(event_from_row).collect()
}

fn event_from_row(row: &SqliteRow) -> Result<Event> {
    let id: String = row.try_get("id")?;
    let kind: String = row.try_get("kind")?;
    let housing_id: Option<String> = row.try_get("housing_id")?;
    let owner_id: Option<String> = row.try_get("owner_id")?;
    let old: Option<String> = row.try_get("old")?;
    let new: Option<String> = row.try_get("new")?;
    let created_at: String = row.try_get("created_at")?;
    let created_by: String = row.try_get("created_by")?;

    Ok(Event {
        id: parse_uuid(&id)?,
        kind: kind.parse()?,
        housing_id: housing_id.as_deref().map(parse_uuid).transpose()?,
        owner_id: owner_id.as_deref().map(parse_uuid).transpose()?,
        old: old.as_deref().map(serde_json::from_str).transpose()?,
        new: new.as_deref().map(serde_json::from_str).transpose()?,
        created_at: parse_timestamp(&created_at)?,
        created_by: parse_uuid(&created_by)?,
    })
}
