//! Append-only activity log. Rows are inserted once and never updated or
//! deleted; ordering within one entity's chain is insertion order (rowid).

use sqlx::sqlite::SqliteRow;
use sqlx::SqliteConnection;

use fiscus_core::domain::activity::{ActivityAction, ActivityRecord, ChangeSummary};
use fiscus_core::domain::actor::Actor;
use fiscus_core::domain::EntityKind;

use super::{flag, json_strings, opt_text, text, timestamp, StoreError};

const COLUMNS: &str = "id, actor_id, actor_name, actor_role, actor_department, action, \
                       entity_kind, entity_id, batch_id, before_json, after_json, \
                       changed_fields, budget_changed, status_changed, date_changed, \
                       location_changed, flagged, flag_reasons, prev_hash, entry_hash, \
                       recorded_at";

fn row_to_record(row: &SqliteRow) -> Result<ActivityRecord, StoreError> {
    let action_raw = text(row, "action")?;
    let action = ActivityAction::parse(&action_raw)
        .ok_or_else(|| StoreError::Decode(format!("action: unknown value `{action_raw}`")))?;

    let kind_raw = text(row, "entity_kind")?;
    let entity_kind = EntityKind::parse(&kind_raw)
        .ok_or_else(|| StoreError::Decode(format!("entity_kind: unknown value `{kind_raw}`")))?;

    let before = opt_text(row, "before_json")?
        .map(|raw| {
            serde_json::from_str(&raw)
                .map_err(|e| StoreError::Decode(format!("before_json: {e}")))
        })
        .transpose()?;
    let after = opt_text(row, "after_json")?
        .map(|raw| {
            serde_json::from_str(&raw).map_err(|e| StoreError::Decode(format!("after_json: {e}")))
        })
        .transpose()?;

    Ok(ActivityRecord {
        id: text(row, "id")?,
        actor: Actor {
            id: text(row, "actor_id")?,
            name: text(row, "actor_name")?,
            role: text(row, "actor_role")?,
            department: text(row, "actor_department")?,
        },
        action,
        entity_kind,
        entity_id: text(row, "entity_id")?,
        batch_id: opt_text(row, "batch_id")?,
        before,
        after,
        changed_fields: json_strings(row, "changed_fields")?,
        summary: ChangeSummary {
            budget_changed: flag(row, "budget_changed")?,
            status_changed: flag(row, "status_changed")?,
            date_changed: flag(row, "date_changed")?,
            location_changed: flag(row, "location_changed")?,
        },
        flagged: flag(row, "flagged")?,
        flag_reasons: json_strings(row, "flag_reasons")?,
        prev_hash: opt_text(row, "prev_hash")?,
        entry_hash: text(row, "entry_hash")?,
        recorded_at: timestamp(row, "recorded_at")?,
    })
}

pub async fn append(conn: &mut SqliteConnection, record: &ActivityRecord) -> Result<(), StoreError> {
    let before_json = record
        .before
        .as_ref()
        .map(|value| {
            serde_json::to_string(value)
                .map_err(|e| StoreError::Decode(format!("before_json: {e}")))
        })
        .transpose()?;
    let after_json = record
        .after
        .as_ref()
        .map(|value| {
            serde_json::to_string(value).map_err(|e| StoreError::Decode(format!("after_json: {e}")))
        })
        .transpose()?;
    let changed_fields = serde_json::to_string(&record.changed_fields)
        .map_err(|e| StoreError::Decode(format!("changed_fields: {e}")))?;
    let flag_reasons = serde_json::to_string(&record.flag_reasons)
        .map_err(|e| StoreError::Decode(format!("flag_reasons: {e}")))?;

    sqlx::query(
        "INSERT INTO activity_log (id, actor_id, actor_name, actor_role, actor_department,
                                   action, entity_kind, entity_id, batch_id, before_json,
                                   after_json, changed_fields, budget_changed, status_changed,
                                   date_changed, location_changed, flagged, flag_reasons,
                                   prev_hash, entry_hash, recorded_at)
         VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)",
    )
    .bind(&record.id)
    .bind(&record.actor.id)
    .bind(&record.actor.name)
    .bind(&record.actor.role)
    .bind(&record.actor.department)
    .bind(record.action.as_str())
    .bind(record.entity_kind.as_str())
    .bind(&record.entity_id)
    .bind(record.batch_id.as_deref())
    .bind(before_json)
    .bind(after_json)
    .bind(changed_fields)
    .bind(i64::from(record.summary.budget_changed))
    .bind(i64::from(record.summary.status_changed))
    .bind(i64::from(record.summary.date_changed))
    .bind(i64::from(record.summary.location_changed))
    .bind(i64::from(record.flagged))
    .bind(flag_reasons)
    .bind(record.prev_hash.as_deref())
    .bind(&record.entry_hash)
    .bind(record.recorded_at.to_rfc3339())
    .execute(conn)
    .await?;

    Ok(())
}

/// Hash of the newest entry in one entity's chain, if any. The recorder links
/// the next entry to it.
pub async fn last_entry_hash(
    conn: &mut SqliteConnection,
    entity_kind: EntityKind,
    entity_id: &str,
) -> Result<Option<String>, StoreError> {
    let hash: Option<String> = sqlx::query_scalar(
        "SELECT entry_hash FROM activity_log
         WHERE entity_kind = ? AND entity_id = ?
         ORDER BY rowid DESC LIMIT 1",
    )
    .bind(entity_kind.as_str())
    .bind(entity_id)
    .fetch_optional(conn)
    .await?;

    Ok(hash)
}

/// One entity's full chain in insertion order.
pub async fn chain(
    conn: &mut SqliteConnection,
    entity_kind: EntityKind,
    entity_id: &str,
) -> Result<Vec<ActivityRecord>, StoreError> {
    let rows = sqlx::query(&format!(
        "SELECT {COLUMNS} FROM activity_log
         WHERE entity_kind = ? AND entity_id = ?
         ORDER BY rowid ASC"
    ))
    .bind(entity_kind.as_str())
    .bind(entity_id)
    .fetch_all(conn)
    .await?;

    rows.iter().map(row_to_record).collect()
}

pub async fn count(conn: &mut SqliteConnection) -> Result<i64, StoreError> {
    let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM activity_log").fetch_one(conn).await?;
    Ok(count)
}

pub async fn count_by_batch(
    conn: &mut SqliteConnection,
    batch_id: &str,
) -> Result<i64, StoreError> {
    let count: i64 =
        sqlx::query_scalar("SELECT COUNT(*) FROM activity_log WHERE batch_id = ?")
            .bind(batch_id)
            .fetch_one(conn)
            .await?;
    Ok(count)
}
