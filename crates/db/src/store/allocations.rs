//! Allocation rows: the root tier of the 3-level tree.

use chrono::{DateTime, Utc};
use sqlx::sqlite::SqliteRow;
use sqlx::SqliteConnection;

use fiscus_core::domain::allocation::{Allocation, AllocationId};
use fiscus_core::rollup::DerivedMetrics;

use super::{flag, integer, money, opt_text, opt_timestamp, status, text, timestamp, StoreError};

const COLUMNS: &str = "id, particular_code, fiscal_year, total_allocated, total_obligated, \
                       total_utilized, utilization_rate, status, auto_calculate_utilized, \
                       is_pinned, is_deleted, deleted_at, deleted_by, created_at, created_by, \
                       updated_at, updated_by";

fn row_to_allocation(row: &SqliteRow) -> Result<Allocation, StoreError> {
    Ok(Allocation {
        id: AllocationId(text(row, "id")?),
        particular_code: text(row, "particular_code")?,
        fiscal_year: integer(row, "fiscal_year")? as i32,
        total_allocated: money(row, "total_allocated")?,
        total_obligated: money(row, "total_obligated")?,
        total_utilized: money(row, "total_utilized")?,
        utilization_rate: money(row, "utilization_rate")?,
        status: status(row, "status")?,
        auto_calculate_utilized: flag(row, "auto_calculate_utilized")?,
        is_pinned: flag(row, "is_pinned")?,
        is_deleted: flag(row, "is_deleted")?,
        deleted_at: opt_timestamp(row, "deleted_at")?,
        deleted_by: opt_text(row, "deleted_by")?,
        created_at: timestamp(row, "created_at")?,
        created_by: text(row, "created_by")?,
        updated_at: timestamp(row, "updated_at")?,
        updated_by: text(row, "updated_by")?,
    })
}

pub async fn save(conn: &mut SqliteConnection, allocation: &Allocation) -> Result<(), StoreError> {
    sqlx::query(
        "INSERT INTO allocations (id, particular_code, fiscal_year, total_allocated,
                                  total_obligated, total_utilized, utilization_rate, status,
                                  auto_calculate_utilized, is_pinned, is_deleted, deleted_at,
                                  deleted_by, created_at, created_by, updated_at, updated_by)
         VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
         ON CONFLICT(id) DO UPDATE SET
             particular_code = excluded.particular_code,
             fiscal_year = excluded.fiscal_year,
             total_allocated = excluded.total_allocated,
             total_obligated = excluded.total_obligated,
             total_utilized = excluded.total_utilized,
             utilization_rate = excluded.utilization_rate,
             status = excluded.status,
             auto_calculate_utilized = excluded.auto_calculate_utilized,
             is_pinned = excluded.is_pinned,
             is_deleted = excluded.is_deleted,
             deleted_at = excluded.deleted_at,
             deleted_by = excluded.deleted_by,
             updated_at = excluded.updated_at,
             updated_by = excluded.updated_by",
    )
    .bind(&allocation.id.0)
    .bind(&allocation.particular_code)
    .bind(i64::from(allocation.fiscal_year))
    .bind(allocation.total_allocated.to_string())
    .bind(allocation.total_obligated.to_string())
    .bind(allocation.total_utilized.to_string())
    .bind(allocation.utilization_rate.to_string())
    .bind(allocation.status.as_str())
    .bind(i64::from(allocation.auto_calculate_utilized))
    .bind(i64::from(allocation.is_pinned))
    .bind(i64::from(allocation.is_deleted))
    .bind(allocation.deleted_at.map(|dt| dt.to_rfc3339()))
    .bind(allocation.deleted_by.as_deref())
    .bind(allocation.created_at.to_rfc3339())
    .bind(&allocation.created_by)
    .bind(allocation.updated_at.to_rfc3339())
    .bind(&allocation.updated_by)
    .execute(conn)
    .await?;

    Ok(())
}

pub async fn fetch(
    conn: &mut SqliteConnection,
    id: &AllocationId,
) -> Result<Option<Allocation>, StoreError> {
    let row = sqlx::query(&format!("SELECT {COLUMNS} FROM allocations WHERE id = ?"))
        .bind(&id.0)
        .fetch_optional(conn)
        .await?;

    match row {
        Some(ref row) => Ok(Some(row_to_allocation(row)?)),
        None => Ok(None),
    }
}

pub async fn list_live(conn: &mut SqliteConnection) -> Result<Vec<Allocation>, StoreError> {
    let rows = sqlx::query(&format!(
        "SELECT {COLUMNS} FROM allocations
         WHERE is_deleted = 0
         ORDER BY is_pinned DESC, fiscal_year DESC, id ASC"
    ))
    .fetch_all(conn)
    .await?;

    rows.iter().map(row_to_allocation).collect()
}

/// Persist one recalculation in a single write, stamping the audit columns.
pub async fn apply_rollup(
    conn: &mut SqliteConnection,
    id: &AllocationId,
    metrics: &DerivedMetrics,
    now: DateTime<Utc>,
    actor_id: &str,
) -> Result<(), StoreError> {
    sqlx::query(
        "UPDATE allocations
         SET total_obligated = ?, total_utilized = ?, utilization_rate = ?, status = ?,
             updated_at = ?, updated_by = ?
         WHERE id = ?",
    )
    .bind(metrics.obligated.to_string())
    .bind(metrics.utilized.to_string())
    .bind(metrics.rate.to_string())
    .bind(metrics.status.as_str())
    .bind(now.to_rfc3339())
    .bind(actor_id)
    .bind(&id.0)
    .execute(conn)
    .await?;

    Ok(())
}

pub async fn mark_deleted(
    conn: &mut SqliteConnection,
    id: &AllocationId,
    deleted_at: DateTime<Utc>,
    actor_id: &str,
) -> Result<(), StoreError> {
    sqlx::query(
        "UPDATE allocations
         SET is_deleted = 1, deleted_at = ?, deleted_by = ?, updated_at = ?, updated_by = ?
         WHERE id = ?",
    )
    .bind(deleted_at.to_rfc3339())
    .bind(actor_id)
    .bind(deleted_at.to_rfc3339())
    .bind(actor_id)
    .bind(&id.0)
    .execute(conn)
    .await?;

    Ok(())
}

pub async fn clear_deleted(
    conn: &mut SqliteConnection,
    id: &AllocationId,
    now: DateTime<Utc>,
    actor_id: &str,
) -> Result<(), StoreError> {
    sqlx::query(
        "UPDATE allocations
         SET is_deleted = 0, deleted_at = NULL, deleted_by = NULL, updated_at = ?, updated_by = ?
         WHERE id = ?",
    )
    .bind(now.to_rfc3339())
    .bind(actor_id)
    .bind(&id.0)
    .execute(conn)
    .await?;

    Ok(())
}

pub async fn set_pinned(
    conn: &mut SqliteConnection,
    id: &AllocationId,
    pinned: bool,
    now: DateTime<Utc>,
    actor_id: &str,
) -> Result<(), StoreError> {
    sqlx::query("UPDATE allocations SET is_pinned = ?, updated_at = ?, updated_by = ? WHERE id = ?")
        .bind(i64::from(pinned))
        .bind(now.to_rfc3339())
        .bind(actor_id)
        .bind(&id.0)
        .execute(conn)
        .await?;

    Ok(())
}

/// Hard delete. Descendant rows are the cascade engine's responsibility.
pub async fn remove(conn: &mut SqliteConnection, id: &AllocationId) -> Result<(), StoreError> {
    sqlx::query("DELETE FROM allocations WHERE id = ?").bind(&id.0).execute(conn).await?;
    Ok(())
}
