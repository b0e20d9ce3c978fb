//! Project rows: the middle tier. A project is both a parent (of reports) and
//! a child (of at most one allocation), so this module serves the rollup from
//! both sides.

use chrono::{DateTime, Utc};
use sqlx::sqlite::SqliteRow;
use sqlx::SqliteConnection;

use fiscus_core::domain::allocation::AllocationId;
use fiscus_core::domain::project::{Project, ProjectId};
use fiscus_core::rollup::{ChildSummary, DerivedMetrics};

use super::{
    flag, money, money_or_zero, opt_text, opt_timestamp, status, text, timestamp, StoreError,
};

const COLUMNS: &str = "id, allocation_id, category_code, office_code, particular_code, title, \
                       total_allocated, total_obligated, total_utilized, utilization_rate, \
                       status, auto_calculate_utilized, is_deleted, deleted_at, deleted_by, \
                       created_at, created_by, updated_at, updated_by";

fn row_to_project(row: &SqliteRow) -> Result<Project, StoreError> {
    Ok(Project {
        id: ProjectId(text(row, "id")?),
        allocation_id: opt_text(row, "allocation_id")?.map(AllocationId),
        category_code: opt_text(row, "category_code")?,
        office_code: text(row, "office_code")?,
        particular_code: text(row, "particular_code")?,
        title: text(row, "title")?,
        total_allocated: money(row, "total_allocated")?,
        total_obligated: money(row, "total_obligated")?,
        total_utilized: money(row, "total_utilized")?,
        utilization_rate: money(row, "utilization_rate")?,
        status: status(row, "status")?,
        auto_calculate_utilized: flag(row, "auto_calculate_utilized")?,
        is_deleted: flag(row, "is_deleted")?,
        deleted_at: opt_timestamp(row, "deleted_at")?,
        deleted_by: opt_text(row, "deleted_by")?,
        created_at: timestamp(row, "created_at")?,
        created_by: text(row, "created_by")?,
        updated_at: timestamp(row, "updated_at")?,
        updated_by: text(row, "updated_by")?,
    })
}

pub async fn save(conn: &mut SqliteConnection, project: &Project) -> Result<(), StoreError> {
    sqlx::query(
        "INSERT INTO projects (id, allocation_id, category_code, office_code, particular_code,
                               title, total_allocated, total_obligated, total_utilized,
                               utilization_rate, status, auto_calculate_utilized, is_deleted,
                               deleted_at, deleted_by, created_at, created_by, updated_at,
                               updated_by)
         VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
         ON CONFLICT(id) DO UPDATE SET
             allocation_id = excluded.allocation_id,
             category_code = excluded.category_code,
             office_code = excluded.office_code,
             particular_code = excluded.particular_code,
             title = excluded.title,
             total_allocated = excluded.total_allocated,
             total_obligated = excluded.total_obligated,
             total_utilized = excluded.total_utilized,
             utilization_rate = excluded.utilization_rate,
             status = excluded.status,
             auto_calculate_utilized = excluded.auto_calculate_utilized,
             is_deleted = excluded.is_deleted,
             deleted_at = excluded.deleted_at,
             deleted_by = excluded.deleted_by,
             updated_at = excluded.updated_at,
             updated_by = excluded.updated_by",
    )
    .bind(&project.id.0)
    .bind(project.allocation_id.as_ref().map(|id| id.0.as_str()))
    .bind(project.category_code.as_deref())
    .bind(&project.office_code)
    .bind(&project.particular_code)
    .bind(&project.title)
    .bind(project.total_allocated.to_string())
    .bind(project.total_obligated.to_string())
    .bind(project.total_utilized.to_string())
    .bind(project.utilization_rate.to_string())
    .bind(project.status.as_str())
    .bind(i64::from(project.auto_calculate_utilized))
    .bind(i64::from(project.is_deleted))
    .bind(project.deleted_at.map(|dt| dt.to_rfc3339()))
    .bind(project.deleted_by.as_deref())
    .bind(project.created_at.to_rfc3339())
    .bind(&project.created_by)
    .bind(project.updated_at.to_rfc3339())
    .bind(&project.updated_by)
    .execute(conn)
    .await?;

    Ok(())
}

pub async fn fetch(
    conn: &mut SqliteConnection,
    id: &ProjectId,
) -> Result<Option<Project>, StoreError> {
    let row = sqlx::query(&format!("SELECT {COLUMNS} FROM projects WHERE id = ?"))
        .bind(&id.0)
        .fetch_optional(conn)
        .await?;

    match row {
        Some(ref row) => Ok(Some(row_to_project(row)?)),
        None => Ok(None),
    }
}

pub async fn list_live(conn: &mut SqliteConnection) -> Result<Vec<Project>, StoreError> {
    let rows = sqlx::query(&format!(
        "SELECT {COLUMNS} FROM projects WHERE is_deleted = 0 ORDER BY id ASC"
    ))
    .fetch_all(conn)
    .await?;

    rows.iter().map(row_to_project).collect()
}

/// Every project under one allocation, trashed rows included (cascade walks).
pub async fn all_by_allocation(
    conn: &mut SqliteConnection,
    allocation_id: &AllocationId,
) -> Result<Vec<Project>, StoreError> {
    let rows = sqlx::query(&format!(
        "SELECT {COLUMNS} FROM projects WHERE allocation_id = ? ORDER BY id ASC"
    ))
    .bind(&allocation_id.0)
    .fetch_all(conn)
    .await?;

    rows.iter().map(row_to_project).collect()
}

/// What the parent allocation's rollup sees: one summary per live child.
/// Malformed money figures decode to zero so one bad row cannot abort the
/// recalculation.
pub async fn live_child_summaries(
    conn: &mut SqliteConnection,
    allocation_id: &AllocationId,
) -> Result<Vec<ChildSummary>, StoreError> {
    let rows = sqlx::query(
        "SELECT total_obligated, total_utilized, status FROM projects
         WHERE allocation_id = ? AND is_deleted = 0",
    )
    .bind(&allocation_id.0)
    .fetch_all(conn)
    .await?;

    rows.iter()
        .map(|row| {
            Ok(ChildSummary {
                obligated: money_or_zero(row, "total_obligated"),
                utilized: money_or_zero(row, "total_utilized"),
                status: status(row, "status")?,
            })
        })
        .collect()
}

pub async fn apply_rollup(
    conn: &mut SqliteConnection,
    id: &ProjectId,
    metrics: &DerivedMetrics,
    now: DateTime<Utc>,
    actor_id: &str,
) -> Result<(), StoreError> {
    sqlx::query(
        "UPDATE projects
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
    id: &ProjectId,
    deleted_at: DateTime<Utc>,
    actor_id: &str,
) -> Result<(), StoreError> {
    sqlx::query(
        "UPDATE projects
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
    id: &ProjectId,
    now: DateTime<Utc>,
    actor_id: &str,
) -> Result<(), StoreError> {
    sqlx::query(
        "UPDATE projects
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

pub async fn set_category(
    conn: &mut SqliteConnection,
    id: &ProjectId,
    category_code: Option<&str>,
    now: DateTime<Utc>,
    actor_id: &str,
) -> Result<(), StoreError> {
    sqlx::query(
        "UPDATE projects SET category_code = ?, updated_at = ?, updated_by = ? WHERE id = ?",
    )
    .bind(category_code)
    .bind(now.to_rfc3339())
    .bind(actor_id)
    .bind(&id.0)
    .execute(conn)
    .await?;

    Ok(())
}

pub async fn remove(conn: &mut SqliteConnection, id: &ProjectId) -> Result<(), StoreError> {
    sqlx::query("DELETE FROM projects WHERE id = ?").bind(&id.0).execute(conn).await?;
    Ok(())
}
