//! Report rows: the leaf tier. The rollup engine reads their raw figures and
//! never writes them back.

use chrono::{DateTime, Utc};
use sqlx::sqlite::SqliteRow;
use sqlx::SqliteConnection;

use fiscus_core::domain::project::ProjectId;
use fiscus_core::domain::report::{Report, ReportId};
use fiscus_core::rollup::ChildSummary;

use super::{
    flag, money, money_or_zero, opt_date, opt_text, opt_timestamp, status, text, timestamp,
    StoreError,
};

const COLUMNS: &str = "id, project_id, allocated_budget, obligated_budget, budget_utilized, \
                       balance, status, report_date, region, province, city, is_deleted, \
                       deleted_at, deleted_by, created_at, created_by, updated_at, updated_by";

fn row_to_report(row: &SqliteRow) -> Result<Report, StoreError> {
    Ok(Report {
        id: ReportId(text(row, "id")?),
        project_id: opt_text(row, "project_id")?.map(ProjectId),
        allocated_budget: money(row, "allocated_budget")?,
        obligated_budget: money(row, "obligated_budget")?,
        budget_utilized: money(row, "budget_utilized")?,
        balance: money(row, "balance")?,
        status: status(row, "status")?,
        report_date: opt_date(row, "report_date")?,
        region: opt_text(row, "region")?,
        province: opt_text(row, "province")?,
        city: opt_text(row, "city")?,
        is_deleted: flag(row, "is_deleted")?,
        deleted_at: opt_timestamp(row, "deleted_at")?,
        deleted_by: opt_text(row, "deleted_by")?,
        created_at: timestamp(row, "created_at")?,
        created_by: text(row, "created_by")?,
        updated_at: timestamp(row, "updated_at")?,
        updated_by: text(row, "updated_by")?,
    })
}

pub async fn save(conn: &mut SqliteConnection, report: &Report) -> Result<(), StoreError> {
    sqlx::query(
        "INSERT INTO reports (id, project_id, allocated_budget, obligated_budget, budget_utilized,
                              balance, status, report_date, region, province, city, is_deleted,
                              deleted_at, deleted_by, created_at, created_by, updated_at,
                              updated_by)
         VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
         ON CONFLICT(id) DO UPDATE SET
             project_id = excluded.project_id,
             allocated_budget = excluded.allocated_budget,
             obligated_budget = excluded.obligated_budget,
             budget_utilized = excluded.budget_utilized,
             balance = excluded.balance,
             status = excluded.status,
             report_date = excluded.report_date,
             region = excluded.region,
             province = excluded.province,
             city = excluded.city,
             is_deleted = excluded.is_deleted,
             deleted_at = excluded.deleted_at,
             deleted_by = excluded.deleted_by,
             updated_at = excluded.updated_at,
             updated_by = excluded.updated_by",
    )
    .bind(&report.id.0)
    .bind(report.project_id.as_ref().map(|id| id.0.as_str()))
    .bind(report.allocated_budget.to_string())
    .bind(report.obligated_budget.to_string())
    .bind(report.budget_utilized.to_string())
    .bind(report.balance.to_string())
    .bind(report.status.as_str())
    .bind(report.report_date.map(|date| date.format("%Y-%m-%d").to_string()))
    .bind(report.region.as_deref())
    .bind(report.province.as_deref())
    .bind(report.city.as_deref())
    .bind(i64::from(report.is_deleted))
    .bind(report.deleted_at.map(|dt| dt.to_rfc3339()))
    .bind(report.deleted_by.as_deref())
    .bind(report.created_at.to_rfc3339())
    .bind(&report.created_by)
    .bind(report.updated_at.to_rfc3339())
    .bind(&report.updated_by)
    .execute(conn)
    .await?;

    Ok(())
}

pub async fn fetch(
    conn: &mut SqliteConnection,
    id: &ReportId,
) -> Result<Option<Report>, StoreError> {
    let row = sqlx::query(&format!("SELECT {COLUMNS} FROM reports WHERE id = ?"))
        .bind(&id.0)
        .fetch_optional(conn)
        .await?;

    match row {
        Some(ref row) => Ok(Some(row_to_report(row)?)),
        None => Ok(None),
    }
}

pub async fn live_by_project(
    conn: &mut SqliteConnection,
    project_id: &ProjectId,
) -> Result<Vec<Report>, StoreError> {
    let rows = sqlx::query(&format!(
        "SELECT {COLUMNS} FROM reports
         WHERE project_id = ? AND is_deleted = 0
         ORDER BY id ASC"
    ))
    .bind(&project_id.0)
    .fetch_all(conn)
    .await?;

    rows.iter().map(row_to_report).collect()
}

pub async fn all_by_project(
    conn: &mut SqliteConnection,
    project_id: &ProjectId,
) -> Result<Vec<Report>, StoreError> {
    let rows = sqlx::query(&format!(
        "SELECT {COLUMNS} FROM reports WHERE project_id = ? ORDER BY id ASC"
    ))
    .bind(&project_id.0)
    .fetch_all(conn)
    .await?;

    rows.iter().map(row_to_report).collect()
}

/// Reports trashed by one specific cascade (shared `deleted_at` stamp).
pub async fn deleted_by_project_at(
    conn: &mut SqliteConnection,
    project_id: &ProjectId,
    deleted_at: DateTime<Utc>,
) -> Result<Vec<Report>, StoreError> {
    let rows = sqlx::query(&format!(
        "SELECT {COLUMNS} FROM reports
         WHERE project_id = ? AND is_deleted = 1 AND deleted_at = ?
         ORDER BY id ASC"
    ))
    .bind(&project_id.0)
    .bind(deleted_at.to_rfc3339())
    .fetch_all(conn)
    .await?;

    rows.iter().map(row_to_report).collect()
}

/// What the parent project's rollup sees. Malformed money figures decode to
/// zero so one bad leaf cannot abort the recalculation.
pub async fn live_child_summaries(
    conn: &mut SqliteConnection,
    project_id: &ProjectId,
) -> Result<Vec<ChildSummary>, StoreError> {
    let rows = sqlx::query(
        "SELECT obligated_budget, budget_utilized, status FROM reports
         WHERE project_id = ? AND is_deleted = 0",
    )
    .bind(&project_id.0)
    .fetch_all(conn)
    .await?;

    rows.iter()
        .map(|row| {
            Ok(ChildSummary {
                obligated: money_or_zero(row, "obligated_budget"),
                utilized: money_or_zero(row, "budget_utilized"),
                status: status(row, "status")?,
            })
        })
        .collect()
}

pub async fn mark_deleted(
    conn: &mut SqliteConnection,
    id: &ReportId,
    deleted_at: DateTime<Utc>,
    actor_id: &str,
) -> Result<(), StoreError> {
    sqlx::query(
        "UPDATE reports
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
    id: &ReportId,
    now: DateTime<Utc>,
    actor_id: &str,
) -> Result<(), StoreError> {
    sqlx::query(
        "UPDATE reports
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

pub async fn remove(conn: &mut SqliteConnection, id: &ReportId) -> Result<(), StoreError> {
    sqlx::query("DELETE FROM reports WHERE id = ?").bind(&id.0).execute(conn).await?;
    Ok(())
}
