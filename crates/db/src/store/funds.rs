//! The 2-level fund tree: fund records and the fund reports directly under
//! them. Fund entities reference no lookup codes, so nothing here touches
//! usage counters.

use chrono::{DateTime, Utc};
use sqlx::sqlite::SqliteRow;
use sqlx::SqliteConnection;

use fiscus_core::domain::fund::{FundRecord, FundRecordId, FundReport, FundReportId};
use fiscus_core::rollup::{ChildSummary, DerivedMetrics};

use super::{
    flag, integer, money, money_or_zero, opt_date, opt_text, opt_timestamp, status, text,
    timestamp, StoreError,
};

const RECORD_COLUMNS: &str = "id, title, fund_source, year, total_allocated, total_obligated, \
                              total_utilized, utilization_rate, status, \
                              auto_calculate_utilized, is_deleted, deleted_at, deleted_by, \
                              created_at, created_by, updated_at, updated_by";

const REPORT_COLUMNS: &str = "id, fund_record_id, allocated_budget, obligated_budget, \
                              budget_utilized, balance, status, report_date, is_deleted, \
                              deleted_at, deleted_by, created_at, created_by, updated_at, \
                              updated_by";

fn row_to_record(row: &SqliteRow) -> Result<FundRecord, StoreError> {
    Ok(FundRecord {
        id: FundRecordId(text(row, "id")?),
        title: text(row, "title")?,
        fund_source: text(row, "fund_source")?,
        year: integer(row, "year")? as i32,
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

fn row_to_report(row: &SqliteRow) -> Result<FundReport, StoreError> {
    Ok(FundReport {
        id: FundReportId(text(row, "id")?),
        fund_record_id: opt_text(row, "fund_record_id")?.map(FundRecordId),
        allocated_budget: money(row, "allocated_budget")?,
        obligated_budget: money(row, "obligated_budget")?,
        budget_utilized: money(row, "budget_utilized")?,
        balance: money(row, "balance")?,
        status: status(row, "status")?,
        report_date: opt_date(row, "report_date")?,
        is_deleted: flag(row, "is_deleted")?,
        deleted_at: opt_timestamp(row, "deleted_at")?,
        deleted_by: opt_text(row, "deleted_by")?,
        created_at: timestamp(row, "created_at")?,
        created_by: text(row, "created_by")?,
        updated_at: timestamp(row, "updated_at")?,
        updated_by: text(row, "updated_by")?,
    })
}

pub async fn save_record(
    conn: &mut SqliteConnection,
    record: &FundRecord,
) -> Result<(), StoreError> {
    sqlx::query(
        "INSERT INTO fund_records (id, title, fund_source, year, total_allocated,
                                   total_obligated, total_utilized, utilization_rate, status,
                                   auto_calculate_utilized, is_deleted, deleted_at, deleted_by,
                                   created_at, created_by, updated_at, updated_by)
         VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
         ON CONFLICT(id) DO UPDATE SET
             title = excluded.title,
             fund_source = excluded.fund_source,
             year = excluded.year,
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
    .bind(&record.id.0)
    .bind(&record.title)
    .bind(&record.fund_source)
    .bind(i64::from(record.year))
    .bind(record.total_allocated.to_string())
    .bind(record.total_obligated.to_string())
    .bind(record.total_utilized.to_string())
    .bind(record.utilization_rate.to_string())
    .bind(record.status.as_str())
    .bind(i64::from(record.auto_calculate_utilized))
    .bind(i64::from(record.is_deleted))
    .bind(record.deleted_at.map(|dt| dt.to_rfc3339()))
    .bind(record.deleted_by.as_deref())
    .bind(record.created_at.to_rfc3339())
    .bind(&record.created_by)
    .bind(record.updated_at.to_rfc3339())
    .bind(&record.updated_by)
    .execute(conn)
    .await?;

    Ok(())
}

pub async fn fetch_record(
    conn: &mut SqliteConnection,
    id: &FundRecordId,
) -> Result<Option<FundRecord>, StoreError> {
    let row = sqlx::query(&format!("SELECT {RECORD_COLUMNS} FROM fund_records WHERE id = ?"))
        .bind(&id.0)
        .fetch_optional(conn)
        .await?;

    match row {
        Some(ref row) => Ok(Some(row_to_record(row)?)),
        None => Ok(None),
    }
}

pub async fn apply_record_rollup(
    conn: &mut SqliteConnection,
    id: &FundRecordId,
    metrics: &DerivedMetrics,
    now: DateTime<Utc>,
    actor_id: &str,
) -> Result<(), StoreError> {
    sqlx::query(
        "UPDATE fund_records
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

pub async fn mark_record_deleted(
    conn: &mut SqliteConnection,
    id: &FundRecordId,
    deleted_at: DateTime<Utc>,
    actor_id: &str,
) -> Result<(), StoreError> {
    sqlx::query(
        "UPDATE fund_records
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

pub async fn clear_record_deleted(
    conn: &mut SqliteConnection,
    id: &FundRecordId,
    now: DateTime<Utc>,
    actor_id: &str,
) -> Result<(), StoreError> {
    sqlx::query(
        "UPDATE fund_records
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

pub async fn remove_record(
    conn: &mut SqliteConnection,
    id: &FundRecordId,
) -> Result<(), StoreError> {
    sqlx::query("DELETE FROM fund_records WHERE id = ?").bind(&id.0).execute(conn).await?;
    Ok(())
}

pub async fn save_report(
    conn: &mut SqliteConnection,
    report: &FundReport,
) -> Result<(), StoreError> {
    sqlx::query(
        "INSERT INTO fund_reports (id, fund_record_id, allocated_budget, obligated_budget,
                                   budget_utilized, balance, status, report_date, is_deleted,
                                   deleted_at, deleted_by, created_at, created_by, updated_at,
                                   updated_by)
         VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
         ON CONFLICT(id) DO UPDATE SET
             fund_record_id = excluded.fund_record_id,
             allocated_budget = excluded.allocated_budget,
             obligated_budget = excluded.obligated_budget,
             budget_utilized = excluded.budget_utilized,
             balance = excluded.balance,
             status = excluded.status,
             report_date = excluded.report_date,
             is_deleted = excluded.is_deleted,
             deleted_at = excluded.deleted_at,
             deleted_by = excluded.deleted_by,
             updated_at = excluded.updated_at,
             updated_by = excluded.updated_by",
    )
    .bind(&report.id.0)
    .bind(report.fund_record_id.as_ref().map(|id| id.0.as_str()))
    .bind(report.allocated_budget.to_string())
    .bind(report.obligated_budget.to_string())
    .bind(report.budget_utilized.to_string())
    .bind(report.balance.to_string())
    .bind(report.status.as_str())
    .bind(report.report_date.map(|date| date.format("%Y-%m-%d").to_string()))
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

pub async fn fetch_report(
    conn: &mut SqliteConnection,
    id: &FundReportId,
) -> Result<Option<FundReport>, StoreError> {
    let row = sqlx::query(&format!("SELECT {REPORT_COLUMNS} FROM fund_reports WHERE id = ?"))
        .bind(&id.0)
        .fetch_optional(conn)
        .await?;

    match row {
        Some(ref row) => Ok(Some(row_to_report(row)?)),
        None => Ok(None),
    }
}

pub async fn all_reports_by_record(
    conn: &mut SqliteConnection,
    record_id: &FundRecordId,
) -> Result<Vec<FundReport>, StoreError> {
    let rows = sqlx::query(&format!(
        "SELECT {REPORT_COLUMNS} FROM fund_reports WHERE fund_record_id = ? ORDER BY id ASC"
    ))
    .bind(&record_id.0)
    .fetch_all(conn)
    .await?;

    rows.iter().map(row_to_report).collect()
}

pub async fn live_reports_by_record(
    conn: &mut SqliteConnection,
    record_id: &FundRecordId,
) -> Result<Vec<FundReport>, StoreError> {
    let rows = sqlx::query(&format!(
        "SELECT {REPORT_COLUMNS} FROM fund_reports
         WHERE fund_record_id = ? AND is_deleted = 0
         ORDER BY id ASC"
    ))
    .bind(&record_id.0)
    .fetch_all(conn)
    .await?;

    rows.iter().map(row_to_report).collect()
}

pub async fn reports_deleted_by_record_at(
    conn: &mut SqliteConnection,
    record_id: &FundRecordId,
    deleted_at: DateTime<Utc>,
) -> Result<Vec<FundReport>, StoreError> {
    let rows = sqlx::query(&format!(
        "SELECT {REPORT_COLUMNS} FROM fund_reports
         WHERE fund_record_id = ? AND is_deleted = 1 AND deleted_at = ?
         ORDER BY id ASC"
    ))
    .bind(&record_id.0)
    .bind(deleted_at.to_rfc3339())
    .fetch_all(conn)
    .await?;

    rows.iter().map(row_to_report).collect()
}

pub async fn live_report_summaries(
    conn: &mut SqliteConnection,
    record_id: &FundRecordId,
) -> Result<Vec<ChildSummary>, StoreError> {
    let rows = sqlx::query(
        "SELECT obligated_budget, budget_utilized, status FROM fund_reports
         WHERE fund_record_id = ? AND is_deleted = 0",
    )
    .bind(&record_id.0)
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

pub async fn mark_report_deleted(
    conn: &mut SqliteConnection,
    id: &FundReportId,
    deleted_at: DateTime<Utc>,
    actor_id: &str,
) -> Result<(), StoreError> {
    sqlx::query(
        "UPDATE fund_reports
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

pub async fn clear_report_deleted(
    conn: &mut SqliteConnection,
    id: &FundReportId,
    now: DateTime<Utc>,
    actor_id: &str,
) -> Result<(), StoreError> {
    sqlx::query(
        "UPDATE fund_reports
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

pub async fn remove_report(
    conn: &mut SqliteConnection,
    id: &FundReportId,
) -> Result<(), StoreError> {
    sqlx::query("DELETE FROM fund_reports WHERE id = ?").bind(&id.0).execute(conn).await?;
    Ok(())
}
