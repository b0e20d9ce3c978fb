//! Row-level persistence for both budget trees, the lookup code tables, and
//! the activity log.
//!
//! Every function takes `&mut SqliteConnection` instead of the pool: the
//! engine composes one transaction per mutation (read children, write parent,
//! bump counters, append activity) and passes `&mut *tx` through, so a
//! recalculation is never split across round-trips.

use std::str::FromStr;

use chrono::{DateTime, NaiveDate, Utc};
use rust_decimal::Decimal;
use sqlx::sqlite::SqliteRow;
use sqlx::Row;
use thiserror::Error;

use fiscus_core::domain::status::NodeStatus;

pub mod activity;
pub mod allocations;
pub mod funds;
pub mod lookups;
pub mod projects;
pub mod reports;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),
    #[error("decode error: {0}")]
    Decode(String),
}

pub(crate) fn text(row: &SqliteRow, column: &'static str) -> Result<String, StoreError> {
    row.try_get(column).map_err(|e| StoreError::Decode(format!("{column}: {e}")))
}

pub(crate) fn opt_text(row: &SqliteRow, column: &'static str) -> Result<Option<String>, StoreError> {
    row.try_get(column).map_err(|e| StoreError::Decode(format!("{column}: {e}")))
}

pub(crate) fn integer(row: &SqliteRow, column: &'static str) -> Result<i64, StoreError> {
    row.try_get(column).map_err(|e| StoreError::Decode(format!("{column}: {e}")))
}

/// Boolean columns are stored as strict 0/1.
pub(crate) fn flag(row: &SqliteRow, column: &'static str) -> Result<bool, StoreError> {
    match integer(row, column)? {
        0 => Ok(false),
        1 => Ok(true),
        raw => Err(StoreError::Decode(format!("{column}: invalid flag value {raw}"))),
    }
}

/// Money columns are TEXT holding exact decimal figures.
pub(crate) fn money(row: &SqliteRow, column: &'static str) -> Result<Decimal, StoreError> {
    let raw = text(row, column)?;
    Decimal::from_str(&raw)
        .map_err(|e| StoreError::Decode(format!("{column}: invalid decimal `{raw}`: {e}")))
}

/// Lenient money decode for child rows feeding a rollup: a missing or
/// malformed figure contributes zero instead of aborting the recalculation.
pub(crate) fn money_or_zero(row: &SqliteRow, column: &'static str) -> Decimal {
    row.try_get::<Option<String>, _>(column)
        .ok()
        .flatten()
        .and_then(|raw| Decimal::from_str(&raw).ok())
        .unwrap_or(Decimal::ZERO)
}

pub(crate) fn timestamp(row: &SqliteRow, column: &'static str) -> Result<DateTime<Utc>, StoreError> {
    let raw = text(row, column)?;
    parse_rfc3339(column, &raw)
}

pub(crate) fn opt_timestamp(
    row: &SqliteRow,
    column: &'static str,
) -> Result<Option<DateTime<Utc>>, StoreError> {
    opt_text(row, column)?.as_deref().map(|raw| parse_rfc3339(column, raw)).transpose()
}

pub(crate) fn opt_date(
    row: &SqliteRow,
    column: &'static str,
) -> Result<Option<NaiveDate>, StoreError> {
    opt_text(row, column)?
        .as_deref()
        .map(|raw| {
            NaiveDate::parse_from_str(raw, "%Y-%m-%d")
                .map_err(|e| StoreError::Decode(format!("{column}: invalid date `{raw}`: {e}")))
        })
        .transpose()
}

/// Status decode is deliberately lenient; unknown values degrade to the
/// default rather than poisoning a whole listing.
pub(crate) fn status(row: &SqliteRow, column: &'static str) -> Result<NodeStatus, StoreError> {
    Ok(NodeStatus::parse(&text(row, column)?))
}

pub(crate) fn json_strings(
    row: &SqliteRow,
    column: &'static str,
) -> Result<Vec<String>, StoreError> {
    let raw = text(row, column)?;
    serde_json::from_str(&raw)
        .map_err(|e| StoreError::Decode(format!("{column}: invalid JSON list `{raw}`: {e}")))
}

pub(crate) fn parse_rfc3339(
    column: &'static str,
    raw: &str,
) -> Result<DateTime<Utc>, StoreError> {
    DateTime::parse_from_rfc3339(raw)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| StoreError::Decode(format!("{column}: invalid timestamp `{raw}`: {e}")))
}
