//! Code tables (particulars, offices, categories) and their usage counters.
//!
//! All three tables share one column layout, so every query is built against
//! [`LookupKind::table`]. The counter is a cache of live references; it is
//! only ever adjusted inside the transaction of the entity transition it
//! mirrors (see the engine's counters module).

use chrono::{DateTime, Utc};
use sqlx::sqlite::SqliteRow;
use sqlx::SqliteConnection;

use fiscus_core::domain::lookup::{LookupEntry, LookupKind};

use super::{flag, integer, text, timestamp, StoreError};

fn row_to_entry(row: &SqliteRow) -> Result<LookupEntry, StoreError> {
    Ok(LookupEntry {
        code: text(row, "code")?,
        name: text(row, "name")?,
        active: flag(row, "active")?,
        usage_count: integer(row, "usage_count")?,
        created_at: timestamp(row, "created_at")?,
        updated_at: timestamp(row, "updated_at")?,
    })
}

pub async fn save(
    conn: &mut SqliteConnection,
    kind: LookupKind,
    entry: &LookupEntry,
) -> Result<(), StoreError> {
    sqlx::query(&format!(
        "INSERT INTO {} (code, name, active, usage_count, created_at, updated_at)
         VALUES (?, ?, ?, ?, ?, ?)
         ON CONFLICT(code) DO UPDATE SET
             name = excluded.name,
             active = excluded.active,
             usage_count = excluded.usage_count,
             updated_at = excluded.updated_at",
        kind.table()
    ))
    .bind(&entry.code)
    .bind(&entry.name)
    .bind(i64::from(entry.active))
    .bind(entry.usage_count)
    .bind(entry.created_at.to_rfc3339())
    .bind(entry.updated_at.to_rfc3339())
    .execute(conn)
    .await?;

    Ok(())
}

pub async fn fetch(
    conn: &mut SqliteConnection,
    kind: LookupKind,
    code: &str,
) -> Result<Option<LookupEntry>, StoreError> {
    let row = sqlx::query(&format!(
        "SELECT code, name, active, usage_count, created_at, updated_at
         FROM {} WHERE code = ?",
        kind.table()
    ))
    .bind(code)
    .fetch_optional(conn)
    .await?;

    match row {
        Some(ref row) => Ok(Some(row_to_entry(row)?)),
        None => Ok(None),
    }
}

pub async fn list(
    conn: &mut SqliteConnection,
    kind: LookupKind,
) -> Result<Vec<LookupEntry>, StoreError> {
    let rows = sqlx::query(&format!(
        "SELECT code, name, active, usage_count, created_at, updated_at
         FROM {} ORDER BY code ASC",
        kind.table()
    ))
    .fetch_all(conn)
    .await?;

    rows.iter().map(row_to_entry).collect()
}

/// Apply one counter delta, floored at zero so a replayed decrement can never
/// drive the cache negative. A missing code is a no-op; creation/update paths
/// validate codes before they reference them.
pub async fn adjust_usage(
    conn: &mut SqliteConnection,
    kind: LookupKind,
    code: &str,
    delta: i64,
    now: DateTime<Utc>,
) -> Result<(), StoreError> {
    sqlx::query(&format!(
        "UPDATE {} SET usage_count = MAX(0, usage_count + ?), updated_at = ? WHERE code = ?",
        kind.table()
    ))
    .bind(delta)
    .bind(now.to_rfc3339())
    .bind(code)
    .execute(conn)
    .await?;

    Ok(())
}

pub async fn set_usage(
    conn: &mut SqliteConnection,
    kind: LookupKind,
    code: &str,
    usage_count: i64,
    now: DateTime<Utc>,
) -> Result<(), StoreError> {
    sqlx::query(&format!(
        "UPDATE {} SET usage_count = ?, updated_at = ? WHERE code = ?",
        kind.table()
    ))
    .bind(usage_count)
    .bind(now.to_rfc3339())
    .bind(code)
    .execute(conn)
    .await?;

    Ok(())
}

/// Count the live (non-deleted) entities referencing `code` right now. This
/// is the ground truth the cached counter mirrors; reconciliation compares
/// the two.
pub async fn live_reference_count(
    conn: &mut SqliteConnection,
    kind: LookupKind,
    code: &str,
) -> Result<i64, StoreError> {
    let count: i64 = match kind {
        LookupKind::Particular => {
            sqlx::query_scalar(
                "SELECT (SELECT COUNT(*) FROM allocations
                          WHERE particular_code = ?1 AND is_deleted = 0)
                      + (SELECT COUNT(*) FROM projects
                          WHERE particular_code = ?1 AND is_deleted = 0)",
            )
            .bind(code)
            .fetch_one(conn)
            .await?
        }
        LookupKind::Office => {
            sqlx::query_scalar(
                "SELECT COUNT(*) FROM projects WHERE office_code = ? AND is_deleted = 0",
            )
            .bind(code)
            .fetch_one(conn)
            .await?
        }
        LookupKind::Category => {
            sqlx::query_scalar(
                "SELECT COUNT(*) FROM projects WHERE category_code = ? AND is_deleted = 0",
            )
            .bind(code)
            .fetch_one(conn)
            .await?
        }
    };

    Ok(count)
}

#[cfg(test)]
mod tests {
    use chrono::Utc;

    use fiscus_core::domain::lookup::{LookupEntry, LookupKind};

    use crate::{connect_with_settings, migrations};

    async fn setup() -> sqlx::SqlitePool {
        let pool = connect_with_settings("sqlite::memory:", 1, 30).await.expect("connect");
        migrations::run_pending(&pool).await.expect("migrations");
        pool
    }

    fn entry(code: &str) -> LookupEntry {
        let now = Utc::now();
        LookupEntry {
            code: code.to_string(),
            name: format!("{code} name"),
            active: true,
            usage_count: 0,
            created_at: now,
            updated_at: now,
        }
    }

    #[tokio::test]
    async fn save_and_fetch_round_trip() {
        let pool = setup().await;
        let mut conn = pool.acquire().await.expect("acquire");

        super::save(&mut conn, LookupKind::Office, &entry("O-DPWH")).await.expect("save");
        let found = super::fetch(&mut conn, LookupKind::Office, "O-DPWH")
            .await
            .expect("fetch")
            .expect("exists");

        assert_eq!(found.code, "O-DPWH");
        assert!(found.active);
        assert_eq!(found.usage_count, 0);
    }

    #[tokio::test]
    async fn adjust_usage_applies_deltas_and_floors_at_zero() {
        let pool = setup().await;
        let mut conn = pool.acquire().await.expect("acquire");
        let now = Utc::now();

        super::save(&mut conn, LookupKind::Particular, &entry("P-ROADS")).await.expect("save");

        super::adjust_usage(&mut conn, LookupKind::Particular, "P-ROADS", 2, now)
            .await
            .expect("increment");
        super::adjust_usage(&mut conn, LookupKind::Particular, "P-ROADS", -5, now)
            .await
            .expect("over-decrement");

        let found = super::fetch(&mut conn, LookupKind::Particular, "P-ROADS")
            .await
            .expect("fetch")
            .expect("exists");
        assert_eq!(found.usage_count, 0, "counter never goes negative");
    }

    #[tokio::test]
    async fn adjusting_a_missing_code_is_a_no_op() {
        let pool = setup().await;
        let mut conn = pool.acquire().await.expect("acquire");

        super::adjust_usage(&mut conn, LookupKind::Category, "C-GHOST", 1, Utc::now())
            .await
            .expect("no-op adjust");
        assert!(super::fetch(&mut conn, LookupKind::Category, "C-GHOST")
            .await
            .expect("fetch")
            .is_none());
    }
}
