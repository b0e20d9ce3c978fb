use sqlx::Executor;

use crate::store::StoreError;
use crate::DbPool;

const SEED_ALLOCATION_ID: &str = "alloc-2026-roads";
const SEED_PROJECT_IDS: &[&str] = &["proj-bridge-001", "proj-road-002"];
const SEED_REPORT_IDS: &[&str] = &["rep-0001", "rep-0002", "rep-0003"];
const SEED_FUND_RECORD_ID: &str = "fund-calamity-2026";
const SEED_FUND_REPORT_ID: &str = "frep-0001";

/// Expected usage counters after a clean seed load: each must equal the
/// number of live referencing rows in the dataset.
const SEED_USAGE_COUNTS: &[(&str, &str, i64)] = &[
    ("particulars", "P-ROADS", 3),
    ("particulars", "P-HEALTH", 0),
    ("offices", "O-DPWH", 2),
    ("offices", "O-DOH", 0),
    ("categories", "C-INFRA", 2),
];

/// Deterministic demo dataset: one allocation with two projects and three
/// reports, one fund record with one fund report, and the code tables they
/// reference. Reload is idempotent.
pub struct SeedDataset;

impl SeedDataset {
    pub const SQL: &str = include_str!("../../../config/fixtures/seed_data.sql");

    pub async fn load(pool: &DbPool) -> Result<SeedSummary, StoreError> {
        let mut tx = pool.begin().await?;
        tx.execute(sqlx::query(Self::SQL)).await?;
        tx.commit().await?;

        Ok(SeedSummary {
            allocations: 1,
            projects: SEED_PROJECT_IDS.len(),
            reports: SEED_REPORT_IDS.len(),
            fund_records: 1,
            fund_reports: 1,
        })
    }

    /// Verify the seeded rows against the dataset contract: rows exist, every
    /// parent's derived columns equal a recomputation over its live children,
    /// and every usage counter equals its live reference count.
    pub async fn verify(pool: &DbPool) -> Result<SeedVerification, StoreError> {
        let mut checks = Vec::new();

        let allocation_ok: i64 = sqlx::query_scalar(
            "SELECT EXISTS(SELECT 1 FROM allocations
             WHERE id = ? AND is_deleted = 0 AND total_obligated = '40000'
               AND total_utilized = '50000' AND utilization_rate = '50' AND status = 'ongoing')",
        )
        .bind(SEED_ALLOCATION_ID)
        .fetch_one(pool)
        .await?;
        checks.push(("allocation-derived-fields", allocation_ok == 1));

        let obligated_matches_children: i64 = sqlx::query_scalar(
            "SELECT CAST(total_obligated AS REAL) =
                    (SELECT IFNULL(SUM(CAST(total_obligated AS REAL)), 0) FROM projects
                      WHERE allocation_id = allocations.id AND is_deleted = 0)
             FROM allocations WHERE id = ?",
        )
        .bind(SEED_ALLOCATION_ID)
        .fetch_one(pool)
        .await?;
        checks.push(("allocation-obligated-is-child-sum", obligated_matches_children == 1));

        let project_count: i64 = sqlx::query_scalar(
            "SELECT COUNT(*) FROM projects WHERE allocation_id = ? AND is_deleted = 0",
        )
        .bind(SEED_ALLOCATION_ID)
        .fetch_one(pool)
        .await?;
        checks.push(("project-count", project_count == SEED_PROJECT_IDS.len() as i64));

        for project_id in SEED_PROJECT_IDS {
            let utilized_matches: i64 = sqlx::query_scalar(
                "SELECT CAST(total_utilized AS REAL) =
                        (SELECT IFNULL(SUM(CAST(budget_utilized AS REAL)), 0) FROM reports
                          WHERE project_id = projects.id AND is_deleted = 0)
                 FROM projects WHERE id = ?",
            )
            .bind(project_id)
            .fetch_one(pool)
            .await?;
            checks.push(("project-utilized-is-child-sum", utilized_matches == 1));
        }

        let report_count: i64 =
            sqlx::query_scalar("SELECT COUNT(*) FROM reports WHERE is_deleted = 0")
                .fetch_one(pool)
                .await?;
        checks.push(("report-count", report_count == SEED_REPORT_IDS.len() as i64));

        let fund_ok: i64 = sqlx::query_scalar(
            "SELECT EXISTS(SELECT 1 FROM fund_records
             WHERE id = ? AND is_deleted = 0 AND total_obligated = '10000'
               AND utilization_rate = '20' AND status = 'ongoing')",
        )
        .bind(SEED_FUND_RECORD_ID)
        .fetch_one(pool)
        .await?;
        checks.push(("fund-record-derived-fields", fund_ok == 1));

        let fund_report_ok: i64 = sqlx::query_scalar(
            "SELECT EXISTS(SELECT 1 FROM fund_reports WHERE id = ? AND fund_record_id = ?)",
        )
        .bind(SEED_FUND_REPORT_ID)
        .bind(SEED_FUND_RECORD_ID)
        .fetch_one(pool)
        .await?;
        checks.push(("fund-report-linked", fund_report_ok == 1));

        for (table, code, expected) in SEED_USAGE_COUNTS {
            let count: Option<i64> =
                sqlx::query_scalar(&format!("SELECT usage_count FROM {table} WHERE code = ?"))
                    .bind(code)
                    .fetch_optional(pool)
                    .await?;
            checks.push(("usage-counter", count == Some(*expected)));
        }

        let all_present = checks.iter().all(|(_, ok)| *ok);
        Ok(SeedVerification { all_present, checks })
    }

    /// Remove the seeded rows from a test database.
    pub async fn clean(pool: &DbPool) -> Result<(), StoreError> {
        let mut tx = pool.begin().await?;

        let report_ids = sql_array_from_ids(SEED_REPORT_IDS);
        let project_ids = sql_array_from_ids(SEED_PROJECT_IDS);

        sqlx::query(&format!("DELETE FROM reports WHERE id IN {report_ids}"))
            .execute(&mut *tx)
            .await?;
        sqlx::query(&format!("DELETE FROM projects WHERE id IN {project_ids}"))
            .execute(&mut *tx)
            .await?;
        sqlx::query("DELETE FROM allocations WHERE id = ?")
            .bind(SEED_ALLOCATION_ID)
            .execute(&mut *tx)
            .await?;
        sqlx::query("DELETE FROM fund_reports WHERE id = ?")
            .bind(SEED_FUND_REPORT_ID)
            .execute(&mut *tx)
            .await?;
        sqlx::query("DELETE FROM fund_records WHERE id = ?")
            .bind(SEED_FUND_RECORD_ID)
            .execute(&mut *tx)
            .await?;
        for table in ["particulars", "offices", "categories"] {
            sqlx::query(&format!("DELETE FROM {table}")).execute(&mut *tx).await?;
        }

        tx.commit().await?;
        Ok(())
    }
}

fn sql_array_from_ids(ids: &[&str]) -> String {
    let quoted = ids.iter().map(|id| format!("'{id}'")).collect::<Vec<_>>().join(",");
    format!("({quoted})")
}

#[derive(Debug)]
pub struct SeedSummary {
    pub allocations: usize,
    pub projects: usize,
    pub reports: usize,
    pub fund_records: usize,
    pub fund_reports: usize,
}

#[derive(Debug)]
pub struct SeedVerification {
    pub all_present: bool,
    pub checks: Vec<(&'static str, bool)>,
}
