//! Usage-counter maintenance on the shared code tables.
//!
//! The counter is a cache of live references, adjusted exactly once per
//! entity lifecycle transition and always inside the transaction of that
//! transition: create +1, trash -1, restore +1, purge of a live entity -1,
//! code reassignment -1 old / +1 new. Because the delta discipline can still
//! drift under operator mistakes (manual SQL, restored backups),
//! [`reconcile_usage_counts`] recomputes every counter from a scan of live
//! references.

use chrono::{DateTime, Utc};
use serde::Serialize;
use sqlx::SqliteConnection;
use tracing::{debug, warn};

use fiscus_core::domain::allocation::Allocation;
use fiscus_core::domain::lookup::LookupKind;
use fiscus_core::domain::project::Project;
use fiscus_db::store::lookups;

use crate::error::EngineError;

pub async fn adjust(
    conn: &mut SqliteConnection,
    kind: LookupKind,
    code: &str,
    delta: i64,
    now: DateTime<Utc>,
) -> Result<(), EngineError> {
    lookups::adjust_usage(conn, kind, code, delta, now).await?;
    debug!(event_name = "counters.adjusted", kind = kind.as_str(), code, delta);
    Ok(())
}

/// The lookup codes one project holds a reference to.
pub fn project_codes(project: &Project) -> Vec<(LookupKind, String)> {
    let mut codes = vec![
        (LookupKind::Particular, project.particular_code.clone()),
        (LookupKind::Office, project.office_code.clone()),
    ];
    if let Some(category) = &project.category_code {
        codes.push((LookupKind::Category, category.clone()));
    }
    codes
}

/// Apply one delta to every code a project references.
pub async fn adjust_project_references(
    conn: &mut SqliteConnection,
    project: &Project,
    delta: i64,
    now: DateTime<Utc>,
) -> Result<(), EngineError> {
    for (kind, code) in project_codes(project) {
        adjust(conn, kind, &code, delta, now).await?;
    }
    Ok(())
}

/// Apply one delta to the single code an allocation references.
pub async fn adjust_allocation_references(
    conn: &mut SqliteConnection,
    allocation: &Allocation,
    delta: i64,
    now: DateTime<Utc>,
) -> Result<(), EngineError> {
    adjust(conn, LookupKind::Particular, &allocation.particular_code, delta, now).await
}

/// One repaired counter from a reconciliation pass.
#[derive(Clone, Debug, Serialize, PartialEq, Eq)]
pub struct UsageDrift {
    pub kind: LookupKind,
    pub code: String,
    pub cached: i64,
    pub actual: i64,
}

/// Recompute every usage counter from a scan of live references, repair the
/// rows that drifted, and report them. An empty result means the delta
/// discipline held.
pub async fn reconcile_usage_counts(
    conn: &mut SqliteConnection,
    now: DateTime<Utc>,
) -> Result<Vec<UsageDrift>, EngineError> {
    let mut drifted = Vec::new();

    for kind in [LookupKind::Particular, LookupKind::Office, LookupKind::Category] {
        for entry in lookups::list(conn, kind).await? {
            let actual = lookups::live_reference_count(conn, kind, &entry.code).await?;
            if actual != entry.usage_count {
                warn!(
                    event_name = "counters.drift_repaired",
                    kind = kind.as_str(),
                    code = %entry.code,
                    cached = entry.usage_count,
                    actual,
                );
                lookups::set_usage(conn, kind, &entry.code, actual, now).await?;
                drifted.push(UsageDrift {
                    kind,
                    code: entry.code,
                    cached: entry.usage_count,
                    actual,
                });
            }
        }
    }

    Ok(drifted)
}
