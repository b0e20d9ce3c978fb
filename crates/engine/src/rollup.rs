//! Per-node recalculation and the explicit parent-chain composition.
//!
//! Each `recalculate_*` function recomputes exactly one node from its live
//! direct children and persists the result in the caller's transaction. The
//! engine never auto-discovers ancestors: the chain helpers below compose the
//! report → project → allocation sequence explicitly, and the allocation hop
//! runs only when the project's derived fields actually changed.

use chrono::{DateTime, Utc};
use serde::Serialize;
use sqlx::SqliteConnection;
use tracing::debug;

use fiscus_core::domain::allocation::AllocationId;
use fiscus_core::domain::fund::FundRecordId;
use fiscus_core::domain::project::ProjectId;
use fiscus_core::domain::status::NodeStatus;
use fiscus_core::rollup::{derive_metrics, DerivedMetrics, StatusCounts};
use fiscus_db::store::{allocations, funds, projects, reports};
use rust_decimal::Decimal;

use crate::error::EngineError;

/// The recalculation summary returned inside every success envelope.
#[derive(Clone, Debug, Serialize, PartialEq, Eq)]
pub struct RecalcSummary {
    pub children_count: usize,
    pub status_counts: StatusCounts,
    pub total_obligated: Decimal,
    pub total_utilized: Decimal,
    pub utilization_rate: Decimal,
    pub status: NodeStatus,
    pub auto_calculated: bool,
}

#[derive(Clone, Debug)]
pub struct RecalcOutcome {
    pub summary: RecalcSummary,
    /// Whether any derived field differs from what was previously persisted.
    pub changed: bool,
}

fn summarize(metrics: &DerivedMetrics, children_count: usize, auto: bool) -> RecalcSummary {
    RecalcSummary {
        children_count,
        status_counts: metrics.status_counts,
        total_obligated: metrics.obligated,
        total_utilized: metrics.utilized,
        utilization_rate: metrics.rate,
        status: metrics.status,
        auto_calculated: auto,
    }
}

pub async fn recalculate_project(
    conn: &mut SqliteConnection,
    id: &ProjectId,
    now: DateTime<Utc>,
    actor_id: &str,
) -> Result<RecalcOutcome, EngineError> {
    let project = projects::fetch(conn, id)
        .await?
        .ok_or_else(|| EngineError::not_found("project", id.0.clone()))?;

    let children = reports::live_child_summaries(conn, id).await?;
    let metrics = derive_metrics(&children, project.total_allocated, project.utilized_source());

    let changed = project.total_obligated != metrics.obligated
        || project.total_utilized != metrics.utilized
        || project.utilization_rate != metrics.rate
        || project.status != metrics.status;

    projects::apply_rollup(conn, id, &metrics, now, actor_id).await?;
    debug!(
        event_name = "rollup.project.recalculated",
        project_id = %id.0,
        children = children.len(),
        changed,
    );

    Ok(RecalcOutcome {
        summary: summarize(&metrics, children.len(), project.auto_calculate_utilized),
        changed,
    })
}

pub async fn recalculate_allocation(
    conn: &mut SqliteConnection,
    id: &AllocationId,
    now: DateTime<Utc>,
    actor_id: &str,
) -> Result<RecalcOutcome, EngineError> {
    let allocation = allocations::fetch(conn, id)
        .await?
        .ok_or_else(|| EngineError::not_found("allocation", id.0.clone()))?;

    let children = projects::live_child_summaries(conn, id).await?;
    let metrics =
        derive_metrics(&children, allocation.total_allocated, allocation.utilized_source());

    let changed = allocation.total_obligated != metrics.obligated
        || allocation.total_utilized != metrics.utilized
        || allocation.utilization_rate != metrics.rate
        || allocation.status != metrics.status;

    allocations::apply_rollup(conn, id, &metrics, now, actor_id).await?;
    debug!(
        event_name = "rollup.allocation.recalculated",
        allocation_id = %id.0,
        children = children.len(),
        changed,
    );

    Ok(RecalcOutcome {
        summary: summarize(&metrics, children.len(), allocation.auto_calculate_utilized),
        changed,
    })
}

pub async fn recalculate_fund_record(
    conn: &mut SqliteConnection,
    id: &FundRecordId,
    now: DateTime<Utc>,
    actor_id: &str,
) -> Result<RecalcOutcome, EngineError> {
    let record = funds::fetch_record(conn, id)
        .await?
        .ok_or_else(|| EngineError::not_found("fund record", id.0.clone()))?;

    let children = funds::live_report_summaries(conn, id).await?;
    let metrics = derive_metrics(&children, record.total_allocated, record.utilized_source());

    let changed = record.total_obligated != metrics.obligated
        || record.total_utilized != metrics.utilized
        || record.utilization_rate != metrics.rate
        || record.status != metrics.status;

    funds::apply_record_rollup(conn, id, &metrics, now, actor_id).await?;
    debug!(
        event_name = "rollup.fund_record.recalculated",
        fund_record_id = %id.0,
        children = children.len(),
        changed,
    );

    Ok(RecalcOutcome {
        summary: summarize(&metrics, children.len(), record.auto_calculate_utilized),
        changed,
    })
}

/// Recalculate a project and, when its derived fields changed, hop to its
/// live parent allocation. A missing or trashed project is tolerated (the
/// parent link may dangle after a purge); returns the project summary when
/// one was computed.
pub async fn recalc_project_chain(
    conn: &mut SqliteConnection,
    project_id: &ProjectId,
    now: DateTime<Utc>,
    actor_id: &str,
) -> Result<Option<RecalcSummary>, EngineError> {
    let Some(project) = projects::fetch(conn, project_id).await? else {
        return Ok(None);
    };
    if project.is_deleted {
        return Ok(None);
    }

    let outcome = recalculate_project(conn, project_id, now, actor_id).await?;
    if outcome.changed {
        if let Some(allocation_id) = &project.allocation_id {
            recalc_allocation_if_live(conn, allocation_id, now, actor_id).await?;
        }
    }

    Ok(Some(outcome.summary))
}

/// Recalculate an allocation only if it exists and is not trashed. Dangling
/// parent links are tolerated as "no parent to cascade to".
pub async fn recalc_allocation_if_live(
    conn: &mut SqliteConnection,
    allocation_id: &AllocationId,
    now: DateTime<Utc>,
    actor_id: &str,
) -> Result<Option<RecalcSummary>, EngineError> {
    let Some(allocation) = allocations::fetch(conn, allocation_id).await? else {
        return Ok(None);
    };
    if allocation.is_deleted {
        return Ok(None);
    }

    let outcome = recalculate_allocation(conn, allocation_id, now, actor_id).await?;
    Ok(Some(outcome.summary))
}

/// Recalculate a fund record only if it exists and is not trashed.
pub async fn recalc_fund_record_if_live(
    conn: &mut SqliteConnection,
    record_id: &FundRecordId,
    now: DateTime<Utc>,
    actor_id: &str,
) -> Result<Option<RecalcSummary>, EngineError> {
    let Some(record) = funds::fetch_record(conn, record_id).await? else {
        return Ok(None);
    };
    if record.is_deleted {
        return Ok(None);
    }

    let outcome = recalculate_fund_record(conn, record_id, now, actor_id).await?;
    Ok(Some(outcome.summary))
}
