//! Trash, restore, and purge as a two-phase protocol: phase 1 marks the node
//! and its descendants top-down, phase 2 recomputes the surviving ancestry
//! bottom-up. Every function here runs inside the caller's transaction and
//! returns the before/after snapshots the activity recorder needs.
//!
//! Counter discipline: trash surrenders a node's lookup references, restore
//! reclaims them, and purge surrenders them only for nodes that were still
//! live (a trashed node already gave its references up). Trashing an already
//! trashed node (or restoring a live one) is rejected rather than ignored so
//! each transition adjusts the counters exactly once.
//!
//! Restore undoes the cascade, not history: descendants are revived only when
//! their `deleted_at` stamp matches the ancestor's cascade timestamp, so a
//! descendant that was independently trashed earlier stays deleted.

use chrono::{DateTime, Utc};
use serde_json::Value;
use sqlx::SqliteConnection;
use tracing::info;

use fiscus_core::domain::allocation::AllocationId;
use fiscus_core::domain::fund::{FundRecordId, FundReportId};
use fiscus_core::domain::project::ProjectId;
use fiscus_core::domain::report::ReportId;
use fiscus_db::store::{allocations, funds, projects, reports};

use crate::counters;
use crate::error::EngineError;
use crate::rollup::{
    self, recalc_allocation_if_live, recalc_fund_record_if_live, recalc_project_chain,
    RecalcSummary,
};

/// What one cascade operation did, for the service layer's envelope and
/// activity entry.
#[derive(Debug)]
pub struct CascadeReceipt {
    pub before: Value,
    /// `None` after a purge; the row no longer exists.
    pub after: Option<Value>,
    /// Descendants affected by the cascade (the node itself excluded).
    pub descendants: usize,
    /// Rollup summary of the node the caller cares about afterwards: the
    /// surviving parent for trash/purge, the node itself for restore.
    pub summary: Option<RecalcSummary>,
}

fn snapshot<T: serde::Serialize>(entity: &T) -> Result<Value, EngineError> {
    serde_json::to_value(entity)
        .map_err(|e| EngineError::validation(format!("snapshot serialization failed: {e}")))
}

// ---------------------------------------------------------------------------
// Reports (leaf tier)
// ---------------------------------------------------------------------------

pub async fn trash_report(
    conn: &mut SqliteConnection,
    id: &ReportId,
    now: DateTime<Utc>,
    actor_id: &str,
) -> Result<CascadeReceipt, EngineError> {
    let report = reports::fetch(conn, id)
        .await?
        .ok_or_else(|| EngineError::not_found("report", id.0.clone()))?;
    if report.is_deleted {
        return Err(EngineError::validation(format!("report {} is already trashed", id.0)));
    }

    let before = snapshot(&report)?;
    reports::mark_deleted(conn, id, now, actor_id).await?;
    let after = reports::fetch(conn, id).await?.map(|r| snapshot(&r)).transpose()?;

    let summary = match &report.project_id {
        Some(project_id) => recalc_project_chain(conn, project_id, now, actor_id).await?,
        None => None,
    };

    info!(event_name = "cascade.report.trashed", report_id = %id.0);
    Ok(CascadeReceipt { before, after, descendants: 0, summary })
}

pub async fn restore_report(
    conn: &mut SqliteConnection,
    id: &ReportId,
    now: DateTime<Utc>,
    actor_id: &str,
) -> Result<CascadeReceipt, EngineError> {
    let report = reports::fetch(conn, id)
        .await?
        .ok_or_else(|| EngineError::not_found("report", id.0.clone()))?;
    if !report.is_deleted {
        return Err(EngineError::validation(format!("report {} is not trashed", id.0)));
    }

    let before = snapshot(&report)?;
    reports::clear_deleted(conn, id, now, actor_id).await?;
    let after = reports::fetch(conn, id).await?.map(|r| snapshot(&r)).transpose()?;

    // Leaves have nothing of their own to recompute; refresh the parent
    // chain. A still-trashed parent is skipped.
    let summary = match &report.project_id {
        Some(project_id) => recalc_project_chain(conn, project_id, now, actor_id).await?,
        None => None,
    };

    info!(event_name = "cascade.report.restored", report_id = %id.0);
    Ok(CascadeReceipt { before, after, descendants: 0, summary })
}

pub async fn purge_report(
    conn: &mut SqliteConnection,
    id: &ReportId,
    now: DateTime<Utc>,
    actor_id: &str,
) -> Result<CascadeReceipt, EngineError> {
    let report = reports::fetch(conn, id)
        .await?
        .ok_or_else(|| EngineError::not_found("report", id.0.clone()))?;

    let before = snapshot(&report)?;
    reports::remove(conn, id).await?;

    let summary = match &report.project_id {
        Some(project_id) => recalc_project_chain(conn, project_id, now, actor_id).await?,
        None => None,
    };

    info!(event_name = "cascade.report.purged", report_id = %id.0);
    Ok(CascadeReceipt { before, after: None, descendants: 0, summary })
}

// ---------------------------------------------------------------------------
// Projects (middle tier)
// ---------------------------------------------------------------------------

pub async fn trash_project(
    conn: &mut SqliteConnection,
    id: &ProjectId,
    now: DateTime<Utc>,
    actor_id: &str,
) -> Result<CascadeReceipt, EngineError> {
    let project = projects::fetch(conn, id)
        .await?
        .ok_or_else(|| EngineError::not_found("project", id.0.clone()))?;
    if project.is_deleted {
        return Err(EngineError::validation(format!("project {} is already trashed", id.0)));
    }

    let before = snapshot(&project)?;

    // Phase 1: mark the project and every live report under it with one
    // shared stamp.
    projects::mark_deleted(conn, id, now, actor_id).await?;
    let children = reports::live_by_project(conn, id).await?;
    for report in &children {
        reports::mark_deleted(conn, &report.id, now, actor_id).await?;
    }
    counters::adjust_project_references(conn, &project, -1, now).await?;

    let after = projects::fetch(conn, id).await?.map(|p| snapshot(&p)).transpose()?;

    // Phase 2: the trashed subtree is never recomputed; only the surviving
    // parent is.
    let summary = match &project.allocation_id {
        Some(allocation_id) => {
            recalc_allocation_if_live(conn, allocation_id, now, actor_id).await?
        }
        None => None,
    };

    info!(event_name = "cascade.project.trashed", project_id = %id.0, reports = children.len());
    Ok(CascadeReceipt { before, after, descendants: children.len(), summary })
}

pub async fn restore_project(
    conn: &mut SqliteConnection,
    id: &ProjectId,
    now: DateTime<Utc>,
    actor_id: &str,
) -> Result<CascadeReceipt, EngineError> {
    let project = projects::fetch(conn, id)
        .await?
        .ok_or_else(|| EngineError::not_found("project", id.0.clone()))?;
    if !project.is_deleted {
        return Err(EngineError::validation(format!("project {} is not trashed", id.0)));
    }
    let cascade_stamp = project
        .deleted_at
        .ok_or_else(|| EngineError::validation(format!("project {} has no deletion stamp", id.0)))?;

    let before = snapshot(&project)?;

    // Phase 1: revive the project and exactly the reports its cascade took
    // down.
    projects::clear_deleted(conn, id, now, actor_id).await?;
    let revived = reports::deleted_by_project_at(conn, id, cascade_stamp).await?;
    for report in &revived {
        reports::clear_deleted(conn, &report.id, now, actor_id).await?;
    }
    counters::adjust_project_references(conn, &project, 1, now).await?;

    let after = projects::fetch(conn, id).await?.map(|p| snapshot(&p)).transpose()?;

    // Phase 2: the node itself first, then the parent unless it is still
    // trashed (an orphaned-but-visible subtree is allowed transiently).
    let outcome = rollup::recalculate_project(conn, id, now, actor_id).await?;
    if let Some(allocation_id) = &project.allocation_id {
        recalc_allocation_if_live(conn, allocation_id, now, actor_id).await?;
    }

    info!(event_name = "cascade.project.restored", project_id = %id.0, reports = revived.len());
    Ok(CascadeReceipt {
        before,
        after,
        descendants: revived.len(),
        summary: Some(outcome.summary),
    })
}

pub async fn purge_project(
    conn: &mut SqliteConnection,
    id: &ProjectId,
    now: DateTime<Utc>,
    actor_id: &str,
) -> Result<CascadeReceipt, EngineError> {
    let project = projects::fetch(conn, id)
        .await?
        .ok_or_else(|| EngineError::not_found("project", id.0.clone()))?;

    let before = snapshot(&project)?;

    // A live project still holds its references; a trashed one surrendered
    // them when it was trashed.
    if !project.is_deleted {
        counters::adjust_project_references(conn, &project, -1, now).await?;
    }

    let children = reports::all_by_project(conn, id).await?;
    for report in &children {
        reports::remove(conn, &report.id).await?;
    }
    projects::remove(conn, id).await?;

    let summary = match &project.allocation_id {
        Some(allocation_id) => {
            recalc_allocation_if_live(conn, allocation_id, now, actor_id).await?
        }
        None => None,
    };

    info!(event_name = "cascade.project.purged", project_id = %id.0, reports = children.len());
    Ok(CascadeReceipt { before, after: None, descendants: children.len(), summary })
}

// ---------------------------------------------------------------------------
// Allocations (root tier)
// ---------------------------------------------------------------------------

pub async fn trash_allocation(
    conn: &mut SqliteConnection,
    id: &AllocationId,
    now: DateTime<Utc>,
    actor_id: &str,
) -> Result<CascadeReceipt, EngineError> {
    let allocation = allocations::fetch(conn, id)
        .await?
        .ok_or_else(|| EngineError::not_found("allocation", id.0.clone()))?;
    if allocation.is_deleted {
        return Err(EngineError::validation(format!("allocation {} is already trashed", id.0)));
    }

    let before = snapshot(&allocation)?;

    // Phase 1, two hops: the allocation and every live descendant, all
    // stamped identically.
    allocations::mark_deleted(conn, id, now, actor_id).await?;
    counters::adjust_allocation_references(conn, &allocation, -1, now).await?;

    let mut descendants = 0;
    for project in projects::all_by_allocation(conn, id).await? {
        if !project.is_deleted {
            projects::mark_deleted(conn, &project.id, now, actor_id).await?;
            counters::adjust_project_references(conn, &project, -1, now).await?;
            descendants += 1;
        }
        // An already trashed project can still shelter live reports (restored
        // individually after the project went down); those take the stamp too.
        for report in reports::live_by_project(conn, &project.id).await? {
            reports::mark_deleted(conn, &report.id, now, actor_id).await?;
            descendants += 1;
        }
    }

    let after = allocations::fetch(conn, id).await?.map(|a| snapshot(&a)).transpose()?;

    info!(event_name = "cascade.allocation.trashed", allocation_id = %id.0, descendants);
    Ok(CascadeReceipt { before, after, descendants, summary: None })
}

pub async fn restore_allocation(
    conn: &mut SqliteConnection,
    id: &AllocationId,
    now: DateTime<Utc>,
    actor_id: &str,
) -> Result<CascadeReceipt, EngineError> {
    let allocation = allocations::fetch(conn, id)
        .await?
        .ok_or_else(|| EngineError::not_found("allocation", id.0.clone()))?;
    if !allocation.is_deleted {
        return Err(EngineError::validation(format!("allocation {} is not trashed", id.0)));
    }
    let cascade_stamp = allocation.deleted_at.ok_or_else(|| {
        EngineError::validation(format!("allocation {} has no deletion stamp", id.0))
    })?;

    let before = snapshot(&allocation)?;

    // Phase 1: the allocation, then exactly the projects and reports its
    // cascade took down.
    allocations::clear_deleted(conn, id, now, actor_id).await?;
    counters::adjust_allocation_references(conn, &allocation, 1, now).await?;

    let all_projects = projects::all_by_allocation(conn, id).await?;
    let mut descendants = 0;
    let mut recalc_ids = Vec::new();
    for project in &all_projects {
        let revive_project = project.is_deleted && project.deleted_at == Some(cascade_stamp);
        if revive_project {
            projects::clear_deleted(conn, &project.id, now, actor_id).await?;
            counters::adjust_project_references(conn, project, 1, now).await?;
            descendants += 1;
        }
        let revived_reports =
            reports::deleted_by_project_at(conn, &project.id, cascade_stamp).await?;
        for report in &revived_reports {
            reports::clear_deleted(conn, &report.id, now, actor_id).await?;
            descendants += 1;
        }
        // Recompute every project that came back or regained a report; one
        // that stayed trashed keeps its frozen figures.
        if revive_project || (!project.is_deleted && !revived_reports.is_empty()) {
            recalc_ids.push(project.id.clone());
        }
    }

    let after = allocations::fetch(conn, id).await?.map(|a| snapshot(&a)).transpose()?;

    // Phase 2, bottom-up: revived projects first, then the root.
    for project_id in &recalc_ids {
        rollup::recalculate_project(conn, project_id, now, actor_id).await?;
    }
    let outcome = rollup::recalculate_allocation(conn, id, now, actor_id).await?;

    info!(event_name = "cascade.allocation.restored", allocation_id = %id.0, descendants);
    Ok(CascadeReceipt { before, after, descendants, summary: Some(outcome.summary) })
}

pub async fn purge_allocation(
    conn: &mut SqliteConnection,
    id: &AllocationId,
    now: DateTime<Utc>,
    actor_id: &str,
) -> Result<CascadeReceipt, EngineError> {
    let allocation = allocations::fetch(conn, id)
        .await?
        .ok_or_else(|| EngineError::not_found("allocation", id.0.clone()))?;

    let before = snapshot(&allocation)?;

    if !allocation.is_deleted {
        counters::adjust_allocation_references(conn, &allocation, -1, now).await?;
    }

    let mut descendants = 0;
    for project in projects::all_by_allocation(conn, id).await? {
        if !project.is_deleted {
            counters::adjust_project_references(conn, &project, -1, now).await?;
        }
        for report in reports::all_by_project(conn, &project.id).await? {
            reports::remove(conn, &report.id).await?;
            descendants += 1;
        }
        projects::remove(conn, &project.id).await?;
        descendants += 1;
    }
    allocations::remove(conn, id).await?;

    info!(event_name = "cascade.allocation.purged", allocation_id = %id.0, descendants);
    Ok(CascadeReceipt { before, after: None, descendants, summary: None })
}

// ---------------------------------------------------------------------------
// Fund tree (2 levels, no lookup references, so no counter traffic)
// ---------------------------------------------------------------------------

pub async fn trash_fund_record(
    conn: &mut SqliteConnection,
    id: &FundRecordId,
    now: DateTime<Utc>,
    actor_id: &str,
) -> Result<CascadeReceipt, EngineError> {
    let record = funds::fetch_record(conn, id)
        .await?
        .ok_or_else(|| EngineError::not_found("fund record", id.0.clone()))?;
    if record.is_deleted {
        return Err(EngineError::validation(format!("fund record {} is already trashed", id.0)));
    }

    let before = snapshot(&record)?;
    funds::mark_record_deleted(conn, id, now, actor_id).await?;

    let children = funds::live_reports_by_record(conn, id).await?;
    for report in &children {
        funds::mark_report_deleted(conn, &report.id, now, actor_id).await?;
    }

    let after = funds::fetch_record(conn, id).await?.map(|r| snapshot(&r)).transpose()?;

    info!(event_name = "cascade.fund_record.trashed", fund_record_id = %id.0, reports = children.len());
    Ok(CascadeReceipt { before, after, descendants: children.len(), summary: None })
}

pub async fn restore_fund_record(
    conn: &mut SqliteConnection,
    id: &FundRecordId,
    now: DateTime<Utc>,
    actor_id: &str,
) -> Result<CascadeReceipt, EngineError> {
    let record = funds::fetch_record(conn, id)
        .await?
        .ok_or_else(|| EngineError::not_found("fund record", id.0.clone()))?;
    if !record.is_deleted {
        return Err(EngineError::validation(format!("fund record {} is not trashed", id.0)));
    }
    let cascade_stamp = record.deleted_at.ok_or_else(|| {
        EngineError::validation(format!("fund record {} has no deletion stamp", id.0))
    })?;

    let before = snapshot(&record)?;
    funds::clear_record_deleted(conn, id, now, actor_id).await?;

    let revived = funds::reports_deleted_by_record_at(conn, id, cascade_stamp).await?;
    for report in &revived {
        funds::clear_report_deleted(conn, &report.id, now, actor_id).await?;
    }

    let after = funds::fetch_record(conn, id).await?.map(|r| snapshot(&r)).transpose()?;

    let outcome = rollup::recalculate_fund_record(conn, id, now, actor_id).await?;

    info!(event_name = "cascade.fund_record.restored", fund_record_id = %id.0, reports = revived.len());
    Ok(CascadeReceipt {
        before,
        after,
        descendants: revived.len(),
        summary: Some(outcome.summary),
    })
}

pub async fn purge_fund_record(
    conn: &mut SqliteConnection,
    id: &FundRecordId,
    _now: DateTime<Utc>,
    _actor_id: &str,
) -> Result<CascadeReceipt, EngineError> {
    let record = funds::fetch_record(conn, id)
        .await?
        .ok_or_else(|| EngineError::not_found("fund record", id.0.clone()))?;

    let before = snapshot(&record)?;

    let children = funds::all_reports_by_record(conn, id).await?;
    for report in &children {
        funds::remove_report(conn, &report.id).await?;
    }
    funds::remove_record(conn, id).await?;

    info!(event_name = "cascade.fund_record.purged", fund_record_id = %id.0, reports = children.len());
    Ok(CascadeReceipt { before, after: None, descendants: children.len(), summary: None })
}

pub async fn trash_fund_report(
    conn: &mut SqliteConnection,
    id: &FundReportId,
    now: DateTime<Utc>,
    actor_id: &str,
) -> Result<CascadeReceipt, EngineError> {
    let report = funds::fetch_report(conn, id)
        .await?
        .ok_or_else(|| EngineError::not_found("fund report", id.0.clone()))?;
    if report.is_deleted {
        return Err(EngineError::validation(format!("fund report {} is already trashed", id.0)));
    }

    let before = snapshot(&report)?;
    funds::mark_report_deleted(conn, id, now, actor_id).await?;
    let after = funds::fetch_report(conn, id).await?.map(|r| snapshot(&r)).transpose()?;

    let summary = match &report.fund_record_id {
        Some(record_id) => recalc_fund_record_if_live(conn, record_id, now, actor_id).await?,
        None => None,
    };

    info!(event_name = "cascade.fund_report.trashed", fund_report_id = %id.0);
    Ok(CascadeReceipt { before, after, descendants: 0, summary })
}

pub async fn restore_fund_report(
    conn: &mut SqliteConnection,
    id: &FundReportId,
    now: DateTime<Utc>,
    actor_id: &str,
) -> Result<CascadeReceipt, EngineError> {
    let report = funds::fetch_report(conn, id)
        .await?
        .ok_or_else(|| EngineError::not_found("fund report", id.0.clone()))?;
    if !report.is_deleted {
        return Err(EngineError::validation(format!("fund report {} is not trashed", id.0)));
    }

    let before = snapshot(&report)?;
    funds::clear_report_deleted(conn, id, now, actor_id).await?;
    let after = funds::fetch_report(conn, id).await?.map(|r| snapshot(&r)).transpose()?;

    let summary = match &report.fund_record_id {
        Some(record_id) => recalc_fund_record_if_live(conn, record_id, now, actor_id).await?,
        None => None,
    };

    info!(event_name = "cascade.fund_report.restored", fund_report_id = %id.0);
    Ok(CascadeReceipt { before, after, descendants: 0, summary })
}

pub async fn purge_fund_report(
    conn: &mut SqliteConnection,
    id: &FundReportId,
    now: DateTime<Utc>,
    actor_id: &str,
) -> Result<CascadeReceipt, EngineError> {
    let report = funds::fetch_report(conn, id)
        .await?
        .ok_or_else(|| EngineError::not_found("fund report", id.0.clone()))?;

    let before = snapshot(&report)?;
    funds::remove_report(conn, id).await?;

    let summary = match &report.fund_record_id {
        Some(record_id) => recalc_fund_record_if_live(conn, record_id, now, actor_id).await?,
        None => None,
    };

    info!(event_name = "cascade.fund_report.purged", fund_report_id = %id.0);
    Ok(CascadeReceipt { before, after: None, descendants: 0, summary })
}
