//! The mutation service: the one front door for every write.
//!
//! Each operation opens a single transaction, applies the base write, runs
//! the counter and rollup follow-ups, records exactly one activity entry,
//! and commits. Bulk operations run the single-node algorithm per id in its
//! own transaction so one bad id cannot poison the rest.

use std::sync::Arc;

use async_trait::async_trait;
use chrono::Utc;
use serde::Serialize;
use sqlx::{SqliteConnection, SqlitePool};
use tracing::{info, warn};
use uuid::Uuid;

use fiscus_core::domain::activity::{ActivityAction, ActivityRecord};
use fiscus_core::domain::actor::Actor;
use fiscus_core::domain::allocation::{Allocation, AllocationId};
use fiscus_core::domain::fund::{FundRecord, FundRecordId, FundReport, FundReportId};
use fiscus_core::domain::lookup::LookupKind;
use fiscus_core::domain::project::{Project, ProjectId};
use fiscus_core::domain::report::{Report, ReportId};
use fiscus_core::domain::status::NodeStatus;
use fiscus_core::domain::EntityKind;
use fiscus_core::errors::DomainError;
use fiscus_db::store::{allocations, funds, lookups, projects, reports, StoreError};
use rust_decimal::Decimal;

use crate::cascade::{self, CascadeReceipt};
use crate::counters::{self, UsageDrift};
use crate::error::EngineError;
use crate::recorder::{self, ChainVerification, Mutation};
use crate::rollup::{self, RecalcSummary};

/// Confirms a referenced lookup code exists and is active before a mutation
/// may bind to it. Production queries the code tables; tests may stub.
#[async_trait]
pub trait LookupValidator: Send + Sync {
    async fn ensure_active(
        &self,
        conn: &mut SqliteConnection,
        kind: LookupKind,
        code: &str,
    ) -> Result<(), EngineError>;
}

pub struct SqlLookupValidator;

#[async_trait]
impl LookupValidator for SqlLookupValidator {
    async fn ensure_active(
        &self,
        conn: &mut SqliteConnection,
        kind: LookupKind,
        code: &str,
    ) -> Result<(), EngineError> {
        match lookups::fetch(conn, kind, code).await? {
            None => Err(EngineError::validation(format!(
                "unknown {} code: {code}",
                kind.as_str()
            ))),
            Some(entry) if !entry.active => Err(EngineError::validation(format!(
                "{} code {code} is inactive",
                kind.as_str()
            ))),
            Some(_) => Ok(()),
        }
    }
}

/// Success envelope for one mutation.
#[derive(Clone, Debug, Serialize)]
pub struct MutationReceipt {
    pub entity_kind: EntityKind,
    pub entity_id: String,
    pub action: ActivityAction,
    pub flagged: bool,
    pub summary: Option<RecalcSummary>,
}

impl MutationReceipt {
    fn new(record: &ActivityRecord, summary: Option<RecalcSummary>) -> Self {
        Self {
            entity_kind: record.entity_kind,
            entity_id: record.entity_id.clone(),
            action: record.action,
            flagged: record.flagged,
            summary,
        }
    }
}

/// Outcome of one bulk operation: per-id failures are skipped, not fatal.
#[derive(Clone, Debug, Serialize)]
pub struct BatchOutcome {
    pub batch_id: String,
    pub requested: usize,
    pub succeeded: usize,
    pub skipped: usize,
}

// --- creation payloads ------------------------------------------------------

#[derive(Clone, Debug)]
pub struct NewAllocation {
    pub id: AllocationId,
    pub particular_code: String,
    pub fiscal_year: i32,
    pub total_allocated: Decimal,
    /// Initial manual figure; only legal while `auto_calculate_utilized` is
    /// off.
    pub total_utilized: Option<Decimal>,
    pub auto_calculate_utilized: bool,
}

#[derive(Clone, Debug)]
pub struct NewProject {
    pub id: ProjectId,
    pub allocation_id: Option<AllocationId>,
    pub category_code: Option<String>,
    pub office_code: String,
    pub particular_code: String,
    pub title: String,
    pub total_allocated: Decimal,
    pub total_utilized: Option<Decimal>,
    pub auto_calculate_utilized: bool,
}

#[derive(Clone, Debug)]
pub struct NewReport {
    pub id: ReportId,
    pub project_id: Option<ProjectId>,
    pub allocated_budget: Decimal,
    pub obligated_budget: Decimal,
    pub budget_utilized: Decimal,
    pub balance: Decimal,
    pub status: NodeStatus,
    pub report_date: Option<chrono::NaiveDate>,
    pub region: Option<String>,
    pub province: Option<String>,
    pub city: Option<String>,
}

#[derive(Clone, Debug)]
pub struct NewFundRecord {
    pub id: FundRecordId,
    pub title: String,
    pub fund_source: String,
    pub year: i32,
    pub total_allocated: Decimal,
    pub total_utilized: Option<Decimal>,
    pub auto_calculate_utilized: bool,
}

#[derive(Clone, Debug)]
pub struct NewFundReport {
    pub id: FundReportId,
    pub fund_record_id: Option<FundRecordId>,
    pub allocated_budget: Decimal,
    pub obligated_budget: Decimal,
    pub budget_utilized: Decimal,
    pub balance: Decimal,
    pub status: NodeStatus,
    pub report_date: Option<chrono::NaiveDate>,
}

// --- update payloads --------------------------------------------------------
//
// `Option<T>` means "leave unchanged / set"; nullable columns use
// `Option<Option<T>>` so "set to NULL" and "leave unchanged" stay distinct.

#[derive(Clone, Debug, Default)]
pub struct AllocationUpdate {
    pub particular_code: Option<String>,
    pub fiscal_year: Option<i32>,
    pub total_allocated: Option<Decimal>,
    pub total_utilized: Option<Decimal>,
    pub auto_calculate_utilized: Option<bool>,
}

#[derive(Clone, Debug, Default)]
pub struct ProjectUpdate {
    pub allocation_id: Option<Option<AllocationId>>,
    pub category_code: Option<Option<String>>,
    pub office_code: Option<String>,
    pub particular_code: Option<String>,
    pub title: Option<String>,
    pub total_allocated: Option<Decimal>,
    pub total_utilized: Option<Decimal>,
    pub auto_calculate_utilized: Option<bool>,
}

#[derive(Clone, Debug, Default)]
pub struct ReportUpdate {
    pub project_id: Option<Option<ProjectId>>,
    pub allocated_budget: Option<Decimal>,
    pub obligated_budget: Option<Decimal>,
    pub budget_utilized: Option<Decimal>,
    pub balance: Option<Decimal>,
    pub status: Option<NodeStatus>,
    pub report_date: Option<Option<chrono::NaiveDate>>,
    pub region: Option<Option<String>>,
    pub province: Option<Option<String>>,
    pub city: Option<Option<String>>,
}

#[derive(Clone, Debug, Default)]
pub struct FundRecordUpdate {
    pub title: Option<String>,
    pub fund_source: Option<String>,
    pub year: Option<i32>,
    pub total_allocated: Option<Decimal>,
    pub total_utilized: Option<Decimal>,
    pub auto_calculate_utilized: Option<bool>,
}

#[derive(Clone, Debug, Default)]
pub struct FundReportUpdate {
    pub fund_record_id: Option<Option<FundRecordId>>,
    pub allocated_budget: Option<Decimal>,
    pub obligated_budget: Option<Decimal>,
    pub budget_utilized: Option<Decimal>,
    pub balance: Option<Decimal>,
    pub status: Option<NodeStatus>,
    pub report_date: Option<Option<chrono::NaiveDate>>,
}

pub struct BudgetService {
    pool: SqlitePool,
    validator: Arc<dyn LookupValidator>,
}

/// One cascade operation on one node, dispatched by [`BudgetService::cascade_mutation`].
enum CascadeOp<'a> {
    TrashAllocation(&'a AllocationId),
    RestoreAllocation(&'a AllocationId),
    PurgeAllocation(&'a AllocationId),
    TrashProject(&'a ProjectId),
    RestoreProject(&'a ProjectId),
    PurgeProject(&'a ProjectId),
    TrashReport(&'a ReportId),
    RestoreReport(&'a ReportId),
    PurgeReport(&'a ReportId),
    TrashFundRecord(&'a FundRecordId),
    RestoreFundRecord(&'a FundRecordId),
    PurgeFundRecord(&'a FundRecordId),
    TrashFundReport(&'a FundReportId),
    RestoreFundReport(&'a FundReportId),
    PurgeFundReport(&'a FundReportId),
}

impl CascadeOp<'_> {
    fn entity_kind(&self) -> EntityKind {
        match self {
            Self::TrashAllocation(_) | Self::RestoreAllocation(_) | Self::PurgeAllocation(_) => {
                EntityKind::Allocation
            }
            Self::TrashProject(_) | Self::RestoreProject(_) | Self::PurgeProject(_) => {
                EntityKind::Project
            }
            Self::TrashReport(_) | Self::RestoreReport(_) | Self::PurgeReport(_) => {
                EntityKind::Report
            }
            Self::TrashFundRecord(_) | Self::RestoreFundRecord(_) | Self::PurgeFundRecord(_) => {
                EntityKind::FundRecord
            }
            Self::TrashFundReport(_) | Self::RestoreFundReport(_) | Self::PurgeFundReport(_) => {
                EntityKind::FundReport
            }
        }
    }

    fn entity_id(&self) -> &str {
        match self {
            Self::TrashAllocation(id) | Self::RestoreAllocation(id) | Self::PurgeAllocation(id) => {
                &id.0
            }
            Self::TrashProject(id) | Self::RestoreProject(id) | Self::PurgeProject(id) => &id.0,
            Self::TrashReport(id) | Self::RestoreReport(id) | Self::PurgeReport(id) => &id.0,
            Self::TrashFundRecord(id)
            | Self::RestoreFundRecord(id)
            | Self::PurgeFundRecord(id) => &id.0,
            Self::TrashFundReport(id)
            | Self::RestoreFundReport(id)
            | Self::PurgeFundReport(id) => &id.0,
        }
    }

    fn action(&self) -> ActivityAction {
        match self {
            Self::TrashAllocation(_)
            | Self::TrashProject(_)
            | Self::TrashReport(_)
            | Self::TrashFundRecord(_)
            | Self::TrashFundReport(_) => ActivityAction::Trashed,
            Self::RestoreAllocation(_)
            | Self::RestoreProject(_)
            | Self::RestoreReport(_)
            | Self::RestoreFundRecord(_)
            | Self::RestoreFundReport(_) => ActivityAction::Restored,
            Self::PurgeAllocation(_)
            | Self::PurgeProject(_)
            | Self::PurgeReport(_)
            | Self::PurgeFundRecord(_)
            | Self::PurgeFundReport(_) => ActivityAction::Purged,
        }
    }

    async fn run(
        &self,
        conn: &mut SqliteConnection,
        now: chrono::DateTime<Utc>,
        actor_id: &str,
    ) -> Result<CascadeReceipt, EngineError> {
        match self {
            Self::TrashAllocation(id) => cascade::trash_allocation(conn, id, now, actor_id).await,
            Self::RestoreAllocation(id) => {
                cascade::restore_allocation(conn, id, now, actor_id).await
            }
            Self::PurgeAllocation(id) => cascade::purge_allocation(conn, id, now, actor_id).await,
            Self::TrashProject(id) => cascade::trash_project(conn, id, now, actor_id).await,
            Self::RestoreProject(id) => cascade::restore_project(conn, id, now, actor_id).await,
            Self::PurgeProject(id) => cascade::purge_project(conn, id, now, actor_id).await,
            Self::TrashReport(id) => cascade::trash_report(conn, id, now, actor_id).await,
            Self::RestoreReport(id) => cascade::restore_report(conn, id, now, actor_id).await,
            Self::PurgeReport(id) => cascade::purge_report(conn, id, now, actor_id).await,
            Self::TrashFundRecord(id) => {
                cascade::trash_fund_record(conn, id, now, actor_id).await
            }
            Self::RestoreFundRecord(id) => {
                cascade::restore_fund_record(conn, id, now, actor_id).await
            }
            Self::PurgeFundRecord(id) => {
                cascade::purge_fund_record(conn, id, now, actor_id).await
            }
            Self::TrashFundReport(id) => {
                cascade::trash_fund_report(conn, id, now, actor_id).await
            }
            Self::RestoreFundReport(id) => {
                cascade::restore_fund_report(conn, id, now, actor_id).await
            }
            Self::PurgeFundReport(id) => {
                cascade::purge_fund_report(conn, id, now, actor_id).await
            }
        }
    }
}

fn snapshot<T: Serialize>(entity: &T) -> Result<serde_json::Value, EngineError> {
    serde_json::to_value(entity)
        .map_err(|e| EngineError::validation(format!("snapshot serialization failed: {e}")))
}

/// Manual `total_utilized` writes are only legal while the node computes
/// nothing for itself.
fn check_manual_utilized(auto: bool, manual: Option<Decimal>) -> Result<(), EngineError> {
    if auto && manual.is_some() {
        return Err(EngineError::validation(
            "total_utilized is engine-owned while auto_calculate_utilized is on",
        ));
    }
    Ok(())
}

impl BudgetService {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool, validator: Arc::new(SqlLookupValidator) }
    }

    pub fn with_validator(pool: SqlitePool, validator: Arc<dyn LookupValidator>) -> Self {
        Self { pool, validator }
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    // --- allocations --------------------------------------------------------

    pub async fn create_allocation(
        &self,
        actor: &Actor,
        payload: NewAllocation,
    ) -> Result<MutationReceipt, EngineError> {
        let now = Utc::now();
        DomainError::check_amount("total_allocated", payload.total_allocated)?;
        if let Some(manual) = payload.total_utilized {
            DomainError::check_amount("total_utilized", manual)?;
        }
        check_manual_utilized(payload.auto_calculate_utilized, payload.total_utilized)?;

        let mut tx = self.pool.begin().await.map_err(StoreError::from)?;
        if allocations::fetch(&mut tx, &payload.id).await?.is_some() {
            return Err(EngineError::validation(format!(
                "allocation {} already exists",
                payload.id.0
            )));
        }
        self.validator
            .ensure_active(&mut tx, LookupKind::Particular, &payload.particular_code)
            .await?;

        let allocation = Allocation {
            id: payload.id.clone(),
            particular_code: payload.particular_code,
            fiscal_year: payload.fiscal_year,
            total_allocated: payload.total_allocated,
            total_obligated: Decimal::ZERO,
            total_utilized: payload.total_utilized.unwrap_or(Decimal::ZERO),
            utilization_rate: Decimal::ZERO,
            status: NodeStatus::Ongoing,
            auto_calculate_utilized: payload.auto_calculate_utilized,
            is_pinned: false,
            is_deleted: false,
            deleted_at: None,
            deleted_by: None,
            created_at: now,
            created_by: actor.id.clone(),
            updated_at: now,
            updated_by: actor.id.clone(),
        };
        allocations::save(&mut tx, &allocation).await?;
        counters::adjust_allocation_references(&mut tx, &allocation, 1, now).await?;

        let outcome = rollup::recalculate_allocation(&mut tx, &allocation.id, now, &actor.id).await?;
        let after = allocations::fetch(&mut tx, &allocation.id)
            .await?
            .map(|a| snapshot(&a))
            .transpose()?;

        let record = recorder::record(
            &mut tx,
            Mutation {
                actor,
                action: ActivityAction::Created,
                entity_kind: EntityKind::Allocation,
                entity_id: &allocation.id.0,
                batch_id: None,
                before: None,
                after,
            },
            now,
        )
        .await?;
        tx.commit().await.map_err(StoreError::from)?;

        info!(event_name = "service.allocation.created", allocation_id = %allocation.id.0);
        Ok(MutationReceipt::new(&record, Some(outcome.summary)))
    }

    pub async fn update_allocation(
        &self,
        actor: &Actor,
        id: &AllocationId,
        update: AllocationUpdate,
    ) -> Result<MutationReceipt, EngineError> {
        let now = Utc::now();
        let mut tx = self.pool.begin().await.map_err(StoreError::from)?;

        let current = allocations::fetch(&mut tx, id)
            .await?
            .ok_or_else(|| EngineError::not_found("allocation", id.0.clone()))?;
        if current.is_deleted {
            return Err(EngineError::validation(format!(
                "allocation {} is trashed; restore it before editing",
                id.0
            )));
        }

        let auto_after = update.auto_calculate_utilized.unwrap_or(current.auto_calculate_utilized);
        check_manual_utilized(auto_after, update.total_utilized)?;
        if let Some(amount) = update.total_allocated {
            DomainError::check_amount("total_allocated", amount)?;
        }
        if let Some(amount) = update.total_utilized {
            DomainError::check_amount("total_utilized", amount)?;
        }

        let before = snapshot(&current)?;
        let mut next = current.clone();
        if let Some(code) = update.particular_code {
            if code != current.particular_code {
                self.validator.ensure_active(&mut tx, LookupKind::Particular, &code).await?;
                counters::adjust(
                    &mut tx,
                    LookupKind::Particular,
                    &current.particular_code,
                    -1,
                    now,
                )
                .await?;
                counters::adjust(&mut tx, LookupKind::Particular, &code, 1, now).await?;
                next.particular_code = code;
            }
        }
        if let Some(year) = update.fiscal_year {
            next.fiscal_year = year;
        }
        if let Some(amount) = update.total_allocated {
            next.total_allocated = amount;
        }
        if let Some(amount) = update.total_utilized {
            next.total_utilized = amount;
        }
        next.auto_calculate_utilized = auto_after;
        next.updated_at = now;
        next.updated_by = actor.id.clone();
        allocations::save(&mut tx, &next).await?;

        let outcome = rollup::recalculate_allocation(&mut tx, id, now, &actor.id).await?;
        let after = allocations::fetch(&mut tx, id).await?.map(|a| snapshot(&a)).transpose()?;

        let record = recorder::record(
            &mut tx,
            Mutation {
                actor,
                action: ActivityAction::Updated,
                entity_kind: EntityKind::Allocation,
                entity_id: &id.0,
                batch_id: None,
                before: Some(before),
                after,
            },
            now,
        )
        .await?;
        tx.commit().await.map_err(StoreError::from)?;

        info!(event_name = "service.allocation.updated", allocation_id = %id.0);
        Ok(MutationReceipt::new(&record, Some(outcome.summary)))
    }

    pub async fn set_allocation_pinned(
        &self,
        actor: &Actor,
        id: &AllocationId,
        pinned: bool,
    ) -> Result<MutationReceipt, EngineError> {
        let now = Utc::now();
        let mut tx = self.pool.begin().await.map_err(StoreError::from)?;

        let current = allocations::fetch(&mut tx, id)
            .await?
            .ok_or_else(|| EngineError::not_found("allocation", id.0.clone()))?;
        let before = snapshot(&current)?;
        allocations::set_pinned(&mut tx, id, pinned, now, &actor.id).await?;
        let after = allocations::fetch(&mut tx, id).await?.map(|a| snapshot(&a)).transpose()?;

        let record = recorder::record(
            &mut tx,
            Mutation {
                actor,
                action: ActivityAction::Updated,
                entity_kind: EntityKind::Allocation,
                entity_id: &id.0,
                batch_id: None,
                before: Some(before),
                after,
            },
            now,
        )
        .await?;
        tx.commit().await.map_err(StoreError::from)?;

        Ok(MutationReceipt::new(&record, None))
    }

    pub async fn trash_allocation(
        &self,
        actor: &Actor,
        id: &AllocationId,
    ) -> Result<MutationReceipt, EngineError> {
        self.cascade_mutation(actor, CascadeOp::TrashAllocation(id)).await
    }

    pub async fn restore_allocation(
        &self,
        actor: &Actor,
        id: &AllocationId,
    ) -> Result<MutationReceipt, EngineError> {
        self.cascade_mutation(actor, CascadeOp::RestoreAllocation(id)).await
    }

    pub async fn purge_allocation(
        &self,
        actor: &Actor,
        id: &AllocationId,
    ) -> Result<MutationReceipt, EngineError> {
        self.cascade_mutation(actor, CascadeOp::PurgeAllocation(id)).await
    }

    pub async fn recalculate_allocation(
        &self,
        actor: &Actor,
        id: &AllocationId,
    ) -> Result<RecalcSummary, EngineError> {
        let now = Utc::now();
        let mut tx = self.pool.begin().await.map_err(StoreError::from)?;
        let outcome = rollup::recalculate_allocation(&mut tx, id, now, &actor.id).await?;
        tx.commit().await.map_err(StoreError::from)?;
        Ok(outcome.summary)
    }

    pub async fn allocation(&self, id: &AllocationId) -> Result<Option<Allocation>, EngineError> {
        let mut conn = self.pool.acquire().await.map_err(StoreError::from)?;
        Ok(allocations::fetch(&mut conn, id).await?)
    }

    pub async fn live_allocations(&self) -> Result<Vec<Allocation>, EngineError> {
        let mut conn = self.pool.acquire().await.map_err(StoreError::from)?;
        Ok(allocations::list_live(&mut conn).await?)
    }

    // --- projects -----------------------------------------------------------

    pub async fn create_project(
        &self,
        actor: &Actor,
        payload: NewProject,
    ) -> Result<MutationReceipt, EngineError> {
        let now = Utc::now();
        DomainError::check_amount("total_allocated", payload.total_allocated)?;
        if let Some(manual) = payload.total_utilized {
            DomainError::check_amount("total_utilized", manual)?;
        }
        check_manual_utilized(payload.auto_calculate_utilized, payload.total_utilized)?;

        let mut tx = self.pool.begin().await.map_err(StoreError::from)?;
        if projects::fetch(&mut tx, &payload.id).await?.is_some() {
            return Err(EngineError::validation(format!(
                "project {} already exists",
                payload.id.0
            )));
        }
        self.validator
            .ensure_active(&mut tx, LookupKind::Particular, &payload.particular_code)
            .await?;
        self.validator.ensure_active(&mut tx, LookupKind::Office, &payload.office_code).await?;
        if let Some(category) = &payload.category_code {
            self.validator.ensure_active(&mut tx, LookupKind::Category, category).await?;
        }
        if let Some(allocation_id) = &payload.allocation_id {
            ensure_allocation_live(&mut tx, allocation_id).await?;
        }

        let project = Project {
            id: payload.id.clone(),
            allocation_id: payload.allocation_id.clone(),
            category_code: payload.category_code,
            office_code: payload.office_code,
            particular_code: payload.particular_code,
            title: payload.title,
            total_allocated: payload.total_allocated,
            total_obligated: Decimal::ZERO,
            total_utilized: payload.total_utilized.unwrap_or(Decimal::ZERO),
            utilization_rate: Decimal::ZERO,
            status: NodeStatus::Ongoing,
            auto_calculate_utilized: payload.auto_calculate_utilized,
            is_deleted: false,
            deleted_at: None,
            deleted_by: None,
            created_at: now,
            created_by: actor.id.clone(),
            updated_at: now,
            updated_by: actor.id.clone(),
        };
        projects::save(&mut tx, &project).await?;
        counters::adjust_project_references(&mut tx, &project, 1, now).await?;

        let outcome = rollup::recalculate_project(&mut tx, &project.id, now, &actor.id).await?;
        if let Some(allocation_id) = &project.allocation_id {
            rollup::recalc_allocation_if_live(&mut tx, allocation_id, now, &actor.id).await?;
        }
        let after = projects::fetch(&mut tx, &project.id).await?.map(|p| snapshot(&p)).transpose()?;

        let record = recorder::record(
            &mut tx,
            Mutation {
                actor,
                action: ActivityAction::Created,
                entity_kind: EntityKind::Project,
                entity_id: &project.id.0,
                batch_id: None,
                before: None,
                after,
            },
            now,
        )
        .await?;
        tx.commit().await.map_err(StoreError::from)?;

        info!(event_name = "service.project.created", project_id = %project.id.0);
        Ok(MutationReceipt::new(&record, Some(outcome.summary)))
    }

    pub async fn update_project(
        &self,
        actor: &Actor,
        id: &ProjectId,
        update: ProjectUpdate,
    ) -> Result<MutationReceipt, EngineError> {
        let now = Utc::now();
        let mut tx = self.pool.begin().await.map_err(StoreError::from)?;

        let current = projects::fetch(&mut tx, id)
            .await?
            .ok_or_else(|| EngineError::not_found("project", id.0.clone()))?;
        if current.is_deleted {
            return Err(EngineError::validation(format!(
                "project {} is trashed; restore it before editing",
                id.0
            )));
        }

        let auto_after = update.auto_calculate_utilized.unwrap_or(current.auto_calculate_utilized);
        check_manual_utilized(auto_after, update.total_utilized)?;
        if let Some(amount) = update.total_allocated {
            DomainError::check_amount("total_allocated", amount)?;
        }
        if let Some(amount) = update.total_utilized {
            DomainError::check_amount("total_utilized", amount)?;
        }

        let before = snapshot(&current)?;
        let mut next = current.clone();
        if let Some(link) = update.allocation_id {
            if let Some(allocation_id) = &link {
                ensure_allocation_live(&mut tx, allocation_id).await?;
            }
            next.allocation_id = link;
        }
        if let Some(category) = update.category_code {
            if let Some(code) = &category {
                self.validator.ensure_active(&mut tx, LookupKind::Category, code).await?;
            }
            next.category_code = category;
        }
        if let Some(code) = update.office_code {
            self.validator.ensure_active(&mut tx, LookupKind::Office, &code).await?;
            next.office_code = code;
        }
        if let Some(code) = update.particular_code {
            self.validator.ensure_active(&mut tx, LookupKind::Particular, &code).await?;
            next.particular_code = code;
        }
        if let Some(title) = update.title {
            next.title = title;
        }
        if let Some(amount) = update.total_allocated {
            next.total_allocated = amount;
        }
        if let Some(amount) = update.total_utilized {
            next.total_utilized = amount;
        }
        next.auto_calculate_utilized = auto_after;
        next.updated_at = now;
        next.updated_by = actor.id.clone();

        // Reassigned codes adjust the counters exactly twice: -old, +new.
        let old_codes = counters::project_codes(&current);
        let new_codes = counters::project_codes(&next);
        for (kind, code) in &old_codes {
            if !new_codes.contains(&(*kind, code.clone())) {
                counters::adjust(&mut tx, *kind, code, -1, now).await?;
            }
        }
        for (kind, code) in &new_codes {
            if !old_codes.contains(&(*kind, code.clone())) {
                counters::adjust(&mut tx, *kind, code, 1, now).await?;
            }
        }

        projects::save(&mut tx, &next).await?;

        let outcome = rollup::recalculate_project(&mut tx, id, now, &actor.id).await?;
        // Re-parenting recalculates both ends of the move; a plain edit only
        // hops to the parent when the derived fields changed.
        if current.allocation_id != next.allocation_id {
            if let Some(old_parent) = &current.allocation_id {
                rollup::recalc_allocation_if_live(&mut tx, old_parent, now, &actor.id).await?;
            }
            if let Some(new_parent) = &next.allocation_id {
                rollup::recalc_allocation_if_live(&mut tx, new_parent, now, &actor.id).await?;
            }
        } else if outcome.changed {
            if let Some(parent) = &next.allocation_id {
                rollup::recalc_allocation_if_live(&mut tx, parent, now, &actor.id).await?;
            }
        }

        let after = projects::fetch(&mut tx, id).await?.map(|p| snapshot(&p)).transpose()?;
        let record = recorder::record(
            &mut tx,
            Mutation {
                actor,
                action: ActivityAction::Updated,
                entity_kind: EntityKind::Project,
                entity_id: &id.0,
                batch_id: None,
                before: Some(before),
                after,
            },
            now,
        )
        .await?;
        tx.commit().await.map_err(StoreError::from)?;

        info!(event_name = "service.project.updated", project_id = %id.0);
        Ok(MutationReceipt::new(&record, Some(outcome.summary)))
    }

    pub async fn trash_project(
        &self,
        actor: &Actor,
        id: &ProjectId,
    ) -> Result<MutationReceipt, EngineError> {
        self.cascade_mutation(actor, CascadeOp::TrashProject(id)).await
    }

    pub async fn restore_project(
        &self,
        actor: &Actor,
        id: &ProjectId,
    ) -> Result<MutationReceipt, EngineError> {
        self.cascade_mutation(actor, CascadeOp::RestoreProject(id)).await
    }

    pub async fn purge_project(
        &self,
        actor: &Actor,
        id: &ProjectId,
    ) -> Result<MutationReceipt, EngineError> {
        self.cascade_mutation(actor, CascadeOp::PurgeProject(id)).await
    }

    pub async fn recalculate_project(
        &self,
        actor: &Actor,
        id: &ProjectId,
    ) -> Result<RecalcSummary, EngineError> {
        let now = Utc::now();
        let mut tx = self.pool.begin().await.map_err(StoreError::from)?;
        let outcome = rollup::recalculate_project(&mut tx, id, now, &actor.id).await?;
        tx.commit().await.map_err(StoreError::from)?;
        Ok(outcome.summary)
    }

    pub async fn project(&self, id: &ProjectId) -> Result<Option<Project>, EngineError> {
        let mut conn = self.pool.acquire().await.map_err(StoreError::from)?;
        Ok(projects::fetch(&mut conn, id).await?)
    }

    pub async fn live_projects(&self) -> Result<Vec<Project>, EngineError> {
        let mut conn = self.pool.acquire().await.map_err(StoreError::from)?;
        Ok(projects::list_live(&mut conn).await?)
    }

    // --- bulk project operations --------------------------------------------

    pub async fn trash_projects(
        &self,
        actor: &Actor,
        ids: &[ProjectId],
    ) -> Result<BatchOutcome, EngineError> {
        self.bulk_projects(actor, ids, ActivityAction::Trashed).await
    }

    pub async fn restore_projects(
        &self,
        actor: &Actor,
        ids: &[ProjectId],
    ) -> Result<BatchOutcome, EngineError> {
        self.bulk_projects(actor, ids, ActivityAction::Restored).await
    }

    /// Move a set of projects onto a new category (or off any category) in
    /// one batch. Counter traffic is -old/+new per project; rollups are
    /// untouched because categories carry no money.
    pub async fn reassign_category(
        &self,
        actor: &Actor,
        ids: &[ProjectId],
        category_code: Option<&str>,
    ) -> Result<BatchOutcome, EngineError> {
        let batch_id = Uuid::new_v4().to_string();
        let mut succeeded = 0;
        let mut skipped = 0;

        for id in ids {
            let result = self
                .reassign_one_category(actor, id, category_code, &batch_id)
                .await;
            match result {
                Ok(()) => succeeded += 1,
                Err(error) => {
                    warn!(
                        event_name = "service.batch.item_skipped",
                        project_id = %id.0,
                        error = %error,
                    );
                    skipped += 1;
                }
            }
        }

        info!(
            event_name = "service.projects.category_reassigned",
            batch_id = %batch_id,
            requested = ids.len(),
            succeeded,
            skipped,
        );
        Ok(BatchOutcome { batch_id, requested: ids.len(), succeeded, skipped })
    }

    async fn reassign_one_category(
        &self,
        actor: &Actor,
        id: &ProjectId,
        category_code: Option<&str>,
        batch_id: &str,
    ) -> Result<(), EngineError> {
        let now = Utc::now();
        let mut tx = self.pool.begin().await.map_err(StoreError::from)?;

        let current = projects::fetch(&mut tx, id)
            .await?
            .ok_or_else(|| EngineError::not_found("project", id.0.clone()))?;
        if current.is_deleted {
            return Err(EngineError::validation(format!("project {} is trashed", id.0)));
        }
        if let Some(code) = category_code {
            self.validator.ensure_active(&mut tx, LookupKind::Category, code).await?;
        }

        let before = snapshot(&current)?;
        if current.category_code.as_deref() != category_code {
            if let Some(old) = &current.category_code {
                counters::adjust(&mut tx, LookupKind::Category, old, -1, now).await?;
            }
            if let Some(new) = category_code {
                counters::adjust(&mut tx, LookupKind::Category, new, 1, now).await?;
            }
        }
        projects::set_category(&mut tx, id, category_code, now, &actor.id).await?;
        let after = projects::fetch(&mut tx, id).await?.map(|p| snapshot(&p)).transpose()?;

        recorder::record(
            &mut tx,
            Mutation {
                actor,
                action: ActivityAction::CategoryReassigned,
                entity_kind: EntityKind::Project,
                entity_id: &id.0,
                batch_id: Some(batch_id),
                before: Some(before),
                after,
            },
            now,
        )
        .await?;
        tx.commit().await.map_err(StoreError::from)?;
        Ok(())
    }

    // --- reports ------------------------------------------------------------

    pub async fn create_report(
        &self,
        actor: &Actor,
        payload: NewReport,
    ) -> Result<MutationReceipt, EngineError> {
        let now = Utc::now();
        for (field, amount) in [
            ("allocated_budget", payload.allocated_budget),
            ("obligated_budget", payload.obligated_budget),
            ("budget_utilized", payload.budget_utilized),
        ] {
            DomainError::check_amount(field, amount)?;
        }

        let mut tx = self.pool.begin().await.map_err(StoreError::from)?;
        if reports::fetch(&mut tx, &payload.id).await?.is_some() {
            return Err(EngineError::validation(format!(
                "report {} already exists",
                payload.id.0
            )));
        }
        if let Some(project_id) = &payload.project_id {
            ensure_project_live(&mut tx, project_id).await?;
        }

        let report = Report {
            id: payload.id.clone(),
            project_id: payload.project_id.clone(),
            allocated_budget: payload.allocated_budget,
            obligated_budget: payload.obligated_budget,
            budget_utilized: payload.budget_utilized,
            balance: payload.balance,
            status: payload.status,
            report_date: payload.report_date,
            region: payload.region,
            province: payload.province,
            city: payload.city,
            is_deleted: false,
            deleted_at: None,
            deleted_by: None,
            created_at: now,
            created_by: actor.id.clone(),
            updated_at: now,
            updated_by: actor.id.clone(),
        };
        reports::save(&mut tx, &report).await?;

        let summary = match &report.project_id {
            Some(project_id) => {
                rollup::recalc_project_chain(&mut tx, project_id, now, &actor.id).await?
            }
            None => None,
        };
        let after = reports::fetch(&mut tx, &report.id).await?.map(|r| snapshot(&r)).transpose()?;

        let record = recorder::record(
            &mut tx,
            Mutation {
                actor,
                action: ActivityAction::Created,
                entity_kind: EntityKind::Report,
                entity_id: &report.id.0,
                batch_id: None,
                before: None,
                after,
            },
            now,
        )
        .await?;
        tx.commit().await.map_err(StoreError::from)?;

        info!(event_name = "service.report.created", report_id = %report.id.0);
        Ok(MutationReceipt::new(&record, summary))
    }

    pub async fn update_report(
        &self,
        actor: &Actor,
        id: &ReportId,
        update: ReportUpdate,
    ) -> Result<MutationReceipt, EngineError> {
        let now = Utc::now();
        let mut tx = self.pool.begin().await.map_err(StoreError::from)?;

        let current = reports::fetch(&mut tx, id)
            .await?
            .ok_or_else(|| EngineError::not_found("report", id.0.clone()))?;
        if current.is_deleted {
            return Err(EngineError::validation(format!(
                "report {} is trashed; restore it before editing",
                id.0
            )));
        }
        for (field, amount) in [
            ("allocated_budget", update.allocated_budget),
            ("obligated_budget", update.obligated_budget),
            ("budget_utilized", update.budget_utilized),
        ] {
            if let Some(amount) = amount {
                DomainError::check_amount(field, amount)?;
            }
        }

        let before = snapshot(&current)?;
        let mut next = current.clone();
        if let Some(link) = update.project_id {
            if let Some(project_id) = &link {
                ensure_project_live(&mut tx, project_id).await?;
            }
            next.project_id = link;
        }
        if let Some(amount) = update.allocated_budget {
            next.allocated_budget = amount;
        }
        if let Some(amount) = update.obligated_budget {
            next.obligated_budget = amount;
        }
        if let Some(amount) = update.budget_utilized {
            next.budget_utilized = amount;
        }
        if let Some(amount) = update.balance {
            next.balance = amount;
        }
        if let Some(status) = update.status {
            next.status = status;
        }
        if let Some(date) = update.report_date {
            next.report_date = date;
        }
        if let Some(region) = update.region {
            next.region = region;
        }
        if let Some(province) = update.province {
            next.province = province;
        }
        if let Some(city) = update.city {
            next.city = city;
        }
        next.updated_at = now;
        next.updated_by = actor.id.clone();
        reports::save(&mut tx, &next).await?;

        // Re-parenting a leaf recalculates both chains; otherwise just the
        // (possibly unchanged) current one.
        let summary = if current.project_id != next.project_id {
            if let Some(old_parent) = &current.project_id {
                rollup::recalc_project_chain(&mut tx, old_parent, now, &actor.id).await?;
            }
            match &next.project_id {
                Some(new_parent) => {
                    rollup::recalc_project_chain(&mut tx, new_parent, now, &actor.id).await?
                }
                None => None,
            }
        } else {
            match &next.project_id {
                Some(parent) => {
                    rollup::recalc_project_chain(&mut tx, parent, now, &actor.id).await?
                }
                None => None,
            }
        };

        let after = reports::fetch(&mut tx, id).await?.map(|r| snapshot(&r)).transpose()?;
        let record = recorder::record(
            &mut tx,
            Mutation {
                actor,
                action: ActivityAction::Updated,
                entity_kind: EntityKind::Report,
                entity_id: &id.0,
                batch_id: None,
                before: Some(before),
                after,
            },
            now,
        )
        .await?;
        tx.commit().await.map_err(StoreError::from)?;

        info!(event_name = "service.report.updated", report_id = %id.0);
        Ok(MutationReceipt::new(&record, summary))
    }

    pub async fn trash_report(
        &self,
        actor: &Actor,
        id: &ReportId,
    ) -> Result<MutationReceipt, EngineError> {
        self.cascade_mutation(actor, CascadeOp::TrashReport(id)).await
    }

    pub async fn restore_report(
        &self,
        actor: &Actor,
        id: &ReportId,
    ) -> Result<MutationReceipt, EngineError> {
        self.cascade_mutation(actor, CascadeOp::RestoreReport(id)).await
    }

    pub async fn purge_report(
        &self,
        actor: &Actor,
        id: &ReportId,
    ) -> Result<MutationReceipt, EngineError> {
        self.cascade_mutation(actor, CascadeOp::PurgeReport(id)).await
    }

    pub async fn report(&self, id: &ReportId) -> Result<Option<Report>, EngineError> {
        let mut conn = self.pool.acquire().await.map_err(StoreError::from)?;
        Ok(reports::fetch(&mut conn, id).await?)
    }

    // --- fund records -------------------------------------------------------

    pub async fn create_fund_record(
        &self,
        actor: &Actor,
        payload: NewFundRecord,
    ) -> Result<MutationReceipt, EngineError> {
        let now = Utc::now();
        DomainError::check_amount("total_allocated", payload.total_allocated)?;
        if let Some(manual) = payload.total_utilized {
            DomainError::check_amount("total_utilized", manual)?;
        }
        check_manual_utilized(payload.auto_calculate_utilized, payload.total_utilized)?;

        let mut tx = self.pool.begin().await.map_err(StoreError::from)?;
        if funds::fetch_record(&mut tx, &payload.id).await?.is_some() {
            return Err(EngineError::validation(format!(
                "fund record {} already exists",
                payload.id.0
            )));
        }

        let record_row = FundRecord {
            id: payload.id.clone(),
            title: payload.title,
            fund_source: payload.fund_source,
            year: payload.year,
            total_allocated: payload.total_allocated,
            total_obligated: Decimal::ZERO,
            total_utilized: payload.total_utilized.unwrap_or(Decimal::ZERO),
            utilization_rate: Decimal::ZERO,
            status: NodeStatus::Ongoing,
            auto_calculate_utilized: payload.auto_calculate_utilized,
            is_deleted: false,
            deleted_at: None,
            deleted_by: None,
            created_at: now,
            created_by: actor.id.clone(),
            updated_at: now,
            updated_by: actor.id.clone(),
        };
        funds::save_record(&mut tx, &record_row).await?;

        let outcome = rollup::recalculate_fund_record(&mut tx, &record_row.id, now, &actor.id).await?;
        let after =
            funds::fetch_record(&mut tx, &record_row.id).await?.map(|r| snapshot(&r)).transpose()?;

        let record = recorder::record(
            &mut tx,
            Mutation {
                actor,
                action: ActivityAction::Created,
                entity_kind: EntityKind::FundRecord,
                entity_id: &record_row.id.0,
                batch_id: None,
                before: None,
                after,
            },
            now,
        )
        .await?;
        tx.commit().await.map_err(StoreError::from)?;

        info!(event_name = "service.fund_record.created", fund_record_id = %record_row.id.0);
        Ok(MutationReceipt::new(&record, Some(outcome.summary)))
    }

    pub async fn update_fund_record(
        &self,
        actor: &Actor,
        id: &FundRecordId,
        update: FundRecordUpdate,
    ) -> Result<MutationReceipt, EngineError> {
        let now = Utc::now();
        let mut tx = self.pool.begin().await.map_err(StoreError::from)?;

        let current = funds::fetch_record(&mut tx, id)
            .await?
            .ok_or_else(|| EngineError::not_found("fund record", id.0.clone()))?;
        if current.is_deleted {
            return Err(EngineError::validation(format!(
                "fund record {} is trashed; restore it before editing",
                id.0
            )));
        }

        let auto_after = update.auto_calculate_utilized.unwrap_or(current.auto_calculate_utilized);
        check_manual_utilized(auto_after, update.total_utilized)?;
        if let Some(amount) = update.total_allocated {
            DomainError::check_amount("total_allocated", amount)?;
        }
        if let Some(amount) = update.total_utilized {
            DomainError::check_amount("total_utilized", amount)?;
        }

        let before = snapshot(&current)?;
        let mut next = current.clone();
        if let Some(title) = update.title {
            next.title = title;
        }
        if let Some(source) = update.fund_source {
            next.fund_source = source;
        }
        if let Some(year) = update.year {
            next.year = year;
        }
        if let Some(amount) = update.total_allocated {
            next.total_allocated = amount;
        }
        if let Some(amount) = update.total_utilized {
            next.total_utilized = amount;
        }
        next.auto_calculate_utilized = auto_after;
        next.updated_at = now;
        next.updated_by = actor.id.clone();
        funds::save_record(&mut tx, &next).await?;

        let outcome = rollup::recalculate_fund_record(&mut tx, id, now, &actor.id).await?;
        let after = funds::fetch_record(&mut tx, id).await?.map(|r| snapshot(&r)).transpose()?;

        let record = recorder::record(
            &mut tx,
            Mutation {
                actor,
                action: ActivityAction::Updated,
                entity_kind: EntityKind::FundRecord,
                entity_id: &id.0,
                batch_id: None,
                before: Some(before),
                after,
            },
            now,
        )
        .await?;
        tx.commit().await.map_err(StoreError::from)?;

        info!(event_name = "service.fund_record.updated", fund_record_id = %id.0);
        Ok(MutationReceipt::new(&record, Some(outcome.summary)))
    }

    pub async fn trash_fund_record(
        &self,
        actor: &Actor,
        id: &FundRecordId,
    ) -> Result<MutationReceipt, EngineError> {
        self.cascade_mutation(actor, CascadeOp::TrashFundRecord(id)).await
    }

    pub async fn restore_fund_record(
        &self,
        actor: &Actor,
        id: &FundRecordId,
    ) -> Result<MutationReceipt, EngineError> {
        self.cascade_mutation(actor, CascadeOp::RestoreFundRecord(id)).await
    }

    pub async fn purge_fund_record(
        &self,
        actor: &Actor,
        id: &FundRecordId,
    ) -> Result<MutationReceipt, EngineError> {
        self.cascade_mutation(actor, CascadeOp::PurgeFundRecord(id)).await
    }

    pub async fn recalculate_fund_record(
        &self,
        actor: &Actor,
        id: &FundRecordId,
    ) -> Result<RecalcSummary, EngineError> {
        let now = Utc::now();
        let mut tx = self.pool.begin().await.map_err(StoreError::from)?;
        let outcome = rollup::recalculate_fund_record(&mut tx, id, now, &actor.id).await?;
        tx.commit().await.map_err(StoreError::from)?;
        Ok(outcome.summary)
    }

    pub async fn fund_record(&self, id: &FundRecordId) -> Result<Option<FundRecord>, EngineError> {
        let mut conn = self.pool.acquire().await.map_err(StoreError::from)?;
        Ok(funds::fetch_record(&mut conn, id).await?)
    }

    // --- fund reports -------------------------------------------------------

    pub async fn create_fund_report(
        &self,
        actor: &Actor,
        payload: NewFundReport,
    ) -> Result<MutationReceipt, EngineError> {
        let now = Utc::now();
        for (field, amount) in [
            ("allocated_budget", payload.allocated_budget),
            ("obligated_budget", payload.obligated_budget),
            ("budget_utilized", payload.budget_utilized),
        ] {
            DomainError::check_amount(field, amount)?;
        }

        let mut tx = self.pool.begin().await.map_err(StoreError::from)?;
        if funds::fetch_report(&mut tx, &payload.id).await?.is_some() {
            return Err(EngineError::validation(format!(
                "fund report {} already exists",
                payload.id.0
            )));
        }
        if let Some(record_id) = &payload.fund_record_id {
            ensure_fund_record_live(&mut tx, record_id).await?;
        }

        let report = FundReport {
            id: payload.id.clone(),
            fund_record_id: payload.fund_record_id.clone(),
            allocated_budget: payload.allocated_budget,
            obligated_budget: payload.obligated_budget,
            budget_utilized: payload.budget_utilized,
            balance: payload.balance,
            status: payload.status,
            report_date: payload.report_date,
            is_deleted: false,
            deleted_at: None,
            deleted_by: None,
            created_at: now,
            created_by: actor.id.clone(),
            updated_at: now,
            updated_by: actor.id.clone(),
        };
        funds::save_report(&mut tx, &report).await?;

        let summary = match &report.fund_record_id {
            Some(record_id) => {
                rollup::recalc_fund_record_if_live(&mut tx, record_id, now, &actor.id).await?
            }
            None => None,
        };
        let after =
            funds::fetch_report(&mut tx, &report.id).await?.map(|r| snapshot(&r)).transpose()?;

        let record = recorder::record(
            &mut tx,
            Mutation {
                actor,
                action: ActivityAction::Created,
                entity_kind: EntityKind::FundReport,
                entity_id: &report.id.0,
                batch_id: None,
                before: None,
                after,
            },
            now,
        )
        .await?;
        tx.commit().await.map_err(StoreError::from)?;

        info!(event_name = "service.fund_report.created", fund_report_id = %report.id.0);
        Ok(MutationReceipt::new(&record, summary))
    }

    pub async fn update_fund_report(
        &self,
        actor: &Actor,
        id: &FundReportId,
        update: FundReportUpdate,
    ) -> Result<MutationReceipt, EngineError> {
        let now = Utc::now();
        let mut tx = self.pool.begin().await.map_err(StoreError::from)?;

        let current = funds::fetch_report(&mut tx, id)
            .await?
            .ok_or_else(|| EngineError::not_found("fund report", id.0.clone()))?;
        if current.is_deleted {
            return Err(EngineError::validation(format!(
                "fund report {} is trashed; restore it before editing",
                id.0
            )));
        }
        for (field, amount) in [
            ("allocated_budget", update.allocated_budget),
            ("obligated_budget", update.obligated_budget),
            ("budget_utilized", update.budget_utilized),
        ] {
            if let Some(amount) = amount {
                DomainError::check_amount(field, amount)?;
            }
        }

        let before = snapshot(&current)?;
        let mut next = current.clone();
        if let Some(link) = update.fund_record_id {
            if let Some(record_id) = &link {
                ensure_fund_record_live(&mut tx, record_id).await?;
            }
            next.fund_record_id = link;
        }
        if let Some(amount) = update.allocated_budget {
            next.allocated_budget = amount;
        }
        if let Some(amount) = update.obligated_budget {
            next.obligated_budget = amount;
        }
        if let Some(amount) = update.budget_utilized {
            next.budget_utilized = amount;
        }
        if let Some(amount) = update.balance {
            next.balance = amount;
        }
        if let Some(status) = update.status {
            next.status = status;
        }
        if let Some(date) = update.report_date {
            next.report_date = date;
        }
        next.updated_at = now;
        next.updated_by = actor.id.clone();
        funds::save_report(&mut tx, &next).await?;

        let summary = if current.fund_record_id != next.fund_record_id {
            if let Some(old_parent) = &current.fund_record_id {
                rollup::recalc_fund_record_if_live(&mut tx, old_parent, now, &actor.id).await?;
            }
            match &next.fund_record_id {
                Some(new_parent) => {
                    rollup::recalc_fund_record_if_live(&mut tx, new_parent, now, &actor.id).await?
                }
                None => None,
            }
        } else {
            match &next.fund_record_id {
                Some(parent) => {
                    rollup::recalc_fund_record_if_live(&mut tx, parent, now, &actor.id).await?
                }
                None => None,
            }
        };

        let after = funds::fetch_report(&mut tx, id).await?.map(|r| snapshot(&r)).transpose()?;
        let record = recorder::record(
            &mut tx,
            Mutation {
                actor,
                action: ActivityAction::Updated,
                entity_kind: EntityKind::FundReport,
                entity_id: &id.0,
                batch_id: None,
                before: Some(before),
                after,
            },
            now,
        )
        .await?;
        tx.commit().await.map_err(StoreError::from)?;

        info!(event_name = "service.fund_report.updated", fund_report_id = %id.0);
        Ok(MutationReceipt::new(&record, summary))
    }

    pub async fn trash_fund_report(
        &self,
        actor: &Actor,
        id: &FundReportId,
    ) -> Result<MutationReceipt, EngineError> {
        self.cascade_mutation(actor, CascadeOp::TrashFundReport(id)).await
    }

    pub async fn restore_fund_report(
        &self,
        actor: &Actor,
        id: &FundReportId,
    ) -> Result<MutationReceipt, EngineError> {
        self.cascade_mutation(actor, CascadeOp::RestoreFundReport(id)).await
    }

    pub async fn purge_fund_report(
        &self,
        actor: &Actor,
        id: &FundReportId,
    ) -> Result<MutationReceipt, EngineError> {
        self.cascade_mutation(actor, CascadeOp::PurgeFundReport(id)).await
    }

    pub async fn fund_report(&self, id: &FundReportId) -> Result<Option<FundReport>, EngineError> {
        let mut conn = self.pool.acquire().await.map_err(StoreError::from)?;
        Ok(funds::fetch_report(&mut conn, id).await?)
    }

    // --- maintenance --------------------------------------------------------

    pub async fn reconcile_usage_counts(&self) -> Result<Vec<UsageDrift>, EngineError> {
        let now = Utc::now();
        let mut tx = self.pool.begin().await.map_err(StoreError::from)?;
        let drifted = counters::reconcile_usage_counts(&mut tx, now).await?;
        tx.commit().await.map_err(StoreError::from)?;
        Ok(drifted)
    }

    pub async fn verify_log(
        &self,
        entity_kind: EntityKind,
        entity_id: &str,
    ) -> Result<ChainVerification, EngineError> {
        let mut conn = self.pool.acquire().await.map_err(StoreError::from)?;
        recorder::verify_log(&mut conn, entity_kind, entity_id).await
    }

    // --- shared plumbing ----------------------------------------------------

    /// One cascade mutation: run the cascade inside a fresh transaction,
    /// record the activity entry from its before/after snapshots, commit.
    async fn cascade_mutation(
        &self,
        actor: &Actor,
        op: CascadeOp<'_>,
    ) -> Result<MutationReceipt, EngineError> {
        let now = Utc::now();
        let mut tx = self.pool.begin().await.map_err(StoreError::from)?;

        let receipt = op.run(&mut tx, now, &actor.id).await?;
        let record = recorder::record(
            &mut tx,
            Mutation {
                actor,
                action: op.action(),
                entity_kind: op.entity_kind(),
                entity_id: op.entity_id(),
                batch_id: None,
                before: Some(receipt.before),
                after: receipt.after,
            },
            now,
        )
        .await?;
        tx.commit().await.map_err(StoreError::from)?;

        Ok(MutationReceipt::new(&record, receipt.summary))
    }

    /// Shared driver for bulk project trash/restore: one transaction per id,
    /// one activity entry per id under a shared batch id, failures skipped.
    async fn bulk_projects(
        &self,
        actor: &Actor,
        ids: &[ProjectId],
        action: ActivityAction,
    ) -> Result<BatchOutcome, EngineError> {
        let batch_id = Uuid::new_v4().to_string();
        let mut succeeded = 0;
        let mut skipped = 0;

        for id in ids {
            let now = Utc::now();
            let attempt: Result<(), EngineError> = async {
                let mut tx = self.pool.begin().await.map_err(StoreError::from)?;
                let receipt = match action {
                    ActivityAction::Restored => {
                        cascade::restore_project(&mut tx, id, now, &actor.id).await?
                    }
                    _ => cascade::trash_project(&mut tx, id, now, &actor.id).await?,
                };
                recorder::record(
                    &mut tx,
                    Mutation {
                        actor,
                        action,
                        entity_kind: EntityKind::Project,
                        entity_id: &id.0,
                        batch_id: Some(&batch_id),
                        before: Some(receipt.before),
                        after: receipt.after,
                    },
                    now,
                )
                .await?;
                tx.commit().await.map_err(StoreError::from)?;
                Ok(())
            }
            .await;

            match attempt {
                Ok(()) => succeeded += 1,
                Err(error) => {
                    warn!(
                        event_name = "service.batch.item_skipped",
                        project_id = %id.0,
                        error = %error,
                    );
                    skipped += 1;
                }
            }
        }

        info!(
            event_name = "service.projects.batch_finished",
            action = action.as_str(),
            batch_id = %batch_id,
            requested = ids.len(),
            succeeded,
            skipped,
        );
        Ok(BatchOutcome { batch_id, requested: ids.len(), succeeded, skipped })
    }
}

async fn ensure_allocation_live(
    conn: &mut SqliteConnection,
    id: &AllocationId,
) -> Result<(), EngineError> {
    let allocation = allocations::fetch(conn, id)
        .await?
        .ok_or_else(|| EngineError::not_found("allocation", id.0.clone()))?;
    if allocation.is_deleted {
        return Err(EngineError::validation(format!("allocation {} is trashed", id.0)));
    }
    Ok(())
}

async fn ensure_project_live(
    conn: &mut SqliteConnection,
    id: &ProjectId,
) -> Result<(), EngineError> {
    let project = projects::fetch(conn, id)
        .await?
        .ok_or_else(|| EngineError::not_found("project", id.0.clone()))?;
    if project.is_deleted {
        return Err(EngineError::validation(format!("project {} is trashed", id.0)));
    }
    Ok(())
}

async fn ensure_fund_record_live(
    conn: &mut SqliteConnection,
    id: &FundRecordId,
) -> Result<(), EngineError> {
    let record = funds::fetch_record(conn, id)
        .await?
        .ok_or_else(|| EngineError::not_found("fund record", id.0.clone()))?;
    if record.is_deleted {
        return Err(EngineError::validation(format!("fund record {} is trashed", id.0)));
    }
    Ok(())
}
