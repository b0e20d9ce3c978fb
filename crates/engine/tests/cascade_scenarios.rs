use chrono::Utc;
use rust_decimal::Decimal;

use fiscus_core::domain::actor::Actor;
use fiscus_core::domain::allocation::AllocationId;
use fiscus_core::domain::fund::{FundRecordId, FundReportId};
use fiscus_core::domain::lookup::{LookupEntry, LookupKind};
use fiscus_core::domain::project::ProjectId;
use fiscus_core::domain::report::ReportId;
use fiscus_core::domain::status::NodeStatus;
use fiscus_core::domain::EntityKind;
use fiscus_db::store::{activity, lookups};
use fiscus_db::{connect_with_settings, migrations};
use fiscus_engine::{
    BudgetService, EngineError, NewAllocation, NewFundRecord, NewFundReport, NewProject,
    NewReport, ProjectUpdate,
};

async fn setup() -> BudgetService {
    let pool = connect_with_settings("sqlite::memory:", 1, 30).await.expect("connect");
    migrations::run_pending(&pool).await.expect("migrations");

    let mut conn = pool.acquire().await.expect("acquire");
    for (kind, code, name) in [
        (LookupKind::Particular, "P-ROADS", "Road Networks"),
        (LookupKind::Office, "O-DPWH", "Public Works"),
        (LookupKind::Category, "C-INFRA", "Infrastructure"),
    ] {
        let now = Utc::now();
        lookups::save(
            &mut conn,
            kind,
            &LookupEntry {
                code: code.to_string(),
                name: name.to_string(),
                active: true,
                usage_count: 0,
                created_at: now,
                updated_at: now,
            },
        )
        .await
        .expect("seed code");
    }
    drop(conn);

    BudgetService::new(pool)
}

fn actor() -> Actor {
    Actor::new("u-1", "Test User", "admin", "Budget Office")
}

async fn usage(service: &BudgetService, kind: LookupKind, code: &str) -> i64 {
    let mut conn = service.pool().acquire().await.expect("acquire");
    lookups::fetch(&mut conn, kind, code).await.expect("fetch").expect("code exists").usage_count
}

fn new_allocation(id: &str) -> NewAllocation {
    NewAllocation {
        id: AllocationId(id.to_string()),
        particular_code: "P-ROADS".to_string(),
        fiscal_year: 2026,
        total_allocated: Decimal::from(100_000),
        total_utilized: None,
        auto_calculate_utilized: true,
    }
}

fn new_project(id: &str, allocation: Option<&str>) -> NewProject {
    NewProject {
        id: ProjectId(id.to_string()),
        allocation_id: allocation.map(|a| AllocationId(a.to_string())),
        category_code: Some("C-INFRA".to_string()),
        office_code: "O-DPWH".to_string(),
        particular_code: "P-ROADS".to_string(),
        title: format!("Project {id}"),
        total_allocated: Decimal::from(50_000),
        total_utilized: None,
        auto_calculate_utilized: true,
    }
}

fn new_report(id: &str, project: &str, utilized: i64) -> NewReport {
    NewReport {
        id: ReportId(id.to_string()),
        project_id: Some(ProjectId(project.to_string())),
        allocated_budget: Decimal::from(utilized),
        obligated_budget: Decimal::from(utilized / 2),
        budget_utilized: Decimal::from(utilized),
        balance: Decimal::ZERO,
        status: NodeStatus::Ongoing,
        report_date: None,
        region: None,
        province: None,
        city: None,
    }
}

#[tokio::test]
async fn trash_restore_round_trip_spares_independently_trashed_descendants() {
    let service = setup().await;
    let actor = actor();

    service.create_allocation(&actor, new_allocation("alloc-1")).await.unwrap();
    service.create_project(&actor, new_project("proj-1", Some("alloc-1"))).await.unwrap();
    service.create_report(&actor, new_report("rep-keep", "proj-1", 10_000)).await.unwrap();
    service.create_report(&actor, new_report("rep-gone", "proj-1", 5_000)).await.unwrap();
    assert_eq!(usage(&service, LookupKind::Particular, "P-ROADS").await, 2);

    // rep-gone is trashed on its own, before the cascade.
    service.trash_report(&actor, &ReportId("rep-gone".into())).await.unwrap();

    service.trash_allocation(&actor, &AllocationId("alloc-1".into())).await.unwrap();
    assert_eq!(usage(&service, LookupKind::Particular, "P-ROADS").await, 0);
    assert_eq!(usage(&service, LookupKind::Office, "O-DPWH").await, 0);
    let project = service.project(&ProjectId("proj-1".into())).await.unwrap().unwrap();
    assert!(project.is_deleted);

    service.restore_allocation(&actor, &AllocationId("alloc-1".into())).await.unwrap();
    assert_eq!(usage(&service, LookupKind::Particular, "P-ROADS").await, 2);
    assert_eq!(usage(&service, LookupKind::Office, "O-DPWH").await, 1);

    let project = service.project(&ProjectId("proj-1".into())).await.unwrap().unwrap();
    assert!(!project.is_deleted);
    let kept = service.report(&ReportId("rep-keep".into())).await.unwrap().unwrap();
    assert!(!kept.is_deleted);
    // The independently trashed report stays in the trash.
    let gone = service.report(&ReportId("rep-gone".into())).await.unwrap().unwrap();
    assert!(gone.is_deleted);

    // Rollup reflects only the revived leaf.
    let allocation = service.allocation(&AllocationId("alloc-1".into())).await.unwrap().unwrap();
    assert_eq!(allocation.total_utilized, Decimal::from(10_000));
}

#[tokio::test]
async fn purge_decrements_counters_only_for_live_entities() {
    let service = setup().await;
    let actor = actor();

    for id in ["proj-1", "proj-2", "proj-3"] {
        service.create_project(&actor, new_project(id, None)).await.unwrap();
    }
    assert_eq!(usage(&service, LookupKind::Office, "O-DPWH").await, 3);

    service.trash_project(&actor, &ProjectId("proj-1".into())).await.unwrap();
    assert_eq!(usage(&service, LookupKind::Office, "O-DPWH").await, 2);

    service.purge_project(&actor, &ProjectId("proj-2".into())).await.unwrap();
    service.purge_project(&actor, &ProjectId("proj-3".into())).await.unwrap();
    assert_eq!(usage(&service, LookupKind::Office, "O-DPWH").await, 0);

    // proj-1 surrendered its reference at trash time; purging it now must
    // not decrement again.
    service.purge_project(&actor, &ProjectId("proj-1".into())).await.unwrap();
    assert_eq!(usage(&service, LookupKind::Office, "O-DPWH").await, 0);
    assert!(service.project(&ProjectId("proj-1".into())).await.unwrap().is_none());
}

#[tokio::test]
async fn bulk_trash_skips_bad_ids_and_shares_one_batch() {
    let service = setup().await;
    let actor = actor();

    service.create_project(&actor, new_project("proj-a", None)).await.unwrap();
    service.create_project(&actor, new_project("proj-c", None)).await.unwrap();

    let ids = vec![
        ProjectId("proj-a".into()),
        ProjectId("proj-missing".into()),
        ProjectId("proj-c".into()),
    ];
    let outcome = service.trash_projects(&actor, &ids).await.unwrap();
    assert_eq!(outcome.requested, 3);
    assert_eq!(outcome.succeeded, 2);
    assert_eq!(outcome.skipped, 1);

    let mut conn = service.pool().acquire().await.unwrap();
    let entries = activity::count_by_batch(&mut conn, &outcome.batch_id).await.unwrap();
    assert_eq!(entries, 2);
    drop(conn);

    assert!(service.project(&ProjectId("proj-a".into())).await.unwrap().unwrap().is_deleted);
    assert!(service.project(&ProjectId("proj-c".into())).await.unwrap().unwrap().is_deleted);
}

#[tokio::test]
async fn restoring_a_child_under_a_trashed_parent_skips_the_parent() {
    let service = setup().await;
    let actor = actor();

    service.create_allocation(&actor, new_allocation("alloc-1")).await.unwrap();
    service.create_project(&actor, new_project("proj-1", Some("alloc-1"))).await.unwrap();
    service.create_report(&actor, new_report("rep-1", "proj-1", 10_000)).await.unwrap();

    service.trash_allocation(&actor, &AllocationId("alloc-1".into())).await.unwrap();
    let trashed_alloc = service.allocation(&AllocationId("alloc-1".into())).await.unwrap().unwrap();

    service.restore_project(&actor, &ProjectId("proj-1".into())).await.unwrap();

    let project = service.project(&ProjectId("proj-1".into())).await.unwrap().unwrap();
    assert!(!project.is_deleted);
    assert_eq!(project.total_utilized, Decimal::from(10_000));
    let report = service.report(&ReportId("rep-1".into())).await.unwrap().unwrap();
    assert!(!report.is_deleted);

    // The parent stays trashed and untouched until its own restore.
    let allocation = service.allocation(&AllocationId("alloc-1".into())).await.unwrap().unwrap();
    assert!(allocation.is_deleted);
    assert_eq!(allocation.updated_at, trashed_alloc.updated_at);
}

#[tokio::test]
async fn double_trash_and_live_restore_are_rejected() {
    let service = setup().await;
    let actor = actor();

    service.create_project(&actor, new_project("proj-1", None)).await.unwrap();

    let error = service.restore_project(&actor, &ProjectId("proj-1".into())).await.unwrap_err();
    assert!(matches!(error, EngineError::Validation(_)));

    service.trash_project(&actor, &ProjectId("proj-1".into())).await.unwrap();
    let error = service.trash_project(&actor, &ProjectId("proj-1".into())).await.unwrap_err();
    assert!(matches!(error, EngineError::Validation(_)));

    // The failed second trash must not have decremented anything.
    assert_eq!(usage(&service, LookupKind::Office, "O-DPWH").await, 0);

    let error = service.trash_project(&actor, &ProjectId("proj-404".into())).await.unwrap_err();
    assert!(matches!(error, EngineError::NotFound { .. }));
}

#[tokio::test]
async fn fund_tree_cascades_without_counter_traffic() {
    let service = setup().await;
    let actor = actor();

    service
        .create_fund_record(
            &actor,
            NewFundRecord {
                id: FundRecordId("fund-1".into()),
                title: "Calamity Fund".to_string(),
                fund_source: "national".to_string(),
                year: 2026,
                total_allocated: Decimal::from(50_000),
                total_utilized: None,
                auto_calculate_utilized: true,
            },
        )
        .await
        .unwrap();
    service
        .create_fund_report(
            &actor,
            NewFundReport {
                id: FundReportId("frep-1".into()),
                fund_record_id: Some(FundRecordId("fund-1".into())),
                allocated_budget: Decimal::from(10_000),
                obligated_budget: Decimal::from(5_000),
                budget_utilized: Decimal::from(10_000),
                balance: Decimal::ZERO,
                status: NodeStatus::Ongoing,
                report_date: None,
            },
        )
        .await
        .unwrap();

    let record = service.fund_record(&FundRecordId("fund-1".into())).await.unwrap().unwrap();
    assert_eq!(record.total_utilized, Decimal::from(10_000));
    assert_eq!(record.utilization_rate, Decimal::from(20));

    service.trash_fund_record(&actor, &FundRecordId("fund-1".into())).await.unwrap();
    let report = service.fund_report(&FundReportId("frep-1".into())).await.unwrap().unwrap();
    assert!(report.is_deleted);

    service.restore_fund_record(&actor, &FundRecordId("fund-1".into())).await.unwrap();
    let report = service.fund_report(&FundReportId("frep-1".into())).await.unwrap().unwrap();
    assert!(!report.is_deleted);

    service.purge_fund_record(&actor, &FundRecordId("fund-1".into())).await.unwrap();
    assert!(service.fund_record(&FundRecordId("fund-1".into())).await.unwrap().is_none());
    assert!(service.fund_report(&FundReportId("frep-1".into())).await.unwrap().is_none());
}

#[tokio::test]
async fn activity_chain_verifies_after_a_lifecycle() {
    let service = setup().await;
    let actor = actor();

    service.create_project(&actor, new_project("proj-1", None)).await.unwrap();
    service
        .update_project(
            &actor,
            &ProjectId("proj-1".into()),
            ProjectUpdate { title: Some("Renamed".to_string()), ..Default::default() },
        )
        .await
        .unwrap();
    let receipt = service.trash_project(&actor, &ProjectId("proj-1".into())).await.unwrap();
    // Deletions are always flagged.
    assert!(receipt.flagged);

    let verification = service.verify_log(EntityKind::Project, "proj-1").await.unwrap();
    assert!(verification.valid);
    assert_eq!(verification.verified_entries, 3);
    assert!(verification.latest_hash.is_some());
}

#[tokio::test]
async fn reconcile_repairs_drifted_counters() {
    let service = setup().await;
    let actor = actor();

    service.create_project(&actor, new_project("proj-1", None)).await.unwrap();

    {
        let mut conn = service.pool().acquire().await.unwrap();
        lookups::set_usage(&mut conn, LookupKind::Office, "O-DPWH", 99, Utc::now())
            .await
            .unwrap();
    }

    let drifted = service.reconcile_usage_counts().await.unwrap();
    assert_eq!(drifted.len(), 1);
    assert_eq!(drifted[0].code, "O-DPWH");
    assert_eq!(drifted[0].cached, 99);
    assert_eq!(drifted[0].actual, 1);
    assert_eq!(usage(&service, LookupKind::Office, "O-DPWH").await, 1);

    // A clean second pass reports nothing.
    assert!(service.reconcile_usage_counts().await.unwrap().is_empty());
}

async fn seed_code(service: &BudgetService, kind: LookupKind, code: &str, name: &str) {
    let mut conn = service.pool().acquire().await.expect("acquire");
    let now = Utc::now();
    lookups::save(
        &mut conn,
        kind,
        &LookupEntry {
            code: code.to_string(),
            name: name.to_string(),
            active: true,
            usage_count: 0,
            created_at: now,
            updated_at: now,
        },
    )
    .await
    .expect("seed code");
}

#[tokio::test]
async fn code_reassignment_moves_each_counter_exactly_once() {
    let service = setup().await;
    let actor = actor();
    seed_code(&service, LookupKind::Particular, "P-BRIDGES", "Bridges").await;

    service.create_allocation(&actor, new_allocation("alloc-1")).await.unwrap();
    service.create_project(&actor, new_project("proj-1", Some("alloc-1"))).await.unwrap();
    // The allocation and the project both reference P-ROADS.
    assert_eq!(usage(&service, LookupKind::Particular, "P-ROADS").await, 2);
    assert_eq!(usage(&service, LookupKind::Office, "O-DPWH").await, 1);

    service
        .update_project(
            &actor,
            &ProjectId("proj-1".into()),
            ProjectUpdate { particular_code: Some("P-BRIDGES".to_string()), ..Default::default() },
        )
        .await
        .unwrap();
    assert_eq!(usage(&service, LookupKind::Particular, "P-ROADS").await, 1);
    assert_eq!(usage(&service, LookupKind::Particular, "P-BRIDGES").await, 1);
    // Codes the update left alone see no traffic.
    assert_eq!(usage(&service, LookupKind::Office, "O-DPWH").await, 1);
    assert_eq!(usage(&service, LookupKind::Category, "C-INFRA").await, 1);

    // Re-saving the same code moves nothing.
    service
        .update_project(
            &actor,
            &ProjectId("proj-1".into()),
            ProjectUpdate {
                particular_code: Some("P-BRIDGES".to_string()),
                title: Some("Renamed".to_string()),
                ..Default::default()
            },
        )
        .await
        .unwrap();
    assert_eq!(usage(&service, LookupKind::Particular, "P-BRIDGES").await, 1);
    assert_eq!(usage(&service, LookupKind::Particular, "P-ROADS").await, 1);
}

#[tokio::test]
async fn category_reassignment_batches_and_skips_ineligible_ids() {
    let service = setup().await;
    let actor = actor();
    seed_code(&service, LookupKind::Category, "C-TRANSPORT", "Transport").await;

    service.create_project(&actor, new_project("proj-a", None)).await.unwrap();
    service.create_project(&actor, new_project("proj-b", None)).await.unwrap();
    assert_eq!(usage(&service, LookupKind::Category, "C-INFRA").await, 2);

    let ids = vec![
        ProjectId("proj-a".into()),
        ProjectId("proj-missing".into()),
        ProjectId("proj-b".into()),
    ];
    let outcome = service.reassign_category(&actor, &ids, Some("C-TRANSPORT")).await.unwrap();
    assert_eq!(outcome.requested, 3);
    assert_eq!(outcome.succeeded, 2);
    assert_eq!(outcome.skipped, 1);
    assert_eq!(usage(&service, LookupKind::Category, "C-INFRA").await, 0);
    assert_eq!(usage(&service, LookupKind::Category, "C-TRANSPORT").await, 2);

    {
        let mut conn = service.pool().acquire().await.unwrap();
        let entries = activity::count_by_batch(&mut conn, &outcome.batch_id).await.unwrap();
        assert_eq!(entries, 2);
    }

    // Dropping the category entirely is a single decrement.
    let outcome =
        service.reassign_category(&actor, &[ProjectId("proj-a".into())], None).await.unwrap();
    assert_eq!(outcome.succeeded, 1);
    assert_eq!(usage(&service, LookupKind::Category, "C-TRANSPORT").await, 1);
    let project = service.project(&ProjectId("proj-a".into())).await.unwrap().unwrap();
    assert!(project.category_code.is_none());
}

#[tokio::test]
async fn bulk_restore_reclaims_references_and_skips_live_ids() {
    let service = setup().await;
    let actor = actor();

    for id in ["proj-a", "proj-b", "proj-c"] {
        service.create_project(&actor, new_project(id, None)).await.unwrap();
    }
    service.trash_project(&actor, &ProjectId("proj-a".into())).await.unwrap();
    service.trash_project(&actor, &ProjectId("proj-b".into())).await.unwrap();
    assert_eq!(usage(&service, LookupKind::Office, "O-DPWH").await, 1);

    let ids = vec![
        ProjectId("proj-a".into()),
        ProjectId("proj-b".into()),
        ProjectId("proj-c".into()),
    ];
    let outcome = service.restore_projects(&actor, &ids).await.unwrap();
    assert_eq!(outcome.requested, 3);
    assert_eq!(outcome.succeeded, 2);
    // proj-c is live; restoring it would double-count its references.
    assert_eq!(outcome.skipped, 1);
    assert_eq!(usage(&service, LookupKind::Office, "O-DPWH").await, 3);
    assert_eq!(usage(&service, LookupKind::Category, "C-INFRA").await, 3);

    let mut conn = service.pool().acquire().await.unwrap();
    let entries = activity::count_by_batch(&mut conn, &outcome.batch_id).await.unwrap();
    assert_eq!(entries, 2);
}

#[tokio::test]
async fn allocation_trash_sweeps_reports_revived_under_trashed_projects() {
    let service = setup().await;
    let actor = actor();

    service.create_allocation(&actor, new_allocation("alloc-1")).await.unwrap();
    service.create_project(&actor, new_project("proj-1", Some("alloc-1"))).await.unwrap();
    service.create_report(&actor, new_report("rep-1", "proj-1", 10_000)).await.unwrap();

    // A report brought back under a project that stays trashed.
    service.trash_project(&actor, &ProjectId("proj-1".into())).await.unwrap();
    service.restore_report(&actor, &ReportId("rep-1".into())).await.unwrap();

    service.trash_allocation(&actor, &AllocationId("alloc-1".into())).await.unwrap();
    let report = service.report(&ReportId("rep-1".into())).await.unwrap().unwrap();
    assert!(report.is_deleted, "the cascade marks every live descendant");

    service.restore_allocation(&actor, &AllocationId("alloc-1".into())).await.unwrap();
    let report = service.report(&ReportId("rep-1".into())).await.unwrap().unwrap();
    assert!(!report.is_deleted);
    // The independently trashed project keeps its earlier stamp and stays down.
    let project = service.project(&ProjectId("proj-1".into())).await.unwrap().unwrap();
    assert!(project.is_deleted);
    // Its references were surrendered once, at its own trash.
    assert_eq!(usage(&service, LookupKind::Office, "O-DPWH").await, 0);
    assert_eq!(usage(&service, LookupKind::Particular, "P-ROADS").await, 1);
}
