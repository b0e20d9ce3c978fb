use chrono::Utc;
use rust_decimal::Decimal;

use fiscus_core::domain::actor::Actor;
use fiscus_core::domain::allocation::AllocationId;
use fiscus_core::domain::lookup::{LookupEntry, LookupKind};
use fiscus_core::domain::project::ProjectId;
use fiscus_core::domain::report::ReportId;
use fiscus_core::domain::status::NodeStatus;
use fiscus_db::store::lookups;
use fiscus_db::{connect_with_settings, migrations};
use fiscus_engine::{
    AllocationUpdate, BudgetService, EngineError, NewAllocation, NewProject, NewReport,
    ProjectUpdate,
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

fn new_allocation(id: &str, allocated: i64) -> NewAllocation {
    NewAllocation {
        id: AllocationId(id.to_string()),
        particular_code: "P-ROADS".to_string(),
        fiscal_year: 2026,
        total_allocated: Decimal::from(allocated),
        total_utilized: None,
        auto_calculate_utilized: true,
    }
}

fn new_project(id: &str, allocation: Option<&str>, allocated: i64) -> NewProject {
    NewProject {
        id: ProjectId(id.to_string()),
        allocation_id: allocation.map(|a| AllocationId(a.to_string())),
        category_code: Some("C-INFRA".to_string()),
        office_code: "O-DPWH".to_string(),
        particular_code: "P-ROADS".to_string(),
        title: format!("Project {id}"),
        total_allocated: Decimal::from(allocated),
        total_utilized: None,
        auto_calculate_utilized: true,
    }
}

fn new_report(
    id: &str,
    project: &str,
    obligated: i64,
    utilized: i64,
    status: NodeStatus,
) -> NewReport {
    NewReport {
        id: ReportId(id.to_string()),
        project_id: Some(ProjectId(project.to_string())),
        allocated_budget: Decimal::from(obligated + utilized),
        obligated_budget: Decimal::from(obligated),
        budget_utilized: Decimal::from(utilized),
        balance: Decimal::ZERO,
        status,
        report_date: None,
        region: None,
        province: None,
        city: None,
    }
}

#[tokio::test]
async fn report_figures_roll_up_through_project_to_allocation() {
    let service = setup().await;
    let actor = actor();

    service.create_allocation(&actor, new_allocation("alloc-1", 100_000)).await.unwrap();
    service.create_project(&actor, new_project("proj-1", Some("alloc-1"), 100_000)).await.unwrap();
    service
        .create_report(&actor, new_report("rep-1", "proj-1", 10_000, 20_000, NodeStatus::Ongoing))
        .await
        .unwrap();
    let receipt = service
        .create_report(&actor, new_report("rep-2", "proj-1", 30_000, 30_000, NodeStatus::Ongoing))
        .await
        .unwrap();

    let summary = receipt.summary.expect("parent project summary");
    assert_eq!(summary.children_count, 2);
    assert_eq!(summary.total_utilized, Decimal::from(50_000));
    assert_eq!(summary.utilization_rate, Decimal::from(50));

    let project = service.project(&ProjectId("proj-1".into())).await.unwrap().unwrap();
    assert_eq!(project.total_obligated, Decimal::from(40_000));
    assert_eq!(project.total_utilized, Decimal::from(50_000));
    assert_eq!(project.utilization_rate, Decimal::from(50));

    let allocation = service.allocation(&AllocationId("alloc-1".into())).await.unwrap().unwrap();
    assert_eq!(allocation.total_obligated, Decimal::from(40_000));
    assert_eq!(allocation.total_utilized, Decimal::from(50_000));
    assert_eq!(allocation.utilization_rate, Decimal::from(50));
    assert_eq!(allocation.status, NodeStatus::Ongoing);
}

#[tokio::test]
async fn manual_utilized_overrides_the_sum_but_not_obligated() {
    let service = setup().await;
    let actor = actor();

    service.create_allocation(&actor, new_allocation("alloc-1", 100_000)).await.unwrap();
    service.create_project(&actor, new_project("proj-1", Some("alloc-1"), 100_000)).await.unwrap();
    service
        .create_report(&actor, new_report("rep-1", "proj-1", 15_000, 20_000, NodeStatus::Ongoing))
        .await
        .unwrap();
    service
        .create_report(&actor, new_report("rep-2", "proj-1", 25_000, 30_000, NodeStatus::Ongoing))
        .await
        .unwrap();

    service
        .update_project(
            &actor,
            &ProjectId("proj-1".into()),
            ProjectUpdate {
                auto_calculate_utilized: Some(false),
                total_utilized: Some(Decimal::from(70_000)),
                ..Default::default()
            },
        )
        .await
        .unwrap();

    let project = service.project(&ProjectId("proj-1".into())).await.unwrap().unwrap();
    assert_eq!(project.total_utilized, Decimal::from(70_000));
    assert_eq!(project.utilization_rate, Decimal::from(70));
    // Obligated never honors the manual override.
    assert_eq!(project.total_obligated, Decimal::from(40_000));
}

#[tokio::test]
async fn manual_utilized_write_is_rejected_while_auto_is_on() {
    let service = setup().await;
    let actor = actor();

    service.create_allocation(&actor, new_allocation("alloc-1", 100_000)).await.unwrap();
    let error = service
        .update_allocation(
            &actor,
            &AllocationId("alloc-1".into()),
            AllocationUpdate {
                total_utilized: Some(Decimal::from(10_000)),
                ..Default::default()
            },
        )
        .await
        .unwrap_err();
    assert!(matches!(error, EngineError::Validation(_)));
}

#[tokio::test]
async fn status_cascade_is_strict_priority() {
    let service = setup().await;
    let actor = actor();

    service.create_project(&actor, new_project("proj-1", None, 10_000)).await.unwrap();
    service
        .create_report(&actor, new_report("rep-1", "proj-1", 1_000, 1_000, NodeStatus::Completed))
        .await
        .unwrap();
    let project = service.project(&ProjectId("proj-1".into())).await.unwrap().unwrap();
    assert_eq!(project.status, NodeStatus::Completed);

    service
        .create_report(&actor, new_report("rep-2", "proj-1", 1_000, 1_000, NodeStatus::Delayed))
        .await
        .unwrap();
    let project = service.project(&ProjectId("proj-1".into())).await.unwrap().unwrap();
    assert_eq!(project.status, NodeStatus::Delayed);

    service
        .create_report(&actor, new_report("rep-3", "proj-1", 1_000, 1_000, NodeStatus::Ongoing))
        .await
        .unwrap();
    let project = service.project(&ProjectId("proj-1".into())).await.unwrap().unwrap();
    assert_eq!(project.status, NodeStatus::Ongoing);
}

#[tokio::test]
async fn childless_nodes_stay_ongoing() {
    let service = setup().await;
    let actor = actor();

    service.create_project(&actor, new_project("proj-1", None, 10_000)).await.unwrap();
    let summary = service.recalculate_project(&actor, &ProjectId("proj-1".into())).await.unwrap();
    assert_eq!(summary.children_count, 0);
    assert_eq!(summary.status, NodeStatus::Ongoing);
    assert_eq!(summary.total_obligated, Decimal::ZERO);
}

#[tokio::test]
async fn recalculation_is_idempotent() {
    let service = setup().await;
    let actor = actor();

    service.create_project(&actor, new_project("proj-1", None, 50_000)).await.unwrap();
    service
        .create_report(&actor, new_report("rep-1", "proj-1", 5_000, 10_000, NodeStatus::Ongoing))
        .await
        .unwrap();

    let first = service.recalculate_project(&actor, &ProjectId("proj-1".into())).await.unwrap();
    let second = service.recalculate_project(&actor, &ProjectId("proj-1".into())).await.unwrap();
    assert_eq!(first, second);
}

#[tokio::test]
async fn reparenting_recalculates_both_allocations() {
    let service = setup().await;
    let actor = actor();

    service.create_allocation(&actor, new_allocation("alloc-1", 100_000)).await.unwrap();
    service.create_allocation(&actor, new_allocation("alloc-2", 100_000)).await.unwrap();
    service.create_project(&actor, new_project("proj-1", Some("alloc-1"), 50_000)).await.unwrap();
    service
        .create_report(&actor, new_report("rep-1", "proj-1", 10_000, 20_000, NodeStatus::Ongoing))
        .await
        .unwrap();

    service
        .update_project(
            &actor,
            &ProjectId("proj-1".into()),
            ProjectUpdate {
                allocation_id: Some(Some(AllocationId("alloc-2".into()))),
                ..Default::default()
            },
        )
        .await
        .unwrap();

    let old_parent = service.allocation(&AllocationId("alloc-1".into())).await.unwrap().unwrap();
    assert_eq!(old_parent.total_obligated, Decimal::ZERO);
    assert_eq!(old_parent.total_utilized, Decimal::ZERO);

    let new_parent = service.allocation(&AllocationId("alloc-2".into())).await.unwrap().unwrap();
    assert_eq!(new_parent.total_obligated, Decimal::from(10_000));
    assert_eq!(new_parent.total_utilized, Decimal::from(20_000));
}

#[tokio::test]
async fn auto_toggle_recomputes_or_freezes_the_manual_figure() {
    let service = setup().await;
    let actor = actor();

    service.create_project(&actor, new_project("proj-1", None, 100_000)).await.unwrap();
    service
        .create_report(&actor, new_report("rep-1", "proj-1", 10_000, 40_000, NodeStatus::Ongoing))
        .await
        .unwrap();

    // Freeze: true -> false keeps the last computed figure as the manual one.
    service
        .update_project(
            &actor,
            &ProjectId("proj-1".into()),
            ProjectUpdate { auto_calculate_utilized: Some(false), ..Default::default() },
        )
        .await
        .unwrap();
    let project = service.project(&ProjectId("proj-1".into())).await.unwrap().unwrap();
    assert!(!project.auto_calculate_utilized);
    assert_eq!(project.total_utilized, Decimal::from(40_000));

    // More utilization arrives while frozen; the manual figure holds.
    service
        .create_report(&actor, new_report("rep-2", "proj-1", 5_000, 25_000, NodeStatus::Ongoing))
        .await
        .unwrap();
    let project = service.project(&ProjectId("proj-1".into())).await.unwrap().unwrap();
    assert_eq!(project.total_utilized, Decimal::from(40_000));
    assert_eq!(project.total_obligated, Decimal::from(15_000));

    // Unfreeze: false -> true recomputes immediately from the live children.
    service
        .update_project(
            &actor,
            &ProjectId("proj-1".into()),
            ProjectUpdate { auto_calculate_utilized: Some(true), ..Default::default() },
        )
        .await
        .unwrap();
    let project = service.project(&ProjectId("proj-1".into())).await.unwrap().unwrap();
    assert_eq!(project.total_utilized, Decimal::from(65_000));
    assert_eq!(project.utilization_rate, Decimal::from(65));
}

#[tokio::test]
async fn negative_amounts_are_rejected_at_the_edge() {
    let service = setup().await;
    let actor = actor();

    let mut payload = new_allocation("alloc-1", 100_000);
    payload.total_allocated = Decimal::from(-1);
    let error = service.create_allocation(&actor, payload).await.unwrap_err();
    assert_eq!(error.code(), "validation_error");
}

#[tokio::test]
async fn unknown_or_inactive_codes_are_rejected() {
    let service = setup().await;
    let actor = actor();

    let mut payload = new_allocation("alloc-1", 100_000);
    payload.particular_code = "P-MISSING".to_string();
    let error = service.create_allocation(&actor, payload).await.unwrap_err();
    assert!(matches!(error, EngineError::Validation(_)));
}
