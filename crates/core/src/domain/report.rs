use chrono::{DateTime, NaiveDate, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::domain::project::ProjectId;
use crate::domain::status::NodeStatus;
use crate::rollup::ChildSummary;

#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ReportId(pub String);

/// Dated progress/financial entry under one project (a "breakdown").
///
/// Leaf of the tree: the rollup engine reads its raw figures and never writes
/// them back.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Report {
    pub id: ReportId,
    pub project_id: Option<ProjectId>,
    pub allocated_budget: Decimal,
    pub obligated_budget: Decimal,
    pub budget_utilized: Decimal,
    pub balance: Decimal,
    pub status: NodeStatus,
    pub report_date: Option<NaiveDate>,
    pub region: Option<String>,
    pub province: Option<String>,
    pub city: Option<String>,
    pub is_deleted: bool,
    pub deleted_at: Option<DateTime<Utc>>,
    pub deleted_by: Option<String>,
    pub created_at: DateTime<Utc>,
    pub created_by: String,
    pub updated_at: DateTime<Utc>,
    pub updated_by: String,
}

impl Report {
    pub fn child_summary(&self) -> ChildSummary {
        ChildSummary {
            obligated: self.obligated_budget,
            utilized: self.budget_utilized,
            status: self.status,
        }
    }
}
