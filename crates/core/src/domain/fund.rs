use chrono::{DateTime, NaiveDate, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::domain::status::NodeStatus;
use crate::rollup::{ChildSummary, UtilizedSource};

#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct FundRecordId(pub String);

#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct FundReportId(pub String);

/// Root of the separately tracked 2-level fund tree. Same derived-field shape
/// and rollup rules as [`crate::domain::allocation::Allocation`], but its
/// reports attach directly (no project tier) and it references no lookup
/// codes, so cascades on it never touch usage counters.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct FundRecord {
    pub id: FundRecordId,
    pub title: String,
    pub fund_source: String,
    pub year: i32,
    pub total_allocated: Decimal,
    pub total_obligated: Decimal,
    pub total_utilized: Decimal,
    pub utilization_rate: Decimal,
    pub status: NodeStatus,
    pub auto_calculate_utilized: bool,
    pub is_deleted: bool,
    pub deleted_at: Option<DateTime<Utc>>,
    pub deleted_by: Option<String>,
    pub created_at: DateTime<Utc>,
    pub created_by: String,
    pub updated_at: DateTime<Utc>,
    pub updated_by: String,
}

impl FundRecord {
    pub fn utilized_source(&self) -> UtilizedSource {
        if self.auto_calculate_utilized {
            UtilizedSource::Computed
        } else {
            UtilizedSource::Manual(self.total_utilized)
        }
    }
}

/// Leaf of the fund tree.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct FundReport {
    pub id: FundReportId,
    pub fund_record_id: Option<FundRecordId>,
    pub allocated_budget: Decimal,
    pub obligated_budget: Decimal,
    pub budget_utilized: Decimal,
    pub balance: Decimal,
    pub status: NodeStatus,
    pub report_date: Option<NaiveDate>,
    pub is_deleted: bool,
    pub deleted_at: Option<DateTime<Utc>>,
    pub deleted_by: Option<String>,
    pub created_at: DateTime<Utc>,
    pub created_by: String,
    pub updated_at: DateTime<Utc>,
    pub updated_by: String,
}

impl FundReport {
    pub fn child_summary(&self) -> ChildSummary {
        ChildSummary {
            obligated: self.obligated_budget,
            utilized: self.budget_utilized,
            status: self.status,
        }
    }
}
