use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::domain::status::NodeStatus;
use crate::rollup::UtilizedSource;

#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct AllocationId(pub String);

/// Top-level budget line item for one fiscal year.
///
/// `total_obligated`, `utilization_rate`, and `status` are exclusively owned
/// by the rollup engine. `total_utilized` is engine-owned while
/// `auto_calculate_utilized` is on and editor-owned while it is off.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Allocation {
    pub id: AllocationId,
    pub particular_code: String,
    pub fiscal_year: i32,
    pub total_allocated: Decimal,
    pub total_obligated: Decimal,
    pub total_utilized: Decimal,
    pub utilization_rate: Decimal,
    pub status: NodeStatus,
    pub auto_calculate_utilized: bool,
    pub is_pinned: bool,
    pub is_deleted: bool,
    pub deleted_at: Option<DateTime<Utc>>,
    pub deleted_by: Option<String>,
    pub created_at: DateTime<Utc>,
    pub created_by: String,
    pub updated_at: DateTime<Utc>,
    pub updated_by: String,
}

impl Allocation {
    /// The computation strategy the rollup calculator must use for this node.
    pub fn utilized_source(&self) -> UtilizedSource {
        if self.auto_calculate_utilized {
            UtilizedSource::Computed
        } else {
            UtilizedSource::Manual(self.total_utilized)
        }
    }
}
