use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::domain::allocation::AllocationId;
use crate::domain::status::NodeStatus;
use crate::rollup::{ChildSummary, UtilizedSource};

#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ProjectId(pub String);

/// Funded initiative under (at most) one allocation.
///
/// The middle tier of the 3-level tree: its derived fields roll up from its
/// report children, and it in turn contributes one [`ChildSummary`] to the
/// parent allocation's rollup.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Project {
    pub id: ProjectId,
    pub allocation_id: Option<AllocationId>,
    pub category_code: Option<String>,
    pub office_code: String,
    pub particular_code: String,
    pub title: String,
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

impl Project {
    pub fn utilized_source(&self) -> UtilizedSource {
        if self.auto_calculate_utilized {
            UtilizedSource::Computed
        } else {
            UtilizedSource::Manual(self.total_utilized)
        }
    }

    /// How this project is seen by its parent allocation's rollup.
    pub fn child_summary(&self) -> ChildSummary {
        ChildSummary {
            obligated: self.total_obligated,
            utilized: self.total_utilized,
            status: self.status,
        }
    }
}
