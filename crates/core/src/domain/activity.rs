use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::domain::actor::Actor;
use crate::domain::EntityKind;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ActivityAction {
    Created,
    Updated,
    Trashed,
    Restored,
    Purged,
    CategoryReassigned,
}

impl ActivityAction {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Created => "created",
            Self::Updated => "updated",
            Self::Trashed => "trashed",
            Self::Restored => "restored",
            Self::Purged => "purged",
            Self::CategoryReassigned => "category_reassigned",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "created" => Some(Self::Created),
            "updated" => Some(Self::Updated),
            "trashed" => Some(Self::Trashed),
            "restored" => Some(Self::Restored),
            "purged" => Some(Self::Purged),
            "category_reassigned" => Some(Self::CategoryReassigned),
            _ => None,
        }
    }

    /// Trash and purge are deletions; every deletion is flagged.
    pub fn is_deletion(&self) -> bool {
        matches!(self, Self::Trashed | Self::Purged)
    }
}

/// Coarse change booleans surfaced beside the exact field list so consumers
/// can filter without re-diffing snapshots.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChangeSummary {
    pub budget_changed: bool,
    pub status_changed: bool,
    pub date_changed: bool,
    pub location_changed: bool,
}

/// One immutable audit entry. Appended once per mutation (bulk operations
/// append one per affected entity under a shared `batch_id`), never updated
/// or deleted. `prev_hash`/`entry_hash` chain entries per entity so tampering
/// with historical rows is detectable.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ActivityRecord {
    pub id: String,
    pub actor: Actor,
    pub action: ActivityAction,
    pub entity_kind: EntityKind,
    pub entity_id: String,
    pub batch_id: Option<String>,
    pub before: Option<Value>,
    pub after: Option<Value>,
    pub changed_fields: Vec<String>,
    pub summary: ChangeSummary,
    pub flagged: bool,
    pub flag_reasons: Vec<String>,
    pub prev_hash: Option<String>,
    pub entry_hash: String,
    pub recorded_at: DateTime<Utc>,
}
