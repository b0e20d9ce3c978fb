use serde::{Deserialize, Serialize};

/// Tri-state progress status shared by every node in both trees.
///
/// The ordering matters: when a parent derives its status from children the
/// cascade is strict priority (any `Ongoing` child wins, then any `Delayed`,
/// and only an all-`Completed` set completes the parent).
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NodeStatus {
    Ongoing,
    Delayed,
    Completed,
}

impl NodeStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Ongoing => "ongoing",
            Self::Delayed => "delayed",
            Self::Completed => "completed",
        }
    }

    /// Lenient decode for persisted rows: an unrecognized value falls back to
    /// `Ongoing`, the tree's default-optimistic state.
    pub fn parse(value: &str) -> Self {
        match value {
            "delayed" => Self::Delayed,
            "completed" => Self::Completed,
            _ => Self::Ongoing,
        }
    }

    /// Completed is terminal for flagging purposes: a transition into it is
    /// always surfaced by the activity recorder.
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Completed)
    }
}

impl Default for NodeStatus {
    fn default() -> Self {
        Self::Ongoing
    }
}
