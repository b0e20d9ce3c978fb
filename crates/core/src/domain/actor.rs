use serde::{Deserialize, Serialize};

/// Snapshot of the authenticated user performing a mutation.
///
/// Resolution (session, token, role lookup) happens outside this engine; every
/// mutation receives the already-resolved actor and copies these fields into
/// the activity record so the log stays meaningful even after the account
/// changes or disappears.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Actor {
    pub id: String,
    pub name: String,
    pub role: String,
    pub department: String,
}

impl Actor {
    pub fn new(
        id: impl Into<String>,
        name: impl Into<String>,
        role: impl Into<String>,
        department: impl Into<String>,
    ) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            role: role.into(),
            department: department.into(),
        }
    }
}
