use serde::{Deserialize, Serialize};

/// On-disk identity record, version 1.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct IdentityRecord {
    pub version: u32,
    pub user_id: String,
    pub created_at: String,
}

impl IdentityRecord {
    #[must_use]
    pub fn v1(user_id: impl Into<String>, created_at: impl Into<String>) -> Self {
        Self {
            version: 1,
            user_id: user_id.into(),
            created_at: created_at.into(),
        }
    }
}
