use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AssignmentStatus {
    Active,
    Inactive,
}

impl AssignmentStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Active => "active",
            Self::Inactive => "inactive",
        }
    }
}

/// Sticky binding of a lead to a sending mailbox.
///
/// At most one active row per (lead_id, tenant_id), enforced by a partial
/// unique index. Superseded rows are kept as inactive history.
#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct LeadMailboxAssignment {
    pub id: String,
    pub lead_id: String,
    pub tenant_id: String,
    pub assigned_email: String,
    pub email_count: i64,
    pub status: String,
    pub assigned_at: i64,
    pub last_used_at: i64,
    pub created_at: i64,
    pub updated_at: i64,
}
