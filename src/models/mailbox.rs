use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum IdentityStatus {
    #[default]
    Active,
    Expired,
    Revoked,
}

impl IdentityStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Active => "active",
            Self::Expired => "expired",
            Self::Revoked => "revoked",
        }
    }

    pub fn from_str(s: &str) -> Self {
        match s {
            "expired" => Self::Expired,
            "revoked" => Self::Revoked,
            _ => Self::Active,
        }
    }
}

/// One sending account owned by a tenant. (tenant_id, address) is unique.
///
/// `daily_send_count` is only ever touched by single atomic increments and the
/// daily reset sweep; multiple dispatcher replicas may hit the same row.
#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct MailboxIdentity {
    pub id: String,
    pub tenant_id: String,
    pub address: String,
    pub status: String,
    pub send_priority: i64,
    pub daily_send_count: i64,
    pub daily_send_limit: i64,
    /// Cursor for reply detection against the mail provider's history feed.
    pub last_history_id: Option<String>,
    pub last_used_at: Option<i64>,
    pub created_at: i64,
    pub updated_at: i64,
}

impl MailboxIdentity {
    pub fn status(&self) -> IdentityStatus {
        IdentityStatus::from_str(&self.status)
    }

    pub fn remaining_capacity(&self) -> i64 {
        (self.daily_send_limit - self.daily_send_count).max(0)
    }
}
