use serde::{Deserialize, Serialize};

/// Dedicated per-tenant daily rate-limit row, decoupled from other tenant
/// attributes so counter churn never contends with unrelated tenant writes.
#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct TenantSendLimit {
    pub tenant_id: String,
    pub daily_limit: i64,
    pub sent_today: i64,
    /// UTC date ("YYYY-MM-DD") the counter was last zeroed.
    pub last_reset_day: String,
    pub updated_at: i64,
}
