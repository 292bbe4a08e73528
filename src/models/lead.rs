use serde::{Deserialize, Serialize};

/// Per-lead engagement aggregates, maintained alongside the event log.
/// Counts are call-counts, not unique-visitor counts: mail-client prefetching
/// will inflate opens, and that is accepted behavior.
#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct LeadMetrics {
    pub lead_id: String,
    pub tenant_id: String,
    pub emails_sent: i64,
    pub emails_opened: i64,
    pub emails_clicked: i64,
    pub emails_replied: i64,
    pub first_opened_at: Option<i64>,
    pub first_clicked_at: Option<i64>,
    pub first_replied_at: Option<i64>,
    pub last_engagement_type: Option<String>,
    pub last_engagement_at: Option<i64>,
    pub sequence_status: String,
}
