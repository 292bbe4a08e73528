use serde::{Deserialize, Serialize};

/// Send queue job states.
///
/// Transitions are monotonic: PENDING -> SENDING -> {SENT | PENDING (retry) | FAILED},
/// plus PENDING -> CANCELLED from the producer side. SENT/FAILED/CANCELLED are terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum JobStatus {
    Pending,
    Sending,
    Sent,
    Failed,
    Cancelled,
}

impl JobStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "PENDING",
            Self::Sending => "SENDING",
            Self::Sent => "SENT",
            Self::Failed => "FAILED",
            Self::Cancelled => "CANCELLED",
        }
    }

    pub fn from_str(s: &str) -> Self {
        match s {
            "SENDING" => Self::Sending,
            "SENT" => Self::Sent,
            "FAILED" => Self::Failed,
            "CANCELLED" => Self::Cancelled,
            _ => Self::Pending,
        }
    }
}

/// One outbound email instance. Rows are never deleted (audit trail); only the
/// dispatcher mutates them after enqueue.
#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct SendJob {
    pub id: String,
    pub lead_id: String,
    pub tenant_id: String,
    pub recipient_email: String,
    pub subject: String,
    pub body: String,
    pub cta: String,
    pub sequence_number: i64,
    pub send_delay_days: i64,
    pub scheduled_for: i64,
    pub status: String,
    pub attempts: i64,
    pub max_attempts: i64,
    pub last_error: Option<String>,
    pub failed_at: Option<i64>,
    pub message_id: Option<String>,
    pub sent_at: Option<i64>,
    pub sent_from_email: Option<String>,
    pub claimed_at: Option<i64>,
    pub created_at: i64,
    pub updated_at: i64,
}

impl SendJob {
    pub fn status(&self) -> JobStatus {
        JobStatus::from_str(&self.status)
    }
}

/// Enqueue payload from the producer interface, already validated by the
/// HTTP layer. `scheduled_for` is epoch seconds; when absent, enqueue
/// computes now + send_delay_days.
#[derive(Debug, Clone)]
pub struct NewSendJob {
    pub lead_id: String,
    pub tenant_id: String,
    pub recipient_email: String,
    pub subject: String,
    pub body: String,
    pub cta: String,
    pub sequence_number: i64,
    pub send_delay_days: i64,
    pub scheduled_for: Option<i64>,
}
