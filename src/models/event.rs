use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum EventType {
    Sent,
    Open,
    Click,
    Reply,
    Bounce,
}

impl EventType {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Sent => "SENT",
            Self::Open => "OPEN",
            Self::Click => "CLICK",
            Self::Reply => "REPLY",
            Self::Bounce => "BOUNCE",
        }
    }
}

/// Append-only engagement log entry. Immutable once created; every dashboard
/// aggregate is derived from these rows.
#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct EngagementEvent {
    pub id: String,
    pub lead_id: String,
    pub tenant_id: String,
    pub event_type: String,
    pub message_id: String,
    pub thread_id: Option<String>,
    pub sequence_number: Option<i64>,
    pub subject: String,
    pub url: Option<String>,
    pub user_agent: Option<String>,
    pub ip_address: Option<String>,
    pub device_type: String,
    pub reply_content: Option<String>,
    pub reply_snippet: Option<String>,
    pub metadata: String,
    pub created_at: i64,
}

/// Builder-ish payload for appending one event.
#[derive(Debug, Clone, Default)]
pub struct NewEngagementEvent {
    pub lead_id: String,
    pub tenant_id: String,
    pub event_type: &'static str,
    pub message_id: String,
    pub thread_id: Option<String>,
    pub sequence_number: Option<i64>,
    pub subject: String,
    pub url: Option<String>,
    pub user_agent: Option<String>,
    pub ip_address: Option<String>,
    pub device_type: String,
    pub reply_content: Option<String>,
    pub reply_snippet: Option<String>,
    pub metadata: serde_json::Value,
}

impl NewEngagementEvent {
    pub fn new(lead_id: &str, tenant_id: &str, event_type: EventType, message_id: &str) -> Self {
        Self {
            lead_id: lead_id.to_string(),
            tenant_id: tenant_id.to_string(),
            event_type: event_type.as_str(),
            message_id: message_id.to_string(),
            metadata: serde_json::json!({}),
            ..Default::default()
        }
    }
}
