use serde::{Deserialize, Serialize};

/// Open-tracking token. `pixel_id` is an opaque, unguessable URL-safe token
/// handed to untrusted mail clients; rows are purged after the retention window.
#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct TrackingPixel {
    pub pixel_id: String,
    pub lead_id: String,
    pub tenant_id: String,
    pub message_id: String,
    pub opened: bool,
    pub open_count: i64,
    pub first_opened_at: Option<i64>,
    pub last_opened_at: Option<i64>,
    pub created_at: i64,
    pub expires_at: Option<i64>,
}

/// Click-tracking token mapping to a destination URL.
#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct ClickTracking {
    pub click_id: String,
    pub lead_id: String,
    pub tenant_id: String,
    pub message_id: String,
    pub destination_url: String,
    pub click_count: i64,
    pub first_clicked_at: Option<i64>,
    pub last_clicked_at: Option<i64>,
    pub created_at: i64,
}
