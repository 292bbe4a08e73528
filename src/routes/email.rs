use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::Json;
use chrono::{DateTime, TimeZone, Utc};
use serde::Deserialize;
use tracing::error;

use crate::models::NewSendJob;
use crate::services::send_queue;

use super::{ApiKey, AppState};

#[derive(Debug, Deserialize)]
pub struct SendEmailRequest {
    pub lead_id: String,
    pub tenant_id: String,
    pub recipient_email: String,
    pub subject: String,
    pub body: String,
    #[serde(default)]
    pub cta: String,
    pub sequence_number: i64,
    #[serde(default)]
    pub send_delay_days: i64,
    /// RFC3339; defaults to now + send_delay_days when omitted.
    pub scheduled_for: Option<String>,
}

/// Queue an email for sending. The dispatcher picks it up within one cycle.
pub async fn send_email(
    State(state): State<AppState>,
    _auth: ApiKey,
    Json(req): Json<SendEmailRequest>,
) -> impl IntoResponse {
    if let Err(msg) = validate(&req) {
        return (
            StatusCode::BAD_REQUEST,
            Json(serde_json::json!({"error": "Invalid request data", "details": msg})),
        );
    }

    let scheduled_for = match req.scheduled_for.as_deref() {
        Some(ts) => match DateTime::parse_from_rfc3339(ts) {
            Ok(dt) => Some(dt.timestamp()),
            Err(_) => {
                return (
                    StatusCode::BAD_REQUEST,
                    Json(serde_json::json!({
                        "error": "Invalid request data",
                        "details": "scheduled_for must be RFC3339"
                    })),
                )
            }
        },
        None => None,
    };

    let job = NewSendJob {
        lead_id: req.lead_id,
        tenant_id: req.tenant_id,
        recipient_email: req.recipient_email,
        subject: req.subject,
        body: req.body,
        cta: req.cta,
        sequence_number: req.sequence_number,
        send_delay_days: req.send_delay_days,
        scheduled_for,
    };

    match send_queue::enqueue(&state.pool, job).await {
        Ok(queued) => (
            StatusCode::CREATED,
            Json(serde_json::json!({
                "success": true,
                "queue_id": queued.id,
                "scheduled_for": rfc3339(queued.scheduled_for),
                "message": "Email queued successfully"
            })),
        ),
        Err(e) => {
            error!(error=%e, "failed to queue email");
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(serde_json::json!({"error": "Failed to queue email"})),
            )
        }
    }
}

/// Cancel a queued email. Only PENDING jobs can be cancelled.
pub async fn cancel_email(
    State(state): State<AppState>,
    _auth: ApiKey,
    Path(queue_id): Path<String>,
) -> impl IntoResponse {
    match send_queue::cancel(&state.pool, &queue_id).await {
        Ok(true) => (
            StatusCode::OK,
            Json(serde_json::json!({"success": true, "queue_id": queue_id})),
        ),
        Ok(false) => (
            StatusCode::CONFLICT,
            Json(serde_json::json!({
                "success": false,
                "error": "Job is not PENDING (already sent, failed, or cancelled)"
            })),
        ),
        Err(e) => {
            error!(error=%e, "failed to cancel email");
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(serde_json::json!({"error": "Failed to cancel email"})),
            )
        }
    }
}

fn validate(req: &SendEmailRequest) -> Result<(), &'static str> {
    if req.recipient_email.trim().is_empty() || !req.recipient_email.contains('@') {
        return Err("recipient_email must be a valid address");
    }
    if !(1..=4).contains(&req.sequence_number) {
        return Err("sequence_number must be between 1 and 4");
    }
    if req.send_delay_days < 0 {
        return Err("send_delay_days must not be negative");
    }
    if req.subject.is_empty() {
        return Err("subject must not be empty");
    }
    Ok(())
}

fn rfc3339(epoch: i64) -> String {
    Utc.timestamp_opt(epoch, 0)
        .single()
        .map(|dt| dt.to_rfc3339())
        .unwrap_or_default()
}
