use axum::extract::{Path, State};
use axum::http::{header, HeaderMap, StatusCode};
use axum::response::IntoResponse;
use axum::Json;
use serde::Deserialize;
use tracing::error;

use crate::services::{replies, tracking};

use super::{ApiKey, AppState, ClientIp};

/// Open-tracking pixel. Always answers 200 with the transparent PNG, whatever
/// happened: these requests come from untrusted mail clients and a broken
/// image or error status would leak tracking internals into the inbox.
pub async fn track_open(
    State(state): State<AppState>,
    ClientIp(ip): ClientIp,
    headers: HeaderMap,
    Path(pixel_id): Path<String>,
) -> impl IntoResponse {
    let pixel_id = pixel_id.trim_end_matches(".png");
    let user_agent = header_str(&headers, header::USER_AGENT);

    if let Err(e) =
        tracking::record_open(&state.pool, pixel_id, user_agent.as_deref(), ip.as_deref()).await
    {
        error!(error=%e, "failed to record open");
    }

    (
        StatusCode::OK,
        [
            (header::CONTENT_TYPE, "image/png"),
            (header::CACHE_CONTROL, "no-cache, no-store, must-revalidate"),
            (header::PRAGMA, "no-cache"),
            (header::EXPIRES, "0"),
        ],
        tracking::TRANSPARENT_PIXEL,
    )
}

/// Click redirect. Unknown or stale ids send the visitor to "/" rather than
/// an error page.
pub async fn track_click(
    State(state): State<AppState>,
    ClientIp(ip): ClientIp,
    headers: HeaderMap,
    Path(click_id): Path<String>,
) -> impl IntoResponse {
    let user_agent = header_str(&headers, header::USER_AGENT);

    let destination =
        match tracking::record_click(&state.pool, &click_id, user_agent.as_deref(), ip.as_deref())
            .await
        {
            Ok(url) => url,
            Err(e) => {
                error!(error=%e, "failed to record click");
                "/".to_string()
            }
        };

    (StatusCode::FOUND, [(header::LOCATION, destination)])
}

#[derive(Debug, Deserialize)]
pub struct ReplyRequest {
    pub lead_id: String,
    pub tenant_id: String,
    pub message_id: String,
    pub thread_id: Option<String>,
    pub reply_content: String,
    #[serde(default)]
    pub reply_snippet: String,
}

/// Direct reply-ingestion path for the external reply-detection process.
pub async fn track_reply(
    State(state): State<AppState>,
    _auth: ApiKey,
    Json(req): Json<ReplyRequest>,
) -> impl IntoResponse {
    let snippet = if req.reply_snippet.is_empty() {
        &req.reply_content
    } else {
        &req.reply_snippet
    };

    match replies::record_reply(
        &state.pool,
        &req.lead_id,
        &req.tenant_id,
        &req.message_id,
        req.thread_id.as_deref(),
        &req.reply_content,
        snippet,
    )
    .await
    {
        Ok(()) => (
            StatusCode::CREATED,
            Json(serde_json::json!({"success": true})),
        ),
        Err(e) => {
            error!(error=%e, "failed to record reply");
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(serde_json::json!({"error": "Failed to record reply"})),
            )
        }
    }
}

fn header_str(headers: &HeaderMap, name: header::HeaderName) -> Option<String> {
    headers
        .get(name)
        .and_then(|v| v.to_str().ok())
        .map(str::to_string)
}
