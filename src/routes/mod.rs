pub mod email;
pub mod tracking;

use std::sync::Arc;

use axum::extract::FromRef;
use axum::http::request::Parts;
use axum::http::StatusCode;
use axum::routing::{get, post};
use axum::{async_trait, extract::FromRequestParts, Json, Router};
use sqlx::SqlitePool;

use crate::config::Config;

#[derive(Clone)]
pub struct AppState {
    pub pool: SqlitePool,
    pub config: Arc<Config>,
}

impl FromRef<AppState> for SqlitePool {
    fn from_ref(state: &AppState) -> Self {
        state.pool.clone()
    }
}

impl FromRef<AppState> for Arc<Config> {
    fn from_ref(state: &AppState) -> Self {
        state.config.clone()
    }
}

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/api/email/send", post(email::send_email))
        .route("/api/email/cancel/:queue_id", post(email::cancel_email))
        .route("/api/track/open/:pixel_id", get(tracking::track_open))
        .route("/api/track/click/:click_id", get(tracking::track_click))
        .route("/api/track/reply", post(tracking::track_reply))
        .with_state(state)
}

async fn health(
    axum::extract::State(state): axum::extract::State<AppState>,
) -> impl axum::response::IntoResponse {
    match sqlx::query("SELECT 1").execute(&state.pool).await {
        Ok(_) => (
            StatusCode::OK,
            Json(serde_json::json!({"status": "ok", "database": "up"})),
        ),
        Err(e) => (
            StatusCode::SERVICE_UNAVAILABLE,
            Json(serde_json::json!({"status": "degraded", "database": e.to_string()})),
        ),
    }
}

/// Bearer API key guard for producer-facing endpoints. Tracking endpoints are
/// deliberately unauthenticated: they are hit by arbitrary mail clients.
pub struct ApiKey;

#[async_trait]
impl FromRequestParts<AppState> for ApiKey {
    type Rejection = (StatusCode, Json<serde_json::Value>);

    async fn from_request_parts(
        parts: &mut Parts,
        state: &AppState,
    ) -> Result<Self, Self::Rejection> {
        let header = parts
            .headers
            .get("Authorization")
            .and_then(|v| v.to_str().ok())
            .unwrap_or_default();

        match header.strip_prefix("Bearer ") {
            Some(key) if key == state.config.api_key => Ok(ApiKey),
            Some(_) => Err(unauthorized("Invalid API key")),
            None => Err(unauthorized(
                "Missing or malformed Authorization header. Expected: Bearer <API_KEY>",
            )),
        }
    }
}

fn unauthorized(msg: &str) -> (StatusCode, Json<serde_json::Value>) {
    (
        StatusCode::UNAUTHORIZED,
        Json(serde_json::json!({"error": msg})),
    )
}

/// Client IP for tracking events, honoring proxies.
pub struct ClientIp(pub Option<String>);

#[async_trait]
impl FromRequestParts<AppState> for ClientIp {
    type Rejection = std::convert::Infallible;

    async fn from_request_parts(
        parts: &mut Parts,
        _state: &AppState,
    ) -> Result<Self, Self::Rejection> {
        let ip = parts
            .headers
            .get("x-forwarded-for")
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.split(',').next())
            .map(|v| v.trim().to_string());
        Ok(ClientIp(ip))
    }
}
