use std::collections::HashMap;

use base64::Engine;
use once_cell::sync::Lazy;
use rand::RngCore;
use regex::{Captures, Regex};
use sqlx::SqlitePool;
use tracing::{debug, info, warn};

use crate::config::Config;
use crate::db::now_epoch;
use crate::error::DispatchError;
use crate::models::{ClickTracking, EventType, NewEngagementEvent, TrackingPixel};
use crate::services::events;

/// Pixel rows are purged this long after creation.
const PIXEL_RETENTION_SECS: i64 = 30 * 86400;

/// 1x1 transparent PNG served for every pixel request, valid or not.
pub const TRANSPARENT_PIXEL: &[u8] = &[
    0x89, 0x50, 0x4e, 0x47, 0x0d, 0x0a, 0x1a, 0x0a, 0x00, 0x00, 0x00, 0x0d, 0x49, 0x48, 0x44,
    0x52, 0x00, 0x00, 0x00, 0x01, 0x00, 0x00, 0x00, 0x01, 0x08, 0x02, 0x00, 0x00, 0x00, 0x90,
    0x77, 0x53, 0xde, 0x00, 0x00, 0x00, 0x0c, 0x49, 0x44, 0x41, 0x54, 0x78, 0x9c, 0x63, 0x00,
    0x01, 0x00, 0x00, 0x05, 0x00, 0x01, 0x0d, 0x0a, 0x2d, 0xb4, 0x00, 0x00, 0x00, 0x00, 0x49,
    0x45, 0x4e, 0x44, 0xae, 0x42, 0x60, 0x82,
];

static HREF_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r#"(?i)(<a\b[^>]*?\bhref\s*=\s*")([^"]*)(")"#).unwrap());

/// Opaque URL-safe token with 32 bytes of entropy. Never reused: collisions
/// across 256-bit random tokens are not a practical concern.
pub fn generate_token() -> String {
    let mut bytes = [0u8; 32];
    rand::thread_rng().fill_bytes(&mut bytes);
    base64::engine::general_purpose::URL_SAFE_NO_PAD.encode(bytes)
}

/// Create an open-tracking pixel record and return its public URL.
pub async fn create_pixel(
    pool: &SqlitePool,
    config: &Config,
    lead_id: &str,
    tenant_id: &str,
    message_id: &str,
) -> Result<String, DispatchError> {
    let pixel_id = generate_token();
    let now = now_epoch();
    sqlx::query(
        r#"INSERT INTO tracking_pixels
           (pixel_id, lead_id, tenant_id, message_id, opened, open_count, created_at, expires_at)
           VALUES (?, ?, ?, ?, 0, 0, ?, ?)"#,
    )
    .bind(&pixel_id)
    .bind(lead_id)
    .bind(tenant_id)
    .bind(message_id)
    .bind(now)
    .bind(now + PIXEL_RETENTION_SECS)
    .execute(pool)
    .await?;

    debug!(lead=%lead_id, "created tracking pixel");
    Ok(format!(
        "{}/api/track/open/{}.png",
        config.tracking_base_url, pixel_id
    ))
}

/// Create a click-tracking record and return the redirect URL.
pub async fn create_click(
    pool: &SqlitePool,
    config: &Config,
    lead_id: &str,
    tenant_id: &str,
    message_id: &str,
    destination_url: &str,
) -> Result<String, DispatchError> {
    let click_id = generate_token();
    sqlx::query(
        r#"INSERT INTO click_tracking
           (click_id, lead_id, tenant_id, message_id, destination_url, click_count, created_at)
           VALUES (?, ?, ?, ?, ?, 0, ?)"#,
    )
    .bind(&click_id)
    .bind(lead_id)
    .bind(tenant_id)
    .bind(message_id)
    .bind(destination_url)
    .bind(now_epoch())
    .execute(pool)
    .await?;

    Ok(format!(
        "{}/api/track/click/{}",
        config.tracking_base_url, click_id
    ))
}

/// Record an open. Every call increments open_count and appends one OPEN
/// event; only the first call sets first_opened_at. Unknown pixels return
/// false with no writes and no error: pixels are fired by untrusted mail
/// clients and must never see a failure.
pub async fn record_open(
    pool: &SqlitePool,
    pixel_id: &str,
    user_agent: Option<&str>,
    ip_address: Option<&str>,
) -> Result<bool, DispatchError> {
    let pixel = sqlx::query_as::<_, TrackingPixel>(
        "SELECT * FROM tracking_pixels WHERE pixel_id = ?",
    )
    .bind(pixel_id)
    .fetch_optional(pool)
    .await?;

    let Some(pixel) = pixel else {
        warn!(pixel=%pixel_id, "tracking pixel not found");
        return Ok(false);
    };

    let now = now_epoch();
    sqlx::query(
        r#"UPDATE tracking_pixels
           SET opened = 1, open_count = open_count + 1,
               first_opened_at = COALESCE(first_opened_at, ?), last_opened_at = ?
           WHERE pixel_id = ?"#,
    )
    .bind(now)
    .bind(now)
    .bind(pixel_id)
    .execute(pool)
    .await?;

    let mut event = NewEngagementEvent::new(
        &pixel.lead_id,
        &pixel.tenant_id,
        EventType::Open,
        &pixel.message_id,
    );
    event.user_agent = user_agent.map(str::to_string);
    event.ip_address = ip_address.map(str::to_string);
    event.device_type = device_type(user_agent).to_string();
    events::append(pool, event).await?;
    events::record_lead_open(pool, &pixel.lead_id, &pixel.tenant_id, now).await?;

    info!(lead=%pixel.lead_id, "recorded email open");
    Ok(true)
}

/// Record a click and resolve the destination. Unknown ids fall back to "/"
/// with no writes, so a stale link degrades to the homepage instead of an
/// error page.
pub async fn record_click(
    pool: &SqlitePool,
    click_id: &str,
    user_agent: Option<&str>,
    ip_address: Option<&str>,
) -> Result<String, DispatchError> {
    let click = sqlx::query_as::<_, ClickTracking>(
        "SELECT * FROM click_tracking WHERE click_id = ?",
    )
    .bind(click_id)
    .fetch_optional(pool)
    .await?;

    let Some(click) = click else {
        warn!(click=%click_id, "click tracking not found");
        return Ok("/".to_string());
    };

    let now = now_epoch();
    sqlx::query(
        r#"UPDATE click_tracking
           SET click_count = click_count + 1,
               first_clicked_at = COALESCE(first_clicked_at, ?), last_clicked_at = ?
           WHERE click_id = ?"#,
    )
    .bind(now)
    .bind(now)
    .bind(click_id)
    .execute(pool)
    .await?;

    let mut event = NewEngagementEvent::new(
        &click.lead_id,
        &click.tenant_id,
        EventType::Click,
        &click.message_id,
    );
    event.url = Some(click.destination_url.clone());
    event.user_agent = user_agent.map(str::to_string);
    event.ip_address = ip_address.map(str::to_string);
    event.device_type = device_type(user_agent).to_string();
    events::append(pool, event).await?;
    events::record_lead_click(pool, &click.lead_id, &click.tenant_id, now).await?;

    info!(lead=%click.lead_id, url=%click.destination_url, "recorded email click");
    Ok(click.destination_url)
}

/// Rewrite every hyperlink target to a tracking redirect, except mailto:,
/// tel:, fragment-only and already-tracked links. Idempotent: running it on
/// its own output leaves previously rewritten links alone.
pub async fn replace_links_with_tracking(
    pool: &SqlitePool,
    config: &Config,
    html: &str,
    lead_id: &str,
    tenant_id: &str,
    message_id: &str,
) -> Result<(String, HashMap<String, String>), DispatchError> {
    let mut mapping: HashMap<String, String> = HashMap::new();

    // Collect targets first: the regex replacement closure cannot await.
    for caps in HREF_RE.captures_iter(html) {
        let url = &caps[2];
        if !should_track(url) || mapping.contains_key(url) {
            continue;
        }
        let tracking_url =
            create_click(pool, config, lead_id, tenant_id, message_id, url).await?;
        mapping.insert(url.to_string(), tracking_url);
    }

    let rewritten = HREF_RE.replace_all(html, |caps: &Captures| {
        let url = &caps[2];
        match mapping.get(url) {
            Some(tracked) => format!("{}{}{}", &caps[1], tracked, &caps[3]),
            None => caps[0].to_string(),
        }
    });

    info!(lead=%lead_id, links = mapping.len(), "rewrote links with tracking");
    Ok((rewritten.into_owned(), mapping))
}

/// Full tracking injection for an outgoing body: link rewrite plus the open
/// pixel appended at the end.
pub async fn add_tracking_to_email(
    pool: &SqlitePool,
    config: &Config,
    html: &str,
    lead_id: &str,
    tenant_id: &str,
    message_id: &str,
) -> Result<String, DispatchError> {
    let (mut body, _) =
        replace_links_with_tracking(pool, config, html, lead_id, tenant_id, message_id).await?;
    let pixel_url = create_pixel(pool, config, lead_id, tenant_id, message_id).await?;
    body.push_str(&format!(
        r#"<img src="{pixel_url}" width="1" height="1" style="display:none;" alt="" />"#
    ));
    Ok(body)
}

fn should_track(url: &str) -> bool {
    !(url.starts_with("mailto:")
        || url.starts_with("tel:")
        || url.starts_with('#')
        || url.is_empty()
        || url.contains("/track/click/"))
}

/// Best-effort device classification from the user agent. Substring matching
/// only; not authoritative.
pub fn device_type(user_agent: Option<&str>) -> &'static str {
    let Some(ua) = user_agent else {
        return "unknown";
    };
    let ua = ua.to_lowercase();
    if ["iphone", "android", "mobile"].iter().any(|d| ua.contains(d)) {
        "mobile"
    } else if ["ipad", "tablet"].iter().any(|d| ua.contains(d)) {
        "tablet"
    } else if ["windows", "mac", "linux"].iter().any(|d| ua.contains(d)) {
        "desktop"
    } else {
        "unknown"
    }
}

/// Retention sweep: drop pixels past their expiry.
pub async fn purge_expired_pixels(pool: &SqlitePool, now: i64) -> Result<u64, DispatchError> {
    let result = sqlx::query("DELETE FROM tracking_pixels WHERE expires_at IS NOT NULL AND expires_at < ?")
        .bind(now)
        .execute(pool)
        .await?;
    info!(deleted = result.rows_affected(), "purged expired tracking pixels");
    Ok(result.rows_affected())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn device_type_heuristics() {
        assert_eq!(device_type(Some("Mozilla/5.0 (iPhone; CPU iPhone OS)")), "mobile");
        assert_eq!(device_type(Some("Mozilla/5.0 (iPad; CPU OS 15_0)")), "tablet");
        assert_eq!(device_type(Some("Mozilla/5.0 (Windows NT 10.0)")), "desktop");
        assert_eq!(device_type(Some("curl/8.0")), "unknown");
        assert_eq!(device_type(None), "unknown");
    }

    #[test]
    fn token_is_urlsafe_and_long() {
        let token = generate_token();
        assert!(token.len() >= 43); // 32 bytes, unpadded base64
        assert!(token
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_'));
        assert_ne!(token, generate_token());
    }

    #[test]
    fn should_track_skips_special_schemes() {
        assert!(should_track("https://example.com/pricing"));
        assert!(!should_track("mailto:someone@example.com"));
        assert!(!should_track("tel:+15551234567"));
        assert!(!should_track("#section"));
        assert!(!should_track("https://track.example.com/api/track/click/abc"));
    }
}
