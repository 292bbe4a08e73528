use sqlx::SqlitePool;
use uuid::Uuid;

use crate::db::now_epoch;
use crate::error::DispatchError;
use crate::models::NewEngagementEvent;

/// Append one engagement event. The log is append-only; nothing in this
/// service (or anywhere else) updates or deletes rows once written.
pub async fn append(pool: &SqlitePool, event: NewEngagementEvent) -> Result<String, DispatchError> {
    let id = Uuid::new_v4().to_string();
    sqlx::query(
        r#"INSERT INTO engagement_events
           (id, lead_id, tenant_id, event_type, message_id, thread_id, sequence_number,
            subject, url, user_agent, ip_address, device_type, reply_content, reply_snippet,
            metadata, created_at)
           VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)"#,
    )
    .bind(&id)
    .bind(&event.lead_id)
    .bind(&event.tenant_id)
    .bind(event.event_type)
    .bind(&event.message_id)
    .bind(&event.thread_id)
    .bind(event.sequence_number)
    .bind(&event.subject)
    .bind(&event.url)
    .bind(&event.user_agent)
    .bind(&event.ip_address)
    .bind(&event.device_type)
    .bind(&event.reply_content)
    .bind(&event.reply_snippet)
    .bind(event.metadata.to_string())
    .bind(now_epoch())
    .execute(pool)
    .await?;
    Ok(id)
}

/// Find the lead behind a SENT event in the given thread. Used by reply
/// detection to tie an inbound message back to our outreach.
pub async fn find_sent_lead_for_thread(
    pool: &SqlitePool,
    tenant_id: &str,
    thread_id: &str,
) -> Result<Option<(String, String)>, DispatchError> {
    let row: Option<(String, String)> = sqlx::query_as(
        r#"SELECT lead_id, message_id FROM engagement_events
           WHERE tenant_id = ? AND thread_id = ? AND event_type = 'SENT'
           LIMIT 1"#,
    )
    .bind(tenant_id)
    .bind(thread_id)
    .fetch_optional(pool)
    .await?;
    Ok(row)
}

// Lead aggregate counters. Each is a single atomic UPDATE after an upsert of
// the metrics row; COALESCE keeps the first_* timestamps write-once.

pub async fn record_lead_sent(
    pool: &SqlitePool,
    lead_id: &str,
    tenant_id: &str,
    now: i64,
) -> Result<(), DispatchError> {
    ensure_metrics_row(pool, lead_id, tenant_id).await?;
    sqlx::query(
        r#"UPDATE lead_metrics
           SET emails_sent = emails_sent + 1,
               last_engagement_type = 'SENT', last_engagement_at = ?
           WHERE lead_id = ?"#,
    )
    .bind(now)
    .bind(lead_id)
    .execute(pool)
    .await?;
    Ok(())
}

pub async fn record_lead_open(
    pool: &SqlitePool,
    lead_id: &str,
    tenant_id: &str,
    now: i64,
) -> Result<(), DispatchError> {
    ensure_metrics_row(pool, lead_id, tenant_id).await?;
    sqlx::query(
        r#"UPDATE lead_metrics
           SET emails_opened = emails_opened + 1,
               first_opened_at = COALESCE(first_opened_at, ?),
               last_engagement_type = 'OPEN', last_engagement_at = ?
           WHERE lead_id = ?"#,
    )
    .bind(now)
    .bind(now)
    .bind(lead_id)
    .execute(pool)
    .await?;
    Ok(())
}

pub async fn record_lead_click(
    pool: &SqlitePool,
    lead_id: &str,
    tenant_id: &str,
    now: i64,
) -> Result<(), DispatchError> {
    ensure_metrics_row(pool, lead_id, tenant_id).await?;
    sqlx::query(
        r#"UPDATE lead_metrics
           SET emails_clicked = emails_clicked + 1,
               first_clicked_at = COALESCE(first_clicked_at, ?),
               last_engagement_type = 'CLICK', last_engagement_at = ?
           WHERE lead_id = ?"#,
    )
    .bind(now)
    .bind(now)
    .bind(lead_id)
    .execute(pool)
    .await?;
    Ok(())
}

/// A reply also parks the lead's sequence: no further touches are useful once
/// the prospect has answered.
pub async fn record_lead_reply(
    pool: &SqlitePool,
    lead_id: &str,
    tenant_id: &str,
    now: i64,
) -> Result<(), DispatchError> {
    ensure_metrics_row(pool, lead_id, tenant_id).await?;
    sqlx::query(
        r#"UPDATE lead_metrics
           SET emails_replied = emails_replied + 1,
               first_replied_at = COALESCE(first_replied_at, ?),
               last_engagement_type = 'REPLY', last_engagement_at = ?,
               sequence_status = 'REPLIED'
           WHERE lead_id = ?"#,
    )
    .bind(now)
    .bind(now)
    .bind(lead_id)
    .execute(pool)
    .await?;
    Ok(())
}

async fn ensure_metrics_row(
    pool: &SqlitePool,
    lead_id: &str,
    tenant_id: &str,
) -> Result<(), DispatchError> {
    sqlx::query(
        r#"INSERT INTO lead_metrics (lead_id, tenant_id) VALUES (?, ?)
           ON CONFLICT(lead_id) DO NOTHING"#,
    )
    .bind(lead_id)
    .bind(tenant_id)
    .execute(pool)
    .await?;
    Ok(())
}
