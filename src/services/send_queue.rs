use chrono::{Duration, Utc};
use sqlx::SqlitePool;
use tracing::{info, warn};
use uuid::Uuid;

use crate::db::now_epoch;
use crate::error::DispatchError;
use crate::models::{NewSendJob, SendJob};

/// Fixed retry delay. Intentionally not exponential: at this volume a flat
/// 5 minutes avoids long silent gaps after a couple of transient failures.
pub const RETRY_DELAY_SECS: i64 = 300;

/// Queue an email for sending. `scheduled_for` defaults to now + send_delay_days.
pub async fn enqueue(pool: &SqlitePool, job: NewSendJob) -> Result<SendJob, DispatchError> {
    let now = now_epoch();
    let scheduled_for = match job.scheduled_for {
        Some(ts) => ts,
        None => (Utc::now() + Duration::days(job.send_delay_days)).timestamp(),
    };

    let id = Uuid::new_v4().to_string();
    sqlx::query(
        r#"INSERT INTO send_queue
           (id, lead_id, tenant_id, recipient_email, subject, body, cta,
            sequence_number, send_delay_days, scheduled_for, status, created_at, updated_at)
           VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, 'PENDING', ?, ?)"#,
    )
    .bind(&id)
    .bind(&job.lead_id)
    .bind(&job.tenant_id)
    .bind(&job.recipient_email)
    .bind(&job.subject)
    .bind(&job.body)
    .bind(&job.cta)
    .bind(job.sequence_number)
    .bind(job.send_delay_days)
    .bind(scheduled_for)
    .bind(now)
    .bind(now)
    .execute(pool)
    .await?;

    info!(queue_id=%id, lead=%job.lead_id, scheduled_for, "email queued");
    get_job(pool, &id)
        .await?
        .ok_or(DispatchError::NotFound("send job"))
}

pub async fn get_job(pool: &SqlitePool, id: &str) -> Result<Option<SendJob>, DispatchError> {
    let row = sqlx::query_as::<_, SendJob>("SELECT * FROM send_queue WHERE id = ?")
        .bind(id)
        .fetch_optional(pool)
        .await?;
    Ok(row)
}

/// Cancel a queued email. Only PENDING rows can be cancelled; a job already
/// claimed by a dispatcher finishes its current attempt.
pub async fn cancel(pool: &SqlitePool, id: &str) -> Result<bool, DispatchError> {
    let result = sqlx::query(
        "UPDATE send_queue SET status = 'CANCELLED', updated_at = ? WHERE id = ? AND status = 'PENDING'",
    )
    .bind(now_epoch())
    .bind(id)
    .execute(pool)
    .await?;
    Ok(result.rows_affected() > 0)
}

/// Claim a batch of due jobs for this dispatcher cycle.
///
/// The claim is the per-row conditional update PENDING -> SENDING: a row that
/// reports zero affected rows was claimed by a concurrent cycle (or replica)
/// and is skipped. This is what makes claims exactly-once without any lock.
pub async fn claim_due(
    pool: &SqlitePool,
    batch_size: i64,
    now: i64,
) -> Result<Vec<SendJob>, DispatchError> {
    let due = sqlx::query_as::<_, SendJob>(
        r#"SELECT * FROM send_queue
           WHERE status = 'PENDING' AND scheduled_for <= ?
           ORDER BY scheduled_for ASC
           LIMIT ?"#,
    )
    .bind(now)
    .bind(batch_size)
    .fetch_all(pool)
    .await?;

    let mut claimed = Vec::with_capacity(due.len());
    for mut job in due {
        let result = sqlx::query(
            r#"UPDATE send_queue
               SET status = 'SENDING', claimed_at = ?, updated_at = ?
               WHERE id = ? AND status = 'PENDING'"#,
        )
        .bind(now)
        .bind(now)
        .bind(&job.id)
        .execute(pool)
        .await?;

        if result.rows_affected() == 1 {
            job.status = "SENDING".to_string();
            job.claimed_at = Some(now);
            claimed.push(job);
        }
    }
    Ok(claimed)
}

/// Put a claimed job back without burning an attempt (capacity-skip path).
/// scheduled_for is untouched, so the job is picked up again next cycle.
pub async fn release(pool: &SqlitePool, id: &str) -> Result<(), DispatchError> {
    sqlx::query(
        "UPDATE send_queue SET status = 'PENDING', claimed_at = NULL, updated_at = ? WHERE id = ? AND status = 'SENDING'",
    )
    .bind(now_epoch())
    .bind(id)
    .execute(pool)
    .await?;
    Ok(())
}

pub async fn mark_sent(
    pool: &SqlitePool,
    id: &str,
    message_id: &str,
    from_address: &str,
    now: i64,
) -> Result<(), DispatchError> {
    sqlx::query(
        r#"UPDATE send_queue
           SET status = 'SENT', message_id = ?, sent_at = ?, sent_from_email = ?, updated_at = ?
           WHERE id = ?"#,
    )
    .bind(message_id)
    .bind(now)
    .bind(from_address)
    .bind(now)
    .bind(id)
    .execute(pool)
    .await?;
    Ok(())
}

/// Record a failed attempt: either reschedule with the fixed backoff or, once
/// attempts reach max_attempts, park the job as FAILED.
pub async fn record_failure(
    pool: &SqlitePool,
    job: &SendJob,
    error: &str,
    now: i64,
) -> Result<(), DispatchError> {
    let attempts = job.attempts + 1;
    if attempts >= job.max_attempts {
        sqlx::query(
            r#"UPDATE send_queue
               SET status = 'FAILED', attempts = ?, last_error = ?, failed_at = ?, updated_at = ?
               WHERE id = ?"#,
        )
        .bind(attempts)
        .bind(error)
        .bind(now)
        .bind(now)
        .bind(&job.id)
        .execute(pool)
        .await?;
        warn!(queue_id=%job.id, attempts, error=%error, "email failed permanently");
    } else {
        sqlx::query(
            r#"UPDATE send_queue
               SET status = 'PENDING', attempts = ?, last_error = ?, scheduled_for = ?,
                   claimed_at = NULL, updated_at = ?
               WHERE id = ?"#,
        )
        .bind(attempts)
        .bind(error)
        .bind(now + RETRY_DELAY_SECS)
        .bind(now)
        .bind(&job.id)
        .execute(pool)
        .await?;
        warn!(queue_id=%job.id, attempts, error=%error, "email attempt failed, will retry");
    }
    Ok(())
}

/// Immediate terminal failure, bypassing remaining retries. Used when the
/// sending identity was revoked mid-send.
pub async fn fail_permanently(
    pool: &SqlitePool,
    job: &SendJob,
    error: &str,
    now: i64,
) -> Result<(), DispatchError> {
    sqlx::query(
        r#"UPDATE send_queue
           SET status = 'FAILED', attempts = ?, last_error = ?, failed_at = ?, updated_at = ?
           WHERE id = ?"#,
    )
    .bind(job.attempts + 1)
    .bind(error)
    .bind(now)
    .bind(now)
    .bind(&job.id)
    .execute(pool)
    .await?;
    warn!(queue_id=%job.id, error=%error, "email failed permanently (identity revoked)");
    Ok(())
}

/// Requeue SENDING rows whose claim outlived the TTL. Covers workers that died
/// between claim and transport call; a worker that died after the transport
/// call may double-send, which transport-level message-id dedup absorbs.
pub async fn requeue_stale(
    pool: &SqlitePool,
    claim_ttl_secs: i64,
    now: i64,
) -> Result<u64, DispatchError> {
    let result = sqlx::query(
        r#"UPDATE send_queue
           SET status = 'PENDING', claimed_at = NULL, updated_at = ?
           WHERE status = 'SENDING' AND claimed_at IS NOT NULL AND claimed_at <= ?"#,
    )
    .bind(now)
    .bind(now - claim_ttl_secs)
    .execute(pool)
    .await?;
    if result.rows_affected() > 0 {
        warn!(requeued = result.rows_affected(), "requeued stale SENDING jobs");
    }
    Ok(result.rows_affected())
}
