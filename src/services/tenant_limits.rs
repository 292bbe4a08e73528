use sqlx::SqlitePool;
use tracing::info;

use crate::db::now_epoch;
use crate::error::DispatchError;
use crate::models::TenantSendLimit;

/// Check whether the tenant still has daily headroom, lazily rolling the
/// counter over when the stored reset day is stale. Unknown tenants get a row
/// with the default limit so the first send of a new tenant just works.
pub async fn check_and_reset(
    pool: &SqlitePool,
    tenant_id: &str,
    today: &str,
    default_limit: i64,
) -> Result<bool, DispatchError> {
    let now = now_epoch();
    sqlx::query(
        r#"INSERT INTO tenant_send_limits (tenant_id, daily_limit, sent_today, last_reset_day, updated_at)
           VALUES (?, ?, 0, ?, ?)
           ON CONFLICT(tenant_id) DO NOTHING"#,
    )
    .bind(tenant_id)
    .bind(default_limit)
    .bind(today)
    .bind(now)
    .execute(pool)
    .await?;

    // Lazy rollover: conditional on the stored day, so concurrent dispatchers
    // reset at most once.
    sqlx::query(
        "UPDATE tenant_send_limits SET sent_today = 0, last_reset_day = ?, updated_at = ? WHERE tenant_id = ? AND last_reset_day < ?",
    )
    .bind(today)
    .bind(now)
    .bind(tenant_id)
    .bind(today)
    .execute(pool)
    .await?;

    let row = sqlx::query_as::<_, TenantSendLimit>(
        "SELECT * FROM tenant_send_limits WHERE tenant_id = ?",
    )
    .bind(tenant_id)
    .fetch_one(pool)
    .await?;

    Ok(row.sent_today < row.daily_limit)
}

/// Count one send against the tenant. Single atomic increment.
pub async fn increment(pool: &SqlitePool, tenant_id: &str) -> Result<(), DispatchError> {
    sqlx::query(
        "UPDATE tenant_send_limits SET sent_today = sent_today + 1, updated_at = ? WHERE tenant_id = ?",
    )
    .bind(now_epoch())
    .bind(tenant_id)
    .execute(pool)
    .await?;
    Ok(())
}

/// Daily sweep counterpart to the lazy rollover in `check_and_reset`.
pub async fn reset_all(pool: &SqlitePool, today: &str) -> Result<u64, DispatchError> {
    let result = sqlx::query(
        "UPDATE tenant_send_limits SET sent_today = 0, last_reset_day = ?, updated_at = ? WHERE last_reset_day < ?",
    )
    .bind(today)
    .bind(now_epoch())
    .bind(today)
    .execute(pool)
    .await?;
    info!(tenants = result.rows_affected(), "reset tenant daily limits");
    Ok(result.rows_affected())
}

/// Set (or create) a tenant's daily cap.
pub async fn set_limit(
    pool: &SqlitePool,
    tenant_id: &str,
    daily_limit: i64,
) -> Result<(), DispatchError> {
    let now = now_epoch();
    sqlx::query(
        r#"INSERT INTO tenant_send_limits (tenant_id, daily_limit, sent_today, last_reset_day, updated_at)
           VALUES (?, ?, 0, '', ?)
           ON CONFLICT(tenant_id) DO UPDATE SET daily_limit = excluded.daily_limit, updated_at = excluded.updated_at"#,
    )
    .bind(tenant_id)
    .bind(daily_limit)
    .bind(now)
    .execute(pool)
    .await?;
    Ok(())
}
