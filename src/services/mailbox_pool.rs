use sqlx::SqlitePool;
use tracing::{info, warn};
use uuid::Uuid;

use crate::db::now_epoch;
use crate::error::{CapacityScope, DispatchError};
use crate::models::{IdentityStatus, MailboxIdentity};

/// Register a sending identity for a tenant. Called from the account
/// onboarding path once the mailbox is authorized.
pub async fn add_identity(
    pool: &SqlitePool,
    tenant_id: &str,
    address: &str,
    daily_send_limit: i64,
) -> Result<MailboxIdentity, DispatchError> {
    let now = now_epoch();
    let id = Uuid::new_v4().to_string();
    sqlx::query(
        r#"INSERT INTO mailbox_identities
           (id, tenant_id, address, status, send_priority, daily_send_count, daily_send_limit, created_at, updated_at)
           VALUES (?, ?, ?, 'active', 1, 0, ?, ?, ?)"#,
    )
    .bind(&id)
    .bind(tenant_id)
    .bind(address)
    .bind(daily_send_limit)
    .bind(now)
    .bind(now)
    .execute(pool)
    .await?;

    info!(tenant=%tenant_id, mailbox=%address, "registered sending identity");
    get_identity(pool, tenant_id, address)
        .await?
        .ok_or(DispatchError::NotFound("mailbox identity"))
}

pub async fn get_identity(
    pool: &SqlitePool,
    tenant_id: &str,
    address: &str,
) -> Result<Option<MailboxIdentity>, DispatchError> {
    let row = sqlx::query_as::<_, MailboxIdentity>(
        "SELECT * FROM mailbox_identities WHERE tenant_id = ? AND address = ?",
    )
    .bind(tenant_id)
    .bind(address)
    .fetch_optional(pool)
    .await?;
    Ok(row)
}

pub async fn list_active(pool: &SqlitePool) -> Result<Vec<MailboxIdentity>, DispatchError> {
    let rows = sqlx::query_as::<_, MailboxIdentity>(
        "SELECT * FROM mailbox_identities WHERE status = 'active'",
    )
    .fetch_all(pool)
    .await?;
    Ok(rows)
}

/// Select the best identity for a new assignment: among active mailboxes with
/// headroom, most remaining capacity first, least recently used as tiebreak
/// (never-used sorts first). Greedy bin selection, not perfect fairness.
pub async fn assign_next(
    pool: &SqlitePool,
    tenant_id: &str,
) -> Result<MailboxIdentity, DispatchError> {
    let candidate = sqlx::query_as::<_, MailboxIdentity>(
        r#"SELECT * FROM mailbox_identities
           WHERE tenant_id = ? AND status = 'active'
             AND daily_send_count < daily_send_limit
           ORDER BY (daily_send_limit - daily_send_count) DESC, last_used_at ASC
           LIMIT 1"#,
    )
    .bind(tenant_id)
    .fetch_optional(pool)
    .await?;

    if let Some(identity) = candidate {
        return Ok(identity);
    }

    // Distinguish "all full" from "nothing usable at all".
    let (active_count,): (i64,) = sqlx::query_as(
        "SELECT COUNT(*) FROM mailbox_identities WHERE tenant_id = ? AND status = 'active'",
    )
    .bind(tenant_id)
    .fetch_one(pool)
    .await?;

    if active_count == 0 {
        warn!(tenant=%tenant_id, "no active mailbox identities");
        Err(DispatchError::NoActiveIdentity(tenant_id.to_string()))
    } else {
        warn!(tenant=%tenant_id, "all mailboxes at daily limit");
        Err(DispatchError::CapacityExhausted(CapacityScope::Mailbox))
    }
}

/// Count one send against the mailbox. Single atomic increment; safe under
/// concurrent dispatchers targeting the same identity.
pub async fn record_send(
    pool: &SqlitePool,
    tenant_id: &str,
    address: &str,
) -> Result<(), DispatchError> {
    let now = now_epoch();
    sqlx::query(
        r#"UPDATE mailbox_identities
           SET daily_send_count = daily_send_count + 1, last_used_at = ?, updated_at = ?
           WHERE tenant_id = ? AND address = ?"#,
    )
    .bind(now)
    .bind(now)
    .bind(tenant_id)
    .bind(address)
    .execute(pool)
    .await?;
    Ok(())
}

/// Zero the daily counters for active identities. Invoked once per UTC day.
pub async fn reset_daily_counts(pool: &SqlitePool) -> Result<u64, DispatchError> {
    let now = now_epoch();
    let result = sqlx::query(
        "UPDATE mailbox_identities SET daily_send_count = 0, updated_at = ? WHERE status = 'active'",
    )
    .bind(now)
    .execute(pool)
    .await?;
    info!(mailboxes = result.rows_affected(), "reset daily send counts");
    Ok(result.rows_affected())
}

/// Pull an identity out of rotation after an authorization failure. Sticky
/// assignments pointing at it get superseded on their next lookup.
pub async fn set_status(
    pool: &SqlitePool,
    tenant_id: &str,
    address: &str,
    status: IdentityStatus,
) -> Result<(), DispatchError> {
    sqlx::query("UPDATE mailbox_identities SET status = ?, updated_at = ? WHERE tenant_id = ? AND address = ?")
        .bind(status.as_str())
        .bind(now_epoch())
        .bind(tenant_id)
        .bind(address)
        .execute(pool)
        .await?;
    warn!(tenant=%tenant_id, mailbox=%address, status=%status.as_str(), "mailbox status changed");
    Ok(())
}
