use sqlx::SqlitePool;
use tracing::{info, warn};
use uuid::Uuid;

use crate::db::now_epoch;
use crate::error::DispatchError;
use crate::models::{IdentityStatus, LeadMailboxAssignment, MailboxIdentity};
use crate::services::mailbox_pool;

/// Resolve the sticky mailbox for a lead, creating the binding on first send.
///
/// The same lead is always routed through the same sending identity for
/// deliverability and threading, until that identity leaves the active pool.
/// The partial unique index on (lead_id, tenant_id, status='active') is the
/// guard against two dispatchers creating two bindings for one lead: the
/// loser of that race re-reads the winner's row.
pub async fn get_or_assign(
    pool: &SqlitePool,
    lead_id: &str,
    tenant_id: &str,
) -> Result<MailboxIdentity, DispatchError> {
    if let Some(assignment) = active_assignment(pool, lead_id, tenant_id).await? {
        match mailbox_pool::get_identity(pool, tenant_id, &assignment.assigned_email).await? {
            Some(identity) if identity.status() == IdentityStatus::Active => {
                touch_assignment(pool, &assignment.id).await?;
                return Ok(identity);
            }
            _ => {
                // Assigned mailbox fell out of rotation; supersede the binding.
                warn!(
                    lead=%lead_id, mailbox=%assignment.assigned_email,
                    "assigned mailbox no longer active, reassigning"
                );
                deactivate(pool, &assignment.id).await?;
            }
        }
    }

    let identity = mailbox_pool::assign_next(pool, tenant_id).await?;

    match insert_assignment(pool, lead_id, tenant_id, &identity.address).await {
        Ok(()) => {
            info!(lead=%lead_id, mailbox=%identity.address, "assigned new mailbox to lead");
            Ok(identity)
        }
        Err(DispatchError::Db(e)) if is_unique_violation(&e) => {
            // Concurrent dispatch of two jobs for the same lead: keep the
            // winner's binding instead of ours.
            let winner = active_assignment(pool, lead_id, tenant_id)
                .await?
                .ok_or(DispatchError::NotFound("lead mailbox assignment"))?;
            touch_assignment(pool, &winner.id).await?;
            mailbox_pool::get_identity(pool, tenant_id, &winner.assigned_email)
                .await?
                .ok_or(DispatchError::NotFound("mailbox identity"))
        }
        Err(e) => Err(e),
    }
}

pub async fn active_assignment(
    pool: &SqlitePool,
    lead_id: &str,
    tenant_id: &str,
) -> Result<Option<LeadMailboxAssignment>, DispatchError> {
    let row = sqlx::query_as::<_, LeadMailboxAssignment>(
        "SELECT * FROM lead_mailbox_assignments WHERE lead_id = ? AND tenant_id = ? AND status = 'active'",
    )
    .bind(lead_id)
    .bind(tenant_id)
    .fetch_optional(pool)
    .await?;
    Ok(row)
}

async fn insert_assignment(
    pool: &SqlitePool,
    lead_id: &str,
    tenant_id: &str,
    address: &str,
) -> Result<(), DispatchError> {
    let now = now_epoch();
    sqlx::query(
        r#"INSERT INTO lead_mailbox_assignments
           (id, lead_id, tenant_id, assigned_email, email_count, status, assigned_at, last_used_at, created_at, updated_at)
           VALUES (?, ?, ?, ?, 1, 'active', ?, ?, ?, ?)"#,
    )
    .bind(Uuid::new_v4().to_string())
    .bind(lead_id)
    .bind(tenant_id)
    .bind(address)
    .bind(now)
    .bind(now)
    .bind(now)
    .bind(now)
    .execute(pool)
    .await?;
    Ok(())
}

async fn touch_assignment(pool: &SqlitePool, id: &str) -> Result<(), DispatchError> {
    let now = now_epoch();
    sqlx::query(
        r#"UPDATE lead_mailbox_assignments
           SET email_count = email_count + 1, last_used_at = ?, updated_at = ?
           WHERE id = ?"#,
    )
    .bind(now)
    .bind(now)
    .bind(id)
    .execute(pool)
    .await?;
    Ok(())
}

async fn deactivate(pool: &SqlitePool, id: &str) -> Result<(), DispatchError> {
    sqlx::query("UPDATE lead_mailbox_assignments SET status = 'inactive', updated_at = ? WHERE id = ?")
        .bind(now_epoch())
        .bind(id)
        .execute(pool)
        .await?;
    Ok(())
}

fn is_unique_violation(e: &sqlx::Error) -> bool {
    e.as_database_error()
        .map(|d| d.is_unique_violation())
        .unwrap_or(false)
}
