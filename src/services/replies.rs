use std::sync::Arc;
use std::time::Duration;

use sqlx::SqlitePool;
use tracing::{debug, error, info, warn};

use crate::config::Config;
use crate::db::now_epoch;
use crate::error::DispatchError;
use crate::models::{EventType, MailboxIdentity, NewEngagementEvent};
use crate::services::events;
use crate::transport::{MailTransport, TransportError};

const SNIPPET_MAX_LEN: usize = 200;

/// Spawn the reply-detection poll loop.
pub fn start(pool: SqlitePool, transport: Arc<dyn MailTransport>, config: Arc<Config>) {
    tokio::spawn(async move {
        info!(
            interval = config.reply_poll_interval_secs,
            "starting reply detection poller"
        );
        loop {
            match check_for_replies(&pool, transport.as_ref()).await {
                Ok(found) if found > 0 => info!(replies = found, "reply check complete"),
                Ok(_) => {}
                Err(e) => error!(error=%e, "reply check failed"),
            }
            tokio::time::sleep(Duration::from_secs(config.reply_poll_interval_secs)).await;
        }
    });
}

/// Walk every active identity's provider history feed since the stored cursor
/// and record REPLY events for inbound messages on threads we sent into.
pub async fn check_for_replies(
    pool: &SqlitePool,
    transport: &dyn MailTransport,
) -> Result<u64, DispatchError> {
    let identities = crate::services::mailbox_pool::list_active(pool).await?;
    let mut found = 0u64;

    for identity in identities {
        match poll_identity(pool, transport, &identity).await {
            Ok(n) => found += n,
            Err(e) => warn!(mailbox=%identity.address, error=%e, "reply poll failed for mailbox"),
        }
    }
    Ok(found)
}

async fn poll_identity(
    pool: &SqlitePool,
    transport: &dyn MailTransport,
    identity: &MailboxIdentity,
) -> Result<u64, DispatchError> {
    let profile = match transport.get_profile(&identity.address).await {
        Ok(p) => p,
        Err(TransportError::Unsupported(_)) => {
            // Plain SMTP identities have no history feed to poll.
            debug!(mailbox=%identity.address, "transport has no history feed, skipping");
            return Ok(0);
        }
        Err(e) => return Err(transport_err(e)),
    };

    let mut found = 0u64;
    if let Some(cursor) = identity.last_history_id.as_deref() {
        let entries = transport
            .list_history(&identity.address, cursor)
            .await
            .map_err(transport_err)?;

        for entry in entries {
            let message = match transport.get_message(&identity.address, &entry.message_id).await {
                Ok(m) => m,
                Err(e) => {
                    warn!(message=%entry.message_id, error=%e, "failed to fetch message");
                    continue;
                }
            };

            // Our own outbound messages show up in the feed too.
            if message.from_address.eq_ignore_ascii_case(&identity.address) {
                continue;
            }

            if record_reply_if_ours(pool, &identity.tenant_id, &message).await? {
                found += 1;
            }
        }
    }

    // Advance the cursor even on the first pass, so the next poll has a baseline.
    sqlx::query("UPDATE mailbox_identities SET last_history_id = ?, updated_at = ? WHERE id = ?")
        .bind(&profile.history_id)
        .bind(now_epoch())
        .bind(&identity.id)
        .execute(pool)
        .await?;

    Ok(found)
}

/// Record a reply for an inbound message whose thread contains one of our SENT
/// events. Messages on unrelated threads are ignored.
async fn record_reply_if_ours(
    pool: &SqlitePool,
    tenant_id: &str,
    message: &crate::transport::InboundMessage,
) -> Result<bool, DispatchError> {
    let Some(thread_id) = message.thread_id.as_deref() else {
        return Ok(false);
    };
    let Some((lead_id, _)) = events::find_sent_lead_for_thread(pool, tenant_id, thread_id).await?
    else {
        return Ok(false);
    };

    record_reply(
        pool,
        &lead_id,
        tenant_id,
        &message.message_id,
        Some(thread_id),
        &message.body,
        &message.snippet,
    )
    .await?;
    Ok(true)
}

/// Append a REPLY event and update lead aggregates. Also the direct entry
/// point for the external reply-detection process (POST /api/track/reply).
pub async fn record_reply(
    pool: &SqlitePool,
    lead_id: &str,
    tenant_id: &str,
    message_id: &str,
    thread_id: Option<&str>,
    reply_content: &str,
    reply_snippet: &str,
) -> Result<(), DispatchError> {
    let mut event = NewEngagementEvent::new(lead_id, tenant_id, EventType::Reply, message_id);
    event.thread_id = thread_id.map(str::to_string);
    event.reply_content = Some(reply_content.to_string());
    event.reply_snippet = Some(truncate(reply_snippet, SNIPPET_MAX_LEN));
    events::append(pool, event).await?;
    events::record_lead_reply(pool, lead_id, tenant_id, now_epoch()).await?;

    info!(lead=%lead_id, "recorded reply");
    Ok(())
}

fn truncate(s: &str, max: usize) -> String {
    if s.len() <= max {
        s.to_string()
    } else {
        s.chars().take(max).collect()
    }
}

fn transport_err(e: TransportError) -> DispatchError {
    match e {
        TransportError::Permanent(msg) => DispatchError::TransportPermanent(msg),
        other => DispatchError::Transport(other.to_string()),
    }
}
