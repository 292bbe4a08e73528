use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use sqlx::SqlitePool;
use tracing::{error, info, warn};

use crate::config::Config;
use crate::db::now_epoch;
use crate::error::DispatchError;
use crate::models::{EventType, IdentityStatus, NewEngagementEvent, SendJob};
use crate::services::{assignment, events, mailbox_pool, send_queue, tenant_limits, tracking};
use crate::transport::{MailTransport, TransportError};

/// Per-cycle outcome counts, logged for observability.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct CycleStats {
    pub sent: u64,
    pub failed: u64,
    pub skipped: u64,
}

/// Spawn the recurring dispatch loop. Several replicas may run this loop
/// concurrently; per-row conditional claims keep them from double-sending.
pub fn start(pool: SqlitePool, transport: Arc<dyn MailTransport>, config: Arc<Config>) {
    tokio::spawn(async move {
        info!(
            interval = config.dispatch_interval_secs,
            batch = config.dispatch_batch_size,
            "starting send queue dispatcher"
        );
        loop {
            match run_cycle(&pool, transport.as_ref(), &config).await {
                Ok(stats) => {
                    if stats.sent > 0 || stats.failed > 0 || stats.skipped > 0 {
                        info!(
                            sent = stats.sent,
                            failed = stats.failed,
                            skipped = stats.skipped,
                            "dispatch cycle complete"
                        );
                    }
                }
                Err(e) => error!(error=%e, "dispatch cycle failed"),
            }
            tokio::time::sleep(Duration::from_secs(config.dispatch_interval_secs)).await;
        }
    });
}

/// One dispatcher pass: requeue stale claims, claim due jobs, process each.
pub async fn run_cycle(
    pool: &SqlitePool,
    transport: &dyn MailTransport,
    config: &Config,
) -> Result<CycleStats, DispatchError> {
    let now = now_epoch();
    send_queue::requeue_stale(pool, config.claim_ttl_secs, now).await?;

    let jobs = send_queue::claim_due(pool, config.dispatch_batch_size, now).await?;
    let mut stats = CycleStats::default();

    // Sequential on purpose: correctness over throughput at this volume, and
    // every counter update stays a single atomic statement.
    for job in jobs {
        match process_job(pool, transport, config, &job).await {
            Ok(JobOutcome::Sent) => stats.sent += 1,
            Ok(JobOutcome::Deferred) => stats.skipped += 1,
            Ok(JobOutcome::Failed) => stats.failed += 1,
            Err(e) => {
                // Database-level breakage, not a send failure; the claim TTL
                // will recover the row if we left it in SENDING.
                error!(queue_id=%job.id, error=%e, "unexpected dispatch error");
                stats.failed += 1;
            }
        }
    }
    Ok(stats)
}

enum JobOutcome {
    Sent,
    /// Capacity skip: the job went back to PENDING with no attempt burned.
    Deferred,
    /// Attempt failed and was recorded (retry scheduled or terminal FAILED).
    Failed,
}

async fn process_job(
    pool: &SqlitePool,
    transport: &dyn MailTransport,
    config: &Config,
    job: &SendJob,
) -> Result<JobOutcome, DispatchError> {
    let today = Utc::now().date_naive().to_string();

    // Tenant-level cap first: exhausted tenants defer without burning attempts.
    let has_headroom =
        tenant_limits::check_and_reset(pool, &job.tenant_id, &today, config.tenant_daily_limit)
            .await?;
    if !has_headroom {
        warn!(tenant=%job.tenant_id, queue_id=%job.id, "tenant daily limit reached, deferring");
        send_queue::release(pool, &job.id).await?;
        return Ok(JobOutcome::Deferred);
    }

    // Sticky mailbox for this lead. Capacity exhaustion defers; a tenant with
    // no usable mailbox at all is a real failure and counts as an attempt.
    let identity = match assignment::get_or_assign(pool, &job.lead_id, &job.tenant_id).await {
        Ok(identity) => identity,
        Err(e) if e.is_capacity() => {
            send_queue::release(pool, &job.id).await?;
            return Ok(JobOutcome::Deferred);
        }
        Err(DispatchError::Db(e)) => return Err(DispatchError::Db(e)),
        Err(e) => {
            // NoActiveIdentity and friends count against attempts, same as a
            // transport failure.
            send_queue::record_failure(pool, job, &e.to_string(), now_epoch()).await?;
            return Ok(JobOutcome::Failed);
        }
    };

    // Tracking tokens reference the message before the provider assigns an id,
    // so mint a provisional one; engagement joins happen on this value.
    let tracking_message_id = uuid::Uuid::new_v4().to_string();
    let body = tracking::add_tracking_to_email(
        pool,
        config,
        &job.body,
        &job.lead_id,
        &job.tenant_id,
        &tracking_message_id,
    )
    .await?;

    match transport
        .send(&identity.address, &job.recipient_email, &job.subject, &body)
        .await
    {
        Ok(sent) => {
            let now = now_epoch();
            send_queue::mark_sent(pool, &job.id, &sent.message_id, &identity.address, now).await?;
            mailbox_pool::record_send(pool, &job.tenant_id, &identity.address).await?;
            tenant_limits::increment(pool, &job.tenant_id).await?;

            let mut event = NewEngagementEvent::new(
                &job.lead_id,
                &job.tenant_id,
                EventType::Sent,
                &sent.message_id,
            );
            event.thread_id = sent.thread_id.clone();
            event.sequence_number = Some(job.sequence_number);
            event.subject = job.subject.clone();
            event.metadata = serde_json::json!({ "tracking_message_id": tracking_message_id });
            events::append(pool, event).await?;
            events::record_lead_sent(pool, &job.lead_id, &job.tenant_id, now).await?;

            info!(queue_id=%job.id, mailbox=%identity.address, "email sent");
            Ok(JobOutcome::Sent)
        }
        Err(TransportError::Permanent(msg)) => {
            // Authorization is gone for this mailbox: pull it from rotation and
            // fail the job outright instead of retrying into the same wall.
            mailbox_pool::set_status(
                pool,
                &job.tenant_id,
                &identity.address,
                IdentityStatus::Revoked,
            )
            .await?;
            send_queue::fail_permanently(pool, job, &msg, now_epoch()).await?;
            Ok(JobOutcome::Failed)
        }
        Err(e) => {
            send_queue::record_failure(pool, job, &e.to_string(), now_epoch()).await?;
            Ok(JobOutcome::Failed)
        }
    }
}
