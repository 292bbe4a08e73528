use chrono::{Duration as ChronoDuration, Utc};
use sqlx::SqlitePool;
use tokio::time::{sleep, Duration};
use tracing::{error, info};

use crate::db::now_epoch;
use crate::services::{mailbox_pool, tenant_limits, tracking};

/// Starts the daily maintenance loop: counter resets at UTC midnight plus the
/// tracking-pixel retention sweep.
pub fn start(pool: SqlitePool) {
    tokio::spawn(async move {
        info!("starting daily maintenance service");
        loop {
            sleep(until_next_utc_midnight()).await;
            if let Err(e) = run_daily_sweep(&pool).await {
                error!(error=%e, "daily maintenance sweep failed");
            }
        }
    });
}

pub async fn run_daily_sweep(pool: &SqlitePool) -> anyhow::Result<()> {
    let today = Utc::now().date_naive().to_string();
    mailbox_pool::reset_daily_counts(pool).await?;
    tenant_limits::reset_all(pool, &today).await?;
    tracking::purge_expired_pixels(pool, now_epoch()).await?;
    info!("daily maintenance sweep completed");
    Ok(())
}

fn until_next_utc_midnight() -> Duration {
    let now = Utc::now();
    let next_midnight = (now + ChronoDuration::days(1))
        .date_naive()
        .and_hms_opt(0, 0, 0)
        .expect("midnight is a valid time")
        .and_utc();
    (next_midnight - now)
        .to_std()
        .unwrap_or(Duration::from_secs(60))
}
