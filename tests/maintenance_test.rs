mod common;

use common::{setup_pool, test_config};
use outreach_mailer::db::now_epoch;
use outreach_mailer::services::{mailbox_pool, maintenance, tenant_limits, tracking};

#[tokio::test]
async fn daily_sweep_resets_counters_and_purges_pixels() {
    let pool = setup_pool().await;
    let config = test_config();

    mailbox_pool::add_identity(&pool, "tenant-1", "sender@tenant.test", 400)
        .await
        .unwrap();
    for _ in 0..3 {
        mailbox_pool::record_send(&pool, "tenant-1", "sender@tenant.test")
            .await
            .unwrap();
    }
    tenant_limits::set_limit(&pool, "tenant-1", 100).await.unwrap();
    tenant_limits::increment(&pool, "tenant-1").await.unwrap();

    // One pixel already past its expiry, one fresh.
    tracking::create_pixel(&pool, &config, "lead-1", "tenant-1", "msg-1")
        .await
        .unwrap();
    tracking::create_pixel(&pool, &config, "lead-2", "tenant-1", "msg-2")
        .await
        .unwrap();
    sqlx::query("UPDATE tracking_pixels SET expires_at = ? WHERE lead_id = 'lead-1'")
        .bind(now_epoch() - 10)
        .execute(&pool)
        .await
        .unwrap();

    maintenance::run_daily_sweep(&pool).await.unwrap();

    let identity = mailbox_pool::get_identity(&pool, "tenant-1", "sender@tenant.test")
        .await
        .unwrap()
        .unwrap();
    assert_eq!(identity.daily_send_count, 0);

    let (sent_today,): (i64,) =
        sqlx::query_as("SELECT sent_today FROM tenant_send_limits WHERE tenant_id = 'tenant-1'")
            .fetch_one(&pool)
            .await
            .unwrap();
    assert_eq!(sent_today, 0);

    let (pixels,): (i64,) = sqlx::query_as("SELECT COUNT(*) FROM tracking_pixels")
        .fetch_one(&pool)
        .await
        .unwrap();
    assert_eq!(pixels, 1);
}

#[tokio::test]
async fn revoked_identities_keep_their_counts_out_of_reset() {
    let pool = setup_pool().await;

    mailbox_pool::add_identity(&pool, "tenant-1", "dead@tenant.test", 400)
        .await
        .unwrap();
    mailbox_pool::record_send(&pool, "tenant-1", "dead@tenant.test")
        .await
        .unwrap();
    mailbox_pool::set_status(
        &pool,
        "tenant-1",
        "dead@tenant.test",
        outreach_mailer::models::IdentityStatus::Revoked,
    )
    .await
    .unwrap();

    mailbox_pool::reset_daily_counts(&pool).await.unwrap();

    // The reset only touches active identities.
    let identity = mailbox_pool::get_identity(&pool, "tenant-1", "dead@tenant.test")
        .await
        .unwrap()
        .unwrap();
    assert_eq!(identity.daily_send_count, 1);
}

#[tokio::test]
async fn tenant_limit_rolls_over_lazily_on_new_day() {
    let pool = setup_pool().await;

    tenant_limits::set_limit(&pool, "tenant-1", 2).await.unwrap();
    // Pretend yesterday's counter filled the cap.
    sqlx::query(
        "UPDATE tenant_send_limits SET sent_today = 2, last_reset_day = '2000-01-01' WHERE tenant_id = 'tenant-1'",
    )
    .execute(&pool)
    .await
    .unwrap();

    let today = chrono::Utc::now().date_naive().to_string();
    let headroom = tenant_limits::check_and_reset(&pool, "tenant-1", &today, 500)
        .await
        .unwrap();
    assert!(headroom);

    let (sent_today, day): (i64, String) = sqlx::query_as(
        "SELECT sent_today, last_reset_day FROM tenant_send_limits WHERE tenant_id = 'tenant-1'",
    )
    .fetch_one(&pool)
    .await
    .unwrap();
    assert_eq!(sent_today, 0);
    assert_eq!(day, today);
}

#[tokio::test]
async fn unknown_tenant_gets_default_limit_row() {
    let pool = setup_pool().await;
    let today = chrono::Utc::now().date_naive().to_string();

    let headroom = tenant_limits::check_and_reset(&pool, "tenant-new", &today, 500)
        .await
        .unwrap();
    assert!(headroom);

    let (limit,): (i64,) =
        sqlx::query_as("SELECT daily_limit FROM tenant_send_limits WHERE tenant_id = 'tenant-new'")
            .fetch_one(&pool)
            .await
            .unwrap();
    assert_eq!(limit, 500);
}
