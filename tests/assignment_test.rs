mod common;

use common::setup_pool;
use outreach_mailer::error::DispatchError;
use outreach_mailer::models::IdentityStatus;
use outreach_mailer::services::{assignment, mailbox_pool};

#[tokio::test]
async fn assignment_is_sticky_across_sends() {
    let pool = setup_pool().await;
    mailbox_pool::add_identity(&pool, "tenant-1", "alpha@tenant.test", 400)
        .await
        .unwrap();
    mailbox_pool::add_identity(&pool, "tenant-1", "beta@tenant.test", 400)
        .await
        .unwrap();

    let first = assignment::get_or_assign(&pool, "lead-1", "tenant-1").await.unwrap();

    // Skew the pool so a fresh pick would prefer the other mailbox; the lead
    // must still come back to its original identity.
    for _ in 0..10 {
        mailbox_pool::record_send(&pool, "tenant-1", &first.address).await.unwrap();
    }

    for _ in 0..3 {
        let again = assignment::get_or_assign(&pool, "lead-1", "tenant-1").await.unwrap();
        assert_eq!(again.address, first.address);
    }

    let row = assignment::active_assignment(&pool, "lead-1", "tenant-1")
        .await
        .unwrap()
        .unwrap();
    assert_eq!(row.email_count, 4); // initial assign + three reuses
}

#[tokio::test]
async fn revoked_identity_triggers_reassignment() {
    let pool = setup_pool().await;
    mailbox_pool::add_identity(&pool, "tenant-1", "alpha@tenant.test", 400)
        .await
        .unwrap();

    let first = assignment::get_or_assign(&pool, "lead-1", "tenant-1").await.unwrap();
    assert_eq!(first.address, "alpha@tenant.test");

    mailbox_pool::add_identity(&pool, "tenant-1", "beta@tenant.test", 400)
        .await
        .unwrap();
    mailbox_pool::set_status(&pool, "tenant-1", "alpha@tenant.test", IdentityStatus::Revoked)
        .await
        .unwrap();

    let second = assignment::get_or_assign(&pool, "lead-1", "tenant-1").await.unwrap();
    assert_eq!(second.address, "beta@tenant.test");

    // Old binding superseded, exactly one active row remains.
    let (inactive,): (i64,) = sqlx::query_as(
        "SELECT COUNT(*) FROM lead_mailbox_assignments WHERE lead_id = 'lead-1' AND status = 'inactive'",
    )
    .fetch_one(&pool)
    .await
    .unwrap();
    let (active,): (i64,) = sqlx::query_as(
        "SELECT COUNT(*) FROM lead_mailbox_assignments WHERE lead_id = 'lead-1' AND status = 'active'",
    )
    .fetch_one(&pool)
    .await
    .unwrap();
    assert_eq!(inactive, 1);
    assert_eq!(active, 1);
}

#[tokio::test]
async fn no_active_identity_error_propagates() {
    let pool = setup_pool().await;
    let err = assignment::get_or_assign(&pool, "lead-1", "tenant-1")
        .await
        .unwrap_err();
    assert!(matches!(err, DispatchError::NoActiveIdentity(_)));
}

#[tokio::test]
async fn all_mailboxes_full_is_capacity_not_failure() {
    let pool = setup_pool().await;
    mailbox_pool::add_identity(&pool, "tenant-1", "alpha@tenant.test", 0)
        .await
        .unwrap();

    let err = assignment::get_or_assign(&pool, "lead-1", "tenant-1")
        .await
        .unwrap_err();
    assert!(err.is_capacity());
}

#[tokio::test]
async fn assign_next_prefers_most_headroom_then_least_recently_used() {
    let pool = setup_pool().await;
    mailbox_pool::add_identity(&pool, "tenant-1", "alpha@tenant.test", 400)
        .await
        .unwrap();
    mailbox_pool::add_identity(&pool, "tenant-1", "beta@tenant.test", 400)
        .await
        .unwrap();

    // Burn capacity on alpha: beta now has more headroom.
    for _ in 0..5 {
        mailbox_pool::record_send(&pool, "tenant-1", "alpha@tenant.test").await.unwrap();
    }

    let pick = mailbox_pool::assign_next(&pool, "tenant-1").await.unwrap();
    assert_eq!(pick.address, "beta@tenant.test");
}

#[tokio::test]
async fn existing_assignment_survives_unique_index() {
    let pool = setup_pool().await;
    mailbox_pool::add_identity(&pool, "tenant-1", "alpha@tenant.test", 400)
        .await
        .unwrap();

    assignment::get_or_assign(&pool, "lead-1", "tenant-1").await.unwrap();

    // A second active row for the same lead must be rejected by the partial
    // unique index; this is the split-brain guard get_or_assign relies on.
    let result = sqlx::query(
        r#"INSERT INTO lead_mailbox_assignments
           (id, lead_id, tenant_id, assigned_email, email_count, status, assigned_at, last_used_at, created_at, updated_at)
           VALUES ('dup', 'lead-1', 'tenant-1', 'alpha@tenant.test', 1, 'active', 0, 0, 0, 0)"#,
    )
    .execute(&pool)
    .await;
    assert!(result.is_err());
}
