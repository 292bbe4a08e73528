mod common;

use common::{setup_pool, MockTransport};
use outreach_mailer::models::{EventType, NewEngagementEvent};
use outreach_mailer::services::{events, mailbox_pool, replies};
use outreach_mailer::transport::{HistoryEntry, InboundMessage, MailboxProfile};

#[tokio::test]
async fn reply_on_our_thread_is_recorded_with_aggregates() {
    let pool = setup_pool().await;
    let transport = MockTransport::new();

    mailbox_pool::add_identity(&pool, "tenant-1", "sender@tenant.test", 400)
        .await
        .unwrap();

    // The thread we sent into earlier.
    let mut sent = NewEngagementEvent::new("lead-1", "tenant-1", EventType::Sent, "msg-out-1");
    sent.thread_id = Some("thread-1".to_string());
    events::append(&pool, sent).await.unwrap();

    transport.profiles.lock().unwrap().insert(
        "sender@tenant.test".to_string(),
        MailboxProfile {
            address: "sender@tenant.test".to_string(),
            history_id: "hist-2".to_string(),
        },
    );
    transport.history.lock().unwrap().insert(
        "sender@tenant.test".to_string(),
        vec![
            HistoryEntry {
                message_id: "msg-in-1".to_string(),
            },
            // Our own outbound copy also shows up in the feed.
            HistoryEntry {
                message_id: "msg-own-1".to_string(),
            },
        ],
    );
    transport.messages.lock().unwrap().insert(
        "msg-in-1".to_string(),
        InboundMessage {
            message_id: "msg-in-1".to_string(),
            thread_id: Some("thread-1".to_string()),
            from_address: "prospect@example.com".to_string(),
            body: "Sounds interesting, tell me more".to_string(),
            snippet: "Sounds interesting".to_string(),
        },
    );
    transport.messages.lock().unwrap().insert(
        "msg-own-1".to_string(),
        InboundMessage {
            message_id: "msg-own-1".to_string(),
            thread_id: Some("thread-1".to_string()),
            from_address: "sender@tenant.test".to_string(),
            body: "our own message".to_string(),
            snippet: "our own message".to_string(),
        },
    );

    // First pass only establishes the history cursor.
    let found = replies::check_for_replies(&pool, &transport).await.unwrap();
    assert_eq!(found, 0);
    let identity = mailbox_pool::get_identity(&pool, "tenant-1", "sender@tenant.test")
        .await
        .unwrap()
        .unwrap();
    assert_eq!(identity.last_history_id.as_deref(), Some("hist-2"));

    // Second pass walks the feed since the cursor and finds the reply.
    let found = replies::check_for_replies(&pool, &transport).await.unwrap();
    assert_eq!(found, 1);

    let (reply_events,): (i64,) = sqlx::query_as(
        "SELECT COUNT(*) FROM engagement_events WHERE lead_id = 'lead-1' AND event_type = 'REPLY'",
    )
    .fetch_one(&pool)
    .await
    .unwrap();
    assert_eq!(reply_events, 1);

    let (replied, status): (i64, String) = sqlx::query_as(
        "SELECT emails_replied, sequence_status FROM lead_metrics WHERE lead_id = 'lead-1'",
    )
    .fetch_one(&pool)
    .await
    .unwrap();
    assert_eq!(replied, 1);
    assert_eq!(status, "REPLIED");
}

#[tokio::test]
async fn messages_on_unrelated_threads_are_ignored() {
    let pool = setup_pool().await;
    let transport = MockTransport::new();

    mailbox_pool::add_identity(&pool, "tenant-1", "sender@tenant.test", 400)
        .await
        .unwrap();
    sqlx::query("UPDATE mailbox_identities SET last_history_id = 'hist-1'")
        .execute(&pool)
        .await
        .unwrap();

    transport.profiles.lock().unwrap().insert(
        "sender@tenant.test".to_string(),
        MailboxProfile {
            address: "sender@tenant.test".to_string(),
            history_id: "hist-2".to_string(),
        },
    );
    transport.history.lock().unwrap().insert(
        "sender@tenant.test".to_string(),
        vec![HistoryEntry {
            message_id: "msg-in-9".to_string(),
        }],
    );
    transport.messages.lock().unwrap().insert(
        "msg-in-9".to_string(),
        InboundMessage {
            message_id: "msg-in-9".to_string(),
            thread_id: Some("thread-unknown".to_string()),
            from_address: "someone@example.com".to_string(),
            body: "newsletter".to_string(),
            snippet: "newsletter".to_string(),
        },
    );

    let found = replies::check_for_replies(&pool, &transport).await.unwrap();
    assert_eq!(found, 0);

    let (reply_events,): (i64,) =
        sqlx::query_as("SELECT COUNT(*) FROM engagement_events WHERE event_type = 'REPLY'")
            .fetch_one(&pool)
            .await
            .unwrap();
    assert_eq!(reply_events, 0);
}

#[tokio::test]
async fn snippet_is_truncated_to_200_chars() {
    let pool = setup_pool().await;
    let long = "x".repeat(500);

    replies::record_reply(
        &pool,
        "lead-1",
        "tenant-1",
        "msg-in-1",
        Some("thread-1"),
        &long,
        &long,
    )
    .await
    .unwrap();

    let (snippet,): (String,) =
        sqlx::query_as("SELECT reply_snippet FROM engagement_events WHERE event_type = 'REPLY'")
            .fetch_one(&pool)
            .await
            .unwrap();
    assert_eq!(snippet.len(), 200);
}
