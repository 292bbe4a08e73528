#![allow(dead_code)]

use std::collections::{HashMap, VecDeque};
use std::sync::Mutex;

use async_trait::async_trait;
use sqlx::sqlite::SqlitePoolOptions;
use sqlx::SqlitePool;
use uuid::Uuid;

use outreach_mailer::config::Config;
use outreach_mailer::db;
use outreach_mailer::models::NewSendJob;
use outreach_mailer::services::send_queue;
use outreach_mailer::transport::{
    HistoryEntry, InboundMessage, MailTransport, MailboxProfile, SentMessage, TransportError,
};

/// Single-connection in-memory database so every query sees the same state.
pub async fn setup_pool() -> SqlitePool {
    let pool = SqlitePoolOptions::new()
        .max_connections(1)
        .connect("sqlite::memory:")
        .await
        .expect("in-memory sqlite");
    db::run_migrations(&pool).await.expect("migrations");
    pool
}

pub fn test_config() -> Config {
    Config {
        database_url: "sqlite::memory:".into(),
        bind_addr: "127.0.0.1:0".into(),
        api_key: "test-key".into(),
        tracking_base_url: "http://track.test".into(),
        dispatch_interval_secs: 60,
        dispatch_batch_size: 100,
        claim_ttl_secs: 600,
        reply_poll_interval_secs: 900,
        tenant_daily_limit: 500,
        smtp_relay: "smtp.test".into(),
        smtp_username: String::new(),
        smtp_password: String::new(),
    }
}

#[derive(Debug, Clone)]
pub struct SentRecord {
    pub from: String,
    pub to: String,
    pub subject: String,
    pub body: String,
}

/// Scriptable in-memory transport. Sends succeed unless failures were queued
/// with `fail_next`; history data is served from the fields.
#[derive(Default)]
pub struct MockTransport {
    pub sent: Mutex<Vec<SentRecord>>,
    failures: Mutex<VecDeque<TransportError>>,
    pub profiles: Mutex<HashMap<String, MailboxProfile>>,
    pub history: Mutex<HashMap<String, Vec<HistoryEntry>>>,
    pub messages: Mutex<HashMap<String, InboundMessage>>,
}

impl MockTransport {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn fail_next(&self, count: usize, permanent: bool) {
        let mut failures = self.failures.lock().unwrap();
        for _ in 0..count {
            failures.push_back(if permanent {
                TransportError::Permanent("authorization revoked".into())
            } else {
                TransportError::Transient("connection reset".into())
            });
        }
    }

    pub fn sent_count(&self) -> usize {
        self.sent.lock().unwrap().len()
    }
}

#[async_trait]
impl MailTransport for MockTransport {
    async fn send(
        &self,
        from: &str,
        to: &str,
        subject: &str,
        html_body: &str,
    ) -> Result<SentMessage, TransportError> {
        if let Some(err) = self.failures.lock().unwrap().pop_front() {
            return Err(err);
        }
        self.sent.lock().unwrap().push(SentRecord {
            from: from.to_string(),
            to: to.to_string(),
            subject: subject.to_string(),
            body: html_body.to_string(),
        });
        Ok(SentMessage {
            message_id: format!("msg-{}", Uuid::new_v4()),
            thread_id: Some(format!("thread-{}", Uuid::new_v4())),
        })
    }

    async fn get_profile(&self, identity: &str) -> Result<MailboxProfile, TransportError> {
        self.profiles
            .lock()
            .unwrap()
            .get(identity)
            .cloned()
            .ok_or(TransportError::Unsupported("get_profile"))
    }

    async fn list_history(
        &self,
        identity: &str,
        _since_id: &str,
    ) -> Result<Vec<HistoryEntry>, TransportError> {
        Ok(self
            .history
            .lock()
            .unwrap()
            .get(identity)
            .cloned()
            .unwrap_or_default())
    }

    async fn get_message(
        &self,
        _identity: &str,
        message_id: &str,
    ) -> Result<InboundMessage, TransportError> {
        self.messages
            .lock()
            .unwrap()
            .get(message_id)
            .cloned()
            .ok_or_else(|| TransportError::Transient("message not found".into()))
    }
}

/// Enqueue a job already due for dispatch.
pub async fn enqueue_due_job(pool: &SqlitePool, lead_id: &str, tenant_id: &str) -> String {
    let job = send_queue::enqueue(
        pool,
        NewSendJob {
            lead_id: lead_id.to_string(),
            tenant_id: tenant_id.to_string(),
            recipient_email: format!("{lead_id}@prospect.test"),
            subject: "Quick question".to_string(),
            body: "<p>Hello there</p>".to_string(),
            cta: String::new(),
            sequence_number: 1,
            send_delay_days: 0,
            scheduled_for: Some(db::now_epoch() - 1),
        },
    )
    .await
    .expect("enqueue");
    job.id
}
