pub mod smtp;

use async_trait::async_trait;
use thiserror::Error;

pub use smtp::SmtpMailTransport;

/// Transport-level failures, classified so the dispatcher can pick the right
/// recovery: transient errors retry with backoff, permanent errors revoke the
/// sending identity and fail the job.
#[derive(Debug, Error)]
pub enum TransportError {
    #[error("transient transport failure: {0}")]
    Transient(String),
    #[error("permanent transport failure: {0}")]
    Permanent(String),
    /// The provider cannot do this (e.g. plain SMTP has no history feed).
    #[error("operation not supported by this transport: {0}")]
    Unsupported(&'static str),
}

/// Result of a successful send.
#[derive(Debug, Clone)]
pub struct SentMessage {
    pub message_id: String,
    pub thread_id: Option<String>,
}

/// Provider-side mailbox snapshot, used as the reply-detection cursor source.
#[derive(Debug, Clone)]
pub struct MailboxProfile {
    pub address: String,
    pub history_id: String,
}

/// A message newly visible in the provider's history feed since a cursor.
#[derive(Debug, Clone)]
pub struct HistoryEntry {
    pub message_id: String,
}

/// Full inbound message, fetched when the history feed surfaces it.
#[derive(Debug, Clone)]
pub struct InboundMessage {
    pub message_id: String,
    pub thread_id: Option<String>,
    pub from_address: String,
    pub body: String,
    pub snippet: String,
}

/// The mail provider boundary. Everything behind it is black-box, rate-limited
/// and eventually consistent; callers retry transient failures.
#[async_trait]
pub trait MailTransport: Send + Sync {
    async fn send(
        &self,
        from: &str,
        to: &str,
        subject: &str,
        html_body: &str,
    ) -> Result<SentMessage, TransportError>;

    async fn get_profile(&self, identity: &str) -> Result<MailboxProfile, TransportError>;

    async fn list_history(
        &self,
        identity: &str,
        since_id: &str,
    ) -> Result<Vec<HistoryEntry>, TransportError>;

    async fn get_message(
        &self,
        identity: &str,
        message_id: &str,
    ) -> Result<InboundMessage, TransportError>;
}
