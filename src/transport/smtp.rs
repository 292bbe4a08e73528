use async_trait::async_trait;
use lettre::message::header::ContentType;
use lettre::transport::smtp::authentication::Credentials;
use lettre::{AsyncSmtpTransport, AsyncTransport, Message, Tokio1Executor};
use uuid::Uuid;

use crate::config::Config;

use super::{
    HistoryEntry, InboundMessage, MailTransport, MailboxProfile, SentMessage, TransportError,
};

/// SMTP relay implementation of the mail transport.
///
/// Send-only: plain SMTP has no history feed, so the reply poller skips
/// identities behind this transport.
pub struct SmtpMailTransport {
    mailer: AsyncSmtpTransport<Tokio1Executor>,
    /// Domain part of generated Message-ID headers.
    id_domain: String,
}

impl SmtpMailTransport {
    pub fn from_config(config: &Config) -> Result<Self, TransportError> {
        let creds = Credentials::new(config.smtp_username.clone(), config.smtp_password.clone());
        let mailer = AsyncSmtpTransport::<Tokio1Executor>::starttls_relay(&config.smtp_relay)
            .map_err(|e| TransportError::Permanent(e.to_string()))?
            .credentials(creds)
            .build();
        let id_domain = config
            .smtp_relay
            .strip_prefix("smtp.")
            .unwrap_or(&config.smtp_relay)
            .to_string();
        Ok(Self { mailer, id_domain })
    }
}

#[async_trait]
impl MailTransport for SmtpMailTransport {
    async fn send(
        &self,
        from: &str,
        to: &str,
        subject: &str,
        html_body: &str,
    ) -> Result<SentMessage, TransportError> {
        // SMTP returns no provider message id, so we mint one and stamp it on
        // the outgoing message; replies will reference it in In-Reply-To.
        let message_id = format!("<{}@{}>", Uuid::new_v4(), self.id_domain);

        let email = Message::builder()
            .from(
                from.parse()
                    .map_err(|e| TransportError::Permanent(format!("bad from address: {e}")))?,
            )
            .to(to
                .parse()
                .map_err(|e| TransportError::Permanent(format!("bad recipient: {e}")))?)
            .subject(subject)
            .message_id(Some(message_id.clone()))
            .header(ContentType::TEXT_HTML)
            .body(html_body.to_string())
            .map_err(|e| TransportError::Permanent(e.to_string()))?;

        match self.mailer.send(email).await {
            Ok(_) => Ok(SentMessage {
                message_id,
                thread_id: None,
            }),
            Err(e) if e.is_permanent() => Err(TransportError::Permanent(e.to_string())),
            Err(e) => Err(TransportError::Transient(e.to_string())),
        }
    }

    async fn get_profile(&self, _identity: &str) -> Result<MailboxProfile, TransportError> {
        Err(TransportError::Unsupported("get_profile"))
    }

    async fn list_history(
        &self,
        _identity: &str,
        _since_id: &str,
    ) -> Result<Vec<HistoryEntry>, TransportError> {
        Err(TransportError::Unsupported("list_history"))
    }

    async fn get_message(
        &self,
        _identity: &str,
        _message_id: &str,
    ) -> Result<InboundMessage, TransportError> {
        Err(TransportError::Unsupported("get_message"))
    }
}
