//! Outbound mail for `sendemail`

use async_trait::async_trait;
use lettre::message::Mailbox as Address;
use lettre::transport::smtp::authentication::Credentials;
use lettre::{AsyncSmtpTransport, AsyncTransport, Message, Tokio1Executor};

use super::CapabilityError;
use crate::config::MailConfig;

/// One message as parsed from `from|to|subject|body`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutgoingMail {
    pub from: String,
    pub to: String,
    pub subject: String,
    pub body: String,
}

#[async_trait]
pub trait Mailer: Send + Sync {
    async fn send(&self, mail: &OutgoingMail) -> Result<(), CapabilityError>;
}

/// STARTTLS submission to the configured relay with login credentials.
pub struct SmtpMailer {
    config: MailConfig,
}

impl SmtpMailer {
    pub fn new(config: MailConfig) -> Self {
        Self { config }
    }

    fn build_message(mail: &OutgoingMail) -> Result<Message, CapabilityError> {
        let address = |raw: &str| {
            raw.trim()
                .parse::<Address>()
                .map_err(|e| CapabilityError::Mail(format!("invalid address '{}': {}", raw, e)))
        };

        Message::builder()
            .from(address(&mail.from)?)
            .to(address(&mail.to)?)
            .subject(mail.subject.clone())
            .body(mail.body.clone())
            .map_err(|e| CapabilityError::Mail(e.to_string()))
    }
}

#[async_trait]
impl Mailer for SmtpMailer {
    async fn send(&self, mail: &OutgoingMail) -> Result<(), CapabilityError> {
        let message = Self::build_message(mail)?;

        let transport = AsyncSmtpTransport::<Tokio1Executor>::starttls_relay(&self.config.host)
            .map_err(|e| CapabilityError::Mail(e.to_string()))?
            .port(self.config.port)
            .credentials(Credentials::new(
                self.config.username.clone(),
                self.config.password.clone(),
            ))
            .build();

        tracing::debug!(
            "Sending mail to {} via {}:{}",
            mail.to,
            self.config.host,
            self.config.port
        );
        transport
            .send(message)
            .await
            .map_err(|e| CapabilityError::Mail(e.to_string()))?;
        Ok(())
    }
}
