//! Delivery of paid messages.

use async_trait::async_trait;
use serde::Serialize;

/// A message whose delivery has been paid for.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ForwardedEmail {
    pub endpoint_id: String,
    pub to: String,
    pub from: String,
    pub subject: String,
    pub message: String,
}

#[derive(Debug, thiserror::Error)]
#[error("Failed to deliver email to {to}: {reason}")]
pub struct MailerError {
    pub to: String,
    pub reason: String,
}

#[async_trait]
pub trait Mailer: Send + Sync {
    async fn send(&self, email: &ForwardedEmail) -> Result<(), MailerError>;
}

/// Writes each message to the log instead of sending it.
#[derive(Debug, Default, Clone, Copy)]
pub struct LogMailer;

#[async_trait]
impl Mailer for LogMailer {
    async fn send(&self, email: &ForwardedEmail) -> Result<(), MailerError> {
        tracing::info!(
            endpoint_id = %email.endpoint_id,
            to = %email.to,
            from = %email.from,
            subject = %email.subject,
            message = %email.message,
            "email sent"
        );
        Ok(())
    }
}
