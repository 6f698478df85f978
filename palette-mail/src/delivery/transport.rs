//! Outgoing mail transport

use async_trait::async_trait;
use lettre::message::{header::ContentType, Mailbox, Message};
use lettre::transport::smtp::authentication::Credentials;
use lettre::{Address, AsyncSmtpTransport, AsyncTransport, Tokio1Executor};
use tracing::{debug, info};

use crate::config::SmtpConfig;
use crate::error::{PaletteError, Result};

/// A compiled message ready to hand to a transport
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutgoingEmail {
    /// Display name for the From header
    pub sender_name: String,
    pub recipients: Vec<String>,
    pub subject: String,
    pub html: String,
}

/// Delivers compiled messages
#[async_trait]
pub trait MailTransport: Send + Sync {
    /// Send the message, returning a transport-specific message id
    async fn send(&self, email: &OutgoingEmail) -> Result<String>;
}

/// SMTP relay via lettre
///
/// Port 465 uses implicit TLS, any other port STARTTLS.
pub struct SmtpTransport {
    transport: AsyncSmtpTransport<Tokio1Executor>,
    from: Option<Address>,
}

impl SmtpTransport {
    pub fn new(config: &SmtpConfig) -> Result<Self> {
        let builder = if config.port == 465 {
            AsyncSmtpTransport::<Tokio1Executor>::relay(&config.host)
        } else {
            AsyncSmtpTransport::<Tokio1Executor>::starttls_relay(&config.host)
        }
        .map_err(|e| PaletteError::Config(format!("Failed to configure SMTP transport: {}", e)))?
        .port(config.port);

        let (builder, from) = match config.credentials() {
            Some((user, pass)) => {
                let from = user.parse::<Address>().map_err(|e| {
                    PaletteError::Config(format!("SMTP username is not an address: {}", e))
                })?;
                (
                    builder.credentials(Credentials::new(user.to_string(), pass.to_string())),
                    Some(from),
                )
            }
            None => (builder, None),
        };

        info!(host = %config.host, port = config.port, "SMTP transport configured");
        Ok(Self {
            transport: builder.build(),
            from,
        })
    }

    fn build_message(&self, email: &OutgoingEmail) -> Result<Message> {
        let from = self.from.clone().ok_or_else(|| {
            PaletteError::Transport(
                "Email configuration missing: set smtp.username and smtp.password".to_string(),
            )
        })?;

        let mut builder = Message::builder()
            .from(Mailbox::new(Some(email.sender_name.clone()), from))
            .subject(email.subject.as_str())
            .header(ContentType::TEXT_HTML);

        for recipient in &email.recipients {
            let to = recipient.parse::<Mailbox>().map_err(|e| {
                PaletteError::Validation(format!("Invalid recipient {}: {}", recipient, e))
            })?;
            builder = builder.to(to);
        }

        builder
            .body(email.html.clone())
            .map_err(|e| PaletteError::Transport(format!("Failed to build email message: {}", e)))
    }
}

#[async_trait]
impl MailTransport for SmtpTransport {
    async fn send(&self, email: &OutgoingEmail) -> Result<String> {
        let message = self.build_message(email)?;

        let response = self
            .transport
            .send(message)
            .await
            .map_err(|e| PaletteError::Transport(format!("Failed to send email: {}", e)))?;

        let message_id = response.message().collect::<Vec<_>>().join(" ");
        debug!(recipients = email.recipients.len(), %message_id, "Email accepted by relay");
        Ok(message_id)
    }
}
