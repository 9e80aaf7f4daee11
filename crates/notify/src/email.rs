//! Email delivery via SMTP.
//!
//! Configuration is loaded from environment variables; if `SMTP_HOST` is
//! not set, [`EmailConfig::from_env`] returns `None` and the service runs
//! with a [`DisabledMailer`] that only logs what it would have sent.

use async_trait::async_trait;
use lettre::message::header::ContentType;
use lettre::message::{Attachment, Mailbox, MultiPart, SinglePart};
use lettre::transport::smtp::authentication::Credentials;
use lettre::{AsyncSmtpTransport, AsyncTransport, Message, Tokio1Executor};

use crate::{Mailer, OutgoingEmail};

// ---------------------------------------------------------------------------
// Error
// ---------------------------------------------------------------------------

/// Error type for email delivery failures.
#[derive(Debug, thiserror::Error)]
pub enum EmailError {
    /// SMTP transport-level failure (authentication, connection, etc.).
    #[error("SMTP transport error: {0}")]
    Transport(#[from] lettre::transport::smtp::Error),

    /// The recipient or sender address could not be parsed.
    #[error("Email address parse error: {0}")]
    Address(#[from] lettre::address::AddressError),

    /// The MIME message could not be assembled.
    #[error("Email build error: {0}")]
    Build(String),
}

// ---------------------------------------------------------------------------
// EmailConfig
// ---------------------------------------------------------------------------

/// Default SMTP port (STARTTLS).
const DEFAULT_SMTP_PORT: u16 = 587;

/// Default sender address when `SMTP_FROM` is not set.
const DEFAULT_FROM_ADDRESS: &str = "noreply@autotune.local";

/// Default sender display name when `SMTP_FROM_NAME` is not set.
const DEFAULT_FROM_NAME: &str = "Autotune";

/// Configuration for the SMTP email delivery service.
#[derive(Debug, Clone)]
pub struct EmailConfig {
    pub smtp_host: String,
    /// SMTP server port (defaults to 587).
    pub smtp_port: u16,
    /// RFC 5322 "From" address.
    pub from_address: String,
    /// Display name shown next to the sender address.
    pub from_name: String,
    pub smtp_user: Option<String>,
    pub smtp_password: Option<String>,
}

impl EmailConfig {
    /// Load configuration from environment variables.
    ///
    /// Returns `None` if `SMTP_HOST` is not set.
    ///
    /// | Variable         | Required | Default                   |
    /// |------------------|----------|---------------------------|
    /// | `SMTP_HOST`      | yes      |                           |
    /// | `SMTP_PORT`      | no       | `587`                     |
    /// | `SMTP_FROM`      | no       | `noreply@autotune.local`  |
    /// | `SMTP_FROM_NAME` | no       | `Autotune`                |
    /// | `SMTP_USER`      | no       |                           |
    /// | `SMTP_PASSWORD`  | no       |                           |
    pub fn from_env() -> Option<Self> {
        let smtp_host = std::env::var("SMTP_HOST").ok()?;
        Some(Self {
            smtp_host,
            smtp_port: std::env::var("SMTP_PORT")
                .ok()
                .and_then(|p| p.parse().ok())
                .unwrap_or(DEFAULT_SMTP_PORT),
            from_address: std::env::var("SMTP_FROM")
                .unwrap_or_else(|_| DEFAULT_FROM_ADDRESS.to_string()),
            from_name: std::env::var("SMTP_FROM_NAME")
                .unwrap_or_else(|_| DEFAULT_FROM_NAME.to_string()),
            smtp_user: std::env::var("SMTP_USER").ok(),
            smtp_password: std::env::var("SMTP_PASSWORD").ok(),
        })
    }
}

// ---------------------------------------------------------------------------
// SmtpMailer
// ---------------------------------------------------------------------------

/// Sends results emails through an SMTP relay.
pub struct SmtpMailer {
    config: EmailConfig,
    transport: AsyncSmtpTransport<Tokio1Executor>,
}

impl SmtpMailer {
    pub fn new(config: EmailConfig) -> Result<Self, EmailError> {
        let mut transport_builder =
            AsyncSmtpTransport::<Tokio1Executor>::starttls_relay(&config.smtp_host)?
                .port(config.smtp_port);

        if let (Some(user), Some(pass)) = (&config.smtp_user, &config.smtp_password) {
            transport_builder =
                transport_builder.credentials(Credentials::new(user.clone(), pass.clone()));
        }

        Ok(Self {
            transport: transport_builder.build(),
            config,
        })
    }

    /// Assemble the MIME message: an HTML part followed by one part per
    /// attachment.
    pub fn build_message(&self, email: &OutgoingEmail) -> Result<Message, EmailError> {
        let from = Mailbox::new(
            Some(self.config.from_name.clone()),
            self.config.from_address.parse()?,
        );

        let mut body = MultiPart::mixed().singlepart(SinglePart::html(email.html_body.clone()));
        for attachment in &email.attachments {
            body = body.singlepart(
                Attachment::new(attachment.file_name.clone())
                    .body(attachment.content.clone(), ContentType::TEXT_PLAIN),
            );
        }

        Message::builder()
            .from(from)
            .to(email.to.parse()?)
            .subject(email.subject.as_str())
            .multipart(body)
            .map_err(|e| EmailError::Build(e.to_string()))
    }
}

#[async_trait]
impl Mailer for SmtpMailer {
    async fn send(&self, email: OutgoingEmail) -> Result<(), EmailError> {
        let message = self.build_message(&email)?;
        self.transport.send(message).await?;

        tracing::info!(
            to = %email.to,
            attachments = email.attachments.len(),
            "Results email sent"
        );
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// DisabledMailer
// ---------------------------------------------------------------------------

/// Stand-in used when SMTP is not configured. Emails are logged and dropped.
pub struct DisabledMailer;

#[async_trait]
impl Mailer for DisabledMailer {
    async fn send(&self, email: OutgoingEmail) -> Result<(), EmailError> {
        tracing::warn!(
            to = %email.to,
            subject = %email.subject,
            "SMTP not configured, results email dropped"
        );
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{EmailAttachment, RESULTS_SUBJECT};

    fn mailer() -> SmtpMailer {
        SmtpMailer::new(EmailConfig {
            smtp_host: "localhost".to_string(),
            smtp_port: 2525,
            from_address: "results@autotune.example".to_string(),
            from_name: "Autotune".to_string(),
            smtp_user: None,
            smtp_password: None,
        })
        .unwrap()
    }

    fn email(to: &str) -> OutgoingEmail {
        OutgoingEmail {
            to: to.to_string(),
            subject: RESULTS_SUBJECT.to_string(),
            html_body: "<p>done</p>".to_string(),
            attachments: vec![EmailAttachment {
                file_name: "autotune.2024-03-01.log".to_string(),
                content: b"log line".to_vec(),
            }],
        }
    }

    #[test]
    fn from_env_returns_none_without_smtp_host() {
        std::env::remove_var("SMTP_HOST");
        assert!(EmailConfig::from_env().is_none());
    }

    #[tokio::test]
    async fn message_has_sender_name_subject_and_attachment() {
        let message = mailer().build_message(&email("someone@example.com")).unwrap();
        let raw = String::from_utf8(message.formatted()).unwrap();

        assert!(raw.contains("From: Autotune <results@autotune.example>"));
        assert!(raw.contains("To: someone@example.com"));
        assert!(raw.contains("Subject: Autotune Results"));
        assert!(raw.contains("filename=\"autotune.2024-03-01.log\""));
    }

    #[tokio::test]
    async fn bad_recipient_is_an_address_error() {
        let err = mailer().build_message(&email("not-an-email")).unwrap_err();
        assert!(matches!(err, EmailError::Address(_)));
    }

    #[tokio::test]
    async fn disabled_mailer_accepts_everything() {
        assert!(DisabledMailer.send(email("someone@example.com")).await.is_ok());
    }

    #[test]
    fn email_error_display_build() {
        let err = EmailError::Build("missing body".to_string());
        assert_eq!(err.to_string(), "Email build error: missing body");
    }
}
