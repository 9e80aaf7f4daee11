//! Result notification emails.
//!
//! [`Mailer`] is the seam the completion callback sends through;
//! [`SmtpMailer`] delivers over SMTP with `lettre`, and [`templates`]
//! renders the HTML bodies.

pub mod email;
pub mod templates;

use async_trait::async_trait;

pub use email::{DisabledMailer, EmailConfig, EmailError, SmtpMailer};

/// Subject line of every results email.
pub const RESULTS_SUBJECT: &str = "Autotune Results";

/// A file attached to a results email.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EmailAttachment {
    pub file_name: String,
    pub content: Vec<u8>,
}

/// A fully rendered email ready to send.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutgoingEmail {
    pub to: String,
    pub subject: String,
    pub html_body: String,
    pub attachments: Vec<EmailAttachment>,
}

#[async_trait]
pub trait Mailer: Send + Sync {
    async fn send(&self, email: OutgoingEmail) -> Result<(), EmailError>;
}
