//! Turns a completion outcome into the results email.

use autotune_notify::templates::{render_failure, render_success};
use autotune_notify::{EmailAttachment, EmailError, Mailer, OutgoingEmail, RESULTS_SUBJECT};

use crate::engine::completion::CompletionOutcome;

pub fn compose(
    to: &str,
    outcome: &CompletionOutcome,
    attachments: Vec<EmailAttachment>,
) -> OutgoingEmail {
    let html_body = match outcome {
        CompletionOutcome::Success {
            recommendations, ..
        } => render_success(recommendations),
        CompletionOutcome::Failure { .. } => render_failure(),
    };

    OutgoingEmail {
        to: to.to_string(),
        subject: RESULTS_SUBJECT.to_string(),
        html_body,
        attachments,
    }
}

/// Send the results email and wait for the mailer to accept it.
pub async fn send_results(
    mailer: &dyn Mailer,
    to: &str,
    outcome: &CompletionOutcome,
    attachments: Vec<EmailAttachment>,
) -> Result<(), EmailError> {
    mailer.send(compose(to, outcome, attachments)).await
}
