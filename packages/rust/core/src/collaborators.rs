//! Contracts for the external services the pipeline calls.
//!
//! None of these are implemented here: drafting, delivery, inbox polling,
//! spreadsheet logging and prospect search belong to adapters wired in at
//! the composition root.

use std::collections::BTreeSet;

use async_trait::async_trait;
use outreach_shared::{EmailDraft, InboundMessage, Lead, LeadStatus, Prospect, Result, SendKind};

/// AI drafting service. Errors are scoped to the one lead being drafted.
#[async_trait]
pub trait Drafter: Send + Sync {
    async fn draft_email(
        &self,
        lead: &Lead,
        research_summary: &str,
        sender_name: &str,
    ) -> Result<EmailDraft>;

    async fn draft_follow_up(&self, request: &FollowUpRequest) -> Result<EmailDraft>;

    async fn subject_variants(&self, context: &str) -> Result<Vec<String>>;
}

/// Context handed to [`Drafter::draft_follow_up`].
#[derive(Debug, Clone)]
pub struct FollowUpRequest {
    pub lead: Lead,
    /// Body of the initial email as sent.
    pub original_body: String,
    /// Body of an earlier follow-up, when the lead has one.
    pub prior_follow_up_body: Option<String>,
    /// Whatever the lead has answered so far.
    pub reply_text: Option<String>,
    pub sender_name: String,
}

/// Mail delivery and inbox access.
#[async_trait]
pub trait MailTransport: Send + Sync {
    /// Hand one message to the transport. Returns the transport's message id.
    async fn send(&self, to: &str, from: &str, subject: &str, body: &str) -> Result<String>;

    /// Fetch inbound messages whose subject matches one of `subjects` or
    /// whose sender is one of `lead_emails`.
    async fn fetch_replies(
        &self,
        subjects: &BTreeSet<String>,
        lead_emails: &[String],
    ) -> Result<Vec<InboundMessage>>;
}

/// A sent email, as reported to the event log.
#[derive(Debug, Clone)]
pub struct EmailEvent {
    pub lead: Lead,
    pub kind: SendKind,
    pub subject: String,
    pub message_id: String,
}

/// A reconciled inbound message, as reported to the event log.
#[derive(Debug, Clone)]
pub struct ReplyEvent {
    pub lead: Lead,
    pub status: LeadStatus,
    pub snippet: String,
}

/// Spreadsheet-style activity log. Failures never abort the pipeline; the
/// caller reports them through a [`LogReceipt`].
#[async_trait]
pub trait EventLog: Send + Sync {
    async fn log_email_event(&self, event: &EmailEvent) -> Result<()>;

    async fn log_reply_received(&self, event: &ReplyEvent) -> Result<()>;
}

/// An event log that records nothing.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopEventLog;

#[async_trait]
impl EventLog for NoopEventLog {
    async fn log_email_event(&self, _event: &EmailEvent) -> Result<()> {
        Ok(())
    }

    async fn log_reply_received(&self, _event: &ReplyEvent) -> Result<()> {
        Ok(())
    }
}

/// Result of a best-effort event-log write.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LogReceipt {
    Logged,
    Failed(String),
}

impl LogReceipt {
    pub fn from_result(result: Result<()>) -> Self {
        match result {
            Ok(()) => Self::Logged,
            Err(e) => {
                tracing::warn!(error = %e, "event log write failed; continuing");
                Self::Failed(e.to_string())
            }
        }
    }

    pub fn is_failed(&self) -> bool {
        matches!(self, Self::Failed(_))
    }
}

/// Prospect discovery (company/contact search).
#[async_trait]
pub trait LeadSource: Send + Sync {
    async fn search(&self, region: &str, query: &str) -> Result<Vec<Prospect>>;
}
