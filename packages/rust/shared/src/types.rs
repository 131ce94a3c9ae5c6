//! Core domain types for the outreach pipeline.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

// ---------------------------------------------------------------------------
// LeadId
// ---------------------------------------------------------------------------

/// A UUID v7 wrapper for lead identifiers (time-sortable).
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct LeadId(pub Uuid);

impl LeadId {
    /// Generate a new time-sortable lead identifier.
    pub fn new() -> Self {
        Self(Uuid::now_v7())
    }
}

impl Default for LeadId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for LeadId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl std::str::FromStr for LeadId {
    type Err = uuid::Error;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        Ok(Self(Uuid::parse_str(s)?))
    }
}

// ---------------------------------------------------------------------------
// Status enums
// ---------------------------------------------------------------------------

/// Pipeline stage of a lead.
///
/// Unknown values fail to decode instead of falling back to a default.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum LeadStatus {
    #[default]
    Identified,
    Contacted,
    EmailDrafted,
    EmailApproved,
    EmailSent,
    FollowedUp,
    FollowUpDrafted,
    FollowUpSent,
    Qualified,
    Converted,
    NotInterested,
    Replied,
    DoNotContact,
    Closed,
}

impl LeadStatus {
    /// Every status, in pipeline order.
    pub const ALL: [LeadStatus; 14] = [
        Self::Identified,
        Self::Contacted,
        Self::EmailDrafted,
        Self::EmailApproved,
        Self::EmailSent,
        Self::FollowedUp,
        Self::FollowUpDrafted,
        Self::FollowUpSent,
        Self::Qualified,
        Self::Converted,
        Self::NotInterested,
        Self::Replied,
        Self::DoNotContact,
        Self::Closed,
    ];

    /// Terminal states accept no further pipeline transitions.
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::DoNotContact | Self::Closed)
    }

    /// The camelCase wire name.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Identified => "identified",
            Self::Contacted => "contacted",
            Self::EmailDrafted => "emailDrafted",
            Self::EmailApproved => "emailApproved",
            Self::EmailSent => "emailSent",
            Self::FollowedUp => "followedUp",
            Self::FollowUpDrafted => "followUpDrafted",
            Self::FollowUpSent => "followUpSent",
            Self::Qualified => "qualified",
            Self::Converted => "converted",
            Self::NotInterested => "notInterested",
            Self::Replied => "replied",
            Self::DoNotContact => "doNotContact",
            Self::Closed => "closed",
        }
    }
}

impl std::fmt::Display for LeadStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for LeadStatus {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|status| status.as_str().eq_ignore_ascii_case(s))
            .ok_or_else(|| format!("unknown lead status: {s}"))
    }
}

/// Outcome of the most recent send attempt for a lead.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum DeliveryStatus {
    #[default]
    None,
    Delivered,
    Bounced,
    Failed,
}

/// Which of a lead's two emails an operation refers to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum SendKind {
    Initial,
    FollowUp,
}

impl std::fmt::Display for SendKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Initial => f.write_str("initial"),
            Self::FollowUp => f.write_str("follow-up"),
        }
    }
}

// ---------------------------------------------------------------------------
// EmailDraft
// ---------------------------------------------------------------------------

/// An email awaiting approval, or the record of one that was sent.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EmailDraft {
    pub subject: String,
    pub body: String,
    #[serde(default)]
    pub is_approved: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sent_date: Option<DateTime<Utc>>,
}

impl EmailDraft {
    /// A fresh, unapproved draft.
    pub fn new(subject: impl Into<String>, body: impl Into<String>) -> Self {
        Self {
            subject: subject.into(),
            body: body.into(),
            is_approved: false,
            sent_date: None,
        }
    }

    pub fn is_sent(&self) -> bool {
        self.sent_date.is_some()
    }

    /// Approved and not yet sent.
    pub fn is_ready(&self) -> bool {
        self.is_approved && !self.is_sent()
    }
}

// ---------------------------------------------------------------------------
// Lead
// ---------------------------------------------------------------------------

/// A contact record moving through the outreach pipeline.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Lead {
    pub id: LeadId,
    pub name: String,
    #[serde(default)]
    pub company: String,
    pub email: String,
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub phone: String,
    #[serde(default)]
    pub linkedin_url: String,
    #[serde(default)]
    pub email_verified: bool,
    #[serde(default)]
    pub status: LeadStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub drafted_email: Option<EmailDraft>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub follow_up_email: Option<EmailDraft>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub scheduled_send_date: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub date_email_sent: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub date_follow_up_sent: Option<DateTime<Utc>>,
    #[serde(default)]
    pub delivery_status: DeliveryStatus,
    /// Snippet of the last inbound message; empty means none.
    #[serde(default)]
    pub reply_received: String,
    #[serde(default)]
    pub opted_out: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub unsubscribed_date: Option<DateTime<Utc>>,
    #[serde(default)]
    pub is_manually_created: bool,
    /// Background handed to the drafting service.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub research_summary: Option<String>,
    pub date_identified: DateTime<Utc>,
}

impl Lead {
    /// A newly identified lead with only the required contact fields set.
    pub fn new(name: impl Into<String>, company: impl Into<String>, email: impl Into<String>) -> Self {
        Self {
            id: LeadId::new(),
            name: name.into(),
            company: company.into(),
            email: email.into(),
            title: String::new(),
            phone: String::new(),
            linkedin_url: String::new(),
            email_verified: false,
            status: LeadStatus::Identified,
            drafted_email: None,
            follow_up_email: None,
            scheduled_send_date: None,
            date_email_sent: None,
            date_follow_up_sent: None,
            delivery_status: DeliveryStatus::None,
            reply_received: String::new(),
            opted_out: false,
            unsubscribed_date: None,
            is_manually_created: false,
            research_summary: None,
            date_identified: Utc::now(),
        }
    }

    /// A lead entered by hand; drafting is allowed without verification.
    pub fn manual(name: impl Into<String>, company: impl Into<String>, email: impl Into<String>) -> Self {
        Self {
            is_manually_created: true,
            ..Self::new(name, company, email)
        }
    }

    /// The draft of the given kind, if any.
    pub fn draft(&self, kind: SendKind) -> Option<&EmailDraft> {
        match kind {
            SendKind::Initial => self.drafted_email.as_ref(),
            SendKind::FollowUp => self.follow_up_email.as_ref(),
        }
    }

    pub fn draft_mut(&mut self, kind: SendKind) -> Option<&mut EmailDraft> {
        match kind {
            SendKind::Initial => self.drafted_email.as_mut(),
            SendKind::FollowUp => self.follow_up_email.as_mut(),
        }
    }

    /// Whether the lead has been sent at least one email.
    pub fn has_been_contacted(&self) -> bool {
        self.date_email_sent.is_some() || self.date_follow_up_sent.is_some()
    }

    pub fn has_reply(&self) -> bool {
        !self.reply_received.is_empty()
    }
}

// ---------------------------------------------------------------------------
// Prospect
// ---------------------------------------------------------------------------

/// A contact returned by a discovery source, not yet tracked as a lead.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Prospect {
    pub name: String,
    pub company: String,
    pub email: String,
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub phone: String,
    #[serde(default)]
    pub linkedin_url: String,
    #[serde(default)]
    pub email_verified: bool,
    #[serde(default)]
    pub research_summary: Option<String>,
}

impl From<Prospect> for Lead {
    fn from(p: Prospect) -> Self {
        Self {
            title: p.title,
            phone: p.phone,
            linkedin_url: p.linkedin_url,
            email_verified: p.email_verified,
            research_summary: p.research_summary,
            ..Lead::new(p.name, p.company, p.email)
        }
    }
}

// ---------------------------------------------------------------------------
// Compliance & scheduling records
// ---------------------------------------------------------------------------

/// Persisted form of the opt-out blocklist. All entries are lower-cased.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ComplianceRecord {
    #[serde(default)]
    pub emails: Vec<String>,
    #[serde(default)]
    pub domains: Vec<String>,
}

/// A user-deferred send.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScheduledSend {
    pub id: Uuid,
    pub lead_id: LeadId,
    pub kind: SendKind,
    pub scheduled_date: DateTime<Utc>,
    #[serde(default)]
    pub sent: bool,
}

impl ScheduledSend {
    pub fn new(lead_id: LeadId, kind: SendKind, scheduled_date: DateTime<Utc>) -> Self {
        Self {
            id: Uuid::now_v7(),
            lead_id,
            kind,
            scheduled_date,
            sent: false,
        }
    }
}

// ---------------------------------------------------------------------------
// InboundMessage
// ---------------------------------------------------------------------------

/// A message fetched from the outreach inbox.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct InboundMessage {
    pub from: String,
    pub subject: String,
    #[serde(default)]
    pub snippet: String,
    #[serde(default)]
    pub body: String,
}
