//! Lead state machine.
//!
//! Every pipeline transition lives here as a function over `&mut Lead`.
//! A transition either applies completely or returns a precondition error
//! and leaves the lead untouched. `DoNotContact` and `Closed` are terminal:
//! only [`block`] and [`set_status`] act on them.

use chrono::{DateTime, Utc};
use outreach_shared::{
    DeliveryStatus, EmailDraft, Lead, LeadStatus, OutreachError, Result, SendKind,
};

/// Prefix stored in `reply_received` when a bounce is recorded.
pub const BOUNCE_PREFIX: &str = "BOUNCE: ";

fn ensure_active(lead: &Lead) -> Result<()> {
    if lead.status.is_terminal() {
        return Err(OutreachError::precondition(
            &lead.id,
            format!("lead is {} and accepts no further pipeline steps", lead.status),
        ));
    }
    Ok(())
}

/// Check whether an initial draft may be written for `lead`.
pub fn ensure_can_draft(lead: &Lead) -> Result<()> {
    ensure_active(lead)?;
    if !(lead.email_verified || lead.is_manually_created) {
        return Err(OutreachError::precondition(
            &lead.id,
            "email address is not verified",
        ));
    }
    if lead.date_email_sent.is_some() {
        return Err(OutreachError::precondition(
            &lead.id,
            "initial email already sent; delete the draft before redrafting",
        ));
    }
    Ok(())
}

/// Attach (or replace) the initial draft.
pub fn attach_draft(lead: &mut Lead, draft: EmailDraft) -> Result<()> {
    ensure_can_draft(lead)?;
    lead.drafted_email = Some(EmailDraft {
        is_approved: false,
        sent_date: None,
        ..draft
    });
    lead.status = LeadStatus::EmailDrafted;
    Ok(())
}

/// Check whether a follow-up may be drafted for `lead`.
pub fn ensure_can_draft_follow_up(lead: &Lead) -> Result<()> {
    ensure_active(lead)?;
    if lead.date_email_sent.is_none() {
        return Err(OutreachError::precondition(
            &lead.id,
            "initial email has not been sent",
        ));
    }
    if lead.follow_up_email.is_some() {
        return Err(OutreachError::precondition(
            &lead.id,
            "a follow-up draft already exists",
        ));
    }
    Ok(())
}

pub fn attach_follow_up(lead: &mut Lead, draft: EmailDraft) -> Result<()> {
    ensure_can_draft_follow_up(lead)?;
    lead.follow_up_email = Some(EmailDraft {
        is_approved: false,
        sent_date: None,
        ..draft
    });
    lead.status = LeadStatus::FollowUpDrafted;
    Ok(())
}

/// Approve the draft of `kind`. Approving the initial draft moves the lead
/// to `EmailApproved`; follow-up approval keeps `FollowUpDrafted`.
pub fn approve(lead: &mut Lead, kind: SendKind) -> Result<()> {
    ensure_active(lead)?;
    let id = lead.id.clone();
    let draft = lead
        .draft_mut(kind)
        .ok_or_else(|| OutreachError::precondition(&id, format!("no {kind} draft to approve")))?;
    if draft.is_sent() {
        return Err(OutreachError::precondition(
            &id,
            format!("{kind} email was already sent"),
        ));
    }
    draft.is_approved = true;
    if kind == SendKind::Initial {
        lead.status = LeadStatus::EmailApproved;
    }
    Ok(())
}

/// Check that the draft of `kind` is approved and unsent.
///
/// Compliance and schedule checks are separate; see
/// [`crate::state::PipelineState::check_send`].
pub fn ensure_sendable(lead: &Lead, kind: SendKind) -> Result<&EmailDraft> {
    ensure_active(lead)?;
    let draft = lead
        .draft(kind)
        .ok_or_else(|| OutreachError::precondition(&lead.id, format!("no {kind} draft")))?;
    if !draft.is_approved {
        return Err(OutreachError::precondition(
            &lead.id,
            format!("{kind} draft is not approved"),
        ));
    }
    if draft.is_sent() {
        return Err(OutreachError::precondition(
            &lead.id,
            format!("{kind} email was already sent"),
        ));
    }
    Ok(draft)
}

/// Record a successful transport hand-off.
pub fn record_sent(lead: &mut Lead, kind: SendKind, now: DateTime<Utc>) -> Result<()> {
    ensure_sendable(lead, kind)?;
    if let Some(draft) = lead.draft_mut(kind) {
        draft.sent_date = Some(now);
    }
    match kind {
        SendKind::Initial => {
            lead.date_email_sent = Some(now);
            lead.status = LeadStatus::EmailSent;
        }
        SendKind::FollowUp => {
            lead.date_follow_up_sent = Some(now);
            lead.status = LeadStatus::FollowUpSent;
        }
    }
    lead.delivery_status = DeliveryStatus::Delivered;
    lead.scheduled_send_date = None;
    Ok(())
}

/// Record a transport failure. Status is left as it was.
pub fn record_send_failure(lead: &mut Lead) {
    lead.delivery_status = DeliveryStatus::Failed;
}

/// Force the lead to `DoNotContact` because its address is blocklisted.
/// Applies from any state.
pub fn block(lead: &mut Lead) {
    lead.opted_out = true;
    lead.status = LeadStatus::DoNotContact;
}

/// A genuine reply. Terminal leads keep their status but the reply text is
/// still recorded.
pub fn record_reply(lead: &mut Lead, snippet: &str) {
    lead.reply_received = snippet.to_string();
    if !lead.status.is_terminal() {
        lead.status = LeadStatus::Replied;
    }
}

/// The recipient asked not to be contacted again.
pub fn record_unsubscribe(lead: &mut Lead, snippet: &str, now: DateTime<Utc>) {
    lead.reply_received = snippet.to_string();
    lead.unsubscribed_date = Some(now);
    block(lead);
}

/// A delivery-failure notification arrived in place of a reply.
pub fn record_bounce(lead: &mut Lead, snippet: &str) {
    lead.delivery_status = DeliveryStatus::Bounced;
    lead.reply_received = format!("{BOUNCE_PREFIX}{snippet}");
}

/// Clear the unsent initial draft and return to `Identified`.
pub fn delete_draft(lead: &mut Lead) -> Result<()> {
    ensure_active(lead)?;
    if lead.drafted_email.is_none() {
        return Err(OutreachError::precondition(&lead.id, "no draft to delete"));
    }
    if lead.date_email_sent.is_some() {
        return Err(OutreachError::precondition(
            &lead.id,
            "initial email was already sent",
        ));
    }
    lead.drafted_email = None;
    lead.scheduled_send_date = None;
    lead.status = LeadStatus::Identified;
    Ok(())
}

/// Clear the unsent follow-up and return to `EmailSent`.
pub fn delete_follow_up_draft(lead: &mut Lead) -> Result<()> {
    ensure_active(lead)?;
    match &lead.follow_up_email {
        None => {
            return Err(OutreachError::precondition(
                &lead.id,
                "no follow-up draft to delete",
            ));
        }
        Some(draft) if draft.is_sent() => {
            return Err(OutreachError::precondition(
                &lead.id,
                "follow-up was already sent",
            ));
        }
        Some(_) => {}
    }
    lead.follow_up_email = None;
    lead.scheduled_send_date = None;
    lead.status = LeadStatus::EmailSent;
    Ok(())
}

/// Manual status edit. Allowed from any state; `blocked` says whether the
/// lead's address is currently on the blocklist, in which case the lead
/// cannot leave `DoNotContact`.
pub fn set_status(lead: &mut Lead, status: LeadStatus, blocked: bool) -> Result<()> {
    if blocked && status != LeadStatus::DoNotContact {
        return Err(OutreachError::precondition(
            &lead.id,
            format!("{} is blocklisted; status must stay doNotContact", lead.email),
        ));
    }
    lead.status = status;
    lead.opted_out = status == LeadStatus::DoNotContact;
    Ok(())
}
