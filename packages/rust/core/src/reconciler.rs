//! Inbound reply reconciliation.
//!
//! Fetches the inbox for everything that could answer our outreach,
//! classifies each message and matches it to the lead it responds to:
//!
//! 1. subject match against the subjects we actually sent, first lead in
//!    store order wins;
//! 2. otherwise, sender address containing a contacted lead's email.
//!
//! Unmatched messages are returned untouched. Matched ones update the lead
//! (and, for opt-outs, the blocklist) and are reported to the event log.

use std::collections::BTreeSet;

use chrono::{DateTime, Utc};
use outreach_shared::{InboundMessage, Lead, LeadId, Result};
use tokio::sync::Mutex;
use tracing::{debug, info, instrument};

use crate::classify::{self, InboundKind};
use crate::clock::Clock;
use crate::collaborators::{EventLog, LogReceipt, MailTransport, ReplyEvent};
use crate::lifecycle;
use crate::state::PipelineState;

/// Longest snippet taken from a body when the transport gave none.
const SNIPPET_CHARS: usize = 200;

/// How a message was tied to its lead.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MatchedBy {
    Subject,
    Sender,
}

/// One reconciled message.
#[derive(Debug, Clone, PartialEq)]
pub struct ReplyMatch {
    pub lead_id: LeadId,
    pub kind: InboundKind,
    pub matched_by: MatchedBy,
    pub message: InboundMessage,
    /// False when the lead already reflected this message (a re-run).
    pub changed: bool,
    /// Event-log outcome; `None` when nothing changed and nothing was logged.
    pub log: Option<LogReceipt>,
}

/// Outcome of one reconciliation run.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ReconcileReport {
    pub fetched: usize,
    pub matches: Vec<ReplyMatch>,
    /// Messages no lead claimed, kept for display.
    pub unmatched: Vec<InboundMessage>,
}

impl ReconcileReport {
    pub fn count(&self, kind: InboundKind) -> usize {
        self.matches.iter().filter(|m| m.kind == kind).count()
    }

    pub fn log_failures(&self) -> usize {
        self.matches
            .iter()
            .filter(|m| m.log.as_ref().is_some_and(LogReceipt::is_failed))
            .count()
    }
}

/// Subjects of the emails actually sent to `lead`.
pub fn sent_subjects(lead: &Lead) -> Vec<&str> {
    let mut subjects = Vec::new();
    if let Some(draft) = &lead.drafted_email {
        if draft.is_sent() || lead.date_email_sent.is_some() {
            subjects.push(draft.subject.as_str());
        }
    }
    if let Some(draft) = &lead.follow_up_email {
        if draft.is_sent() || lead.date_follow_up_sent.is_some() {
            subjects.push(draft.subject.as_str());
        }
    }
    subjects
}

/// Find the lead `message` answers. Subject matches across all leads take
/// precedence over the sender fallback; within each rule the first lead in
/// store order wins.
pub fn match_lead(leads: &[Lead], message: &InboundMessage, threshold: f64) -> Option<(LeadId, MatchedBy)> {
    leads
        .iter()
        .find(|lead| {
            sent_subjects(lead)
                .into_iter()
                .any(|subject| classify::subjects_match(subject, &message.subject, threshold))
        })
        .map(|lead| (lead.id.clone(), MatchedBy::Subject))
        .or_else(|| {
            leads
                .iter()
                .find(|lead| {
                    lead.has_been_contacted() && classify::sender_matches(&message.from, &lead.email)
                })
                .map(|lead| (lead.id.clone(), MatchedBy::Sender))
        })
}

fn snippet_of(message: &InboundMessage) -> String {
    let snippet = message.snippet.trim();
    if !snippet.is_empty() {
        return snippet.to_string();
    }
    message.body.trim().chars().take(SNIPPET_CHARS).collect()
}

/// Apply one classified message to its lead. Returns whether the lead
/// changed, plus the lead as it is afterwards.
fn apply(
    state: &mut PipelineState,
    id: &LeadId,
    kind: InboundKind,
    message: &InboundMessage,
    now: DateTime<Utc>,
) -> Option<(bool, Lead)> {
    let snippet = snippet_of(message);
    let recorded = match kind {
        InboundKind::Bounce => format!("{}{snippet}", lifecycle::BOUNCE_PREFIX),
        _ => snippet.clone(),
    };
    let lead = state.leads_mut().get_mut(id)?;
    // Already applied on an earlier run; the lead may have moved on since.
    if lead.reply_received == recorded {
        return Some((false, lead.clone()));
    }
    let before = lead.clone();

    match kind {
        InboundKind::Unsubscribe => {
            if lead.opted_out {
                lead.reply_received = snippet;
            } else {
                lifecycle::record_unsubscribe(lead, &snippet, now);
            }
        }
        InboundKind::Bounce => lifecycle::record_bounce(lead, &snippet),
        InboundKind::Reply => lifecycle::record_reply(lead, &snippet),
    }

    let changed = *lead != before;
    let after = lead.clone();
    if kind == InboundKind::Unsubscribe
        && state.gate_mut().add_to_blocklist(&after.email, "unsubscribe request")
    {
        state.persist_compliance();
    }
    Some((changed, after))
}

pub(crate) enum Reconciled {
    /// The event is present only when the lead changed.
    Matched(ReplyMatch, Option<ReplyEvent>),
    Unmatched(InboundMessage),
}

/// Classify, match and apply one message. Lead persistence is left to the
/// caller.
pub(crate) fn reconcile_message(
    state: &mut PipelineState,
    message: InboundMessage,
    threshold: f64,
    now: DateTime<Utc>,
) -> Reconciled {
    let kind = classify::classify_message(&message);
    let Some((lead_id, matched_by)) = match_lead(state.leads(), &message, threshold) else {
        debug!(from = %message.from, subject = %message.subject, "unmatched inbound message");
        return Reconciled::Unmatched(message);
    };
    let Some((changed, lead)) = apply(state, &lead_id, kind, &message, now) else {
        return Reconciled::Unmatched(message);
    };
    info!(lead = %lead_id, ?kind, ?matched_by, changed, "inbound message matched");

    let event = changed.then(|| ReplyEvent {
        status: lead.status,
        snippet: lead.reply_received.clone(),
        lead,
    });
    let found = ReplyMatch {
        lead_id,
        kind,
        matched_by,
        message,
        changed,
        log: None,
    };
    Reconciled::Matched(found, event)
}

pub(crate) struct Reconciler<'a> {
    pub state: &'a Mutex<PipelineState>,
    pub transport: &'a dyn MailTransport,
    pub event_log: &'a dyn EventLog,
    pub clock: &'a dyn Clock,
    pub overlap_threshold: f64,
}

impl Reconciler<'_> {
    #[instrument(skip_all)]
    pub async fn run(&self) -> Result<ReconcileReport> {
        let (subjects, emails) = {
            let state = self.state.lock().await;
            let mut subjects = BTreeSet::new();
            let mut emails = Vec::new();
            for lead in state.leads().iter().filter(|l| l.has_been_contacted()) {
                subjects.extend(sent_subjects(lead).into_iter().map(str::to_string));
                emails.push(lead.email.clone());
            }
            (subjects, emails)
        };

        if subjects.is_empty() && emails.is_empty() {
            debug!("no sent outreach to reconcile");
            return Ok(ReconcileReport::default());
        }

        let messages = self.transport.fetch_replies(&subjects, &emails).await?;
        let mut report = ReconcileReport {
            fetched: messages.len(),
            ..Default::default()
        };

        let mut events = Vec::new();
        {
            let mut state = self.state.lock().await;
            let now = self.clock.now();
            let mut any_changed = false;

            for message in messages {
                match reconcile_message(&mut state, message, self.overlap_threshold, now) {
                    Reconciled::Matched(found, event) => {
                        any_changed |= found.changed;
                        if let Some(event) = event {
                            events.push((report.matches.len(), event));
                        }
                        report.matches.push(found);
                    }
                    Reconciled::Unmatched(message) => report.unmatched.push(message),
                }
            }

            if any_changed {
                state.persist_leads();
            }
        }

        for (index, event) in events {
            let receipt = LogReceipt::from_result(self.event_log.log_reply_received(&event).await);
            report.matches[index].log = Some(receipt);
        }

        info!(
            fetched = report.fetched,
            replies = report.count(InboundKind::Reply),
            bounces = report.count(InboundKind::Bounce),
            unsubscribes = report.count(InboundKind::Unsubscribe),
            unmatched = report.unmatched.len(),
            "reconciliation complete"
        );
        Ok(report)
    }
}
