//! Scripted collaborators for unit tests.

use std::collections::{BTreeSet, HashMap, HashSet};
use std::sync::Mutex;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use outreach_shared::{EmailDraft, InboundMessage, Lead, OutreachError, Prospect, Result};

use crate::collaborators::{
    Drafter, EmailEvent, EventLog, FollowUpRequest, LeadSource, MailTransport, ReplyEvent,
};

#[derive(Default)]
pub(crate) struct ScriptedTransport {
    sent: Mutex<Vec<String>>,
    failing: Mutex<HashSet<String>>,
    latency: Mutex<Duration>,
    inbox: Mutex<Vec<InboundMessage>>,
    fail_fetch: AtomicBool,
    attempts: AtomicUsize,
    in_flight: AtomicUsize,
    pub max_in_flight: AtomicUsize,
    pub last_query: Mutex<Option<(BTreeSet<String>, Vec<String>)>>,
}

impl ScriptedTransport {
    pub fn fail_for(&self, to: &str) {
        self.failing.lock().unwrap().insert(to.to_string());
    }

    pub fn set_latency(&self, latency: Duration) {
        *self.latency.lock().unwrap() = latency;
    }

    pub fn deliver_to_inbox(&self, message: InboundMessage) {
        self.inbox.lock().unwrap().push(message);
    }

    pub fn fail_fetch(&self) {
        self.fail_fetch.store(true, Ordering::SeqCst);
    }

    pub fn sent_to(&self) -> Vec<String> {
        self.sent.lock().unwrap().clone()
    }

    pub fn attempts(&self) -> usize {
        self.attempts.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl MailTransport for ScriptedTransport {
    async fn send(&self, to: &str, _from: &str, _subject: &str, _body: &str) -> Result<String> {
        let attempt = self.attempts.fetch_add(1, Ordering::SeqCst) + 1;
        let now_in_flight = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_in_flight.fetch_max(now_in_flight, Ordering::SeqCst);

        let latency = *self.latency.lock().unwrap();
        if !latency.is_zero() {
            tokio::time::sleep(latency).await;
        }
        self.in_flight.fetch_sub(1, Ordering::SeqCst);

        if self.failing.lock().unwrap().contains(to) {
            return Err(OutreachError::Transport(format!("550 rejected {to}")));
        }
        self.sent.lock().unwrap().push(to.to_string());
        Ok(format!("msg-{attempt}"))
    }

    async fn fetch_replies(
        &self,
        subjects: &BTreeSet<String>,
        lead_emails: &[String],
    ) -> Result<Vec<InboundMessage>> {
        *self.last_query.lock().unwrap() = Some((subjects.clone(), lead_emails.to_vec()));
        if self.fail_fetch.load(Ordering::SeqCst) {
            return Err(OutreachError::Transport("IMAP timeout".into()));
        }
        Ok(self.inbox.lock().unwrap().clone())
    }
}

#[derive(Default)]
pub(crate) struct RecordingEventLog {
    email_events: AtomicUsize,
    reply_events: Mutex<Vec<ReplyEvent>>,
    fail: AtomicBool,
}

impl RecordingEventLog {
    pub fn fail_all(&self) {
        self.fail.store(true, Ordering::SeqCst);
    }

    pub fn email_events(&self) -> usize {
        self.email_events.load(Ordering::SeqCst)
    }

    pub fn reply_events(&self) -> Vec<ReplyEvent> {
        self.reply_events.lock().unwrap().clone()
    }
}

#[async_trait]
impl EventLog for RecordingEventLog {
    async fn log_email_event(&self, _event: &EmailEvent) -> Result<()> {
        if self.fail.load(Ordering::SeqCst) {
            return Err(OutreachError::EventLog("sheet quota exceeded".into()));
        }
        self.email_events.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    async fn log_reply_received(&self, event: &ReplyEvent) -> Result<()> {
        if self.fail.load(Ordering::SeqCst) {
            return Err(OutreachError::EventLog("sheet quota exceeded".into()));
        }
        self.reply_events.lock().unwrap().push(event.clone());
        Ok(())
    }
}

/// Drafts "Intro for {name}" / "Following up, {name}" and records what it saw.
#[derive(Default)]
pub(crate) struct ScriptedDrafter {
    fail: AtomicBool,
    pub follow_up_requests: Mutex<Vec<FollowUpRequest>>,
}

impl ScriptedDrafter {
    pub fn fail_all(&self) {
        self.fail.store(true, Ordering::SeqCst);
    }
}

#[async_trait]
impl Drafter for ScriptedDrafter {
    async fn draft_email(&self, lead: &Lead, research_summary: &str, sender_name: &str) -> Result<EmailDraft> {
        if self.fail.load(Ordering::SeqCst) {
            return Err(OutreachError::Drafting("model unavailable".into()));
        }
        Ok(EmailDraft::new(
            format!("Intro for {}", lead.name),
            format!("{research_summary}\n\n{sender_name}"),
        ))
    }

    async fn draft_follow_up(&self, request: &FollowUpRequest) -> Result<EmailDraft> {
        if self.fail.load(Ordering::SeqCst) {
            return Err(OutreachError::Drafting("model unavailable".into()));
        }
        self.follow_up_requests.lock().unwrap().push(request.clone());
        Ok(EmailDraft::new(
            format!("Following up, {}", request.lead.name),
            "Just checking in.",
        ))
    }

    async fn subject_variants(&self, context: &str) -> Result<Vec<String>> {
        Ok(vec![format!("{context}?"), format!("Idea: {context}")])
    }
}

/// Returns fixed prospects per region; unknown regions fail.
#[derive(Default)]
pub(crate) struct StaticLeadSource {
    pub by_region: HashMap<String, Vec<Prospect>>,
    pub latency: Duration,
    pub searches: AtomicUsize,
}

#[async_trait]
impl LeadSource for StaticLeadSource {
    async fn search(&self, region: &str, _query: &str) -> Result<Vec<Prospect>> {
        self.searches.fetch_add(1, Ordering::SeqCst);
        if !self.latency.is_zero() {
            tokio::time::sleep(self.latency).await;
        }
        self.by_region
            .get(region)
            .cloned()
            .ok_or_else(|| OutreachError::Discovery(format!("no results for {region}")))
    }
}

pub(crate) fn prospect(name: &str, email: &str) -> Prospect {
    Prospect {
        name: name.into(),
        company: "Acme".into(),
        email: email.into(),
        email_verified: true,
        ..Default::default()
    }
}
